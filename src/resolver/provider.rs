//! `pubgrub::DependencyProvider` implementation. Covers only
//! range-constrained (non-pinned) dependencies — path, repository, and
//! branch dependencies are identity-matched by [`super::resolve`]
//! before pubgrub ever sees them (see DESIGN.md).

use super::candidates::CandidateSource;
use crate::recipe::{DependencySource, Recipe};
use crate::version::{Identifier, Version, VersionRange};
use pubgrub::{
    Dependencies, DependencyConstraints, DependencyProvider, PackageResolutionStatistics, Ranges,
};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

/// A total-order wrapper around the numeric half of [`Version`], used
/// only for pubgrub's interval bookkeeping. Branch versions never reach
/// this type (see module docs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NumericVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
}

impl NumericVersion {
    pub fn from_version(v: &Version) -> Option<Self> {
        match v {
            Version::Numeric { major, minor, patch, pre, .. } => Some(NumericVersion {
                major: *major,
                minor: *minor,
                patch: *patch,
                pre: pre.clone(),
            }),
            Version::Branch(_) => None,
        }
    }

    pub fn to_version(&self) -> Version {
        Version::Numeric {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre: self.pre.clone(),
            build: Vec::new(),
        }
    }
}

impl fmt::Display for NumericVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-")?;
            for (i, id) in self.pre.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{id}")?;
            }
        }
        Ok(())
    }
}

impl PartialOrd for NumericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

pub type NumericRange = Ranges<NumericVersion>;

/// Converts a numeric-only [`VersionRange`] into pubgrub's interval
/// representation. Returns `None` if `range` mentions a branch anywhere
/// (those dependencies are pre-resolved outside pubgrub).
pub fn version_range_to_ranges(range: &VersionRange) -> Option<NumericRange> {
    match range {
        VersionRange::Any => Some(Ranges::full()),
        VersionRange::Empty => Some(Ranges::empty()),
        VersionRange::Branch(_) => None,
        VersionRange::Exact(v) => NumericVersion::from_version(v).map(Ranges::singleton),
        VersionRange::Interval { lo, lo_inclusive, hi, hi_inclusive } => {
            let lo = match lo {
                None => std::ops::Bound::Unbounded,
                Some(v) => {
                    let nv = NumericVersion::from_version(v)?;
                    if *lo_inclusive {
                        std::ops::Bound::Included(nv)
                    } else {
                        std::ops::Bound::Excluded(nv)
                    }
                }
            };
            let hi = match hi {
                None => std::ops::Bound::Unbounded,
                Some(v) => {
                    let nv = NumericVersion::from_version(v)?;
                    if *hi_inclusive {
                        std::ops::Bound::Included(nv)
                    } else {
                        std::ops::Bound::Excluded(nv)
                    }
                }
            };
            Some(Ranges::from_range_bounds((lo, hi)))
        }
        VersionRange::And(a, b) => {
            Some(version_range_to_ranges(a)?.intersection(&version_range_to_ranges(b)?))
        }
        VersionRange::Or(parts) => {
            let mut acc = Ranges::empty();
            for part in parts {
                acc = acc.union(&version_range_to_ranges(part)?);
            }
            Some(acc)
        }
    }
}

/// Feeds pubgrub from a [`CandidateSource`], reusing an existing
/// [`crate::selections::Selections`] pin when `prefer_existing` holds
/// for a name, for resolver stability across repeated resolves.
pub struct ResolverProvider<'a, F: crate::store::FileSystem> {
    pub candidates: &'a CandidateSource<'a, F>,
    pub prefer_existing: HashMap<String, Version>,
    recipe_cache: RefCell<HashMap<(String, NumericVersion), Recipe>>,
}

impl<'a, F: crate::store::FileSystem> ResolverProvider<'a, F> {
    pub fn new(candidates: &'a CandidateSource<'a, F>, prefer_existing: HashMap<String, Version>) -> Self {
        Self {
            candidates,
            prefer_existing,
            recipe_cache: RefCell::new(HashMap::new()),
        }
    }

    fn load_recipe(&self, name: &str, version: &NumericVersion) -> Option<Recipe> {
        let key = (name.to_string(), version.clone());
        if let Some(recipe) = self.recipe_cache.borrow().get(&key) {
            return Some(recipe.clone());
        }
        let recipe = self.candidates.load_recipe(name, &version.to_version()).ok()?;
        self.recipe_cache.borrow_mut().insert(key, recipe.clone());
        Some(recipe)
    }
}

impl<'a, F: crate::store::FileSystem> DependencyProvider for ResolverProvider<'a, F> {
    type P = String;
    type V = NumericVersion;
    type VS = NumericRange;
    type M = String;
    type Err = Infallible;
    type Priority = (u32, Reverse<usize>);

    fn choose_version(
        &self,
        package: &String,
        range: &NumericRange,
    ) -> std::result::Result<Option<NumericVersion>, Infallible> {
        if let Some(pinned) = self.prefer_existing.get(package) {
            if let Some(nv) = NumericVersion::from_version(pinned) {
                if range.contains(&nv) {
                    return Ok(Some(nv));
                }
            }
        }

        // Already sorted ascending by (version, origin priority).
        let candidates = self.candidates.numeric_candidates(package);
        let matching: Vec<&super::candidates::NumericCandidate> =
            candidates.iter().filter(|c| range.contains(&c.version)).collect();

        // Prefer the highest non-pre-release unless every match is one.
        if let Some(release) = matching.iter().rev().find(|c| c.version.pre.is_empty()) {
            return Ok(Some(release.version.clone()));
        }
        Ok(matching.last().map(|c| c.version.clone()))
    }

    fn prioritize(
        &self,
        package: &String,
        range: &NumericRange,
        package_statistics: &PackageResolutionStatistics,
    ) -> Self::Priority {
        let count = self
            .candidates
            .numeric_candidates(package)
            .iter()
            .filter(|c| range.contains(&c.version))
            .count();
        if count == 0 {
            return (u32::MAX, Reverse(0));
        }
        (package_statistics.conflict_count(), Reverse(count))
    }

    fn get_dependencies(
        &self,
        package: &String,
        version: &NumericVersion,
    ) -> std::result::Result<Dependencies<String, NumericRange, String>, Infallible> {
        let Some(recipe) = self.load_recipe(package, version) else {
            return Ok(Dependencies::Unavailable(format!(
                "could not load recipe for {package} {version}"
            )));
        };

        let mut constraints: DependencyConstraints<String, NumericRange> = DependencyConstraints::default();

        let main_name = super::candidates::main_of(package);
        if main_name != package {
            // A sub-package has no version of its own; this edge forces
            // pubgrub to solve the main package at the exact version
            // chosen here for the sub-package.
            constraints.insert(main_name.to_string(), Ranges::singleton(version.clone()));
        }

        for dep in recipe.get_dependencies(None, &self.candidates.platform) {
            let DependencySource::Version(range) = &dep.source else {
                // Path/repository/branch dependencies are pinned outside
                // pubgrub; skip them here.
                continue;
            };
            let Some(converted) = version_range_to_ranges(range) else {
                continue;
            };
            constraints.insert(dep.name.full().to_string(), converted);
        }
        Ok(Dependencies::Available(constraints))
    }
}
