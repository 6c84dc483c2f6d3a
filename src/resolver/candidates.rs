//! Store-then-supplier candidate enumeration.

use super::provider::NumericVersion;
use crate::error::{Error, Result};
use crate::recipe::{JsonRecipeSource, Recipe, RecipeSource};
use crate::store::{FileSystem, Store, Tier};
use crate::suppliers::PackageSupplier;
use crate::version::{Version, VersionRange};

pub const RECIPE_FILE_NAME: &str = "recipe.json";

/// A sub-package has no store location or version of its own; every
/// store/supplier lookup for `main:sub` really means `main`.
pub(crate) fn main_of(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

/// Where a candidate version was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Store,
    Supplier(usize),
}

impl Origin {
    /// Higher value wins a tie among equal versions: the store always
    /// outranks every supplier, and suppliers are preferred in
    /// declaration order.
    fn priority_rank(&self, supplier_count: usize) -> usize {
        match self {
            Origin::Store => supplier_count + 1,
            Origin::Supplier(i) => supplier_count - i,
        }
    }
}

pub struct NumericCandidate {
    pub version: NumericVersion,
    pub origin: Origin,
}

/// Everything the resolver needs to enumerate and materialize packages:
/// the store, an ordered supplier list, and the target platform used to
/// filter configuration-scoped dependencies.
pub struct CandidateSource<'a, F: FileSystem> {
    pub store: &'a Store<F>,
    pub suppliers: &'a [Box<dyn PackageSupplier>],
    pub platform: String,
    pub allow_prerelease: bool,
}

impl<'a, F: FileSystem> CandidateSource<'a, F> {
    /// Candidates sorted ascending by (version, origin priority); the
    /// highest-priority match for the highest version is always last.
    pub fn numeric_candidates(&self, name: &str) -> Vec<NumericCandidate> {
        let name = main_of(name);
        let mut out = Vec::new();
        for package in self.store.iter(name) {
            if let Some(nv) = NumericVersion::from_version(&package.version) {
                out.push(NumericCandidate { version: nv, origin: Origin::Store });
            }
        }
        for (index, supplier) in self.suppliers.iter().enumerate() {
            if let Ok(versions) = supplier.get_versions(name) {
                for v in versions {
                    if let Some(nv) = NumericVersion::from_version(&v) {
                        out.push(NumericCandidate { version: nv, origin: Origin::Supplier(index) });
                    }
                }
            }
        }
        let supplier_count = self.suppliers.len();
        out.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.origin.priority_rank(supplier_count).cmp(&b.origin.priority_rank(supplier_count)))
        });
        out
    }

    /// Loads a package's recipe. `name` may be a sub-package's dotted
    /// name (`main:sub`): the main recipe is loaded and its declared
    /// sub-packages searched, since a sub-package has no recipe file of
    /// its own on disk.
    pub fn load_recipe(&self, name: &str, version: &Version) -> Result<Recipe> {
        let main_name = main_of(name);
        let main_recipe = self.load_main_recipe(main_name, version)?;
        if name == main_name {
            return Ok(main_recipe);
        }

        let root = self.store.get_package(main_name, version, None).map(|p| p.root);
        let subs = main_recipe.sub_packages(root.as_deref())?;
        subs.get(name).cloned().ok_or_else(|| Error::MissingDependency {
            name: name.to_string(),
            required_by: main_name.to_string(),
        })
    }

    fn load_main_recipe(&self, name: &str, version: &Version) -> Result<Recipe> {
        if let Some(package) = self.store.get_package(name, version, None) {
            let recipe_path = package.root.join(RECIPE_FILE_NAME);
            if let Ok(text) = std::fs::read_to_string(&recipe_path) {
                return JsonRecipeSource.parse(&text);
            }
        }

        let range = VersionRange::exact(version.clone());
        for supplier in self.suppliers {
            if let Ok(Some(recipe)) = supplier.fetch_package_recipe(name, &range, self.allow_prerelease) {
                return Ok(recipe);
            }
        }
        Err(Error::MissingDependency {
            name: name.to_string(),
            required_by: "resolver".to_string(),
        })
    }

    /// Materializes `name` at `version` into `tier`, preferring whichever
    /// supplier served the winning candidate. A sub-package's name
    /// resolves to its main package's location — sub-packages are never
    /// materialized independently.
    pub fn materialize(&self, name: &str, version: &Version, tier: Tier) -> Result<crate::store::Package> {
        let name = main_of(name);
        if let Some(existing) = self.store.get_package(name, version, None) {
            return Ok(existing);
        }
        let range = VersionRange::exact(version.clone());
        let mut last_err = None;
        for supplier in self.suppliers {
            match crate::fetcher::fetch(
                self.store,
                supplier.as_ref(),
                name,
                &range,
                self.allow_prerelease,
                tier,
            ) {
                Ok(fetched) => return Ok(fetched.package),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::MissingDependency {
            name: name.to_string(),
            required_by: "resolver".to_string(),
        }))
    }
}
