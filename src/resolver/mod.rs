//! The dependency resolver: pubgrub-backed resolution
//! over the recipe/selections/supplier model.
//!
//! Path, repository, and branch dependencies are identity-matched in a
//! pre-pass (`resolve_pinned`) before the remaining, purely
//! range-constrained graph is handed to pubgrub via [`ResolverProvider`]
//! — see DESIGN.md for why this module keeps them out of pubgrub's
//! interval arithmetic rather than encoding them as pseudo-versions.

mod candidates;
mod provider;

pub use candidates::CandidateSource;
pub use provider::{NumericVersion, ResolverProvider};

use crate::error::{Error, Result};
use crate::recipe::{Dependency, DependencySource, PackageName, Recipe};
use crate::selections::{SelectedVersion, Selections};
use crate::store::{FileSystem, Package, Tier};
use crate::version::{Version, VersionRange};
use pubgrub::{DefaultStringReporter, PubGrubError, Reporter};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Named packages allowed to be re-resolved even without `upgrade`.
    pub select: Vec<String>,
    pub upgrade: bool,
    pub prerelease: bool,
    pub force_remove_missing: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub recipe: Recipe,
    pub package: Package,
    pub selection: SelectedVersion,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    pub packages: BTreeMap<String, ResolvedPackage>,
}

/// One constraint contributing to a name's resolution, kept for
/// `UnresolvableDependency` diagnostics.
#[derive(Debug, Clone)]
struct Origin {
    range: VersionRange,
    required_by: String,
}

/// Top-level entry point implementing the resolution algorithm.
pub fn resolve<F: FileSystem>(
    root: &Recipe,
    existing: Option<&Selections>,
    store: &crate::store::Store<F>,
    suppliers: &[Box<dyn crate::suppliers::PackageSupplier>],
    platform: &str,
    target_tier: Tier,
    options: UpgradeOptions,
) -> Result<(Selections, ResolvedGraph)> {
    let candidates = CandidateSource {
        store,
        suppliers,
        platform: platform.to_string(),
        allow_prerelease: options.prerelease,
    };

    let mut graph = ResolvedGraph::default();
    let mut pinned_names: HashSet<String> = HashSet::new();
    let mut range_origins: HashMap<String, Vec<Origin>> = HashMap::new();

    // Step 1 (seed) + identity-matching pre-pass: walk the whole graph,
    // resolving pinned dependencies immediately and collecting range
    // constraints for the remainder.
    let mut worklist: Vec<(String, Dependency)> =
        root.get_dependencies(None, platform).into_iter().map(|d| ("<root>".to_string(), d)).collect();
    let mut visited_pins: HashSet<(String, String)> = HashSet::new();

    while let Some((required_by, dep)) = worklist.pop() {
        match &dep.source {
            DependencySource::Version(VersionRange::Branch(name)) => {
                let identity = (dep.name.full().to_string(), format!("branch:{name}"));
                if !visited_pins.insert(identity) {
                    continue;
                }
                pinned_names.insert(dep.name.main().to_string());
                let resolved = resolve_pinned(&candidates, &dep, target_tier)?;
                record_pinned(&dep, resolved, &mut graph, &mut worklist, platform)?;
            }
            DependencySource::Path(path) => {
                // `path` is a `RelativePath`, normalized at construction, so
                // two recipes spelling the same sibling directory
                // differently (`vendor/lib` vs `./vendor/lib`) unify here.
                let identity = (dep.name.full().to_string(), format!("path:{}", path.as_path().display()));
                if !visited_pins.insert(identity) {
                    continue;
                }
                pinned_names.insert(dep.name.main().to_string());
                let resolved = resolve_pinned(&candidates, &dep, target_tier)?;
                record_pinned(&dep, resolved, &mut graph, &mut worklist, platform)?;
            }
            DependencySource::Repository { url, commit_or_ref, .. } => {
                // `url`'s `Display` is its normalized form, so the identity
                // key unifies regardless of host casing or a trailing slash.
                let identity = (dep.name.full().to_string(), format!("{url}@{commit_or_ref}"));
                if !visited_pins.insert(identity) {
                    continue;
                }
                pinned_names.insert(dep.name.main().to_string());
                let resolved = resolve_pinned(&candidates, &dep, target_tier)?;
                record_pinned(&dep, resolved, &mut graph, &mut worklist, platform)?;
            }
            DependencySource::Version(range) => {
                range_origins.entry(dep.name.full().to_string()).or_default().push(Origin {
                    range: range.clone(),
                    required_by,
                });
            }
        }
    }

    // A name pinned by identity can't also carry range constraints; this
    // would be a genuinely ambiguous recipe. Sub-packages share their
    // main package's pin, so the check is done on the main name.
    for name in range_origins.keys() {
        if pinned_names.contains(candidates::main_of(name)) {
            return Err(conflict_error(name, &range_origins[name]));
        }
    }

    if range_origins.is_empty() {
        let selections = build_selections(&graph, &Selections::default());
        return Ok((selections, graph));
    }

    // Steps 2-7: hand the purely range-constrained sub-graph to pubgrub.
    let prefer_existing = if options.upgrade {
        HashMap::new()
    } else {
        existing_pins(existing, &options.select)
    };

    let resolver_provider = ResolverProvider::new(&candidates, prefer_existing);

    let root_package = "__root__".to_string();
    let root_version = NumericVersion { major: 0, minor: 0, patch: 0, pre: Vec::new() };
    let mut root_deps = pubgrub::DependencyConstraints::default();
    for (name, origins) in &range_origins {
        let mut acc = VersionRange::Any;
        for origin in origins {
            acc = acc.intersection(origin.range.clone());
        }
        let Some(converted) = provider::version_range_to_ranges(&acc) else {
            return Err(conflict_error(name, origins));
        };
        root_deps.insert(name.clone(), converted);
    }

    let root_provider = RootProvider {
        inner: resolver_provider,
        root_package: root_package.clone(),
        root_version: root_version.clone(),
        root_deps,
    };

    let solution = pubgrub::resolve(&root_provider, root_package.clone(), root_version)
        .map_err(|e| convert_pubgrub_error(e, &range_origins))?;

    for (name, version) in &solution {
        if *name == root_package {
            continue;
        }
        let resolved_version = version.to_version();
        let main_name = candidates::main_of(name).to_string();
        let main_package = candidates.materialize(&main_name, &resolved_version, target_tier)?;
        let selection = SelectedVersion::from_version(&resolved_version);

        // A sub-package shares its main package's location and version;
        // make sure the main package itself also ends up in the graph,
        // even if nothing else depends on it directly.
        if !graph.packages.contains_key(&main_name) {
            let main_recipe = candidates.load_recipe(&main_name, &resolved_version)?;
            graph.packages.insert(
                main_name.clone(),
                ResolvedPackage {
                    name: main_name.clone(),
                    recipe: main_recipe,
                    package: main_package.clone(),
                    selection: selection.clone(),
                },
            );
        }

        if *name != main_name {
            let recipe = candidates.load_recipe(name, &resolved_version)?;
            graph.packages.insert(
                name.clone(),
                ResolvedPackage { name: main_name.clone(), recipe, package: main_package, selection },
            );
        }
    }

    let baseline = existing.cloned().unwrap_or_default();
    let selections = build_selections(&graph, &baseline);
    Ok((selections, graph))
}

/// Folds a pinned resolution into the graph and queues its children.
/// When `dep` names a sub-package, `resolved` is the containing main
/// package (sub-packages have no recipe file or version of their own),
/// so the main package's own dependencies are extracted from it and
/// recorded under the main name, while the sub-package gets its own
/// graph entry sharing the main package's location and version.
fn record_pinned(
    dep: &Dependency,
    resolved: ResolvedPackage,
    graph: &mut ResolvedGraph,
    worklist: &mut Vec<(String, Dependency)>,
    platform: &str,
) -> Result<()> {
    let main_name = dep.name.main().to_string();
    let full_name = dep.name.full().to_string();

    if dep.name.is_sub_package() {
        let subs = resolved.recipe.sub_packages(Some(&resolved.package.root))?;
        let sub_recipe = subs.get(&full_name).cloned().ok_or_else(|| Error::MissingDependency {
            name: full_name.clone(),
            required_by: main_name.clone(),
        })?;
        for child in sub_recipe.get_dependencies(None, platform) {
            worklist.push((full_name.clone(), child));
        }
        graph.packages.insert(
            full_name,
            ResolvedPackage {
                name: main_name.clone(),
                recipe: sub_recipe,
                package: resolved.package.clone(),
                selection: resolved.selection.clone(),
            },
        );
    } else {
        for child in resolved.recipe.get_dependencies(None, platform) {
            worklist.push((full_name.clone(), child));
        }
    }

    graph.packages.entry(main_name).or_insert(resolved);
    Ok(())
}

fn resolve_pinned<F: FileSystem>(
    candidates: &CandidateSource<F>,
    dep: &Dependency,
    target_tier: Tier,
) -> Result<ResolvedPackage> {
    let name = dep.name.main();
    match &dep.source {
        DependencySource::Path(path) => {
            let recipe_path = path.as_path().join(crate::resolver::candidates::RECIPE_FILE_NAME);
            let text = std::fs::read_to_string(&recipe_path).map_err(|_| Error::UnableToFetch {
                name: name.to_string(),
                reason: format!("path dependency not found at {}", path.as_path().display()),
            })?;
            let recipe = <crate::recipe::JsonRecipeSource as crate::recipe::RecipeSource>::parse(
                &crate::recipe::JsonRecipeSource,
                &text,
            )?;
            Ok(ResolvedPackage {
                name: name.to_string(),
                recipe,
                package: Package {
                    name: name.to_string(),
                    version: Version::branch(format!("path:{}", path.as_path().display())),
                    root: path.as_path().to_path_buf(),
                    tier: target_tier,
                    repository: None,
                },
                selection: SelectedVersion::Path { path: path.as_path().display().to_string() },
            })
        }
        DependencySource::Version(VersionRange::Branch(branch_name)) => {
            let pinned_version = Version::branch(branch_name.clone());
            let package = candidates.materialize(name, &pinned_version, target_tier)?;
            let recipe = candidates.load_recipe(name, &pinned_version)?;
            Ok(ResolvedPackage {
                name: name.to_string(),
                recipe,
                package,
                selection: SelectedVersion::Version(pinned_version.to_string()),
            })
        }
        DependencySource::Repository { url, commit_or_ref, .. } => {
            let pinned_version = Version::branch(commit_or_ref.clone());
            match candidates.materialize(name, &pinned_version, target_tier) {
                Ok(package) => {
                    let recipe = candidates.load_recipe(name, &pinned_version)?;
                    Ok(ResolvedPackage {
                        name: name.to_string(),
                        recipe,
                        package,
                        selection: SelectedVersion::Repository {
                            repository: url.as_str().to_string(),
                            version: commit_or_ref.clone(),
                        },
                    })
                }
                Err(_) => Err(Error::UnableToFetch {
                    name: name.to_string(),
                    reason: format!("unreachable repository {} @ {commit_or_ref}", url.as_str()),
                }),
            }
        }
        DependencySource::Version(_) => unreachable!("range dependencies never reach resolve_pinned"),
    }
}

fn existing_pins(existing: Option<&Selections>, select: &[String]) -> HashMap<String, Version> {
    let Some(existing) = existing else { return HashMap::new() };
    let selectable: HashSet<&str> = select.iter().map(|s| s.as_str()).collect();
    let mut out = HashMap::new();
    for (name, selected) in &existing.versions {
        if selectable.contains(name.as_str()) {
            continue;
        }
        if let SelectedVersion::Version(v) = selected {
            if let Ok(version) = Version::parse(v) {
                out.insert(name.clone(), version);
            }
        }
    }
    out
}

fn build_selections(graph: &ResolvedGraph, baseline: &Selections) -> Selections {
    let mut selections = baseline.clone();
    for (name, resolved) in &graph.packages {
        let Ok(package_name) = PackageName::parse(name) else { continue };
        selections.set(&package_name, resolved.selection.clone());
    }
    selections
}

fn conflict_error(name: &str, origins: &[Origin]) -> Error {
    let constraints = origins
        .iter()
        .map(|o| format!("  - {} (required by {})", o.range, o.required_by))
        .collect::<Vec<_>>()
        .join("\n");
    Error::UnresolvableDependency { name: name.to_string(), constraints }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Wraps [`ResolverProvider`] with a virtual root package that depends on
/// every name discovered during the pre-pass.
struct RootProvider<'a, F: FileSystem> {
    inner: ResolverProvider<'a, F>,
    root_package: String,
    root_version: NumericVersion,
    root_deps: pubgrub::DependencyConstraints<String, provider::NumericRange>,
}

impl<'a, F: FileSystem> pubgrub::DependencyProvider for RootProvider<'a, F> {
    type P = String;
    type V = NumericVersion;
    type VS = provider::NumericRange;
    type M = String;
    type Err = std::convert::Infallible;
    type Priority = (u32, std::cmp::Reverse<usize>);

    fn choose_version(
        &self,
        package: &String,
        range: &provider::NumericRange,
    ) -> std::result::Result<Option<NumericVersion>, std::convert::Infallible> {
        if package == &self.root_package {
            return Ok(range.contains(&self.root_version).then(|| self.root_version.clone()));
        }
        self.inner.choose_version(package, range)
    }

    fn prioritize(
        &self,
        package: &String,
        range: &provider::NumericRange,
        stats: &pubgrub::PackageResolutionStatistics,
    ) -> Self::Priority {
        if package == &self.root_package {
            return (u32::MAX, std::cmp::Reverse(1));
        }
        self.inner.prioritize(package, range, stats)
    }

    fn get_dependencies(
        &self,
        package: &String,
        version: &NumericVersion,
    ) -> std::result::Result<
        pubgrub::Dependencies<String, provider::NumericRange, String>,
        std::convert::Infallible,
    > {
        if package == &self.root_package && version == &self.root_version {
            return Ok(pubgrub::Dependencies::Available(self.root_deps.clone()));
        }
        self.inner.get_dependencies(package, version)
    }
}

fn convert_pubgrub_error<DP: pubgrub::DependencyProvider>(
    error: PubGrubError<DP>,
    origins: &HashMap<String, Vec<Origin>>,
) -> Error
where
    DP::P: std::fmt::Display,
    DP::VS: std::fmt::Display,
    DP::M: std::fmt::Display,
{
    match error {
        PubGrubError::NoSolution(mut tree) => {
            tree.collapse_no_versions();
            let report = DefaultStringReporter::report(&tree).replace("__root__", "your project");
            let extra = origins
                .iter()
                .map(|(name, os)| {
                    format!(
                        "{name}:\n{}",
                        os.iter().map(|o| format!("  - {} (required by {})", o.range, o.required_by)).collect::<Vec<_>>().join("\n")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            Error::UnresolvableDependency { name: "<graph>".to_string(), constraints: format!("{report}\n\n{extra}") }
        }
        PubGrubError::ErrorChoosingVersion { package, source } => {
            Error::Other(format!("error choosing version for '{package}': {source}"))
        }
        PubGrubError::ErrorRetrievingDependencies { package, version, source } => Error::Other(format!(
            "error retrieving dependencies for {package} {version}: {source}"
        )),
        PubGrubError::ErrorInShouldCancel(source) => Error::Other(format!("resolution cancelled: {source}")),
    }
}
