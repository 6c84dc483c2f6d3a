//! End-to-end resolver scenarios, exercised against an in-memory store
//! and a small stub supplier — no network access.

use dep::recipe::{
    BuildSettings, Dependency, DependencySource, PackageName, Recipe,
};
use dep::resolver::UpgradeOptions;
use dep::selections::{SelectedVersion, Selections};
use dep::store::{InMemoryFs, Store, Tier};
use dep::suppliers::{PackageSupplier, SearchResult, SupplierResult};
use dep::value_types::RepositoryUrl;
use dep::version::{Version, VersionRange};
use dep::Error;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

fn leaf_recipe(name: &str, version: Version, deps: &[(&str, &str)]) -> Recipe {
    Recipe {
        name: PackageName::parse(name).unwrap(),
        version: Some(version),
        description: None,
        dependencies: deps
            .iter()
            .map(|(dep_name, range)| Dependency {
                name: PackageName::parse(dep_name).unwrap(),
                source: DependencySource::Version(VersionRange::parse(range).unwrap()),
                optional: false,
                default: true,
            })
            .collect(),
        configurations: Vec::new(),
        build_settings: BuildSettings::default(),
        sub_packages: Vec::new(),
    }
}

/// Builds the on-disk JSON text directly from the same `(name, range)`
/// pairs used to build the in-memory [`Recipe`], rather than trying to
/// serialize `VersionRange` back to its original constraint syntax.
fn recipe_json(name: &str, version: &Version, deps: &[(&str, &str)]) -> Vec<u8> {
    let deps = deps
        .iter()
        .map(|(dep_name, range)| format!("\"{dep_name}\":\"{range}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"name\":\"{name}\",\"version\":\"{version}\",\"dependencies\":{{{deps}}}}}").into_bytes()
}

/// Seeds `store` with a package whose only file is `recipe.json`, so the
/// resolver can load it back without a supplier.
fn seed(store: &Store<InMemoryFs>, tier: Tier, name: &str, version: Version, deps: &[(&str, &str)]) {
    store
        .store_from_entries(tier, name, &version, &[(PathBuf::from("recipe.json"), recipe_json(name, &version, deps))])
        .unwrap();
}

fn new_store() -> Store<InMemoryFs> {
    Store::new(InMemoryFs::new(), PathBuf::from("/system"), PathBuf::from("/user"), PathBuf::from("/project"))
}

fn root_with_dep(name: &str, dep_name: &str, range: &str) -> Recipe {
    leaf_recipe(name, Version::new(1, 0, 0), &[(dep_name, range)])
}

/// A stub supplier backed by a fixed table of (version, recipe) pairs,
/// with an empty-but-valid tar.gz archive for every version it serves.
struct StubSupplier {
    table: Mutex<HashMap<String, Vec<(Version, Recipe)>>>,
}

impl StubSupplier {
    fn new(table: HashMap<String, Vec<(Version, Recipe)>>) -> Self {
        StubSupplier { table: Mutex::new(table) }
    }
}

fn empty_tar_gz() -> Vec<u8> {
    let builder = tar::Builder::new(Vec::new());
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

impl PackageSupplier for StubSupplier {
    fn description(&self) -> String {
        "stub".into()
    }
    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        Ok(self.table.lock().unwrap().get(name).map(|v| v.iter().map(|(ver, _)| ver.clone()).collect()).unwrap_or_default())
    }
    fn fetch_package_archive(&self, _name: &str, _range: &VersionRange, _allow_prerelease: bool) -> SupplierResult<Vec<u8>> {
        Ok(empty_tar_gz())
    }
    fn fetch_package_recipe(&self, name: &str, range: &VersionRange, _allow_prerelease: bool) -> SupplierResult<Option<Recipe>> {
        let table = self.table.lock().unwrap();
        Ok(table
            .get(name)
            .and_then(|versions| versions.iter().find(|(v, _)| range.matches(v)))
            .map(|(_, r)| r.clone()))
    }
    fn search_packages(&self, _query: &str) -> SupplierResult<Vec<SearchResult>> {
        Ok(vec![])
    }
}

#[test]
fn s1_simple_dependency() {
    let store = new_store();
    seed(&store, Tier::Project, "b", Version::new(1, 0, 0), &[]);

    let root = root_with_dep("a", "b", "*");
    let (selections, graph) = dep::resolve(&root, None, &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap();

    assert!(graph.packages.contains_key("b"));
    assert!(!graph.packages.contains_key("no"));
    assert_eq!(selections.get(&PackageName::parse("b").unwrap()), Some(&SelectedVersion::Version("1.0.0".to_string())));
}

#[test]
fn s2_transitive_dependency() {
    let store = new_store();
    seed(&store, Tier::Project, "b", Version::new(1, 0, 0), &[("c", "*")]);
    seed(&store, Tier::Project, "c", Version::new(1, 0, 0), &[]);

    let root = root_with_dep("a", "b", "*");
    let (selections, _graph) = dep::resolve(&root, None, &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap();

    assert_eq!(selections.get(&PackageName::parse("b").unwrap()), Some(&SelectedVersion::Version("1.0.0".to_string())));
    assert_eq!(selections.get(&PackageName::parse("c").unwrap()), Some(&SelectedVersion::Version("1.0.0".to_string())));
}

#[test]
fn s3_diamond_dependency_is_selected_once() {
    let store = new_store();
    seed(&store, Tier::Project, "b", Version::new(1, 0, 0), &[("d", "*")]);
    seed(&store, Tier::Project, "c", Version::new(1, 0, 0), &[("d", "*")]);
    seed(&store, Tier::Project, "d", Version::new(1, 0, 0), &[]);

    let root = leaf_recipe("a", Version::new(1, 0, 0), &[("b", "*"), ("c", "*")]);
    let (selections, graph) = dep::resolve(&root, None, &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap();

    assert_eq!(graph.packages.len(), 3);
    for name in ["b", "c", "d"] {
        assert_eq!(
            selections.get(&PackageName::parse(name).unwrap()),
            Some(&SelectedVersion::Version("1.0.0".to_string()))
        );
    }
}

#[test]
fn s4_missing_dependency_then_added_succeeds() {
    let store = new_store();
    let root = root_with_dep("a", "b", "*");

    let err = dep::resolve(&root, None, &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnresolvableDependency { .. }));

    seed(&store, Tier::Project, "b", Version::new(1, 0, 0), &[]);
    let (selections, _graph) = dep::resolve(&root, None, &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap();
    assert!(selections.has_selections());
}

#[test]
fn s5_upgrade_moves_to_highest_available() {
    let store = new_store();
    seed(&store, Tier::Project, "b", Version::new(1, 0, 0), &[]);
    seed(&store, Tier::Project, "b", Version::new(1, 1, 0), &[]);
    seed(&store, Tier::Project, "b", Version::new(1, 2, 0), &[]);

    let root = root_with_dep("a", "b", "*");
    let mut existing = Selections::new();
    existing.set(&PackageName::parse("b").unwrap(), SelectedVersion::Version("1.1.0".to_string()));

    let (stayed, _) =
        dep::resolve(&root, Some(&existing), &store, &[], "linux", Tier::Project, UpgradeOptions::default()).unwrap();
    assert_eq!(stayed.get(&PackageName::parse("b").unwrap()), Some(&SelectedVersion::Version("1.1.0".to_string())));

    let upgrade_options = UpgradeOptions { upgrade: true, ..Default::default() };
    let (upgraded, _) = dep::resolve(&root, Some(&existing), &store, &[], "linux", Tier::Project, upgrade_options.clone()).unwrap();
    assert_eq!(upgraded.get(&PackageName::parse("b").unwrap()), Some(&SelectedVersion::Version("1.2.0".to_string())));

    seed(&store, Tier::Project, "b", Version::new(1, 3, 0), &[]);
    let (upgraded_again, _) =
        dep::resolve(&root, Some(&existing), &store, &[], "linux", Tier::Project, upgrade_options).unwrap();
    assert_eq!(upgraded_again.get(&PackageName::parse("b").unwrap()), Some(&SelectedVersion::Version("1.3.0".to_string())));
}

#[test]
fn s6_repository_dependency_materializes_on_matching_commit() {
    let store = new_store();
    let url = RepositoryUrl::parse("git+https://example.com/x/y").unwrap();
    let commit = "54339dffcafebabe0000000000000000000000".to_string();

    let mut table = HashMap::new();
    table.insert(
        "dep1".to_string(),
        vec![(Version::branch(commit.clone()), leaf_recipe("dep1", Version::new(1, 0, 0), &[]))],
    );
    let supplier: Box<dyn PackageSupplier> = Box::new(StubSupplier::new(table));

    let root = Recipe {
        name: PackageName::parse("a").unwrap(),
        version: Some(Version::new(1, 0, 0)),
        description: None,
        dependencies: vec![Dependency {
            name: PackageName::parse("dep1").unwrap(),
            source: DependencySource::Repository { kind: "git".to_string(), url: url.clone(), commit_or_ref: commit.clone() },
            optional: false,
            default: true,
        }],
        configurations: Vec::new(),
        build_settings: BuildSettings::default(),
        sub_packages: Vec::new(),
    };

    let (selections, graph) =
        dep::resolve(&root, None, &store, std::slice::from_ref(&supplier), "linux", Tier::Project, UpgradeOptions::default()).unwrap();

    assert!(graph.packages.contains_key("dep1"));
    assert_eq!(
        selections.get(&PackageName::parse("dep1").unwrap()),
        Some(&SelectedVersion::Repository { repository: url.as_str().to_string(), version: commit })
    );
}

#[test]
fn s6_repository_dependency_commit_mismatch_fails() {
    let store = new_store();
    let url = RepositoryUrl::parse("git+https://example.com/x/y").unwrap();

    let mut table = HashMap::new();
    table.insert(
        "dep1".to_string(),
        vec![(Version::branch("deadbeef".to_string()), leaf_recipe("dep1", Version::new(1, 0, 0), &[]))],
    );
    let supplier: Box<dyn PackageSupplier> = Box::new(StubSupplier::new(table));

    let root = Recipe {
        name: PackageName::parse("a").unwrap(),
        version: Some(Version::new(1, 0, 0)),
        description: None,
        dependencies: vec![Dependency {
            name: PackageName::parse("dep1").unwrap(),
            source: DependencySource::Repository {
                kind: "git".to_string(),
                url,
                commit_or_ref: "54339dffcafebabe0000000000000000000000".to_string(),
            },
            optional: false,
            default: true,
        }],
        configurations: Vec::new(),
        build_settings: BuildSettings::default(),
        sub_packages: Vec::new(),
    };

    let err =
        dep::resolve(&root, None, &store, std::slice::from_ref(&supplier), "linux", Tier::Project, UpgradeOptions::default())
            .unwrap_err();
    assert!(matches!(err, Error::UnableToFetch { .. }));
}
