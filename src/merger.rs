//! Build-settings merge across the resolved graph, reusing
//! `BuildSettings`'s own `merge_from`/dedup rules from `src/recipe/mod.rs`.

use crate::recipe::{BuildSettings, Recipe};
use crate::resolver::ResolvedGraph;
use std::collections::HashSet;

/// Depth-first post-order walk of `root`'s dependency graph, in
/// declaration order, merging each package's configuration- and
/// platform-filtered `BuildSettings` exactly once. `configuration`
/// applies only to `root`; dependencies contribute their default
/// (unconfigured) settings, since a configuration name chosen for the
/// root package has no meaning for an unrelated package's own
/// configurations.
pub fn merge_build_settings(
    root: &Recipe,
    graph: &ResolvedGraph,
    configuration: Option<&str>,
    platform: &str,
) -> BuildSettings {
    let mut visited = HashSet::new();
    let mut merged = BuildSettings::default();
    visit(root, graph, configuration, platform, &mut visited, &mut merged);
    merged
}

fn visit(
    recipe: &Recipe,
    graph: &ResolvedGraph,
    configuration: Option<&str>,
    platform: &str,
    visited: &mut HashSet<String>,
    merged: &mut BuildSettings,
) {
    for dep in recipe.get_dependencies(configuration, platform) {
        // Sub-packages get their own graph entry distinct from their main
        // package's, so a dependency on `foo:sub` merges that sub-package's
        // own settings rather than `foo`'s.
        let name = dep.name.full().to_string();
        if !visited.insert(name.clone()) {
            continue;
        }
        if let Some(resolved) = graph.packages.get(&name) {
            visit(&resolved.recipe, graph, None, platform, visited, merged);
        }
    }
    merged.merge_from(&recipe.merged_build_settings(configuration, platform));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Dependency, DependencySource, PackageName};
    use crate::resolver::ResolvedPackage;
    use crate::selections::SelectedVersion;
    use crate::store::{Package, Tier};
    use crate::version::{Version, VersionRange};
    use std::collections::BTreeMap;

    fn leaf(name: &str, import_paths: &[&str]) -> Recipe {
        Recipe {
            name: PackageName::parse(name).unwrap(),
            version: Some(Version::new(1, 0, 0)),
            description: None,
            dependencies: Vec::new(),
            configurations: Vec::new(),
            build_settings: BuildSettings {
                import_paths: import_paths.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            sub_packages: Vec::new(),
        }
    }

    fn resolved(recipe: Recipe) -> ResolvedPackage {
        ResolvedPackage {
            name: recipe.name.main().to_string(),
            package: Package {
                name: recipe.name.main().to_string(),
                version: recipe.version.clone().unwrap(),
                root: "/store/x".into(),
                tier: Tier::Project,
                repository: None,
            },
            selection: SelectedVersion::from_version(recipe.version.as_ref().unwrap()),
            recipe,
        }
    }

    #[test]
    fn merges_dependencies_before_root_in_declaration_order() {
        let b = leaf("b", &["b_include"]);
        let c = leaf("c", &["c_include"]);
        let mut graph = ResolvedGraph::default();
        graph.packages.insert("b".to_string(), resolved(b));
        graph.packages.insert("c".to_string(), resolved(c));

        let root = Recipe {
            name: PackageName::parse("root").unwrap(),
            version: Some(Version::new(1, 0, 0)),
            description: None,
            dependencies: vec![
                Dependency {
                    name: PackageName::parse("b").unwrap(),
                    source: DependencySource::Version(VersionRange::Any),
                    optional: false,
                    default: true,
                },
                Dependency {
                    name: PackageName::parse("c").unwrap(),
                    source: DependencySource::Version(VersionRange::Any),
                    optional: false,
                    default: true,
                },
            ],
            configurations: Vec::new(),
            build_settings: BuildSettings {
                import_paths: vec!["root_include".to_string()],
                ..Default::default()
            },
            sub_packages: Vec::new(),
        };

        let merged = merge_build_settings(&root, &graph, None, "linux");
        assert_eq!(merged.import_paths, vec!["b_include", "c_include", "root_include"]);
    }

    #[test]
    fn shared_dependency_is_merged_only_once() {
        let c = leaf("c", &["c_include"]);
        let mut graph = ResolvedGraph::default();
        graph.packages.insert("c".to_string(), resolved(c));

        let b = Recipe {
            name: PackageName::parse("b").unwrap(),
            version: Some(Version::new(1, 0, 0)),
            description: None,
            dependencies: vec![Dependency {
                name: PackageName::parse("c").unwrap(),
                source: DependencySource::Version(VersionRange::Any),
                optional: false,
                default: true,
            }],
            configurations: Vec::new(),
            build_settings: BuildSettings::default(),
            sub_packages: Vec::new(),
        };
        graph.packages.insert("b".to_string(), resolved(b));

        let root = Recipe {
            name: PackageName::parse("root").unwrap(),
            version: Some(Version::new(1, 0, 0)),
            description: None,
            dependencies: vec![
                Dependency {
                    name: PackageName::parse("b").unwrap(),
                    source: DependencySource::Version(VersionRange::Any),
                    optional: false,
                    default: true,
                },
                Dependency {
                    name: PackageName::parse("c").unwrap(),
                    source: DependencySource::Version(VersionRange::Any),
                    optional: false,
                    default: true,
                },
            ],
            configurations: Vec::new(),
            build_settings: BuildSettings::default(),
            sub_packages: Vec::new(),
        };

        let merged = merge_build_settings(&root, &graph, None, "linux");
        assert_eq!(merged.import_paths, vec!["c_include"]);
    }
}
