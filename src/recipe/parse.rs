//! Format-neutral recipe ingestion. The recipe text format itself (JSON
//! dialect, SDL dialect) is an external collaborator; this
//! module only defines the boundary and a JSON reference implementation
//! so the resolver's own tests have something to load recipes from.

use super::{
    BuildSettings, ConfigurationInfo, Dependency, DependencySource, PackageName, Recipe,
    SubPackageRef,
};
use crate::error::{Error, Result};
use crate::value_types::{RelativePath, RepositoryUrl};
use crate::version::{Version, VersionRange};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Anything that can turn recipe source text into a [`Recipe`]. An
/// external front-end supplies the concrete format; the core only
/// depends on this trait.
pub trait RecipeSource {
    fn parse(&self, text: &str) -> Result<Recipe>;
}

/// The minimum recipe shape: a name, an optional
/// version, a dependency map whose values are a range string, `{path}`,
/// or `{repository, commit}`, and zero or more configurations.
#[derive(Debug, Deserialize)]
struct RawRecipe {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
    #[serde(default)]
    configurations: Vec<RawConfiguration>,
    #[serde(default)]
    build_settings: BuildSettings,
    #[serde(default)]
    sub_packages: Vec<RawSubPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Range(String),
    Path {
        path: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        default: bool,
    },
    Repository {
        repository: String,
        version: String,
        #[serde(default = "default_repository_kind")]
        kind: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        default: bool,
    },
}

fn default_repository_kind() -> String {
    "git".to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfiguration {
    name: String,
    #[serde(default)]
    platform_filters: Vec<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
    #[serde(default)]
    build_settings: BuildSettings,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSubPackage {
    Path(String),
    Inline(Box<RawRecipe>),
}

fn convert_dependency(name: &str, raw: RawDependency) -> Result<Dependency> {
    let name = PackageName::parse(name)?;
    Ok(match raw {
        RawDependency::Range(range) => Dependency {
            name,
            source: DependencySource::Version(VersionRange::parse(&range)?),
            optional: false,
            default: false,
        },
        RawDependency::Path {
            path,
            optional,
            default,
        } => Dependency {
            name,
            source: DependencySource::Path(RelativePath::new(path)?),
            optional,
            default,
        },
        RawDependency::Repository {
            repository,
            version,
            kind,
            optional,
            default,
        } => Dependency {
            name,
            source: DependencySource::Repository {
                kind,
                url: RepositoryUrl::parse(&repository)?,
                commit_or_ref: version,
            },
            optional,
            default,
        },
    })
}

fn convert_dependencies(raw: BTreeMap<String, RawDependency>) -> Result<Vec<Dependency>> {
    raw.into_iter()
        .map(|(name, dep)| convert_dependency(&name, dep))
        .collect()
}

fn convert_recipe(raw: RawRecipe) -> Result<Recipe> {
    let version = raw.version.as_deref().map(Version::parse).transpose()?;
    let configurations = raw
        .configurations
        .into_iter()
        .map(|c| -> Result<ConfigurationInfo> {
            Ok(ConfigurationInfo {
                name: c.name,
                platform_filters: c.platform_filters,
                dependencies: convert_dependencies(c.dependencies)?,
                build_settings: c.build_settings,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let sub_packages = raw
        .sub_packages
        .into_iter()
        .map(|s| -> Result<SubPackageRef> {
            Ok(match s {
                RawSubPackage::Path(p) => SubPackageRef::Path(RelativePath::new(p)?),
                RawSubPackage::Inline(r) => SubPackageRef::Inline(Box::new(convert_recipe(*r)?)),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Recipe {
        name: PackageName::parse(&raw.name)?,
        version,
        description: raw.description,
        dependencies: convert_dependencies(raw.dependencies)?,
        configurations,
        build_settings: raw.build_settings,
        sub_packages,
    })
}

/// Reference `RecipeSource` over the JSON recipe dialect.
#[derive(Debug, Default)]
pub struct JsonRecipeSource;

impl RecipeSource for JsonRecipeSource {
    fn parse(&self, text: &str) -> Result<Recipe> {
        let raw: RawRecipe = serde_json::from_str(text).map_err(Error::Json)?;
        convert_recipe(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_recipe() {
        let json = r#"{"name": "a", "dependencies": {"b": "*"}}"#;
        let recipe = JsonRecipeSource.parse(json).unwrap();
        assert_eq!(recipe.name.full(), "a");
        assert_eq!(recipe.dependencies.len(), 1);
    }

    #[test]
    fn parses_path_and_repository_dependencies() {
        let json = r#"{
            "name": "a",
            "dependencies": {
                "b": {"path": "../b"},
                "c": {"repository": "git+https://example.com/x/y", "version": "abc123"}
            }
        }"#;
        let recipe = JsonRecipeSource.parse(json).unwrap();
        assert_eq!(recipe.dependencies.len(), 2);
    }

    #[test]
    fn rejects_unparseable_version() {
        let json = r#"{"name": "a", "version": "not-a-version!!"}"#;
        assert!(JsonRecipeSource.parse(json).is_err());
    }
}
