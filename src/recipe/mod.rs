//! The in-memory recipe model: a package's name, version, dependencies,
//! configurations, build settings, and sub-packages.

mod parse;
mod sub_package;

pub use parse::{JsonRecipeSource, RecipeSource};
pub use sub_package::resolve_sub_packages;

use crate::error::{Error, Result};
use crate::value_types::RelativePath;
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A dotted package name: `main[:sub1[:sub2...]]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName {
    full: String,
    main: String,
}

impl PackageName {
    /// Parses and canonicalizes a name, lower-casing every segment.
    /// Rejects a name whose declared casing differs from its canonical
    /// form.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidRecipe("package name is empty".into()));
        }
        let canonical = raw.to_ascii_lowercase();
        if canonical != raw {
            return Err(Error::InvalidRecipe(format!(
                "package name '{raw}' is not in canonical lower-case form (expected '{canonical}')"
            )));
        }
        let main = raw
            .split(':')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidRecipe(format!("invalid package name: {raw}")))?
            .to_string();
        if raw.split(':').any(|segment| segment.is_empty()) {
            return Err(Error::InvalidRecipe(format!("invalid package name: {raw}")));
        }
        Ok(PackageName {
            full: raw.to_string(),
            main,
        })
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn is_sub_package(&self) -> bool {
        self.full.contains(':')
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl Serialize for PackageName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PackageName::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Where a dependency's code comes from. Exactly one of these applies per
/// dependency (made a sum type so
/// "unset" is unrepresentable).
#[derive(Debug, Clone)]
pub enum DependencySource {
    Version(VersionRange),
    Path(RelativePath),
    Repository {
        kind: String,
        url: crate::value_types::RepositoryUrl,
        commit_or_ref: String,
    },
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: PackageName,
    pub source: DependencySource,
    pub optional: bool,
    pub default: bool,
}

/// A named variant of a package's build settings, possibly restricted to
/// a set of target platforms and introducing extra dependencies.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationInfo {
    pub name: String,
    pub platform_filters: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub build_settings: BuildSettings,
}

impl ConfigurationInfo {
    pub fn applies_to(&self, platform: &str) -> bool {
        self.platform_filters.is_empty()
            || self.platform_filters.iter().any(|p| p == platform)
    }
}

/// Ordered string-list build settings. Every field preserves insertion
/// order; merging appends in traversal order after deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(default)]
    pub import_paths: Vec<String>,
    #[serde(default)]
    pub c_import_paths: Vec<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub excluded_source_files: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub version_identifiers: Vec<String>,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    #[serde(default)]
    pub linker_flags: Vec<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
}

impl BuildSettings {
    /// Appends `other`'s lists to `self`'s, preserving first-seen order.
    pub fn merge_from(&mut self, other: &BuildSettings) {
        Self::append_dedup(&mut self.import_paths, &other.import_paths);
        Self::append_dedup(&mut self.c_import_paths, &other.c_import_paths);
        Self::append_dedup(&mut self.source_files, &other.source_files);
        Self::append_dedup(&mut self.excluded_source_files, &other.excluded_source_files);
        Self::append_dedup(&mut self.libraries, &other.libraries);
        Self::append_dedup(&mut self.version_identifiers, &other.version_identifiers);
        Self::append_dedup(&mut self.compiler_flags, &other.compiler_flags);
        Self::append_dedup(&mut self.linker_flags, &other.linker_flags);
        if self.target_type.is_none() {
            self.target_type = other.target_type.clone();
        }
        if self.target_name.is_none() {
            self.target_name = other.target_name.clone();
        }
        if self.target_path.is_none() {
            self.target_path = other.target_path.clone();
        }
    }

    fn append_dedup(into: &mut Vec<String>, from: &[String]) {
        for item in from {
            if !into.contains(item) {
                into.push(item.clone());
            }
        }
    }
}

/// A sub-package declared inline in its parent's recipe, or as a path to
/// a directory containing its own recipe file.
#[derive(Debug, Clone)]
pub enum SubPackageRef {
    Inline(Box<Recipe>),
    Path(RelativePath),
}

#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: PackageName,
    pub version: Option<Version>,
    pub description: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub configurations: Vec<ConfigurationInfo>,
    pub build_settings: BuildSettings,
    pub sub_packages: Vec<SubPackageRef>,
}

impl Recipe {
    /// Union of root dependencies and those introduced by `configuration`
    /// (when given), filtered by `platform`.
    pub fn get_dependencies(&self, configuration: Option<&str>, platform: &str) -> Vec<Dependency> {
        let mut deps = self.dependencies.clone();
        if let Some(configuration) = configuration {
            for config in &self.configurations {
                if config.name == configuration && config.applies_to(platform) {
                    deps.extend(config.dependencies.iter().cloned());
                }
            }
        }
        deps
    }

    /// Inline recipes and path-based sub-package directories, keyed by
    /// each sub-package's own declared name, with collisions resolved
    /// per [`resolve_sub_packages`]. `base_dir` is this recipe's own
    /// materialized root, needed to load path-based entries; `None` is
    /// only valid when every entry is inline.
    pub fn sub_packages(&self, base_dir: Option<&Path>) -> Result<BTreeMap<String, Recipe>> {
        resolve_sub_packages(&self.sub_packages, base_dir)
    }

    pub fn merged_build_settings(&self, configuration: Option<&str>, platform: &str) -> BuildSettings {
        let mut merged = self.build_settings.clone();
        if let Some(configuration) = configuration {
            for config in &self.configurations {
                if config.name == configuration && config.applies_to(platform) {
                    merged.merge_from(&config.build_settings);
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_rejects_non_canonical_case() {
        assert!(PackageName::parse("Foo").is_err());
        assert!(PackageName::parse("foo").is_ok());
    }

    #[test]
    fn package_name_splits_main_and_sub() {
        let n = PackageName::parse("foo:bar").unwrap();
        assert_eq!(n.main(), "foo");
        assert!(n.is_sub_package());
    }

    #[test]
    fn package_name_rejects_empty_segments() {
        assert!(PackageName::parse("foo::bar").is_err());
        assert!(PackageName::parse(":bar").is_err());
    }

    #[test]
    fn build_settings_merge_preserves_first_seen_order() {
        let mut a = BuildSettings {
            import_paths: vec!["x".into(), "y".into()],
            ..Default::default()
        };
        let b = BuildSettings {
            import_paths: vec!["y".into(), "z".into()],
            ..Default::default()
        };
        a.merge_from(&b);
        assert_eq!(a.import_paths, vec!["x", "y", "z"]);
    }

    #[test]
    fn configuration_without_platform_filter_applies_everywhere() {
        let config = ConfigurationInfo {
            name: "debug".into(),
            ..Default::default()
        };
        assert!(config.applies_to("linux"));
        assert!(config.applies_to("windows"));
    }
}
