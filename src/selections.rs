//! The persisted mapping of dependency name to selected version/source.

use crate::error::{Error, Result};
use crate::recipe::PackageName;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CURRENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectedVersion {
    Version(String),
    Path {
        path: String,
    },
    Repository {
        repository: String,
        version: String,
    },
}

impl SelectedVersion {
    pub fn from_version(v: &Version) -> Self {
        SelectedVersion::Version(v.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selections {
    pub format_version: u32,
    pub versions: BTreeMap<String, SelectedVersion>,
}

impl Default for Selections {
    fn default() -> Self {
        Selections {
            format_version: CURRENT_FORMAT_VERSION,
            versions: BTreeMap::new(),
        }
    }
}

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a selections file, or `Ok(None)` if it does not exist.
    /// Fails with `UnsupportedSelectionsVersion` on an unrecognized
    /// `format_version` rather than silently dropping unknown fields.
    pub fn load(path: &Path) -> Result<Option<Selections>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let selections: Selections = toml::from_str(&text)?;
        if selections.format_version != CURRENT_FORMAT_VERSION {
            return Err(Error::UnsupportedSelectionsVersion(selections.format_version));
        }
        Ok(Some(selections))
    }

    /// Atomic write-new-then-rename, matching the store's crash-safety
    /// pattern.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn get(&self, name: &PackageName) -> Option<&SelectedVersion> {
        self.versions.get(name.full())
    }

    pub fn set(&mut self, name: &PackageName, value: SelectedVersion) {
        self.versions.insert(name.full().to_string(), value);
    }

    pub fn remove(&mut self, name: &PackageName) {
        self.versions.remove(name.full());
    }

    pub fn has_selections(&self) -> bool {
        !self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_through_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selections.toml");
        let mut s = Selections::new();
        s.set(
            &PackageName::parse("b").unwrap(),
            SelectedVersion::Version("1.0.0".into()),
        );
        s.save(&path).unwrap();

        let loaded = Selections::load(&path).unwrap().unwrap();
        assert_eq!(loaded.versions, s.versions);
        assert_eq!(loaded.format_version, CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(Selections::load(&path).unwrap().is_none());
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selections.toml");
        std::fs::write(&path, "format_version = 999\n[versions]\n").unwrap();
        let err = Selections::load(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSelectionsVersion(999)));
    }

    #[test]
    fn repository_selection_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selections.toml");
        let mut s = Selections::new();
        s.set(
            &PackageName::parse("dep1").unwrap(),
            SelectedVersion::Repository {
                repository: "git+https://example.com/x/y".into(),
                version: "abc123".into(),
            },
        );
        s.save(&path).unwrap();
        let loaded = Selections::load(&path).unwrap().unwrap();
        assert_eq!(loaded.versions, s.versions);
    }
}
