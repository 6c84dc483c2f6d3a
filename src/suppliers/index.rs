//! Git-cloned index supplier: a git repository
//! holding one JSON file per package at a sharded path, refreshed by
//! pulling the clone. Shells out to the system `git` binary the way
//! `examples/prefix-dev-pixi/src/config.rs` shells out to `git config`.

use super::{best_match, PackageSupplier, SearchResult, SupplierResult};
use crate::error::SupplierError;
use crate::recipe::{JsonRecipeSource, Recipe, RecipeSource};
use crate::version::{Version, VersionRange};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
    archive_url: String,
    #[serde(default)]
    recipe: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    versions: Vec<IndexEntry>,
}

pub struct IndexSupplier {
    repository_url: String,
    clone_dir: PathBuf,
    client: reqwest::blocking::Client,
    cloned: Mutex<bool>,
}

impl IndexSupplier {
    pub fn new(repository_url: impl Into<String>, clone_dir: PathBuf) -> Self {
        Self {
            repository_url: repository_url.into(),
            clone_dir,
            client: reqwest::blocking::Client::new(),
            cloned: Mutex::new(false),
        }
    }

    /// `<pkg[0..2]>/<reversed pkg[-3..]>/<pkg>` sharding, following the
    /// cargo/crates.io-style index layout.
    fn shard_path(&self, name: &str) -> PathBuf {
        let chars: Vec<char> = name.chars().collect();
        let first_shard: String = chars.iter().take(2).collect();
        let tail: String = chars.iter().rev().take(3).collect();
        self.clone_dir.join(first_shard).join(tail).join(format!("{name}.json"))
    }

    fn ensure_cloned(&self) -> SupplierResult<()> {
        let mut cloned = self.cloned.lock().unwrap();
        if *cloned {
            return self.pull();
        }
        if self.clone_dir.join(".git").exists() {
            *cloned = true;
            return self.pull();
        }
        let status = Command::new("git")
            .arg("clone")
            .arg(&self.repository_url)
            .arg(&self.clone_dir)
            .status()
            .map_err(|e| SupplierError::TransientIoFailure(format!("git clone failed: {e}")))?;
        if !status.success() {
            return Err(SupplierError::ProtocolError(format!(
                "git clone of {} exited with {status}",
                self.repository_url
            )));
        }
        *cloned = true;
        Ok(())
    }

    fn pull(&self) -> SupplierResult<()> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.clone_dir)
            .arg("pull")
            .arg("--ff-only")
            .status()
            .map_err(|e| SupplierError::TransientIoFailure(format!("git pull failed: {e}")))?;
        if !status.success() {
            return Err(SupplierError::ProtocolError(format!(
                "git pull in {} exited with {status}",
                self.clone_dir.display()
            )));
        }
        Ok(())
    }

    fn read_index(&self, name: &str) -> SupplierResult<IndexFile> {
        self.ensure_cloned()?;
        let path = self.shard_path(name);
        if !path.exists() {
            return Err(SupplierError::PackageNotFound(name.to_string()));
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| SupplierError::TransientIoFailure(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| SupplierError::ProtocolError(format!("invalid index entry for {name}: {e}")))
    }
}

impl PackageSupplier for IndexSupplier {
    fn description(&self) -> String {
        format!("git index at {}", self.repository_url)
    }

    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        let index = self.read_index(name)?;
        Ok(index
            .versions
            .into_iter()
            .filter_map(|e| Version::parse(&e.version).ok())
            .collect())
    }

    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>> {
        let index = self.read_index(name)?;
        let versions: Vec<Version> = index
            .versions
            .iter()
            .filter_map(|e| Version::parse(&e.version).ok())
            .collect();
        let chosen = best_match(&versions, range, allow_prerelease)
            .ok_or_else(|| SupplierError::PackageNotFound(name.to_string()))?;
        let entry = index
            .versions
            .into_iter()
            .find(|e| Version::parse(&e.version).map(|v| v == chosen).unwrap_or(false))
            .expect("best_match returned an enumerated version");

        let response = self.client.get(&entry.archive_url).send().map_err(|e| {
            SupplierError::TransientIoFailure(format!("GET {} failed: {e}", entry.archive_url))
        })?;
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} fetching {}",
                response.status(),
                entry.archive_url
            )));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SupplierError::TransientIoFailure(e.to_string()))
    }

    fn fetch_package_recipe(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>> {
        let index = self.read_index(name)?;
        let versions: Vec<Version> = index
            .versions
            .iter()
            .filter_map(|e| Version::parse(&e.version).ok())
            .collect();
        let Some(chosen) = best_match(&versions, range, allow_prerelease) else {
            return Ok(None);
        };
        let entry = index
            .versions
            .into_iter()
            .find(|e| Version::parse(&e.version).map(|v| v == chosen).unwrap_or(false));
        match entry.and_then(|e| e.recipe) {
            Some(text) => JsonRecipeSource
                .parse(&text)
                .map(Some)
                .map_err(|e| SupplierError::ProtocolError(e.to_string())),
            None => Ok(None),
        }
    }

    fn search_packages(&self, query: &str) -> SupplierResult<Vec<SearchResult>> {
        self.ensure_cloned()?;
        let mut results = Vec::new();
        for entry in walkdir::WalkDir::new(&self.clone_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    if stem.contains(query) {
                        results.push(SearchResult {
                            name: stem.to_string(),
                            description: None,
                            version: String::new(),
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_path_uses_first_two_and_reversed_last_three_chars() {
        let supplier = IndexSupplier::new("https://example.invalid/idx.git", PathBuf::from("/idx"));
        let path = supplier.shard_path("mypackage");
        assert_eq!(path, PathBuf::from("/idx/my/ega/mypackage.json"));
    }
}
