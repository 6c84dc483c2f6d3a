//! A directory of `<name>-<version>.<ext>` archive files, scanned
//! directly as a package source.

use super::{best_match, PackageSupplier, SearchResult, SupplierResult};
use crate::error::SupplierError;
use crate::recipe::Recipe;
use crate::version::{Version, VersionRange};
use std::path::PathBuf;

/// Recognized archive suffixes, longest first so `.tar.gz` is stripped
/// whole rather than leaving a dangling `.tar`.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.xz", ".tar.bz2", ".tgz", ".zip"];

/// Strips a recognized archive extension from `file_name`, returning
/// `None` if it doesn't end in one of [`ARCHIVE_EXTENSIONS`].
fn strip_archive_extension(file_name: &str) -> Option<&str> {
    ARCHIVE_EXTENSIONS.iter().find_map(|ext| file_name.strip_suffix(ext))
}

pub struct FilesystemSupplier {
    root: PathBuf,
}

impl FilesystemSupplier {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn archive_entries(&self, name: &str) -> SupplierResult<Vec<(Version, PathBuf)>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            SupplierError::TransientIoFailure(format!("{}: {e}", self.root.display()))
        })?;
        let prefix = format!("{name}-");
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SupplierError::TransientIoFailure(e.to_string()))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(rest) = file_name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(version_str) = strip_archive_extension(rest) else {
                continue;
            };
            if let Ok(version) = Version::parse(version_str) {
                found.push((version, entry.path()));
            }
        }
        Ok(found)
    }
}

impl PackageSupplier for FilesystemSupplier {
    fn description(&self) -> String {
        format!("filesystem directory at {}", self.root.display())
    }

    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        Ok(self.archive_entries(name)?.into_iter().map(|(v, _)| v).collect())
    }

    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>> {
        let entries = self.archive_entries(name)?;
        let versions: Vec<Version> = entries.iter().map(|(v, _)| v.clone()).collect();
        let chosen = best_match(&versions, range, allow_prerelease)
            .ok_or_else(|| SupplierError::PackageNotFound(name.to_string()))?;
        let path = entries
            .into_iter()
            .find(|(v, _)| *v == chosen)
            .map(|(_, p)| p)
            .expect("best_match returned a version we enumerated");
        std::fs::read(&path).map_err(|e| SupplierError::TransientIoFailure(e.to_string()))
    }

    fn fetch_package_recipe(
        &self,
        _name: &str,
        _range: &VersionRange,
        _allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>> {
        // The filesystem supplier only serves archives; the recipe
        // inside is read by the fetcher once extracted.
        Ok(None)
    }

    fn search_packages(&self, query: &str) -> SupplierResult<Vec<SearchResult>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| SupplierError::TransientIoFailure(e.to_string()))?;
        let mut results = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SupplierError::TransientIoFailure(e.to_string()))?;
            if let Some(file_name) = entry.file_name().to_str() {
                if file_name.contains(query) {
                    if let Some((name, rest)) = file_name.split_once('-') {
                        if let Some(version) = strip_archive_extension(rest) {
                            results.push(SearchResult {
                                name: name.to_string(),
                                description: None,
                                version: version.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}
