//! Pluggable package sources.

mod fallback;
mod filesystem;
mod index;
mod maven;
mod registry_http;

pub use fallback::FallbackSupplier;
pub use filesystem::FilesystemSupplier;
pub use index::IndexSupplier;
pub use maven::MavenSupplier;
pub use registry_http::HttpRegistrySupplier;

use crate::error::SupplierError;
use crate::recipe::Recipe;
use crate::version::{Version, VersionRange};

pub type SupplierResult<T> = std::result::Result<T, SupplierError>;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
}

/// A source that can enumerate versions, fetch archives, fetch recipes,
/// and search for packages by name.
pub trait PackageSupplier: Send + Sync {
    fn description(&self) -> String;
    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>>;
    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>>;
    fn fetch_package_recipe(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>>;
    fn search_packages(&self, query: &str) -> SupplierResult<Vec<SearchResult>>;
}

/// Among versions matching `range`, picks the highest; prefers a
/// non-pre-release unless `allow_prerelease` is set, every matching
/// candidate is a pre-release, or the current best is itself a
/// pre-release with a higher pre-release candidate available
/// ("best-match" rule).
///
/// `versions` need not be pre-sorted.
pub fn best_match(versions: &[Version], range: &VersionRange, allow_prerelease: bool) -> Option<Version> {
    let mut matching: Vec<&Version> = versions.iter().filter(|v| range.matches(v)).collect();
    matching.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if allow_prerelease {
        return matching.last().map(|v| (*v).clone());
    }

    if let Some(best_release) = matching.iter().rev().find(|v| !v.is_pre_release()) {
        return Some((*best_release).clone());
    }
    // All matching candidates are pre-release: fall through to the
    // highest one.
    matching.last().map(|v| (*v).clone())
}
