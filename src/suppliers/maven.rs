//! Maven-style supplier: XML metadata at
//! `<base>/<name>/maven-metadata.xml`, archive at
//! `<base>/<name>/<version>/<name>-<version>.<ext>`.

use super::{best_match, PackageSupplier, SearchResult, SupplierResult};
use crate::error::SupplierError;
use crate::recipe::Recipe;
use crate::version::{Version, VersionRange};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct Versioning {
    versions: Versions,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default, rename = "version")]
    version: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "metadata")]
struct Metadata {
    versioning: Versioning,
}

struct CacheEntry {
    fetched_at: Instant,
    versions: Vec<Version>,
}

pub struct MavenSupplier {
    base_url: String,
    client: reqwest::blocking::Client,
    archive_ext: String,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl MavenSupplier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
            archive_ext: "tar.gz".to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn versions_cached(&self, name: &str) -> SupplierResult<Vec<Version>> {
        if let Some(entry) = self.cache.lock().get(name) {
            if entry.fetched_at.elapsed() < METADATA_TTL {
                return Ok(entry.versions.clone());
            }
        }

        let url = format!("{}/{name}/maven-metadata.xml", self.base_url);
        let response = self.client.get(&url).send().map_err(|e| {
            SupplierError::TransientIoFailure(format!("GET {url} failed: {e}"))
        })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SupplierError::PackageNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }
        let text = response
            .text()
            .map_err(|e| SupplierError::TransientIoFailure(e.to_string()))?;
        let metadata: Metadata = quick_xml::de::from_str(&text)
            .map_err(|e| SupplierError::ProtocolError(format!("invalid maven-metadata.xml: {e}")))?;

        let versions: Vec<Version> = metadata
            .versioning
            .versions
            .version
            .into_iter()
            .filter_map(|v| Version::parse(&v).ok())
            .collect();

        self.cache.lock().insert(
            name.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                versions: versions.clone(),
            },
        );
        Ok(versions)
    }
}

impl PackageSupplier for MavenSupplier {
    fn description(&self) -> String {
        format!("Maven-style repository at {}", self.base_url)
    }

    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        self.versions_cached(name)
    }

    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>> {
        let versions = self.versions_cached(name)?;
        let chosen = best_match(&versions, range, allow_prerelease)
            .ok_or_else(|| SupplierError::PackageNotFound(name.to_string()))?;
        let url = format!(
            "{}/{name}/{chosen}/{name}-{chosen}.{}",
            self.base_url, self.archive_ext
        );
        let response = self.client.get(&url).send().map_err(|e| {
            SupplierError::TransientIoFailure(format!("GET {url} failed: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} fetching {url}",
                response.status()
            )));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SupplierError::TransientIoFailure(e.to_string()))
    }

    fn fetch_package_recipe(
        &self,
        _name: &str,
        _range: &VersionRange,
        _allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>> {
        // Maven-style repositories carry no recipe metadata separate
        // from the archive; the fetcher reads it after extraction.
        Ok(None)
    }

    fn search_packages(&self, _query: &str) -> SupplierResult<Vec<SearchResult>> {
        Err(SupplierError::Unsupported(
            "maven-style repositories do not support search".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_maven_metadata_versions() {
        let mut server = mockito::Server::new();
        let xml = r#"<metadata>
            <versioning>
                <versions>
                    <version>1.0.0</version>
                    <version>1.1.0</version>
                </versions>
            </versioning>
        </metadata>"#;
        let _mock = server
            .mock("GET", "/foo/maven-metadata.xml")
            .with_status(200)
            .with_body(xml)
            .create();
        let supplier = MavenSupplier::new(server.url());
        let versions = supplier.get_versions("foo").unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn missing_metadata_is_package_not_found() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/missing/maven-metadata.xml")
            .with_status(404)
            .create();
        let supplier = MavenSupplier::new(server.url());
        assert!(matches!(
            supplier.get_versions("missing").unwrap_err(),
            SupplierError::PackageNotFound(_)
        ));
    }
}
