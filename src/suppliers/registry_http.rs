//! HTTP+JSON registry supplier: bearer/token auth header formatting,
//! JSON metadata shape, checksum-verified downloads.

use super::{best_match, PackageSupplier, SearchResult, SupplierResult};
use crate::config::AuthConfig;
use crate::error::SupplierError;
use crate::recipe::Recipe;
use crate::recipe::{JsonRecipeSource, RecipeSource};
use crate::version::{Version, VersionRange};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Deserialize)]
struct ApiVersionEntry {
    version: String,
    #[serde(default)]
    recipe: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPackageResponse {
    versions: Vec<ApiVersionEntry>,
}

struct CacheEntry {
    fetched_at: Instant,
    versions: Vec<(Version, ApiVersionEntry)>,
    etag: Option<String>,
    last_modified: Option<String>,
}

/// `x-ratelimit-*` headers observed on the most recent response, per
/// spec.md §6. Suppliers don't throttle themselves; this just lets a
/// caller (e.g. a CLI progress line) see how close to the limit it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitStatus {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
}

pub struct HttpRegistrySupplier {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
    rate_limit: Mutex<Option<RateLimitStatus>>,
}

static SHARED_CLIENT: Lazy<reqwest::blocking::Client> =
    Lazy::new(|| reqwest::blocking::Client::new());

impl HttpRegistrySupplier {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            client: SHARED_CLIENT.clone(),
            cache: Mutex::new(HashMap::new()),
            rate_limit: Mutex::new(None),
        }
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_deref().map(AuthConfig::format_auth_header)
    }

    /// Most recent `x-ratelimit-*` values seen from the registry, if any.
    pub fn rate_limit_status(&self) -> Option<RateLimitStatus> {
        self.rate_limit.lock().clone()
    }

    fn record_rate_limit(&self, response: &reqwest::blocking::Response) {
        let header = |name: &str| -> Option<u64> {
            response.headers().get(name)?.to_str().ok()?.parse().ok()
        };
        let status = RateLimitStatus {
            limit: header("x-ratelimit-limit"),
            remaining: header("x-ratelimit-remaining"),
            reset: header("x-ratelimit-reset"),
        };
        if status != RateLimitStatus::default() {
            *self.rate_limit.lock() = Some(status);
        }
    }

    fn rate_limited_error(&self, response: &reqwest::blocking::Response) -> SupplierError {
        match response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
        {
            Some(reset) => SupplierError::RateLimited(format!("resets at {reset}")),
            None => SupplierError::RateLimited("try again later".to_string()),
        }
    }

    fn versions_cached(&self, name: &str) -> SupplierResult<Vec<(Version, ApiVersionEntry)>> {
        let cached = self.cache.lock().get(name).map(|e| {
            (e.fetched_at, e.versions.clone(), e.etag.clone(), e.last_modified.clone())
        });
        if let Some((fetched_at, versions, _, _)) = &cached {
            if fetched_at.elapsed() < METADATA_TTL {
                return Ok(versions.clone());
            }
        }

        let url = format!("{}/packages/{name}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(header) = self.auth_header() {
            request = request.header("Authorization", header);
        }
        // Revalidate a stale cache entry instead of re-fetching the whole
        // body when the registry still considers it current.
        if let Some((_, _, etag, last_modified)) = &cached {
            if let Some(etag) = etag {
                request = request.header("If-None-Match", etag.clone());
            }
            if let Some(last_modified) = last_modified {
                request = request.header("If-Modified-Since", last_modified.clone());
            }
        }
        let response = request.send().map_err(|e| {
            SupplierError::TransientIoFailure(format!("GET {url} failed: {e}"))
        })?;
        self.record_rate_limit(&response);

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            if let Some((_, versions, etag, last_modified)) = cached {
                self.cache.lock().insert(
                    name.to_string(),
                    CacheEntry { fetched_at: Instant::now(), versions: versions.clone(), etag, last_modified },
                );
                return Ok(versions);
            }
            // No local cache to revalidate against; treat as a protocol
            // error rather than fabricating an empty version list.
            return Err(SupplierError::ProtocolError(format!(
                "{url} returned 304 with no cached entry to revalidate"
            )));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(self.rate_limited_error(&response));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SupplierError::PackageNotFound(name.to_string()));
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SupplierError::AuthFailure(format!("unauthorized: {name}")));
        }
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body: ApiPackageResponse = response
            .json()
            .map_err(|e| SupplierError::ProtocolError(format!("invalid JSON from {url}: {e}")))?;

        let versions: Vec<(Version, ApiVersionEntry)> = body
            .versions
            .into_iter()
            .filter_map(|entry| Version::parse(&entry.version).ok().map(|v| (v, entry)))
            .collect();

        self.cache.lock().insert(
            name.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                versions: versions.clone(),
                etag,
                last_modified,
            },
        );
        Ok(versions)
    }
}

impl PackageSupplier for HttpRegistrySupplier {
    fn description(&self) -> String {
        format!("HTTP registry at {}", self.base_url)
    }

    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        Ok(self.versions_cached(name)?.into_iter().map(|(v, _)| v).collect())
    }

    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>> {
        let versions = self.get_versions(name)?;
        let chosen = best_match(&versions, range, allow_prerelease)
            .ok_or_else(|| SupplierError::PackageNotFound(name.to_string()))?;
        let url = format!("{}/packages/{name}/{chosen}/archive", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(header) = self.auth_header() {
            request = request.header("Authorization", header);
        }
        let response = request
            .send()
            .map_err(|e| SupplierError::TransientIoFailure(format!("GET {url} failed: {e}")))?;
        self.record_rate_limit(&response);
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(self.rate_limited_error(&response));
        }
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} fetching archive for {name}@{chosen}",
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
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>> {
        let versions = self.versions_cached(name)?;
        let version_values: Vec<Version> = versions.iter().map(|(v, _)| v.clone()).collect();
        let Some(chosen) = best_match(&version_values, range, allow_prerelease) else {
            return Ok(None);
        };
        let entry = versions.into_iter().find(|(v, _)| *v == chosen).map(|(_, e)| e);
        match entry.and_then(|e| e.recipe) {
            Some(text) => JsonRecipeSource
                .parse(&text)
                .map(Some)
                .map_err(|e| SupplierError::ProtocolError(e.to_string())),
            None => Ok(None),
        }
    }

    fn search_packages(&self, query: &str) -> SupplierResult<Vec<SearchResult>> {
        let url = format!("{}/search?q={}", self.base_url, urlencoding_query(query));
        let mut request = self.client.get(&url);
        if let Some(header) = self.auth_header() {
            request = request.header("Authorization", header);
        }
        let response = request
            .send()
            .map_err(|e| SupplierError::TransientIoFailure(format!("GET {url} failed: {e}")))?;
        self.record_rate_limit(&response);
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(self.rate_limited_error(&response));
        }
        if !response.status().is_success() {
            return Err(SupplierError::ProtocolError(format!(
                "unexpected status {} searching for {query}",
                response.status()
            )));
        }
        #[derive(Deserialize)]
        struct SearchHit {
            name: String,
            description: Option<String>,
            version: String,
        }
        #[derive(Deserialize)]
        struct SearchResponse {
            results: Vec<SearchHit>,
        }
        let body: SearchResponse = response
            .json()
            .map_err(|e| SupplierError::ProtocolError(e.to_string()))?;
        Ok(body
            .results
            .into_iter()
            .map(|h| SearchResult {
                name: h.name,
                description: h.description,
                version: h.version,
            })
            .collect())
    }
}

fn urlencoding_query(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            _ => format!("%{:02X}", c as u32),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_not_found_maps_to_supplier_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/packages/missing").with_status(404).create();
        let supplier = HttpRegistrySupplier::new(server.url(), None);
        let err = supplier.get_versions("missing").unwrap_err();
        assert!(matches!(err, SupplierError::PackageNotFound(_)));
    }

    #[test]
    fn unauthorized_maps_to_auth_failure() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/packages/secret").with_status(401).create();
        let supplier = HttpRegistrySupplier::new(server.url(), Some("urpm_bad".into()));
        let err = supplier.get_versions("secret").unwrap_err();
        assert!(matches!(err, SupplierError::AuthFailure(_)));
    }

    #[test]
    fn successful_response_is_parsed_and_cached() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/packages/foo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"versions":[{"version":"1.0.0"},{"version":"1.2.0"}]}"#)
            .create();
        let supplier = HttpRegistrySupplier::new(server.url(), None);
        let versions = supplier.get_versions("foo").unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn rate_limit_headers_are_captured_from_a_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/packages/foo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-limit", "60")
            .with_header("x-ratelimit-remaining", "59")
            .with_header("x-ratelimit-reset", "1700000000")
            .with_body(r#"{"versions":[{"version":"1.0.0"}]}"#)
            .create();
        let supplier = HttpRegistrySupplier::new(server.url(), None);
        supplier.get_versions("foo").unwrap();
        assert_eq!(
            supplier.rate_limit_status(),
            Some(RateLimitStatus { limit: Some(60), remaining: Some(59), reset: Some(1700000000) })
        );
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/packages/foo")
            .with_status(429)
            .with_header("x-ratelimit-reset", "1700000000")
            .create();
        let supplier = HttpRegistrySupplier::new(server.url(), None);
        let err = supplier.get_versions("foo").unwrap_err();
        assert!(matches!(err, SupplierError::RateLimited(msg) if msg.contains("1700000000")));
    }

    #[test]
    fn a_stale_cache_entry_is_revalidated_with_its_etag() {
        let mut server = mockito::Server::new();
        let _first = server
            .mock("GET", "/packages/foo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("etag", "\"v1\"")
            .with_body(r#"{"versions":[{"version":"1.0.0"}]}"#)
            .create();
        let supplier = HttpRegistrySupplier::new(server.url(), None);
        let first = supplier.get_versions("foo").unwrap();
        assert_eq!(first, vec![Version::new(1, 0, 0)]);

        // Force the cache to look stale so the next call issues a request.
        supplier
            .cache
            .lock()
            .get_mut("foo")
            .unwrap()
            .fetched_at = Instant::now() - METADATA_TTL - Duration::from_secs(1);

        let _revalidate = server
            .mock("GET", "/packages/foo")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .create();
        let second = supplier.get_versions("foo").unwrap();
        assert_eq!(second, first);
    }
}
