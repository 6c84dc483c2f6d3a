//! Download, verify, extract, store, grounded on the
//! teacher's `store_package`/`install_package_cas` extract-to-temp-then-
//! rename flow and `verify_checksum` in `installer.rs`, retargeted at
//! the [`crate::store::Store`]'s tier/lock API instead of a single
//! global CAS directory.

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::store::{FileSystem, NativeFs, Package, Store, Tier};
use crate::suppliers::PackageSupplier;
use crate::version::VersionRange;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tar::Archive;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

pub struct Fetched {
    pub package: Package,
    pub recipe: Option<Recipe>,
}

/// Runs the five numbered steps against `store`, using
/// `supplier` as the source of versions and archive bytes.
pub fn fetch<F: FileSystem>(
    store: &Store<F>,
    supplier: &dyn PackageSupplier,
    name: &str,
    range: &VersionRange,
    allow_prerelease: bool,
    target_tier: Tier,
) -> Result<Fetched> {
    let versions = with_retry(|| supplier.get_versions(name).map_err(Error::from))?;
    if versions.is_empty() {
        return Err(Error::NoMatchingVersion {
            name: name.to_string(),
            range: range.to_string(),
        });
    }
    let chosen = crate::suppliers::best_match(&versions, range, allow_prerelease).ok_or_else(|| {
        Error::NoMatchingVersion {
            name: name.to_string(),
            range: range.to_string(),
        }
    })?;

    if let Some(existing) = store.get_package(name, &chosen, None) {
        let recipe = with_retry(|| {
            supplier
                .fetch_package_recipe(name, range, allow_prerelease)
                .map_err(Error::from)
        })?;
        return Ok(Fetched { package: existing, recipe });
    }

    let archive_bytes =
        with_retry(|| supplier.fetch_package_archive(name, range, allow_prerelease).map_err(Error::from))?;

    let entries = extract_archive(&archive_bytes)?;

    let package = store.store_from_entries(target_tier, name, &chosen, &entries)?;

    let recipe = with_retry(|| {
        supplier
            .fetch_package_recipe(name, range, allow_prerelease)
            .map_err(Error::from)
    })?;

    Ok(Fetched { package, recipe })
}

/// Convenience entry point for callers with a real filesystem.
pub fn fetch_native(
    store: &Store<NativeFs>,
    supplier: &dyn PackageSupplier,
    name: &str,
    range: &VersionRange,
    allow_prerelease: bool,
    target_tier: Tier,
) -> Result<Fetched> {
    fetch(store, supplier, name, range, allow_prerelease, target_tier)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    if expected.is_empty() {
        return Err(Error::Other("empty checksum".to_string()));
    }
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn extract_archive(bytes: &[u8]) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = Archive::new(decoder);
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_path_buf();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        entries.push((path, buf));
    }
    Ok(entries)
}

fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_RETRIES && err.is_transient() => {
                tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying after transient fetch failure");
                std::thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupplierError;
    use crate::recipe::Recipe;
    use crate::store::InMemoryFs;
    use crate::suppliers::SupplierResult;
    use crate::version::Version;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSupplier {
        versions: Vec<Version>,
        archive: Vec<u8>,
        calls: AtomicUsize,
    }

    impl PackageSupplier for StubSupplier {
        fn description(&self) -> String {
            "stub".into()
        }
        fn get_versions(&self, _name: &str) -> SupplierResult<Vec<Version>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.versions.clone())
        }
        fn fetch_package_archive(
            &self,
            _name: &str,
            _range: &VersionRange,
            _allow_prerelease: bool,
        ) -> SupplierResult<Vec<u8>> {
            Ok(self.archive.clone())
        }
        fn fetch_package_recipe(
            &self,
            _name: &str,
            _range: &VersionRange,
            _allow_prerelease: bool,
        ) -> SupplierResult<Option<Recipe>> {
            Ok(None)
        }
        fn search_packages(&self, _query: &str) -> SupplierResult<Vec<SearchResult>> {
            Ok(vec![])
        }
    }
    use crate::suppliers::SearchResult;

    fn gzip_tar_with_one_file(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn fetch_stores_and_returns_package_when_not_already_present() {
        let archive = gzip_tar_with_one_file("a/file.txt", b"hello");
        let supplier = StubSupplier {
            versions: vec![Version::new(1, 0, 0)],
            archive,
            calls: AtomicUsize::new(0),
        };
        let store: Store<InMemoryFs> = Store::new(
            InMemoryFs::new(),
            PathBuf::from("/system"),
            PathBuf::from("/user"),
            PathBuf::from("/project"),
        );
        let fetched = fetch(
            &store,
            &supplier,
            "a",
            &VersionRange::Any,
            false,
            Tier::Project,
        )
        .unwrap();
        assert_eq!(fetched.package.version, Version::new(1, 0, 0));
    }

    #[test]
    fn fetch_skips_download_when_store_already_has_the_version() {
        let store: Store<InMemoryFs> = Store::new(
            InMemoryFs::new(),
            PathBuf::from("/system"),
            PathBuf::from("/user"),
            PathBuf::from("/project"),
        );
        store
            .store_from_entries(Tier::Project, "a", &Version::new(1, 0, 0), &[])
            .unwrap();

        let supplier = StubSupplier {
            versions: vec![Version::new(1, 0, 0)],
            archive: Vec::new(),
            calls: AtomicUsize::new(0),
        };
        let fetched = fetch(
            &store,
            &supplier,
            "a",
            &VersionRange::Any,
            false,
            Tier::Project,
        )
        .unwrap();
        assert_eq!(fetched.package.tier, Tier::Project);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let bytes = b"some archive bytes";
        let good = sha256_hex(bytes);
        assert!(verify_checksum(bytes, &good).is_ok());
        assert!(verify_checksum(bytes, "deadbeef").is_err());
    }
}
