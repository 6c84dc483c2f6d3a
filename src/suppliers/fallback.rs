//! Ordered supplier list with a per-entry cooldown (variant
//! 5): tries suppliers in registration order, skipping any that failed
//! within the last 10 minutes.

use super::{PackageSupplier, SearchResult, SupplierResult};
use crate::error::SupplierError;
use crate::recipe::Recipe;
use crate::version::{Version, VersionRange};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const COOLDOWN: Duration = Duration::from_secs(10 * 60);

pub struct FallbackSupplier {
    suppliers: Vec<Box<dyn PackageSupplier>>,
    cooldowns: Mutex<HashMap<usize, Instant>>,
}

impl FallbackSupplier {
    pub fn new(suppliers: Vec<Box<dyn PackageSupplier>>) -> Self {
        Self {
            suppliers,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Index 0 is always eligible, cooldown or not — the first supplier
    /// is always tried. Cooldown only decides whether a *later* supplier
    /// is worth skipping to.
    fn eligible_indices(&self) -> Vec<usize> {
        let cooldowns = self.cooldowns.lock();
        (0..self.suppliers.len())
            .filter(|i| {
                *i == 0
                    || cooldowns
                        .get(i)
                        .map(|failed_at| failed_at.elapsed() >= COOLDOWN)
                        .unwrap_or(true)
            })
            .collect()
    }

    fn mark_failed(&self, index: usize) {
        self.cooldowns.lock().insert(index, Instant::now());
    }

    fn try_each<T>(
        &self,
        op: impl Fn(&dyn PackageSupplier) -> SupplierResult<T>,
    ) -> SupplierResult<T> {
        let mut first_err = None;
        for index in self.eligible_indices() {
            match op(self.suppliers[index].as_ref()) {
                Ok(value) => return Ok(value),
                Err(SupplierError::PackageNotFound(name)) => {
                    first_err.get_or_insert(SupplierError::PackageNotFound(name));
                }
                Err(err) => {
                    self.mark_failed(index);
                    first_err.get_or_insert(err);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| {
            SupplierError::Unsupported("no suppliers configured".into())
        }))
    }
}

impl PackageSupplier for FallbackSupplier {
    fn description(&self) -> String {
        format!(
            "fallback over [{}]",
            self.suppliers
                .iter()
                .map(|s| s.description())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn get_versions(&self, name: &str) -> SupplierResult<Vec<Version>> {
        self.try_each(|s| s.get_versions(name))
    }

    fn fetch_package_archive(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Vec<u8>> {
        self.try_each(|s| s.fetch_package_archive(name, range, allow_prerelease))
    }

    fn fetch_package_recipe(
        &self,
        name: &str,
        range: &VersionRange,
        allow_prerelease: bool,
    ) -> SupplierResult<Option<Recipe>> {
        self.try_each(|s| s.fetch_package_recipe(name, range, allow_prerelease))
    }

    fn search_packages(&self, query: &str) -> SupplierResult<Vec<SearchResult>> {
        self.try_each(|s| s.search_packages(query))
    }
}
