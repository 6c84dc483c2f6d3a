//! dep - dependency resolution and build-settings core for a
//! module-based language toolchain.
//!
//! Given a project recipe describing a root package, its dependencies,
//! build configurations, and target settings, `dep` discovers the
//! transitive set of packages required to build the project, resolves a
//! single consistent set of versions, persists that set so subsequent
//! builds are reproducible, fetches missing packages from remote
//! sources, and produces merged build settings for a compiler driver to
//! consume.
//!
//! # Modules
//!
//! - [`version`] - semantic versions and version ranges
//! - [`value_types`] - path and repository-URL value types
//! - [`recipe`] - the recipe (project/package manifest) model
//! - [`selections`] - the persisted version-selection file
//! - [`store`] - the three-tier filesystem package catalog
//! - [`suppliers`] - pluggable package sources
//! - [`fetcher`] - download, verify, and extract a package into the store
//! - [`resolver`] - dependency resolution
//! - [`merger`] - build-settings merge across the resolved graph
//! - [`config`] - user and project configuration
//! - [`error`] - error types and result handling

pub mod config;
pub mod error;
pub mod fetcher;
pub mod merger;
pub mod recipe;
pub mod resolver;
pub mod selections;
pub mod store;
pub mod suppliers;
pub mod value_types;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use fetcher::{fetch, fetch_native, Fetched};
pub use merger::merge_build_settings;
pub use recipe::{Dependency, DependencySource, PackageName, Recipe};
pub use resolver::{resolve, ResolvedGraph, ResolvedPackage, UpgradeOptions};
pub use selections::{SelectedVersion, Selections};
pub use store::{FileSystem, NativeFs, Store, Tier};
pub use suppliers::PackageSupplier;
pub use version::{Version, VersionRange};
