//! The three-tier (system/user/project) filesystem-backed package
//! catalog: search paths, locking, and a pluggable filesystem backend.

mod fs_backend;
mod layout;

pub use fs_backend::{FileSystem, InMemoryFs, LockGuard, NativeFs};

use crate::error::{Error, Result};
use crate::value_types::RepositoryUrl;
use crate::version::Version;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    System,
    User,
    Project,
}

impl Tier {
    /// project, then user, then system — the fallback order when a
    /// lookup does not fix a tier.
    pub const FALLBACK_ORDER: [Tier; 3] = [Tier::Project, Tier::User, Tier::System];
}

/// A recipe's materialized location: which tier it was found in, its
/// filesystem root, and (if fetched via SCM) the repository it came
/// from.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub root: PathBuf,
    pub tier: Tier,
    pub repository: Option<(RepositoryUrl, String)>,
}

pub struct Store<F: FileSystem = NativeFs> {
    fs: F,
    roots: HashMap<Tier, PathBuf>,
    /// Appended in registration order; most-recently-added searched first.
    search_paths: Vec<(Tier, PathBuf)>,
}

impl Store<NativeFs> {
    pub fn native(system: PathBuf, user: PathBuf, project: PathBuf) -> Self {
        let mut roots = HashMap::new();
        roots.insert(Tier::System, system);
        roots.insert(Tier::User, user);
        roots.insert(Tier::Project, project);
        Store {
            fs: NativeFs,
            roots,
            search_paths: Vec::new(),
        }
    }
}

impl<F: FileSystem> Store<F> {
    pub fn new(fs: F, system: PathBuf, user: PathBuf, project: PathBuf) -> Self {
        let mut roots = HashMap::new();
        roots.insert(Tier::System, system);
        roots.insert(Tier::User, user);
        roots.insert(Tier::Project, project);
        Store {
            fs,
            roots,
            search_paths: Vec::new(),
        }
    }

    pub fn add_search_path(&mut self, tier: Tier, dir: PathBuf) {
        self.search_paths.retain(|(t, d)| !(*t == tier && d == &dir));
        self.search_paths.push((tier, dir));
    }

    pub fn remove_search_path(&mut self, tier: Tier, dir: &PathBuf) {
        self.search_paths.retain(|(t, d)| !(*t == tier && d == dir));
    }

    /// Rescans the filesystem on the next lookup. The store holds no
    /// persistent index, so this is already cheap and a no-op; kept as
    /// an explicit operation so a future caching
    /// layer has a place to clear itself.
    pub fn refresh(&self) {}

    fn probe(&self, root: &PathBuf, name: &str, version: &Version, tier: Tier) -> Option<Package> {
        let dir = layout::package_dir(root, name, &version.to_string());
        if self.fs.exists(&dir) {
            Some(Package {
                name: name.to_string(),
                version: version.clone(),
                root: dir,
                tier,
                repository: None,
            })
        } else {
            None
        }
    }

    pub fn get_package(
        &self,
        name: &str,
        version: &Version,
        tier: Option<Tier>,
    ) -> Option<Package> {
        for (t, dir) in self.search_paths.iter().rev() {
            if tier.is_some_and(|want| want != *t) {
                continue;
            }
            if let Some(pkg) = self.probe(dir, name, version, *t) {
                return Some(pkg);
            }
        }

        let order: Vec<Tier> = match tier {
            Some(t) => vec![t],
            None => Tier::FALLBACK_ORDER.to_vec(),
        };
        for t in order {
            if let Some(root) = self.roots.get(&t) {
                if let Some(pkg) = self.probe(root, name, version, t) {
                    return Some(pkg);
                }
            }
        }
        None
    }

    fn versions_under(&self, root: &PathBuf, name: &str, tier: Tier) -> Vec<Package> {
        let name_dir = root.join("packages").join(name);
        self.fs
            .iter_dir(&name_dir)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|version_dir| {
                let version_str = version_dir.file_name()?.to_str()?;
                let version = Version::parse(version_str).ok()?;
                self.probe(root, name, &version, tier)
            })
            .collect()
    }

    pub fn iter(&self, name: &str) -> Vec<Package> {
        let mut out = Vec::new();
        for (t, dir) in &self.search_paths {
            out.extend(self.versions_under(dir, name, *t));
        }
        for t in Tier::FALLBACK_ORDER {
            if let Some(root) = self.roots.get(&t) {
                out.extend(self.versions_under(root, name, t));
            }
        }
        out
    }

    pub fn iter_all(&self) -> Vec<Package> {
        let mut names = std::collections::BTreeSet::new();
        let mut collect_names = |root: &PathBuf| {
            for entry in self.fs.iter_dir(&root.join("packages")).unwrap_or_default() {
                if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                    names.insert(name.to_string());
                }
            }
        };
        for (_, dir) in &self.search_paths {
            collect_names(dir);
        }
        for root in self.roots.values() {
            collect_names(root);
        }
        names.iter().flat_map(|name| self.iter(name)).collect()
    }

    /// Places `entries` (paths relative to the package root, with their
    /// bytes) under `<tier>/packages/<name>/<version>/<name>/`, holding
    /// an exclusive lock on the destination for the whole operation
    /// A destination already present is returned
    /// as-is without rewriting — the no-op branch required for
    /// racing concurrent `store` calls.
    pub fn store_from_entries(
        &self,
        tier: Tier,
        name: &str,
        version: &Version,
        entries: &[(PathBuf, Vec<u8>)],
    ) -> Result<Package> {
        let root = self
            .roots
            .get(&tier)
            .ok_or_else(|| Error::Other(format!("no root configured for tier {tier:?}")))?;
        let dest = layout::package_dir(root, name, &version.to_string());
        let _lock = self.fs.lock_exclusive(&dest)?;

        if self.fs.exists(&dest) {
            return Ok(Package {
                name: name.to_string(),
                version: version.clone(),
                root: dest,
                tier,
                repository: None,
            });
        }

        let tmp = dest.with_file_name(format!(
            "{}.tmp-{}",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("pkg"),
            std::process::id()
        ));
        self.fs.remove_dir_all(&tmp)?;
        for (rel, data) in entries {
            self.fs.write(&tmp.join(rel), data)?;
        }
        if let Some(parent) = dest.parent() {
            self.fs.mkdir_all(parent)?;
        }
        self.fs.rename(&tmp, &dest)?;

        Ok(Package {
            name: name.to_string(),
            version: version.clone(),
            root: dest,
            tier,
            repository: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> Store<InMemoryFs> {
        Store::new(
            InMemoryFs::new(),
            PathBuf::from("/system"),
            PathBuf::from("/user"),
            PathBuf::from("/project"),
        )
    }

    #[test]
    fn store_then_lookup_returns_the_stored_package() {
        let s = store();
        let v = Version::new(1, 0, 0);
        s.store_from_entries(Tier::Project, "b", &v, &[(PathBuf::from("src.txt"), b"x".to_vec())])
            .unwrap();
        let found = s.get_package("b", &v, None).unwrap();
        assert_eq!(found.tier, Tier::Project);
        assert!(s.get_package("b", &Version::new(2, 0, 0), None).is_none());
    }

    #[test]
    fn add_search_path_takes_priority() {
        let mut s = store();
        let v = Version::new(1, 0, 0);
        s.store_from_entries(Tier::Project, "p", &v, &[]).unwrap();
        s.add_search_path(Tier::Project, PathBuf::from("/override"));
        // Manually place a package under the search path directory using
        // the same layout the store itself would use.
        let dest = layout::package_dir(&PathBuf::from("/override"), "p", "1.0.0");
        s.fs.write(&dest.join("marker"), b"hi").unwrap();

        let found = s.get_package("p", &v, None).unwrap();
        assert_eq!(found.root, dest);
    }

    #[test]
    fn fallback_order_is_project_then_user_then_system() {
        let mut s = store();
        let v = Version::new(1, 0, 0);
        s.store_from_entries(Tier::System, "q", &v, &[]).unwrap();
        assert_eq!(s.get_package("q", &v, None).unwrap().tier, Tier::System);
        s.store_from_entries(Tier::User, "q", &v, &[]).unwrap();
        assert_eq!(s.get_package("q", &v, None).unwrap().tier, Tier::User);
        s.store_from_entries(Tier::Project, "q", &v, &[]).unwrap();
        assert_eq!(s.get_package("q", &v, None).unwrap().tier, Tier::Project);
    }

    #[test]
    fn concurrent_store_of_same_destination_is_a_no_op() {
        let s = store();
        let v = Version::new(1, 0, 0);
        let first = s
            .store_from_entries(Tier::Project, "r", &v, &[(PathBuf::from("a"), b"1".to_vec())])
            .unwrap();
        let second = s
            .store_from_entries(Tier::Project, "r", &v, &[(PathBuf::from("a"), b"2".to_vec())])
            .unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(s.fs.read(&first.root.join("a")).unwrap(), b"1");
    }
}
