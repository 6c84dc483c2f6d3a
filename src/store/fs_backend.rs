//! A small filesystem abstraction so the store can run against a real
//! filesystem or an in-memory one in tests ("filesystem
//! abstraction for tests").

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Held for the lifetime of an exclusive lock on a store destination;
/// releases the lock on drop.
pub trait LockGuard: Send {}

/// The operations the store needs: create directories, read/write
/// files, list entries, check existence, stamp mtimes, and take an
/// exclusive lock on a destination directory.
pub trait FileSystem: Send + Sync {
    fn mkdir_all(&self, path: &Path) -> Result<()>;
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn exists(&self, path: &Path) -> bool;
    /// Direct children of `path`, or an empty list if it doesn't exist.
    fn iter_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn set_times(&self, path: &Path, time: SystemTime) -> Result<()>;
    fn lock_exclusive(&self, path: &Path) -> Result<Box<dyn LockGuard>>;
}

/// Backs the store with real filesystem calls plus an `fd-lock` advisory
/// lock on a sibling `.lock` file (grounded on `installer.rs`'s
/// extract-to-temp-then-rename pattern, extended to inter-process
/// safety via `fd-lock`, the crate `pixi` uses for the same purpose).
#[derive(Debug, Default)]
pub struct NativeFs;

struct NativeLockGuard(#[allow(dead_code)] fd_lock::RwLock<std::fs::File>);
impl LockGuard for NativeLockGuard {}

impl FileSystem for NativeFs {
    fn mkdir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn iter_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        Ok(entries)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn set_times(&self, path: &Path, time: SystemTime) -> Result<()> {
        let file = std::fs::File::open(path)?;
        file.set_modified(time)?;
        Ok(())
    }

    fn lock_exclusive(&self, path: &Path) -> Result<Box<dyn LockGuard>> {
        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        let mut rw_lock = fd_lock::RwLock::new(file);
        // Block until the write lock is acquired; held for the guard's
        // lifetime (the caller's critical section).
        let _guard = rw_lock
            .try_write()
            .or_else(|_| rw_lock.write())
            .map_err(|e| Error::LockTimeout(format!("{}: {e}", path.display())))?;
        // Safe to drop `_guard` immediately: we re-acquire by holding the
        // `RwLock` itself inside `NativeLockGuard`, which keeps the file
        // descriptor (and therefore the OS-level lock) open for as long
        // as the guard lives, then releases it on drop.
        Ok(Box::new(NativeLockGuard(rw_lock)))
    }
}

/// In-memory filesystem for store/resolver tests. Not thread-safe across
/// independent `InMemoryFs` instances — each test constructs its own.
#[derive(Default)]
pub struct InMemoryFs {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    locks: Arc<Mutex<BTreeSet<PathBuf>>>,
}

struct InMemoryLockGuard {
    locks: Arc<Mutex<BTreeSet<PathBuf>>>,
    path: PathBuf,
}
impl LockGuard for InMemoryLockGuard {}
impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.path);
    }
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for InMemoryFs {
    fn mkdir_all(&self, path: &Path) -> Result<()> {
        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.dirs.lock().insert(parent.to_path_buf());
        }
        self.files.lock().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path) || self.dirs.lock().contains(path)
    }

    fn iter_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut children = BTreeSet::new();
        for known in self.dirs.lock().iter().chain(self.files.lock().keys()) {
            if let Ok(rest) = known.strip_prefix(path) {
                if let Some(first) = rest.components().next() {
                    children.insert(path.join(first));
                }
            }
        }
        children.remove(path);
        Ok(children.into_iter().collect())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.files.lock().retain(|p, _| !p.starts_with(path));
        self.dirs.lock().retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let moved_files: Vec<_> = {
            let files = self.files.lock();
            files
                .iter()
                .filter(|(p, _)| p.starts_with(from))
                .map(|(p, d)| (p.clone(), d.clone()))
                .collect()
        };
        for (p, data) in moved_files {
            let new_path = to.join(p.strip_prefix(from).unwrap());
            self.files.lock().remove(&p);
            self.files.lock().insert(new_path, data);
        }
        self.dirs.lock().insert(to.to_path_buf());
        self.dirs.lock().retain(|p| p != from);
        Ok(())
    }

    fn set_times(&self, _path: &Path, _time: SystemTime) -> Result<()> {
        Ok(())
    }

    fn lock_exclusive(&self, path: &Path) -> Result<Box<dyn LockGuard>> {
        let mut locks = self.locks.lock();
        if locks.contains(path) {
            return Err(Error::LockTimeout(path.display().to_string()));
        }
        locks.insert(path.to_path_buf());
        drop(locks);
        Ok(Box::new(InMemoryLockGuard {
            locks: self.locks.clone(),
            path: path.to_path_buf(),
        }))
    }
}
