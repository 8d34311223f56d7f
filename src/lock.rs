//! Advisory lock guarding a store file across processes.
//!
//! The lock lives in a sidecar file `<store>.lock`, created on first use.
//! Read-only sessions take a shared lock and run concurrently with each
//! other; mutating sessions take an exclusive lock and run alone.
//! Acquisition blocks until the lock is granted. The lock is released when
//! the [`StoreLock`] is dropped, on every exit path.
//!
//! Locks are per open file description, so two [`StoreLock`]s in the same
//! process conflict just as two processes would.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read-only session.
    Shared,
    /// Mutating session.
    Exclusive,
}

/// A held store lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

/// Sidecar lock path for a store file.
pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl StoreLock {
    /// Acquire the lock for `store_path`, blocking while it is held in a
    /// conflicting mode.
    pub fn acquire(store_path: &Path, mode: LockMode) -> Result<Self> {
        let path = lock_path(store_path);
        let file = open_lock_file(&path)?;

        match try_lock(&file, mode) {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                info!(lock = %path.display(), ?mode, "store is locked by another session, waiting");
                match mode {
                    LockMode::Shared => FileExt::lock_shared(&file),
                    LockMode::Exclusive => FileExt::lock_exclusive(&file),
                }
                .with_context(|| format!("failed to lock {}", path.display()))?;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to lock {}", path.display()));
            }
        }

        debug!(lock = %path.display(), ?mode, "acquired store lock");
        Ok(Self { file, path, mode })
    }

    /// Acquire the lock without waiting. `Ok(None)` if it is held in a
    /// conflicting mode.
    pub fn try_acquire(store_path: &Path, mode: LockMode) -> Result<Option<Self>> {
        let path = lock_path(store_path);
        let file = open_lock_file(&path)?;
        match try_lock(&file, mode) {
            Ok(()) => {
                debug!(lock = %path.display(), ?mode, "acquired store lock");
                Ok(Some(Self { file, path, mode }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to lock {}", path.display())),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(lock = %self.path.display(), "released store lock"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "failed to release store lock"),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock file {}", path.display()))
}

fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
    match mode {
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}
