//! Store sessions: lock, load, migrate, mutate, save.
//!
//! A [`Session`] owns the in-memory [`ChunkStore`] for as long as it holds
//! the store's [`StoreLock`]. Opening a session:
//!
//! 1. acquires the lock (shared for read-only commands, exclusive otherwise),
//! 2. deserializes the store, recomputing its root from the file location,
//! 3. runs the [`Migrator`]. If anything changed, an exclusive session
//!    backs up the old file and reports both versions and the backup path
//!    before anything else happens, then runs one full refresh if a
//!    transition asked for it. A shared session migrates in memory only.
//!
//! [`Session::save`] writes the whole store to `<store>.tmp` and renames it
//! over the store file, so the file on disk is always either the old or
//! the new store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use grokctx_core::chunk::Chunker;
use grokctx_core::embedding::Provider;
use grokctx_core::migrate::{MigrationReport, Migrator};
use grokctx_core::store::{normalize, ChunkStore};
use grokctx_core::tokenizer::Tokenizer;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lock::{LockMode, StoreLock};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a store already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("no {name} store found in {dir} or any parent directory; run `grok init`")]
    NotFound { name: String, dir: PathBuf },

    #[error("cannot save a read-only session")]
    ReadOnly,
}

/// An open store and the lock that guards it.
pub struct Session {
    store: ChunkStore,
    path: PathBuf,
    migration: MigrationReport,
    backup: Option<PathBuf>,
    // dropped last
    lock: StoreLock,
}

impl Session {
    /// Create an empty store named `config.store.name` in `dir`.
    pub fn init(dir: &Path, config: &Config, tokenizer: Arc<dyn Tokenizer>) -> Result<PathBuf> {
        let dir = absolute(dir)?;
        let path = dir.join(&config.store.name);
        let _lock = StoreLock::acquire(&path, LockMode::Exclusive)?;
        if path.exists() {
            return Err(SessionError::AlreadyExists(path).into());
        }
        let store = ChunkStore::new(
            &dir,
            chunker(config, tokenizer),
            config.chunking.embedding_token_limit,
        );
        save_atomic(&path, &store.to_json()?)?;
        info!(store = %path.display(), "initialized store");
        Ok(path)
    }

    /// Find the store file in `start` or its nearest ancestor.
    pub fn find(start: &Path, name: &str) -> Result<PathBuf> {
        let start = absolute(start)?;
        for dir in start.ancestors() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!(store = %candidate.display(), "found store");
                return Ok(candidate);
            }
        }
        Err(SessionError::NotFound {
            name: name.to_string(),
            dir: start,
        }
        .into())
    }

    /// Open the store at `path`. Waits while the lock is held in a
    /// conflicting mode; the wait runs on the blocking thread pool.
    pub async fn open(
        path: &Path,
        mode: LockMode,
        config: &Config,
        tokenizer: Arc<dyn Tokenizer>,
        provider: &dyn Provider,
    ) -> Result<Self> {
        let path = absolute(path)?;
        let lock = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || StoreLock::acquire(&path, mode))
                .await
                .context("store lock task failed")??
        };

        let bytes = fs::read(&path).with_context(|| format!("failed to read store {}", path.display()))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let mut store = ChunkStore::from_json(
            &bytes,
            root,
            chunker(config, tokenizer),
            config.chunking.embedding_token_limit,
        )
        .with_context(|| format!("failed to load store {}", path.display()))?;

        let migration = Migrator::current()?.migrate(&mut store)?;
        let mut backup = None;
        if migration.migrated {
            match mode {
                LockMode::Exclusive => {
                    let saved = backup_file(&path)?;
                    eprintln!(
                        "Migrated store from {} to {}; backup of the previous version at {}",
                        display_version(&migration.from),
                        migration.to,
                        saved.display()
                    );
                    backup = Some(saved);
                    if migration.refresh_required {
                        info!("schema change requires a full refresh");
                        store.refresh_all(provider).await?;
                    }
                }
                LockMode::Shared => {
                    warn!(
                        from = %display_version(&migration.from),
                        to = %migration.to,
                        "store needs migration; read-only session migrates in memory only"
                    );
                }
            }
        }

        Ok(Self {
            store,
            path,
            migration,
            backup,
            lock,
        })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.lock.mode()
    }

    pub fn migration(&self) -> &MigrationReport {
        &self.migration
    }

    /// Backup written when the store was migrated on open.
    pub fn migration_backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Modification time of the store file, i.e. of the last save.
    pub fn last_saved(&self) -> Result<SystemTime> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    /// Refresh documents modified since the last save.
    pub async fn refresh_changed(&mut self, provider: &dyn Provider) -> Result<bool> {
        let since = self.last_saved()?;
        self.store.refresh_changed(provider, since).await
    }

    /// Copy the store file to a timestamped backup.
    pub fn backup(&self) -> Result<PathBuf> {
        backup_file(&self.path)
    }

    /// Persist the store atomically.
    pub fn save(&self) -> Result<()> {
        if self.mode() != LockMode::Exclusive {
            return Err(SessionError::ReadOnly.into());
        }
        save_atomic(&self.path, &self.store.to_json()?)?;
        debug!(store = %self.path.display(), "saved store");
        Ok(())
    }
}

fn chunker(config: &Config, tokenizer: Arc<dyn Tokenizer>) -> Chunker {
    Chunker::new(tokenizer).with_delimiter(config.chunking.delimiter.clone())
}

fn display_version(v: &str) -> &str {
    if v.is_empty() {
        "(unversioned)"
    } else {
        v
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Write `bytes` to `<path>.tmp` and rename it over `path`.
pub fn save_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Copy `path` into the system temp directory under a timestamped name.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        bail!("nothing to back up: {} does not exist", path.display());
    }
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let deslashed = path.to_string_lossy().replace(['/', '\\'], "-");
    let dest = std::env::temp_dir().join(format!("grokctx-backup-{}{}", stamp, deslashed));
    fs::copy(path, &dest)
        .with_context(|| format!("failed to back up {} to {}", path.display(), dest.display()))?;
    info!(backup = %dest.display(), "backed up store");
    Ok(dest)
}
