//! Store schema migrations.
//!
//! The stored `Version` is compared with the version this build writes:
//!
//! | Stored vs. code | Action |
//! |-----------------|--------|
//! | equal | nothing |
//! | newer | [`StoreError::StoreNewerThanCode`] |
//! | same major.minor | bump the version string |
//! | older major.minor | apply the transition registered for it, loop |
//!
//! Every historical `major.minor` has exactly one transition, which moves
//! the store to the next schema version. Some transitions only change data
//! that a full refresh recomputes; they set
//! [`MigrationReport::refresh_required`] and leave the refresh to the
//! caller, which owns the provider.
//!
//! | From | To | Change |
//! |------|----|--------|
//! | 0.1.x | 1.0.0 | legacy `Path` fields become root-relative keys (refresh) |
//! | 1.0.x | 1.1.0 | chunks gain document paths (refresh) |
//! | 1.1.x | 2.0.0 | none |
//! | 2.0.x | 2.1.0 | chunk text replaced by hash, offset, length (refresh) |
//! | 2.1.x | 3.0.0 | none |

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::STORE_VERSION;
use crate::store::{normalize, ChunkStore};

/// Version assumed for stores written before versioning existed.
pub const UNVERSIONED: &str = "0.1.0";

/// A `major.minor.patch` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SchemaVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidVersion(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u64, StoreError> {
            parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Noop,
    RefreshRequired,
}

struct Transition {
    from: (u64, u64),
    to: SchemaVersion,
    effect: Effect,
    apply: fn(&mut ChunkStore),
}

const TRANSITIONS: &[Transition] = &[
    Transition {
        from: (0, 1),
        to: SchemaVersion::new(1, 0, 0),
        effect: Effect::RefreshRequired,
        apply: canonicalize_paths,
    },
    Transition {
        from: (1, 0),
        to: SchemaVersion::new(1, 1, 0),
        effect: Effect::RefreshRequired,
        apply: no_change,
    },
    Transition {
        from: (1, 1),
        to: SchemaVersion::new(2, 0, 0),
        effect: Effect::Noop,
        apply: no_change,
    },
    Transition {
        from: (2, 0),
        to: SchemaVersion::new(2, 1, 0),
        effect: Effect::RefreshRequired,
        apply: no_change,
    },
    Transition {
        from: (2, 1),
        to: SchemaVersion::new(3, 0, 0),
        effect: Effect::Noop,
        apply: no_change,
    },
];

fn no_change(_: &mut ChunkStore) {}

/// Convert legacy `Path` fields into root-relative document keys.
fn canonicalize_paths(store: &mut ChunkStore) {
    let root = store.root().to_path_buf();
    for doc in store.documents_mut().iter_mut() {
        if let Some(path) = doc.path.take() {
            if doc.rel_path.is_empty() {
                doc.rel_path = canon(&root, &path);
            }
        }
    }
    for chunk in store.chunks_mut().iter_mut() {
        chunk.document = canon(&root, &chunk.document);
    }
    store.rebuild_index();
}

/// Best guess at the root-relative key for a legacy path. Warns when the
/// document is not found there.
fn canon(root: &Path, path: &str) -> String {
    let p = Path::new(path);
    let rel = if p.is_absolute() {
        match normalize(p).strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => {
                warn!(path, root = %root.display(), "legacy path is outside the store root");
                path.to_string()
            }
        }
    } else {
        path.to_string()
    };
    if !root.join(&rel).exists() {
        warn!(path, canonical = %rel, "document not found at canonical path");
    }
    rel
}

/// Outcome of [`Migrator::migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version found in the store, empty if it had none.
    pub from: String,
    pub to: String,
    pub migrated: bool,
    /// A transition needs every document re-chunked and re-embedded.
    pub refresh_required: bool,
}

/// Upgrades stores to a target schema version.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    code_version: SchemaVersion,
}

impl Migrator {
    /// Migrator targeting [`STORE_VERSION`].
    pub fn current() -> Result<Self> {
        Self::new(STORE_VERSION)
    }

    /// Migrator targeting `code_version` rather than the current schema.
    pub fn new(code_version: &str) -> Result<Self> {
        Ok(Self {
            code_version: code_version.parse()?,
        })
    }

    pub fn code_version(&self) -> SchemaVersion {
        self.code_version
    }

    pub fn migrate(&self, store: &mut ChunkStore) -> Result<MigrationReport> {
        let from = store.version().to_string();
        if from.is_empty() {
            store.set_version(UNVERSIONED);
        }

        let mut migrated = false;
        let mut refresh_required = false;
        loop {
            let current: SchemaVersion = store.version().parse()?;
            match current.cmp(&self.code_version) {
                Ordering::Equal => break,
                Ordering::Greater => {
                    return Err(StoreError::StoreNewerThanCode {
                        store: current.to_string(),
                        code: self.code_version.to_string(),
                    }
                    .into())
                }
                Ordering::Less => {}
            }

            if (current.major, current.minor) == (self.code_version.major, self.code_version.minor) {
                info!(from = %current, to = %self.code_version, "updating store patch version");
                store.set_version(self.code_version.to_string());
            } else {
                let step = TRANSITIONS
                    .iter()
                    .find(|t| t.from == (current.major, current.minor))
                    .ok_or_else(|| StoreError::UnknownMigrationStep {
                        version: current.to_string(),
                    })?;
                info!(from = %current, to = %step.to, "migrating store schema");
                (step.apply)(store);
                refresh_required |= step.effect == Effect::RefreshRequired;
                store.set_version(step.to.to_string());
            }
            migrated = true;
        }

        Ok(MigrationReport {
            from,
            to: store.version().to_string(),
            migrated,
            refresh_required,
        })
    }
}
