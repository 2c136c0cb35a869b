//! Single-slot cache for resumable upload sessions
//!
//! A resumable upload that is interrupted can be picked up by a later
//! process if the remote session id survives. Records are keyed by a
//! transfer fingerprint (derived from path, size, and destination) and held
//! in a persisted single-slot store: starting a new resumable upload
//! overwrites whatever was cached before, so only the most recently started
//! upload is resumable after a crash. Concurrent uploads race on the slot;
//! the loser merely loses resumability, never correctness.
//!
//! Persistence failures degrade resumability and are logged, never fatal.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One cached resumable session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSessionRecord {
    /// Fingerprint of (source path, size, destination bucket, destination key)
    pub fingerprint: String,
    /// Remote session identifier
    pub upload_id: String,
    /// Unix seconds at creation, for staleness inspection
    pub created: u64,
}

/// Swappable store for the single cached session.
///
/// All operations are infallible at this boundary: implementations absorb
/// their own I/O errors (logging them) because resumability is best-effort.
pub trait SessionCache: Send + Sync {
    /// Record matching this fingerprint, if it is the one in the slot
    fn lookup(&self, fingerprint: &str) -> Option<UploadSessionRecord>;

    /// Fill the slot, evicting any previous record
    fn store(&self, record: UploadSessionRecord);

    /// Empty the slot if it holds this fingerprint
    fn invalidate(&self, fingerprint: &str);
}

/// File-backed single-slot cache (`sessions.json` under the config dir)
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_slot(&self) -> Option<UploadSessionRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable session cache");
                None
            }
        }
    }

    fn write_slot(&self, record: Option<&UploadSessionRecord>) {
        let result = match record {
            Some(r) => serde_json::to_string_pretty(r)
                .map_err(std::io::Error::other)
                .and_then(|raw| {
                    if let Some(parent) = self.path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&self.path, raw)
                }),
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Could not persist upload session cache; interrupted uploads will not be resumable"
            );
        }
    }
}

impl SessionCache for FileSessionCache {
    fn lookup(&self, fingerprint: &str) -> Option<UploadSessionRecord> {
        self.read_slot().filter(|r| r.fingerprint == fingerprint)
    }

    fn store(&self, record: UploadSessionRecord) {
        self.write_slot(Some(&record));
    }

    fn invalidate(&self, fingerprint: &str) {
        if let Some(current) = self.read_slot()
            && current.fingerprint == fingerprint
        {
            self.write_slot(None);
        }
    }
}

/// In-memory single-slot cache for tests and for `--no-resume` style runs
#[derive(Default)]
pub struct MemorySessionCache {
    slot: Mutex<Option<UploadSessionRecord>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for MemorySessionCache {
    fn lookup(&self, fingerprint: &str) -> Option<UploadSessionRecord> {
        self.slot
            .lock()
            .unwrap()
            .clone()
            .filter(|r| r.fingerprint == fingerprint)
    }

    fn store(&self, record: UploadSessionRecord) {
        *self.slot.lock().unwrap() = Some(record);
    }

    fn invalidate(&self, fingerprint: &str) {
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().is_some_and(|r| r.fingerprint == fingerprint) {
            *slot = None;
        }
    }
}
