//! Record and metadata persistence
//!
//! Two parallel stores hold the same `{id, question, answer}` rows:
//!
//! - [`RecordStore`] writes pretty-printed JSON, kept as a human-auditable
//!   mirror of everything the cache has ever answered.
//! - [`MetadataStore`] writes a compact bincode file and is the store
//!   consulted during similarity lookups.
//!
//! Both stores are append-only at the logical level (rows are never mutated
//! or removed) but each save fully rewrites its file. Loads never fail hard:
//! a missing file is [`LoadOutcome::Empty`] and an unreadable or unparseable
//! file is [`LoadOutcome::Corrupt`], leaving the caller to log and degrade.

use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{CacheError, Result};

/// One cached question/answer pair. Created on a cache miss once the external
/// model has produced an answer; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub question: String,
    pub answer: String,
}

impl Record {
    /// Builds a record with a fresh v4 UUID.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Record {
        Record {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// What happened when a persisted artifact was read back.
///
/// Loaders report the condition instead of deciding how to handle it; the
/// cache manager logs `Corrupt` and continues with empty state, since every
/// artifact here is either a mirror or rebuildable.
#[derive(Debug)]
pub enum LoadOutcome<T> {
    Loaded(T),
    Empty,
    Corrupt(String),
}

impl<T> LoadOutcome<T> {
    /// Collapses the outcome into data, logging a warning for the corrupt
    /// case. `what` names the artifact in the log line.
    pub fn unwrap_or_empty(self, what: &str) -> T
    where
        T: Default,
    {
        match self {
            LoadOutcome::Loaded(data) => data,
            LoadOutcome::Empty => T::default(),
            LoadOutcome::Corrupt(detail) => {
                tracing::warn!("{} unreadable, continuing with empty state: {}", what, detail);
                T::default()
            }
        }
    }
}

/// Writes `bytes` to a sibling temp file and renames it into place, so a
/// concurrent reader sees either the old file or the new one, never a
/// half-written mix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Shared load shape: missing or zero-length file is `Empty`, anything that
/// cannot be read or decoded is `Corrupt`.
fn open_existing(path: &Path) -> std::result::Result<Option<File>, String> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("failed to open '{}': {}", path.display(), e)),
    }
}

/// The human-readable source of truth, one JSON array per deployment.
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> RecordStore {
        RecordStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all records. Missing file means the cache has never been
    /// written; undecodable JSON is reported as `Corrupt` since this store
    /// can be reconstructed by replaying the metadata mirror.
    pub fn load(&self) -> LoadOutcome<Vec<Record>> {
        let file = match open_existing(&self.path) {
            Ok(Some(file)) => file,
            Ok(None) => return LoadOutcome::Empty,
            Err(detail) => return LoadOutcome::Corrupt(detail),
        };

        let mut content = String::new();
        if let Err(e) = BufReader::new(file).read_to_string(&mut content) {
            return LoadOutcome::Corrupt(format!("failed to read '{}': {}", self.path.display(), e));
        }
        if content.trim().is_empty() {
            return LoadOutcome::Empty;
        }

        match serde_json::from_str(&content) {
            Ok(records) => LoadOutcome::Loaded(records),
            Err(e) => LoadOutcome::Corrupt(format!("failed to parse '{}': {}", self.path.display(), e)),
        }
    }

    /// Overwrites the file with the full record list, pretty-printed so the
    /// history stays auditable with a text editor.
    pub fn save(&self, records: &[Record]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| CacheError::Serialize(format!("failed to encode '{}': {}", self.path.display(), e)))?;
        write_atomic(&self.path, &bytes)
    }
}

/// The lookup target: same rows as [`RecordStore`], bincode-encoded. Row
/// position here must line up with the embedding matrix row position.
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> MetadataStore {
        MetadataStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LoadOutcome<Vec<Record>> {
        let file = match open_existing(&self.path) {
            Ok(Some(file)) => file,
            Ok(None) => return LoadOutcome::Empty,
            Err(detail) => return LoadOutcome::Corrupt(detail),
        };

        match file.metadata() {
            Ok(meta) if meta.len() == 0 => return LoadOutcome::Empty,
            Err(e) => {
                return LoadOutcome::Corrupt(format!("failed to stat '{}': {}", self.path.display(), e));
            }
            Ok(_) => {}
        }

        match bincode::deserialize_from(BufReader::new(file)) {
            Ok(records) => LoadOutcome::Loaded(records),
            Err(e) => LoadOutcome::Corrupt(format!("failed to decode '{}': {}", self.path.display(), e)),
        }
    }

    pub fn save(&self, records: &[Record]) -> Result<()> {
        let bytes = bincode::serialize(records)
            .map_err(|e| CacheError::Serialize(format!("failed to encode '{}': {}", self.path.display(), e)))?;
        write_atomic(&self.path, &bytes)
    }
}
