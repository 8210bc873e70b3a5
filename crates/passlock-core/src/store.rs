//! Persistence for lockout state
//!
//! The incorrect-attempt counter, the backoff window and the
//! threshold-reached flag are stored together as a [`LockoutRecord`] so a
//! lockout survives the process being killed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::repository::write_private;

/// An active or expired backoff window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffWindow {
    /// Entry is blocked until this instant
    pub until: DateTime<Utc>,
    /// Number of windows computed since the last success
    pub retry_count: u32,
}

/// Persisted lockout state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutRecord {
    /// Consecutive incorrect passcodes
    pub incorrect_attempts: u32,
    /// Backoff window, if backoff is in use
    pub backoff: Option<BackoffWindow>,
    /// Set when the attempt threshold was reached and not yet acknowledged
    pub threshold_reached: bool,
}

/// Backend for [`LockoutRecord`]
pub trait LockoutStore: Send {
    /// Load the record; a missing record is the default record
    fn load(&self) -> Result<LockoutRecord>;

    /// Replace the stored record
    fn save(&mut self, record: &LockoutRecord) -> Result<()>;
}

/// In-memory store; clones share the same record
#[derive(Clone, Default)]
pub struct MemoryLockoutStore {
    record: Arc<Mutex<LockoutRecord>>,
}

impl MemoryLockoutStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `record`
    pub fn with_record(record: LockoutRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
        }
    }

    /// Snapshot of the stored record
    pub fn snapshot(&self) -> LockoutRecord {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LockoutStore for MemoryLockoutStore {
    fn load(&self) -> Result<LockoutRecord> {
        Ok(self.snapshot())
    }

    fn save(&mut self, record: &LockoutRecord) -> Result<()> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = record.clone();
        Ok(())
    }
}

/// Store backed by a JSON file
pub struct FileLockoutStore {
    path: PathBuf,
}

impl FileLockoutStore {
    /// Use the file at `path`; it is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockoutStore for FileLockoutStore {
    fn load(&self) -> Result<LockoutRecord> {
        if !self.path.exists() {
            return Ok(LockoutRecord::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|e| LockError::Storage(format!("Failed to parse lockout state: {}", e)))
    }

    fn save(&mut self, record: &LockoutRecord) -> Result<()> {
        write_private(&self.path, &serde_json::to_string_pretty(record)?)
    }
}
