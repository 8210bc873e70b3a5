//! Passcode repositories
//!
//! The controller treats its repository as synchronous and authoritative.
//! Two implementations ship with the crate: an in-memory handle for tests
//! and embedding, and a JSON file store for hosts without a secure enclave.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::passcode::{self, Passcode};

/// Storage for the reference passcode
pub trait PasscodeRepository: Send {
    /// Check if a passcode is stored
    fn has_passcode(&self) -> bool {
        self.passcode().is_some()
    }

    /// The stored passcode, if any
    fn passcode(&self) -> Option<Passcode>;

    /// Store a new passcode, replacing any previous one
    fn set_passcode(&mut self, passcode: &Passcode) -> Result<()>;

    /// Delete the stored passcode
    fn delete_passcode(&mut self) -> Result<()>;
}

/// In-memory repository
///
/// Clones share the same slot, so a caller can keep a handle after giving
/// one to a controller.
#[derive(Clone, Default)]
pub struct MemoryPasscodeRepository {
    slot: Arc<Mutex<Option<Passcode>>>,
}

impl MemoryPasscodeRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository already holding `passcode`
    pub fn with_passcode(passcode: Passcode) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(passcode))),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Passcode>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PasscodeRepository for MemoryPasscodeRepository {
    fn passcode(&self) -> Option<Passcode> {
        self.slot().clone()
    }

    fn set_passcode(&mut self, passcode: &Passcode) -> Result<()> {
        *self.slot() = Some(passcode.clone());
        Ok(())
    }

    fn delete_passcode(&mut self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// On-disk format
#[derive(Serialize, Deserialize)]
struct PasscodeFile {
    #[serde(with = "passcode::as_string")]
    passcode: Passcode,
    /// Version for future migrations
    version: u32,
}

const PASSCODE_FILE_VERSION: u32 = 1;

/// Repository backed by a JSON file
pub struct FilePasscodeRepository {
    path: PathBuf,
    cached: Option<Passcode>,
}

impl FilePasscodeRepository {
    /// Open the repository at `path`, loading any stored passcode
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let cached = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let file: PasscodeFile = serde_json::from_str(&contents).map_err(|e| {
                LockError::Storage(format!("Failed to parse passcode file: {}", e))
            })?;
            Some(file.passcode)
        } else {
            None
        };

        Ok(Self { path, cached })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, passcode: &Passcode) -> Result<()> {
        let file = PasscodeFile {
            passcode: passcode.clone(),
            version: PASSCODE_FILE_VERSION,
        };
        write_private(&self.path, &serde_json::to_string_pretty(&file)?)
    }
}

impl PasscodeRepository for FilePasscodeRepository {
    fn has_passcode(&self) -> bool {
        self.cached.is_some()
    }

    fn passcode(&self) -> Option<Passcode> {
        self.cached.clone()
    }

    fn set_passcode(&mut self, passcode: &Passcode) -> Result<()> {
        self.write(passcode)?;
        self.cached = Some(passcode.clone());
        Ok(())
    }

    fn delete_passcode(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.cached = None;
        Ok(())
    }
}

/// Write `contents` through an owner-only temp file and rename it over
/// `path`
///
/// The temp file is removed if any step fails.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let result = write_temp(&temp_path, contents)
        .and_then(|()| fs::rename(&temp_path, path).map_err(LockError::from));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Create `temp_path` with mode 0600 and write `contents` to it
fn write_temp(temp_path: &Path, contents: &str) -> Result<()> {
    // A stale temp file keeps its old mode on reopen
    if temp_path.exists() {
        fs::remove_file(temp_path)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
