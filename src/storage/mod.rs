//! Persistence layer.
//!
//! Saves and loads the pipeline state to/from a JSON file. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact. Audit rows live in SQLite (see
//! [`audit`]).

pub mod audit;

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::PipelineState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read state from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write state to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise state: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Durable home of the pipeline state. Single writer.
pub trait StateStore: Send + Sync {
    /// Load the last snapshot. A missing store yields a fresh state.
    fn load(&self) -> Result<PipelineState, StoreError>;

    fn save(&self, state: &PipelineState) -> Result<(), StoreError>;
}

/// JSON document on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Delete the state file (for testing or reset).
    pub fn delete(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write {
                path: self.display(),
                source,
            }),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<PipelineState, StoreError> {
        let path = self.display();
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path, "No saved state found, starting fresh");
                return Ok(PipelineState::default());
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let state: PipelineState =
            serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;

        info!(
            path,
            seen = state.seen.len(),
            watch = state.watch.len(),
            tracked = state.tracked.len(),
            cycles = state.cycle_count,
            "State loaded from disk"
        );
        Ok(state)
    }

    fn save(&self, state: &PipelineState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.temp_path();

        std::fs::write(&tmp, json.as_bytes()).map_err(|source| StoreError::Write {
            path: tmp.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.display(),
            source,
        })?;

        debug!(path = %self.display(), cycles = state.cycle_count, "State saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
