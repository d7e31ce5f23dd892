//! Error taxonomy shared by the engine and the report driver.
//!
//! Every variant here is fatal: configuration problems abort before any
//! outcome is processed, parse and severity problems abort the run while it
//! is in flight. Unjustified and stale suppressions are *not* errors; they
//! travel as [`crate::models::Defect`] values in the normal result stream.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// A report, rule document, or source file is not well-formed.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Invalid settings or rule sources, detected before processing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown severity '{severity}' when validating file {}", path.display())]
    UnknownSeverity { severity: String, path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GateError {
    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        GateError::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        GateError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;

/// Read a whole file, attaching the path to any I/O failure.
pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| GateError::io(path, e))
}
