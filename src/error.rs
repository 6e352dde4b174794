use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure categories surfaced by the packaging pipeline.
#[derive(Debug, Error)]
pub enum ShipError {
    /// Malformed or incomplete configuration; fatal before any stage runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A missing tool or inconsistent stage setting found during preflight.
    #[error("{0}")]
    Precondition(String),

    /// A stage's work or one of its commands failed.
    #[error("{0}")]
    Execution(String),

    #[error("variable '{key}' has not been set by any earlier stage")]
    MissingVariable { key: String },

    #[error("{context}: {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ShipError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShipError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Whether the error belongs to the execution phase of a run.
    ///
    /// A missing variable can only be detected while substituting a command
    /// template, so it counts as an execution failure.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            ShipError::Execution(_) | ShipError::MissingVariable { .. } | ShipError::Io { .. }
        )
    }
}

pub type ShipResult<T> = Result<T, ShipError>;
