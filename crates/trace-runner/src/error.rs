//! Fatal, batch-level errors.
//!
//! Anything returned as `Err(HarnessError)` aborts the whole batch. Per-trace
//! outcomes (crashes, mismatches) are data on [`crate::TraceResult`] instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::process::ProcessStatus;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// A requested trace id has no definition file in the workload directory.
    #[error("Trace {id} is not a valid trace.")]
    UnknownTrace { id: String },

    /// A build/mount lifecycle command did not exit cleanly.
    #[error("environment operation `{operation}` failed with {status}: {stderr}")]
    Environment {
        operation: String,
        status: ProcessStatus,
        stderr: String,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code, used by the CLI's JSON error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTrace { .. } => "unknown_trace",
            Self::Environment { .. } => "environment_failed",
            Self::Io { .. } => "io_error",
            Self::Config { .. } => "invalid_config",
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
