//! Error types for drain-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The output file could not be opened (startup or rotation).
    #[error("couldn't open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flushing or syncing the old handle failed while rotating.
    #[error("couldn't close {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single record append failed. The record is lost.
    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sink has no open handle (a previous reopen failed).
    #[error("sink for {path} has no open handle")]
    Closed { path: PathBuf },
}

impl SinkError {
    /// Whether the process can keep going after this error.
    ///
    /// Only a failed append is survivable; every other failure leaves the
    /// sink in a state where continuing risks silent data loss.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SinkError::Write { .. })
    }
}
