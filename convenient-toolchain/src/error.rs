//! Errors raised while invoking an external tool

use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain an exit status from an external tool.
///
/// A tool that runs to completion with a non-zero exit code is *not* an
/// error at this layer; callers inspect [`crate::ToolOutput::success`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (missing binary, permissions)
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The program did not terminate within the configured bound
    #[error("{program} timed out after {secs}s")]
    Timeout {
        /// Program that was killed
        program: PathBuf,
        /// Bound that was exceeded
        secs: u64,
    },

    /// IO error while collecting the program's output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Whether this error is the distinct timeout kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

/// Result type for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;
