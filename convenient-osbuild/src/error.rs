//! Error kinds for scanning, building, linking and symbol injection

use convenient_toolchain::ToolError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Why a manifest could not be turned into a build target.
///
/// Always fatal to the one target only; the registry records it as a
/// diagnostic and keeps scanning. Sources are shared so the category that
/// owns the manifest can report the same error as a skipped target.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {0}: {1}")]
    Io(PathBuf, #[source] Arc<std::io::Error>),

    #[error("Malformed manifest {0}: {1}")]
    Json(PathBuf, #[source] Arc<serde_json::Error>),

    #[error("Manifest {path} is missing required field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("Manifest {path} declares unknown linking mode '{value}'")]
    UnknownLinkMode { path: PathBuf, value: String },

    #[error(
        "Manifest {path} has no usable type and lies outside the drivers, libs and user roots"
    )]
    Unclassified { path: PathBuf },
}

/// Errors surfaced at the category or run boundary.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The tree walk hit an unreadable path; no partial catalog is built from
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Failed to compile {source_path}: {reason}")]
    Compile { source_path: PathBuf, reason: String },

    #[error("Failed to link {artifact}: {reason}")]
    Link { artifact: PathBuf, reason: String },

    #[error("Malformed symbol map {path} (line {line}): {reason}")]
    SymbolMap {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Target '{target}' depends on unknown library '{dependency}'")]
    UnresolvedDependency { target: String, dependency: String },

    /// Distinct from a failed exit so hung tools can be told apart
    #[error("{tool} did not finish within {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("Failed to run {tool}: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

impl BuildError {
    /// Map a tool runner error, keeping timeouts distinguishable
    pub fn from_tool(tool: impl Into<String>, source: ToolError) -> Self {
        match source {
            ToolError::Timeout { secs, .. } => BuildError::ToolTimeout {
                tool: tool.into(),
                secs,
            },
            source => BuildError::Tool {
                tool: tool.into(),
                source,
            },
        }
    }

    /// Short phase label for user-visible failure reports
    pub fn phase(&self) -> &'static str {
        match self {
            BuildError::Scan { .. } => "scan",
            BuildError::Manifest(_) => "manifest",
            BuildError::Compile { .. } => "compile",
            BuildError::Link { .. } => "link",
            BuildError::SymbolMap { .. } => "symbol map",
            BuildError::UnresolvedDependency { .. } => "dependency resolution",
            BuildError::ToolTimeout { .. } | BuildError::Tool { .. } => "tool invocation",
            BuildError::Config(_) => "configuration",
            BuildError::Io(..) => "io",
        }
    }
}

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;
