//! Per-directory build descriptors
//!
//! A manifest is a JSON file (`manifest.json` by default):
//!
//! ```json
//! { "name": "ls", "type": "process", "linking": "dynamic", "libs": ["LibGfx"] }
//! ```
//!
//! `name` is required, `type` drives classification, `linking` is required
//! for libraries and processes, everything else defaults to empty.

use crate::config::Layout;
use crate::error::ManifestError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of build target a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Process,
    Driver,
    Library,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Process => write!(f, "process"),
            TargetKind::Driver => write!(f, "driver"),
            TargetKind::Library => write!(f, "library"),
        }
    }
}

/// Value of the manifest's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Process,
    Driver,
    Library,
    /// A userspace program that also calls kernel-exposed interfaces
    UserDriver,
}

impl DeclaredType {
    /// Parse a declared type; unknown values are treated as absent
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "process" => Some(DeclaredType::Process),
            "driver" => Some(DeclaredType::Driver),
            "library" => Some(DeclaredType::Library),
            "user_driver" => Some(DeclaredType::UserDriver),
            _ => None,
        }
    }

    pub fn kind(self) -> TargetKind {
        match self {
            DeclaredType::Process | DeclaredType::UserDriver => TargetKind::Process,
            DeclaredType::Driver => TargetKind::Driver,
            DeclaredType::Library => TargetKind::Library,
        }
    }
}

/// Link mode of a library or process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Static,
    Dynamic,
}

impl LinkMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "static" => Some(LinkMode::Static),
            "dynamic" => Some(LinkMode::Dynamic),
            _ => None,
        }
    }
}

/// Flags may be written as one string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlagList {
    Line(String),
    List(Vec<String>),
}

impl FlagList {
    fn into_vec(self) -> Vec<String> {
        match self {
            FlagList::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            FlagList::List(list) => list,
        }
    }
}

/// Raw on-disk shape; every field optional so missing ones become typed errors.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    linking: Option<String>,
    #[serde(default)]
    libs: Vec<String>,
    path: Option<PathBuf>,
    cflags: Option<FlagList>,
    ldflags: Option<FlagList>,
}

/// Validated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// File the manifest was read from
    pub path: PathBuf,
    pub name: String,
    pub declared: Option<DeclaredType>,
    pub linking: Option<LinkMode>,
    /// Declared library dependencies, by target name
    pub libs: Vec<String>,
    /// Output subpath under the sysroot (libraries only)
    pub output_subpath: Option<PathBuf>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl Manifest {
    /// Read and validate the manifest at `path`
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::Io(path.to_path_buf(), Arc::new(e)))?;
        Self::parse(path, &content)
    }

    /// Validate manifest `content`; `path` is only used for diagnostics
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(content)
            .map_err(|e| ManifestError::Json(path.to_path_buf(), Arc::new(e)))?;

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                field: "name",
            })?;

        let linking = match raw.linking {
            Some(value) => Some(LinkMode::parse(&value).ok_or_else(|| {
                ManifestError::UnknownLinkMode {
                    path: path.to_path_buf(),
                    value,
                }
            })?),
            None => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            name,
            declared: raw.kind.as_deref().and_then(DeclaredType::parse),
            linking,
            libs: raw.libs,
            output_subpath: raw.path,
            cflags: raw.cflags.map(FlagList::into_vec).unwrap_or_default(),
            ldflags: raw.ldflags.map(FlagList::into_vec).unwrap_or_default(),
        })
    }

    /// Directory owning this manifest
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    /// Declared type first; the directory's position in the tree only when
    /// the type is absent or unrecognised.
    pub fn classify(&self, layout: &Layout) -> Result<TargetKind, ManifestError> {
        if let Some(declared) = self.declared {
            return Ok(declared.kind());
        }

        kind_by_position(layout, self.dir()).ok_or_else(|| ManifestError::Unclassified {
            path: self.path.clone(),
        })
    }

    /// Whether the program is a userspace driver needing kernel headers
    pub fn wants_kernel_interface(&self) -> bool {
        matches!(
            self.declared,
            Some(DeclaredType::UserDriver | DeclaredType::Driver)
        )
    }
}

/// Target kind implied by where `dir` sits in the source tree
pub fn kind_by_position(layout: &Layout, dir: &Path) -> Option<TargetKind> {
    if dir.starts_with(&layout.drivers_dir) {
        Some(TargetKind::Driver)
    } else if dir.starts_with(&layout.user_dir) {
        Some(TargetKind::Process)
    } else if dir.starts_with(&layout.libs_dir) {
        Some(TargetKind::Library)
    } else {
        None
    }
}
