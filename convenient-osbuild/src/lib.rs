//! Build orchestration for a cross-compiled operating system tree.
//!
//! An OS project is a kernel, kernel drivers, userspace libraries and
//! userspace programs, all built with an external cross toolchain. This
//! crate models the tree and drives the toolchain over it:
//!
//! - [`SourceCatalog`]: every compilable unit, header, CRT startup unit and
//!   pre-built object, classified by extension
//! - [`ManifestRegistry`]: typed [`BuildTarget`]s discovered from
//!   per-directory `manifest.json` files, each claiming the sources below it
//! - [`ProjectTree`]: both of the above from a single walk
//! - [`BuildSession`]: runs the kernel, drivers, libraries and userspace
//!   pipelines through Build then Link
//! - [`SymbolInjector`]: embeds the kernel's own symbol table with a
//!   two-pass link
//!
//! All tools are invoked through [`convenient_toolchain::ToolRunner`], so a
//! session can run against real binaries or a recording fake.
//!
//! # Example
//!
//! ```no_run
//! use convenient_osbuild::{BuildCategory, BuildConfig, BuildSession, ProjectTree, RunOptions};
//! use convenient_toolchain::ProcessRunner;
//!
//! # async fn example() -> convenient_osbuild::BuildResult<()> {
//! let config = BuildConfig::load("/src/os", None)?;
//! let tree = ProjectTree::scan(&config)?;
//! let runner = ProcessRunner::new(config.tool_timeout);
//! let session = BuildSession::new(&config, &tree, &runner);
//!
//! let reports = session.run_all(&BuildCategory::ALL, RunOptions::default()).await?;
//! assert!(reports.iter().all(|r| r.is_complete()));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod symbols;
pub mod tree;

pub use catalog::{CatalogStats, Language, LanguageStats, SourceCatalog, SourceUnit, UnitRole};
pub use config::{BuildConfig, Layout, DEFAULT_CONFIG_FILE};
pub use error::{BuildError, BuildResult, ManifestError};
pub use manifest::{LinkMode, Manifest, TargetKind};
pub use pipeline::{BuildCategory, CategoryReport, ObjectArtifact, RunOptions, SkippedTarget};
pub use registry::{BuildTarget, ManifestDiagnostic, ManifestRegistry};
pub use session::BuildSession;
pub use symbols::{SymbolInjector, SymbolRecord, SymbolTable};
pub use tree::ProjectTree;
