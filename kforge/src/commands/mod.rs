//! kforge command-line interface
//!
//! - `build`: run one category, or all of them in order
//! - `targets`: list discovered targets and manifest diagnostics
//! - `stats`: per-language file and line counts
//! - `clean`: remove build outputs

use clap::{Parser, Subcommand, ValueEnum};
use convenient_osbuild::BuildCategory;
use std::path::PathBuf;

pub mod build;
pub mod clean;
pub mod stats;
pub mod targets;

/// kforge - build orchestrator for cross-compiled OS trees
#[derive(Parser)]
#[command(name = "kforge")]
#[command(about = "Build orchestrator for cross-compiled OS trees")]
#[command(version)]
pub struct Cli {
    /// Project root (contains src/ and kforge.yml)
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (defaults to <root>/kforge.yml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Concurrent compile jobs per category
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Per-invocation tool timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Extra attempts for a tool invocation that timed out
    #[arg(long, global = true, default_value_t = 0)]
    pub timeout_retries: usize,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and link one category, or all of them
    Build {
        #[arg(value_enum, default_value_t = CategoryArg::All)]
        category: CategoryArg,

        /// Link the kernel with an empty symbol table only
        #[arg(long)]
        no_ksyms: bool,
    },

    /// List libraries, drivers and processes found in manifests
    Targets,

    /// Count files and lines per language
    Stats,

    /// Remove the output root
    Clean {
        /// Also remove the sysroot
        #[arg(long)]
        sysroot: bool,
    },
}

/// Category selector on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Kernel,
    Drivers,
    Libraries,
    Userspace,
    All,
}

impl CategoryArg {
    /// Categories to run, in build order
    pub fn categories(self) -> Vec<BuildCategory> {
        match self {
            CategoryArg::Kernel => vec![BuildCategory::Kernel],
            CategoryArg::Drivers => vec![BuildCategory::Drivers],
            CategoryArg::Libraries => vec![BuildCategory::Libraries],
            CategoryArg::Userspace => vec![BuildCategory::Userspace],
            CategoryArg::All => BuildCategory::ALL.to_vec(),
        }
    }
}
