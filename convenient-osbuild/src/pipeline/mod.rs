//! Category build pipelines
//!
//! Each category runs Build then Link, stopping at the first failure.
//! Build compiles every eligible unit in scope; Link only starts once all
//! of the category's objects exist. Nothing is rolled back on failure.

pub mod compile;
pub mod drivers;
pub mod kernel;
pub mod libraries;
pub mod userspace;

use crate::config::{CompileFlags, FlagSet};
use crate::error::BuildError;
use crate::manifest::TargetKind;
use crate::registry::ManifestRegistry;
use std::fmt;
use std::path::{Path, PathBuf};

/// Build category: selects the source roots, flags and link strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildCategory {
    Kernel,
    Drivers,
    Libraries,
    Userspace,
}

impl BuildCategory {
    /// Every category, in the order a full build runs them
    pub const ALL: [BuildCategory; 4] = [
        BuildCategory::Kernel,
        BuildCategory::Drivers,
        BuildCategory::Libraries,
        BuildCategory::Userspace,
    ];

    /// Base compile flags of the category
    pub fn flags(self, flags: &CompileFlags) -> &FlagSet {
        match self {
            BuildCategory::Kernel => &flags.kernel,
            BuildCategory::Drivers => &flags.driver,
            BuildCategory::Libraries => &flags.library,
            BuildCategory::Userspace => &flags.user,
        }
    }
}

impl fmt::Display for BuildCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildCategory::Kernel => write!(f, "kernel"),
            BuildCategory::Drivers => write!(f, "drivers"),
            BuildCategory::Libraries => write!(f, "libraries"),
            BuildCategory::Userspace => write!(f, "userspace"),
        }
    }
}

/// Object produced by compiling one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectArtifact {
    pub path: PathBuf,
    pub source: PathBuf,
}

/// Objects produced by one Build phase, in compile order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSet {
    objects: Vec<ObjectArtifact>,
}

impl ObjectSet {
    pub fn new(objects: Vec<ObjectArtifact>) -> Self {
        Self { objects }
    }

    /// Objects whose path lies under `dir`, compared component-wise so a
    /// directory that is a textual prefix of another does not match it
    pub fn under(&self, dir: &Path) -> Vec<PathBuf> {
        self.objects
            .iter()
            .filter(|o| o.path.starts_with(dir))
            .map(|o| o.path.clone())
            .collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.objects.iter().map(|o| o.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Target skipped without failing its category.
#[derive(Debug)]
pub struct SkippedTarget {
    pub name: String,
    pub error: BuildError,
}

/// Outcome of one completed category.
#[derive(Debug)]
pub struct CategoryReport {
    pub category: BuildCategory,
    /// Objects compiled
    pub objects: Vec<PathBuf>,
    /// Linked images, libraries and drivers
    pub artifacts: Vec<PathBuf>,
    pub skipped: Vec<SkippedTarget>,
    /// Symbols embedded in the kernel image, when injection ran
    pub symbols: Option<usize>,
}

impl CategoryReport {
    pub fn new(category: BuildCategory) -> Self {
        Self {
            category,
            objects: Vec::new(),
            artifacts: Vec::new(),
            skipped: Vec::new(),
            symbols: None,
        }
    }

    /// Report every `kind` manifest the scan rejected as a skipped target
    pub fn skip_rejected(&mut self, registry: &ManifestRegistry, kind: TargetKind) {
        self.skipped
            .extend(registry.rejected(kind).map(|diagnostic| SkippedTarget {
                name: diagnostic.target_name(),
                error: BuildError::Manifest(diagnostic.error.clone()),
            }));
    }

    /// No target of the category was skipped
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Knobs for one session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Run the symbol injector after the kernel links
    pub inject_symbols: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            inject_symbols: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(path: &str) -> ObjectArtifact {
        ObjectArtifact {
            path: PathBuf::from(path),
            source: PathBuf::new(),
        }
    }

    #[test]
    fn test_under_is_structural() {
        let set = ObjectSet::new(vec![
            artifact("/os/out/user/ls/main.o"),
            artifact("/os/out/user/lsblk/main.o"),
            artifact("/os/out/user/ls/util/fmt.o"),
        ]);

        assert_eq!(
            set.under(Path::new("/os/out/user/ls")),
            vec![
                PathBuf::from("/os/out/user/ls/main.o"),
                PathBuf::from("/os/out/user/ls/util/fmt.o"),
            ]
        );
    }

    #[test]
    fn test_category_flags() {
        let config = crate::config::BuildConfig::for_project("/os");
        assert_eq!(
            BuildCategory::Drivers.flags(&config.compile),
            &config.compile.kernel
        );
        assert!(BuildCategory::Libraries
            .flags(&config.compile)
            .c
            .contains(&"-fPIC".to_string()));
    }
}
