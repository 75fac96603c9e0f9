//! One build run over a scanned tree

use crate::catalog::SourceCatalog;
use crate::config::BuildConfig;
use crate::error::BuildResult;
use crate::pipeline::{drivers, kernel, libraries, userspace};
use crate::pipeline::{BuildCategory, CategoryReport, RunOptions};
use crate::registry::ManifestRegistry;
use crate::tree::ProjectTree;
use convenient_toolchain::ToolRunner;
use tracing::{error, info, warn};

/// Borrowed configuration, scanned tree and tool runner for a run.
///
/// Nothing here is mutated while categories build; a fresh run scans a
/// fresh tree.
#[derive(Clone, Copy)]
pub struct BuildSession<'a> {
    config: &'a BuildConfig,
    tree: &'a ProjectTree,
    runner: &'a dyn ToolRunner,
}

impl<'a> BuildSession<'a> {
    pub fn new(config: &'a BuildConfig, tree: &'a ProjectTree, runner: &'a dyn ToolRunner) -> Self {
        Self {
            config,
            tree,
            runner,
        }
    }

    pub fn config(&self) -> &'a BuildConfig {
        self.config
    }

    pub fn catalog(&self) -> &'a SourceCatalog {
        &self.tree.catalog
    }

    pub fn registry(&self) -> &'a ManifestRegistry {
        &self.tree.registry
    }

    pub fn runner(&self) -> &'a dyn ToolRunner {
        self.runner
    }

    /// Build and link one category
    pub async fn run(
        &self,
        category: BuildCategory,
        options: RunOptions,
    ) -> BuildResult<CategoryReport> {
        info!("Building {}", category);

        let result = match category {
            BuildCategory::Kernel => kernel::build(self, options).await,
            BuildCategory::Drivers => drivers::build(self).await,
            BuildCategory::Libraries => libraries::build(self).await,
            BuildCategory::Userspace => userspace::build(self).await,
        };

        match &result {
            Ok(report) => {
                for skipped in &report.skipped {
                    warn!("{}: skipped '{}': {}", category, skipped.name, skipped.error);
                }
                info!(
                    "Finished {}: {} objects, {} artifacts",
                    category,
                    report.objects.len(),
                    report.artifacts.len()
                );
            }
            Err(e) => error!("{} failed during {}: {}", category, e.phase(), e),
        }
        result
    }

    /// Run `categories` in order, stopping at the first failed category
    pub async fn run_all(
        &self,
        categories: &[BuildCategory],
        options: RunOptions,
    ) -> BuildResult<Vec<CategoryReport>> {
        let mut reports = Vec::with_capacity(categories.len());
        for &category in categories {
            reports.push(self.run(category, options).await?);
        }
        Ok(reports)
    }
}
