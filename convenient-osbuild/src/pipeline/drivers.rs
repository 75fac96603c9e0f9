//! Drivers category: one relocatable object per driver target
//!
//! Drivers are loaded and relocated by the kernel at runtime, so they are
//! linked with `ld -r` rather than into executables.

use crate::error::{BuildError, BuildResult};
use crate::manifest::TargetKind;
use crate::pipeline::compile::{compile_all, link, CompileJob};
use crate::pipeline::{BuildCategory, CategoryReport, SkippedTarget};
use crate::registry::BuildTarget;
use crate::session::BuildSession;
use convenient_toolchain::ToolInvocation;
use std::path::PathBuf;
use tracing::{info, warn};

/// Suffix of linked driver objects
pub const DRIVER_SUFFIX: &str = "drv";

/// Installed path of a driver target
pub fn driver_path(session: &BuildSession<'_>, target: &BuildTarget) -> PathBuf {
    session
        .config()
        .outputs
        .driver_dir
        .join(format!("{}.{DRIVER_SUFFIX}", target.name))
}

pub async fn build(session: &BuildSession<'_>) -> BuildResult<CategoryReport> {
    let config = session.config();
    let registry = session.registry();
    let flags = BuildCategory::Drivers.flags(&config.compile);

    // Claimed units carry their target's flags; anything else under the
    // drivers root is still built with the category flags
    let mut jobs: Vec<CompileJob<'_>> = registry
        .drivers()
        .iter()
        .flat_map(|target| {
            target
                .sources
                .iter()
                .map(move |unit| CompileJob::new(unit, flags).with_extra(&target.cflags))
        })
        .collect();
    jobs.extend(
        session
            .catalog()
            .units_under(&config.layout.drivers_dir)
            .filter(|unit| !registry.is_claimed(unit))
            .map(|unit| CompileJob::new(unit, flags)),
    );
    let objects = compile_all(session, jobs).await?;

    let mut report = CategoryReport::new(BuildCategory::Drivers);
    report.objects = objects.paths();
    report.skip_rejected(registry, TargetKind::Driver);

    for target in registry.drivers() {
        let inputs = objects.under(&target.output_dir);
        let artifact = driver_path(session, target);

        if inputs.is_empty() {
            warn!("Driver '{}' produced no objects", target.name);
            report.skipped.push(SkippedTarget {
                name: target.name.clone(),
                error: BuildError::Link {
                    artifact,
                    reason: "no objects to link".to_string(),
                },
            });
            continue;
        }

        let invocation = ToolInvocation::new(&config.toolchain.ld)
            .args(&config.link.driver)
            .args(&target.ldflags)
            .arg("-o")
            .arg(&artifact)
            .args(&inputs);
        link(session.runner(), &invocation, &artifact).await?;
        report.artifacts.push(artifact);
    }

    info!("Linked {} drivers", report.artifacts.len());
    Ok(report)
}
