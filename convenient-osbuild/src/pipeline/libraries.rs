//! Libraries category: static archive for every library, shared object for
//! dynamic ones, headers staged into the sysroot
//!
//! Objects built from unclaimed units under the libs root form a common
//! pool absorbed by every library except the base runtime, which would
//! otherwise depend on itself. CRT startup objects are built once and lead
//! every static archive.

use crate::error::{BuildError, BuildResult};
use crate::manifest::{LinkMode, TargetKind};
use crate::pipeline::compile::{compile_all, link, CompileJob};
use crate::pipeline::{BuildCategory, CategoryReport, SkippedTarget};
use crate::registry::BuildTarget;
use crate::session::BuildSession;
use convenient_toolchain::ToolInvocation;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const STATIC_SUFFIX: &str = "a";
pub const SHARED_SUFFIX: &str = "so";

/// Sysroot directory receiving a library's artifacts
pub fn output_dir(session: &BuildSession<'_>, target: &BuildTarget) -> PathBuf {
    let config = session.config();
    match &target.output_subpath {
        Some(subpath) => config.layout.sysroot_dir.join(subpath),
        None => config.outputs.library_dir.clone(),
    }
}

pub fn static_archive_path(session: &BuildSession<'_>, target: &BuildTarget) -> PathBuf {
    output_dir(session, target).join(format!("{}.{STATIC_SUFFIX}", target.name))
}

pub fn shared_object_path(session: &BuildSession<'_>, target: &BuildTarget) -> PathBuf {
    output_dir(session, target).join(format!("{}.{SHARED_SUFFIX}", target.name))
}

pub async fn build(session: &BuildSession<'_>) -> BuildResult<CategoryReport> {
    let config = session.config();
    let registry = session.registry();
    let catalog = session.catalog();
    let flags = BuildCategory::Libraries.flags(&config.compile);

    let mut jobs: Vec<CompileJob<'_>> = registry
        .libraries()
        .iter()
        .flat_map(|target| {
            target
                .sources
                .iter()
                .map(move |unit| CompileJob::new(unit, flags).with_extra(&target.cflags))
        })
        .collect();
    jobs.extend(
        catalog
            .units_under(&config.layout.libs_dir)
            .filter(|unit| !registry.is_claimed(unit))
            .map(|unit| CompileJob::new(unit, flags)),
    );
    let objects = compile_all(session, jobs).await?;

    let crt_jobs = catalog
        .crt_units()
        .iter()
        .map(|unit| CompileJob::new(unit, flags))
        .collect();
    let crt = compile_all(session, crt_jobs).await?.paths();

    let common: Vec<PathBuf> = config
        .layout
        .output_dir_for(&config.layout.common_dir)
        .map(|dir| objects.under(&dir))
        .unwrap_or_default();

    let mut report = CategoryReport::new(BuildCategory::Libraries);
    report.skip_rejected(registry, TargetKind::Library);

    for target in registry.libraries() {
        if let Some(dep) = target.unresolved.first() {
            report.skipped.push(SkippedTarget {
                name: target.name.clone(),
                error: BuildError::UnresolvedDependency {
                    target: target.name.clone(),
                    dependency: dep.clone(),
                },
            });
            continue;
        }

        let mut inputs = objects.under(&target.output_dir);
        if target.name != config.libraries.base_runtime {
            let shared: Vec<PathBuf> = common
                .iter()
                .filter(|path| !inputs.contains(path))
                .cloned()
                .collect();
            inputs.extend(shared);
        }

        if target.linking == LinkMode::Dynamic {
            let shared = shared_object_path(session, target);
            let invocation = ToolInvocation::new(&config.toolchain.ld)
                .args(&config.link.shared_library)
                .args(&target.ldflags)
                .arg("-o")
                .arg(&shared)
                .args(&inputs);
            link(session.runner(), &invocation, &shared).await?;
            report.artifacts.push(shared);
        }

        let archive = static_archive_path(session, target);
        let members: Vec<&PathBuf> = crt
            .iter()
            .chain(&inputs)
            .filter(|path| !is_dynamic_entry(path, &config.libraries.dynamic_entry_object))
            .collect();
        remove_stale(&archive).await?;
        let invocation = ToolInvocation::new(&config.toolchain.ar)
            .args(&config.link.archive)
            .arg(&archive)
            .args(members);
        link(session.runner(), &invocation, &archive).await?;
        report.artifacts.push(archive);

        stage_headers(session, target).await?;
    }

    report.objects = objects.paths();
    report.objects.extend(crt);
    info!(
        "Linked {} library artifacts ({} skipped)",
        report.artifacts.len(),
        report.skipped.len()
    );
    Ok(report)
}

fn is_dynamic_entry(path: &Path, entry_object: &str) -> bool {
    path.file_name().is_some_and(|name| name == entry_object)
}

/// `ar` appends to existing archives, so start from scratch
async fn remove_stale(archive: &Path) -> BuildResult<()> {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => {
            debug!("Removed stale {}", archive.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::Io(archive.to_path_buf(), e)),
    }
}

/// Copy claimed headers to `<include dir>/<library dir name>/<relative path>`
async fn stage_headers(session: &BuildSession<'_>, target: &BuildTarget) -> BuildResult<()> {
    let Some(dir_name) = target.dir.file_name() else {
        return Ok(());
    };
    let include_root = session.config().outputs.include_dir.join(dir_name);

    for header in &target.headers {
        let Ok(rel) = header.strip_prefix(&target.dir) else {
            warn!("Header {} lies outside '{}'", header.display(), target.name);
            continue;
        };
        let dest = include_root.join(rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Io(parent.to_path_buf(), e))?;
        }
        tokio::fs::copy(header, &dest)
            .await
            .map_err(|e| BuildError::Io(header.clone(), e))?;
    }

    if !target.headers.is_empty() {
        debug!(
            "Staged {} headers of '{}' into {}",
            target.headers.len(),
            target.name,
            include_root.display()
        );
    }
    Ok(())
}
