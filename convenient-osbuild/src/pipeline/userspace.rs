//! Userspace category: one executable per process target
//!
//! Every program links against the base runtime and base system-call
//! libraries before the ones it declares, in that order; the linker does
//! not revisit archives, so order decides symbol resolution.

use crate::error::BuildResult;
use crate::manifest::{LinkMode, Manifest, TargetKind};
use crate::pipeline::compile::{compile_all, link, CompileJob};
use crate::pipeline::libraries::static_archive_path;
use crate::pipeline::{BuildCategory, CategoryReport, SkippedTarget};
use crate::registry::BuildTarget;
use crate::session::BuildSession;
use convenient_toolchain::ToolInvocation;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A process target that passed manifest and dependency checks.
#[derive(Debug)]
struct PlannedProcess<'a> {
    target: &'a BuildTarget,
    /// Display name from the re-read manifest
    name: String,
    /// Kernel-interface includes (user drivers) plus the target's cflags
    extra: Vec<String>,
    /// Static archives in link order
    archives: Vec<PathBuf>,
}

impl PlannedProcess<'_> {
    fn executable(&self) -> PathBuf {
        self.target.output_dir.join(&self.name)
    }
}

/// Library names a process links, in link order and without repeats
pub fn link_order<'n>(base: &[&'n str], declared: &'n [String]) -> Vec<&'n str> {
    let mut order: Vec<&str> = Vec::new();
    for name in base.iter().copied().chain(declared.iter().map(String::as_str)) {
        if !order.contains(&name) {
            order.push(name);
        }
    }
    order
}

fn plan<'a>(
    session: &BuildSession<'a>,
    target: &'a BuildTarget,
) -> BuildResult<PlannedProcess<'a>> {
    let config = session.config();
    let manifest = Manifest::load(&target.manifest_path)?;

    let mut extra = Vec::new();
    if manifest.wants_kernel_interface() {
        debug!("'{}' is a userspace driver, adding kernel includes", manifest.name);
        extra.extend(config.compile.kernel_interface.iter().cloned());
    }
    extra.extend(target.cflags.iter().cloned());

    let base = [
        config.libraries.base_runtime.as_str(),
        config.libraries.base_syscall.as_str(),
    ];
    let archives = link_order(&base, &target.dependencies)
        .into_iter()
        .map(|lib| {
            session
                .registry()
                .require_library(&target.name, lib)
                .map(|library| static_archive_path(session, library))
        })
        .collect::<BuildResult<Vec<_>>>()?;

    Ok(PlannedProcess {
        target,
        name: manifest.name,
        extra,
        archives,
    })
}

pub async fn build(session: &BuildSession<'_>) -> BuildResult<CategoryReport> {
    let config = session.config();
    let flags = BuildCategory::Userspace.flags(&config.compile);
    let mut report = CategoryReport::new(BuildCategory::Userspace);
    report.skip_rejected(session.registry(), TargetKind::Process);

    let mut planned = Vec::new();
    for target in session.registry().processes() {
        match plan(session, target) {
            Ok(process) => planned.push(process),
            Err(error) => {
                warn!("Skipping process '{}': {}", target.name, error);
                report.skipped.push(SkippedTarget {
                    name: target.name.clone(),
                    error,
                });
            }
        }
    }

    let jobs = planned
        .iter()
        .flat_map(|process| {
            process
                .target
                .sources
                .iter()
                .map(move |unit| CompileJob::new(unit, flags).with_extra(&process.extra))
        })
        .collect();
    let objects = compile_all(session, jobs).await?;
    report.objects = objects.paths();

    for process in &planned {
        let executable = process.executable();
        let mut invocation = ToolInvocation::new(&config.toolchain.ld).args(&config.link.user);
        if process.target.linking == LinkMode::Dynamic {
            invocation = invocation.args(&config.link.user_dynamic);
        }
        let invocation = invocation
            .args(&process.target.ldflags)
            .arg("-o")
            .arg(&executable)
            .args(objects.under(&process.target.output_dir))
            .args(&process.archives);

        link(session.runner(), &invocation, &executable).await?;
        report.artifacts.push(executable);
    }

    info!(
        "Linked {} programs ({} skipped)",
        report.artifacts.len(),
        report.skipped.len()
    );
    Ok(report)
}
