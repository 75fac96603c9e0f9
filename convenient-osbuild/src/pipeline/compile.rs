//! Compile jobs and checked tool runs shared by every category

use crate::catalog::{Language, SourceUnit};
use crate::config::{FlagSet, Toolchain};
use crate::error::{BuildError, BuildResult};
use crate::pipeline::{ObjectArtifact, ObjectSet};
use crate::session::BuildSession;
use convenient_toolchain::{ToolInvocation, ToolOutput, ToolRunner};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lines of captured stderr carried into failure reports
const STDERR_TAIL: usize = 20;

/// One unit paired with the flags of the category compiling it.
#[derive(Debug, Clone, Copy)]
pub struct CompileJob<'a> {
    pub unit: &'a SourceUnit,
    pub flags: &'a FlagSet,
    /// Target-specific C flags appended after the category flags
    pub extra: &'a [String],
}

impl<'a> CompileJob<'a> {
    pub fn new(unit: &'a SourceUnit, flags: &'a FlagSet) -> Self {
        Self {
            unit,
            flags,
            extra: &[],
        }
    }

    #[must_use]
    pub fn with_extra(mut self, extra: &'a [String]) -> Self {
        self.extra = extra;
        self
    }

    /// Command line producing this unit's object.
    ///
    /// C: `cc -c <flags> <extra> <src> -o <obj>`;
    /// assembly: `asm <src> -o <obj> <flags>`.
    pub fn invocation(&self, toolchain: &Toolchain) -> BuildResult<(ToolInvocation, PathBuf)> {
        let unit = self.unit;
        let output = unit.output.clone().ok_or_else(|| BuildError::Compile {
            source_path: unit.path.clone(),
            reason: "no output path".to_string(),
        })?;
        let flags = self
            .flags
            .for_language(unit.language)
            .ok_or_else(|| BuildError::Compile {
                source_path: unit.path.clone(),
                reason: format!("{} is not supported in this category", unit.language),
            })?;

        let invocation = match unit.language {
            Language::Assembly => ToolInvocation::new(&toolchain.asm)
                .arg(&unit.path)
                .arg("-o")
                .arg(&output)
                .args(flags),
            Language::C | Language::Cpp => ToolInvocation::new(&toolchain.cc)
                .arg("-c")
                .args(flags)
                .args(self.extra)
                .arg(&unit.path)
                .arg("-o")
                .arg(&output),
        };

        Ok((invocation, output))
    }
}

/// Compile every eligible job, at most `jobs` at once.
///
/// All command lines are prepared before any tool runs, so a unit the
/// category cannot compile fails the phase without side effects. The first
/// failing compile drops the jobs still in flight.
pub async fn compile_all(
    session: &BuildSession<'_>,
    jobs: Vec<CompileJob<'_>>,
) -> BuildResult<ObjectSet> {
    let config = session.config();
    let runner = session.runner();

    let mut prepared = Vec::with_capacity(jobs.len());
    for job in jobs {
        if !job.unit.is_eligible() {
            debug!("Skipping ineligible unit {}", job.unit.path.display());
            continue;
        }
        let (invocation, output) = job.invocation(&config.toolchain)?;
        prepared.push((invocation, output, job.unit.path.clone()));
    }

    info!("Compiling {} units with {} jobs", prepared.len(), config.jobs);

    let objects: Vec<ObjectArtifact> = stream::iter(prepared)
        .map(|(invocation, output, source)| async move {
            ensure_parent(&output).await?;
            run_checked(runner, &invocation, |reason| BuildError::Compile {
                source_path: source.clone(),
                reason,
            })
            .await?;
            Ok::<_, BuildError>(ObjectArtifact {
                path: output,
                source,
            })
        })
        .buffered(config.jobs.max(1))
        .try_collect::<Vec<_>>()
        .await?;

    Ok(ObjectSet::new(objects))
}

/// Run a tool, mapping runner errors (timeouts included) to build errors
pub async fn run_tool(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
) -> BuildResult<ToolOutput> {
    runner
        .run(invocation)
        .await
        .map_err(|e| BuildError::from_tool(invocation.tool_name(), e))
}

/// Run a tool and turn a non-zero exit into the error built by `failure`
pub async fn run_checked(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    failure: impl FnOnce(String) -> BuildError,
) -> BuildResult<ToolOutput> {
    let output = run_tool(runner, invocation).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(failure(format!(
            "{} exited with {}: {}",
            invocation.tool_name(),
            output.exit_code,
            output.stderr_tail(STDERR_TAIL)
        )))
    }
}

/// Run a link-type step producing `artifact`
pub async fn link(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    artifact: &Path,
) -> BuildResult<()> {
    ensure_parent(artifact).await?;
    run_checked(runner, invocation, |reason| BuildError::Link {
        artifact: artifact.to_path_buf(),
        reason,
    })
    .await?;
    info!("Linked {}", artifact.display());
    Ok(())
}

/// Create the parent directory of `path`; safe to race
pub async fn ensure_parent(path: &Path) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BuildError::Io(parent.to_path_buf(), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UnitRole;
    use crate::config::BuildConfig;

    fn unit(config: &BuildConfig, rel: &str, language: Language) -> SourceUnit {
        SourceUnit::new(
            &config.layout,
            config.layout.src_dir.join(rel),
            language,
            UnitRole::Compilable,
        )
    }

    #[test]
    fn test_c_command_line() {
        let config = BuildConfig::for_project("/os");
        let unit = unit(&config, "user/ls/main.c", Language::C);
        let extra = vec!["-DLS_COLOR".to_string()];
        let job = CompileJob::new(&unit, &config.compile.user).with_extra(&extra);

        let (inv, output) = job.invocation(&config.toolchain).unwrap();

        assert_eq!(output, PathBuf::from("/os/out/user/ls/main.o"));
        assert_eq!(inv.program, config.toolchain.cc);
        assert_eq!(inv.args[0], "-c");
        let src = inv.position_of(&unit.path).unwrap();
        assert!(inv.has_arg("-DLS_COLOR"));
        assert!(inv.position_of(Path::new("-DLS_COLOR")).unwrap() < src);
        assert_eq!(inv.position_of(&output), Some(src + 2));
    }

    #[test]
    fn test_asm_command_line() {
        let config = BuildConfig::for_project("/os");
        let unit = unit(&config, "kernel/boot.asm", Language::Assembly);
        let job = CompileJob::new(&unit, &config.compile.kernel);

        let (inv, output) = job.invocation(&config.toolchain).unwrap();

        assert_eq!(inv.program, config.toolchain.asm);
        assert_eq!(inv.position_of(&unit.path), Some(0));
        assert_eq!(inv.position_of(&output), Some(2));
        assert!(inv.has_arg("elf64"));
    }

    #[test]
    fn test_unsupported_language_is_compile_failure() {
        let config = BuildConfig::for_project("/os");
        let unit = unit(&config, "kernel/vm.cpp", Language::Cpp);
        let err = CompileJob::new(&unit, &config.compile.kernel)
            .invocation(&config.toolchain)
            .unwrap_err();
        assert!(matches!(err, BuildError::Compile { .. }));
    }
}
