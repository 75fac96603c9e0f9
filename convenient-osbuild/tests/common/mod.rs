//! Shared fixtures: on-disk project trees and a recording tool runner

#![allow(dead_code)]

use async_trait::async_trait;
use convenient_osbuild::{BuildConfig, ProjectTree};
use convenient_toolchain::{ToolError, ToolInvocation, ToolOutput, ToolResult, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Records every invocation; succeeds unless an argument matches a
/// configured failure needle. `*-nm` invocations print the symbol map.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<ToolInvocation>>,
    symbol_map: String,
    failing: Vec<String>,
    hanging: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol_map(mut self, map: &str) -> Self {
        self.symbol_map = map.to_string();
        self
    }

    /// Exit 1 when any argument ends with `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Time out when any argument ends with `needle`
    pub fn hanging_on(mut self, needle: &str) -> Self {
        self.hanging.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations whose program name ends with `suffix`
    pub fn calls_to(&self, suffix: &str) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.tool_name().ends_with(suffix))
            .collect()
    }
}

fn matches(invocation: &ToolInvocation, needles: &[String]) -> bool {
    invocation.args.iter().any(|arg| {
        let arg = arg.to_string_lossy();
        needles.iter().any(|needle| arg.ends_with(needle.as_str()))
    })
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if matches(invocation, &self.hanging) {
            return Err(ToolError::Timeout {
                program: invocation.program.clone(),
                secs: 1,
            });
        }
        if matches(invocation, &self.failing) {
            return Ok(ToolOutput::failed(1, "error: simulated failure"));
        }
        if invocation.tool_name().ends_with("-nm") {
            return Ok(ToolOutput::ok(self.symbol_map.clone()));
        }
        Ok(ToolOutput::ok(""))
    }
}

/// Temporary project root with the built-in layout
pub struct Fixture {
    pub dir: TempDir,
    pub config: BuildConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = BuildConfig::for_project(dir.path());
        config.jobs = 2;
        Self { dir, config }
    }

    /// Write `content` to `rel` under the source root
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.config.layout.src_dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn src(&self, rel: &str) -> PathBuf {
        self.config.layout.src_dir.join(rel)
    }

    pub fn out(&self, rel: &str) -> PathBuf {
        self.config.layout.out_dir.join(rel)
    }

    pub fn sysroot(&self, rel: &str) -> PathBuf {
        self.config.layout.sysroot_dir.join(rel)
    }

    pub fn scan(&self) -> ProjectTree {
        ProjectTree::scan(&self.config).unwrap()
    }
}

/// Argument position of `path`, panicking with the command line when absent
pub fn position(invocation: &ToolInvocation, path: &Path) -> usize {
    invocation
        .position_of(path)
        .unwrap_or_else(|| panic!("{} not in `{}`", path.display(), invocation))
}
