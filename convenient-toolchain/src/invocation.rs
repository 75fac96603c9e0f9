//! Tool invocation request and captured result

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// One external program run: what to execute and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program to execute (looked up on `PATH` when not absolute)
    pub program: PathBuf,

    /// Arguments, in order
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    /// Create an invocation of `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Short program name for log lines (file name of the program path)
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(
                || self.program.display().to_string(),
                |n| n.to_string_lossy().into_owned(),
            )
    }

    /// Whether `arg` appears verbatim among the arguments
    pub fn has_arg(&self, arg: impl AsRef<OsStr>) -> bool {
        self.args.iter().any(|a| a.as_os_str() == arg.as_ref())
    }

    /// Position of the first argument equal to `path`
    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.args.iter().position(|a| Path::new(a) == path)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Wall time (ms)
    pub duration_ms: u64,
}

impl ToolOutput {
    /// Successful output with the given stdout, used by fakes
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr, used by fakes
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Whether the tool exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` lines of stderr, for error reports
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = ToolInvocation::new("/opt/cross/bin/x86_64-elf-gcc")
            .arg("-c")
            .args(["-O2", "-Wall"])
            .arg("main.c");

        assert_eq!(inv.tool_name(), "x86_64-elf-gcc");
        assert_eq!(inv.args.len(), 4);
        assert!(inv.has_arg("-O2"));
        assert_eq!(inv.position_of(Path::new("main.c")), Some(3));
        assert_eq!(
            inv.to_string(),
            "/opt/cross/bin/x86_64-elf-gcc -c -O2 -Wall main.c"
        );
    }

    #[test]
    fn test_stderr_tail() {
        let output = ToolOutput::failed(1, "one\ntwo\nthree\nfour");
        assert!(!output.success());
        assert_eq!(output.stderr_tail(2), "three\nfour");
        assert_eq!(output.stderr_tail(10), "one\ntwo\nthree\nfour");
    }
}
