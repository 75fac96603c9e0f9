//! Uniform invocation of external cross-toolchain binaries.
//!
//! Every compile, assemble, link, archive and symbol-dump step of an OS build
//! goes through one abstraction so that timeout and retry policy live in a
//! single place:
//!
//! - [`ToolInvocation`]: program plus arguments, built fluently
//! - [`ToolOutput`]: exit status and captured output of one run
//! - [`ToolRunner`]: the async seam; [`ProcessRunner`] spawns real processes,
//!   tests plug in recording fakes
//! - [`RetryPolicy`]: which failures are worth another attempt
//!
//! # Example
//!
//! ```no_run
//! use convenient_toolchain::{ProcessRunner, ToolInvocation, ToolRunner};
//! use std::time::Duration;
//!
//! # async fn example() -> convenient_toolchain::ToolResult<()> {
//! let runner = ProcessRunner::new(Duration::from_secs(30));
//! let output = runner
//!     .run(&ToolInvocation::new("nasm").arg("-f").arg("elf64").arg("boot.asm"))
//!     .await?;
//! assert!(output.success());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod error;
mod invocation;
mod retry;
mod runner;

pub use error::{ToolError, ToolResult};
pub use invocation::{ToolInvocation, ToolOutput};
pub use retry::RetryPolicy;
pub use runner::{ProcessRunner, ToolRunner};
