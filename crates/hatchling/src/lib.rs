//! POSIX child-process creation and lifecycle engine.
//!
//! Spawns an external program over a fork/exec pair with configurable
//! standard-stream redirection and working directory, then supervises
//! it: blocking wait, non-blocking poll, and signal-based
//! termination. The engine hands back raw descriptors and lifecycle
//! primitives; buffered stream wrappers, retry and timeout policy,
//! and output capture are for callers to build on top.
//!
//! The fragile parts live between fork and exec: descriptor
//! redirection, the inherited-descriptor sweep, search-path
//! resolution, and image replacement with an interpreter fallback for
//! shebang-less scripts. All of that runs against storage materialized
//! before the fork; nothing in the child path allocates.

#[cfg(not(unix))]
compile_error!("hatchling builds on unix targets only");

mod child;
pub mod error;
mod exec;
pub mod path;
pub mod pipe;
pub mod spawn;
pub mod startup;
pub mod supervisor;
mod sweep;

pub use child::EXEC_FAILED_STATUS;
pub use error::SpawnError;
pub use pipe::{StreamPipe, PIPE_READ, PIPE_WRITE};
pub use spawn::{spawn, spawn_with_pipes, ProcessHandle, StdioPipes};
pub use startup::{Redirect, Startup};
pub use supervisor::{ExitOutcome, ProcessPoll};
