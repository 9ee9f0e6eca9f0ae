//! Error taxonomy for spawn and supervision failures.
//!
//! Only parent-side failures surface here. A chdir or exec failure
//! inside the forked child cannot be reported back and shows up as
//! the child's exit status instead (see [`crate::EXEC_FAILED_STATUS`]).

use nix::errno::Errno;
use thiserror::Error;

/// Errors reported synchronously to the caller.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("command line is empty")]
    EmptyCommand,

    #[error("nul byte in {what}")]
    NulByte { what: &'static str },

    #[error("unable to create {stream} pipe: {source}")]
    PipeCreate { stream: &'static str, source: Errno },

    #[error("unable to fork subprocess: {0}")]
    Fork(Errno),

    #[error("unable to wait for process {pid}: {source}")]
    Wait { pid: i32, source: Errno },

    #[error("unable to poll process {pid}: {source}")]
    Poll { pid: i32, source: Errno },

    #[error("unable to signal process {pid}: {source}")]
    Kill { pid: i32, source: Errno },
}
