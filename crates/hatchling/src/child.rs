//! Post-fork child launcher.
//!
//! Everything here runs between fork and exec: no allocation, no
//! locks, no logging, no shared mutable state. Another thread of the
//! parent may have been frozen mid-operation at fork time, so every
//! buffer is materialized before the fork and passed in by reference.

use std::ffi::{CStr, CString};

use libc::c_char;

use crate::exec;
use crate::pipe::StreamPipe;
use crate::sweep;

/// Exit status of the child when chdir fails or every exec candidate
/// is exhausted. Shell convention for "command not found"; the
/// specific cause cannot currently be reported back to the parent.
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Argument/environment vectors and paths materialized before fork.
pub(crate) struct ChildContext<'a> {
    /// Program name or path, as given in `cmdline[0]`.
    pub program: &'a CStr,
    /// NUL-terminated argv with one spare slot past the terminator,
    /// reserved for the interpreter fallback.
    pub argv: &'a mut [*const c_char],
    /// NUL-terminated envp.
    pub envp: &'a [*const c_char],
    /// Resolver candidates; unused when `program` contains a path
    /// separator.
    pub search_dirs: &'a [CString],
    pub cwd: &'a CStr,
}

/// Stream plumbing decided before the fork.
pub(crate) struct ChildPipes {
    pub stdin: StreamPipe,
    pub stdout: StreamPipe,
    pub stderr: StreamPipe,
    pub stdin_redirected: bool,
    pub stdout_redirected: bool,
    pub stderr_redirected: bool,
    pub merge_outputs: bool,
}

/// Run the child side of a spawn. Never returns to caller code: the
/// process image is replaced, or the process terminates with
/// [`EXEC_FAILED_STATUS`].
///
/// # Safety
///
/// Must be the first thing called in a freshly forked child. All
/// context storage lives in the (copied) parent stack and heap.
pub(crate) unsafe fn run_child(ctx: ChildContext<'_>, pipes: &ChildPipes) -> ! {
    // 1. close the parent's ends of engine-created pipes
    if !pipes.stdin_redirected {
        libc::close(pipes.stdin.write_end());
    }
    if !pipes.stdout_redirected {
        libc::close(pipes.stdout.read_end());
    }

    // 2. move the child ends onto the standard stream slots
    if libc::dup2(pipes.stdin.read_end(), libc::STDIN_FILENO) < 0 {
        libc::_exit(EXEC_FAILED_STATUS);
    }
    if libc::dup2(pipes.stdout.write_end(), libc::STDOUT_FILENO) < 0 {
        libc::_exit(EXEC_FAILED_STATUS);
    }
    if pipes.merge_outputs {
        // stderr shares the stdout stream
        if libc::dup2(pipes.stdout.write_end(), libc::STDERR_FILENO) < 0 {
            libc::_exit(EXEC_FAILED_STATUS);
        }
    } else {
        if !pipes.stderr_redirected {
            libc::close(pipes.stderr.read_end());
        }
        if libc::dup2(pipes.stderr.write_end(), libc::STDERR_FILENO) < 0 {
            libc::_exit(EXEC_FAILED_STATUS);
        }
    }

    // 3. the originals are redundant after dup2
    libc::close(pipes.stdin.read_end());
    libc::close(pipes.stdout.write_end());
    if !pipes.merge_outputs {
        libc::close(pipes.stderr.write_end());
    }

    // 4. argv/envp were materialized before the fork (see ctx)

    // 5. drop every other inherited descriptor
    sweep::close_inherited_descriptors();

    // 6. working directory
    if libc::chdir(ctx.cwd.as_ptr()) != 0 {
        libc::_exit(EXEC_FAILED_STATUS);
    }

    // 7. try every candidate; on success this never returns
    exec::exec_candidates(ctx.program, ctx.search_dirs, ctx.argv, ctx.envp.as_ptr());

    // 8. exhausted
    libc::_exit(EXEC_FAILED_STATUS);
}
