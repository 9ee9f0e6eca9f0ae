//! Spawn entry points and parent-side bookkeeping.
//!
//! Everything failure-prone is prepared before the fork: C string
//! vectors, the argv array with its spare interpreter slot, the envp
//! array, the cwd and the resolver candidates. The forked child only
//! ever touches that pre-built storage.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{FromRawFd, OwnedFd};

use libc::c_char;
use nix::unistd::{fork, ForkResult, Pid};
use tracing::debug;

use crate::child::{self, ChildContext, ChildPipes};
use crate::error::SpawnError;
use crate::path;
use crate::pipe::{close_fd, close_pipe, StreamPipe};
use crate::startup::{Redirect, Startup};

/// The three stream pipes consumed by [`spawn_with_pipes`], one per
/// standard stream.
pub struct StdioPipes {
    pub stdin: StreamPipe,
    pub stdout: StreamPipe,
    pub stderr: StreamPipe,
}

/// Handle to a spawned child process.
///
/// Holds the process identifier and the parent's ends of the stream
/// pipes: stdin-write, stdout-read, stderr-read. A stream redirected
/// by the caller (or merged stderr) retains nothing here. Dropping
/// the handle releases the retained descriptors but does not reap the
/// process; call [`ProcessHandle::wait`] for that.
#[derive(Debug)]
pub struct ProcessHandle {
    pub(crate) pid: Pid,
    pub(crate) tid: Option<u32>,
    pub(crate) stdin: Option<OwnedFd>,
    pub(crate) stdout: Option<OwnedFd>,
    pub(crate) stderr: Option<OwnedFd>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// OS thread identifier of the child's main thread. Always `None`
    /// here: fork does not create a thread.
    pub fn tid(&self) -> Option<u32> {
        self.tid
    }

    /// Take ownership of the write end of the child's stdin.
    pub fn take_stdin(&mut self) -> Option<OwnedFd> {
        self.stdin.take()
    }

    /// Take ownership of the read end of the child's stdout.
    pub fn take_stdout(&mut self) -> Option<OwnedFd> {
        self.stdout.take()
    }

    /// Take ownership of the read end of the child's stderr.
    pub fn take_stderr(&mut self) -> Option<OwnedFd> {
        self.stderr.take()
    }
}

/// Spawn a child process, creating a pipe for every stream the caller
/// did not explicitly redirect.
///
/// Mirrors [`spawn_with_pipes`] with the pipe construction done here;
/// engine-created pipes are rolled back on failure, caller-supplied
/// redirect targets are never closed.
pub fn spawn(startup: &Startup) -> Result<ProcessHandle, SpawnError> {
    let stdin = redirect_or_pipe(&startup.stdin, "stdin")?;

    let stdout = match redirect_or_pipe(&startup.stdout, "stdout") {
        Ok(p) => p,
        Err(e) => {
            rollback_pipe(&startup.stdin, &stdin);
            return Err(e);
        }
    };

    // with merged outputs stderr rides on the stdout pipe
    let stderr = if startup.merge_outputs {
        StreamPipe::invalid()
    } else {
        match redirect_or_pipe(&startup.stderr, "stderr") {
            Ok(p) => p,
            Err(e) => {
                rollback_pipe(&startup.stdin, &stdin);
                rollback_pipe(&startup.stdout, &stdout);
                return Err(e);
            }
        }
    };

    spawn_with_pipes(
        startup,
        StdioPipes {
            stdin,
            stdout,
            stderr,
        },
    )
}

/// Spawn a child process over caller-supplied stream pipes.
///
/// This is the one atomic operation: fork, child-side stream plumbing
/// and descriptor sweep, working-directory change, and image
/// replacement all happen inside. The only synchronous failure is the
/// fork itself (plus config validation); an exec failure inside the
/// child is visible only as exit status [`crate::EXEC_FAILED_STATUS`].
///
/// On failure, pipe ends for streams the caller did not redirect are
/// closed; redirect targets stay open and caller-owned.
pub fn spawn_with_pipes(
    startup: &Startup,
    pipes: StdioPipes,
) -> Result<ProcessHandle, SpawnError> {
    let mut prepared = match Prepared::from_startup(startup) {
        Ok(p) => p,
        Err(e) => {
            rollback_pipes(startup, &pipes);
            return Err(e);
        }
    };

    let child_pipes = ChildPipes {
        stdin: pipes.stdin,
        stdout: pipes.stdout,
        stderr: pipes.stderr,
        stdin_redirected: startup.stdin.redirected(),
        stdout_redirected: startup.stdout.redirected(),
        stderr_redirected: startup.stderr.redirected(),
        merge_outputs: startup.merge_outputs,
    };

    debug!(
        program = %startup.cmdline[0],
        args = ?&startup.cmdline[1..],
        cwd = %startup.cwd,
        merge_outputs = startup.merge_outputs,
        "process.spawn"
    );

    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let ctx = ChildContext {
                program: &prepared.program,
                argv: &mut prepared.argv,
                envp: &prepared.envp,
                search_dirs: &prepared.search_dirs,
                cwd: &prepared.cwd,
            };
            unsafe { child::run_child(ctx, &child_pipes) }
        }
        Ok(ForkResult::Parent { child }) => {
            // mirror of the child's step 1: drop the ends the child keeps
            if !child_pipes.stdin_redirected {
                close_fd(pipes.stdin.read_end());
            }
            if !child_pipes.stdout_redirected {
                close_fd(pipes.stdout.write_end());
            }
            if !child_pipes.merge_outputs && !child_pipes.stderr_redirected {
                close_fd(pipes.stderr.write_end());
            }

            let handle = ProcessHandle {
                pid: child,
                // fork creates no thread on this platform
                tid: None,
                stdin: (!child_pipes.stdin_redirected)
                    .then(|| unsafe { OwnedFd::from_raw_fd(pipes.stdin.write_end()) }),
                stdout: (!child_pipes.stdout_redirected)
                    .then(|| unsafe { OwnedFd::from_raw_fd(pipes.stdout.read_end()) }),
                stderr: (!child_pipes.merge_outputs && !child_pipes.stderr_redirected)
                    .then(|| unsafe { OwnedFd::from_raw_fd(pipes.stderr.read_end()) }),
            };

            debug!(pid = child.as_raw(), "process.spawn complete");
            Ok(handle)
        }
        Err(source) => {
            rollback_pipes(startup, &pipes);
            Err(SpawnError::Fork(source))
        }
    }
}

/// Pre-fork materialization of everything the child will touch.
///
/// The raw pointer vectors point into the owned CString vectors of
/// the same struct; the heap blocks they reference never move, so the
/// pointers stay valid for the struct's lifetime.
struct Prepared {
    #[allow(dead_code)]
    args: Vec<CString>,
    #[allow(dead_code)]
    envs: Vec<CString>,
    /// `[args.., NULL, spare]`; the spare slot serves the
    /// interpreter fallback.
    argv: Vec<*const c_char>,
    /// `[envs.., NULL]`
    envp: Vec<*const c_char>,
    program: CString,
    search_dirs: Vec<CString>,
    cwd: CString,
}

impl Prepared {
    fn from_startup(startup: &Startup) -> Result<Self, SpawnError> {
        if startup.cmdline.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        let args = startup
            .cmdline
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SpawnError::NulByte {
                what: "command line argument",
            })?;
        let program = args[0].clone();

        let envs = render_env(&startup.env)?;

        let mut argv: Vec<*const c_char> = Vec::with_capacity(args.len() + 2);
        argv.extend(args.iter().map(|a| a.as_ptr()));
        argv.push(std::ptr::null());
        // spare slot for the interpreter fallback
        argv.push(std::ptr::null());

        let mut envp: Vec<*const c_char> = Vec::with_capacity(envs.len() + 1);
        envp.extend(envs.iter().map(|e| e.as_ptr()));
        envp.push(std::ptr::null());

        let cwd = CString::new(startup.cwd.as_str()).map_err(|_| SpawnError::NulByte {
            what: "working directory",
        })?;

        // search the parent's PATH, snapshotted before the fork; a
        // program path containing a separator skips resolution
        let search_dirs = if startup.cmdline[0].contains('/') {
            Vec::new()
        } else {
            let path_env = std::env::var("PATH").ok();
            path::search_dirs(path_env.as_deref())
                .into_iter()
                .map(CString::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| SpawnError::NulByte {
                    what: "search path",
                })?
        };

        Ok(Self {
            args,
            envs,
            argv,
            envp,
            program,
            search_dirs,
            cwd,
        })
    }
}

/// Render the environment map as `NAME=VALUE` C strings.
fn render_env(env: &HashMap<String, String>) -> Result<Vec<CString>, SpawnError> {
    env.iter()
        .map(|(k, v)| CString::new(format!("{k}={v}")))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| SpawnError::NulByte {
            what: "environment variable",
        })
}

fn redirect_or_pipe(
    redirect: &Redirect,
    stream: &'static str,
) -> Result<StreamPipe, SpawnError> {
    match redirect.target() {
        Some(fd) => Ok(StreamPipe::from_target(fd)),
        None => StreamPipe::create()
            .map_err(|source| SpawnError::PipeCreate { stream, source }),
    }
}

/// Close both ends of an engine-created pipe; caller-supplied
/// redirect targets are left alone.
fn rollback_pipe(redirect: &Redirect, pipe: &StreamPipe) {
    if !redirect.redirected() {
        close_pipe(pipe);
    }
}

fn rollback_pipes(startup: &Startup, pipes: &StdioPipes) {
    rollback_pipe(&startup.stdin, &pipes.stdin);
    rollback_pipe(&startup.stdout, &pipes.stdout);
    if !startup.merge_outputs {
        rollback_pipe(&startup.stderr, &pipes.stderr);
    }
}
