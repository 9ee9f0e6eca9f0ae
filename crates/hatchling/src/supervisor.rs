//! Lifecycle supervision: wait, poll, terminate, close.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use serde::Serialize;
use tracing::debug;

use crate::error::SpawnError;
use crate::spawn::ProcessHandle;

/// Final disposition of a child process, shell-encoded: 0–255 is a
/// normal exit with that code, 128+S means killed by signal S. An
/// exit code that happens to land above 128 is indistinguishable
/// from a signal death; that ambiguity is inherent to the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExitOutcome(pub i32);

impl ExitOutcome {
    pub const SUCCESS: Self = Self(0);

    /// Outcome for a process killed by `signal`, following the
    /// convention every unix shell uses.
    pub fn from_signal(signal: i32) -> Self {
        Self(0x80 + signal)
    }

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// Result of a non-blocking poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessPoll {
    Running,
    Terminated,
}

impl ProcessHandle {
    /// Block until the child terminates and return its outcome.
    ///
    /// Interrupted calls are retried transparently. "No such child"
    /// means a concurrent reaper collected it first and is treated as
    /// an idempotent success with outcome 0.
    pub fn wait(&self) -> Result<ExitOutcome, SpawnError> {
        debug!(pid = self.pid.as_raw(), "process.wait");
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitOutcome(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ExitOutcome::from_signal(signal as i32))
                }
                // without WUNTRACED/WCONTINUED no other status can be
                // delivered; keep waiting if one somehow is
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return Ok(ExitOutcome::SUCCESS),
                Err(source) => {
                    return Err(SpawnError::Wait {
                        pid: self.pid.as_raw(),
                        source,
                    })
                }
            }
        }
    }

    /// Non-blocking termination check. Never blocks, never reports
    /// the outcome — use [`ProcessHandle::wait`] for that.
    pub fn poll(&self) -> Result<ProcessPoll, SpawnError> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(ProcessPoll::Running),
            Ok(_) => Ok(ProcessPoll::Terminated),
            Err(Errno::ECHILD) => self.poll_echild(),
            Err(source) => Err(SpawnError::Poll {
                pid: self.pid.as_raw(),
                source,
            }),
        }
    }

    /// waitpid found no child under this pid. Two legitimate stories:
    /// a racing reaper already collected the termination, or SIGCHLD
    /// is set to SIG_IGN and the kernel silently reparented the dead
    /// child away from us. The disposition tells them apart.
    fn poll_echild(&self) -> Result<ProcessPoll, SpawnError> {
        let ignored = sigchld_ignored().map_err(|source| SpawnError::Poll {
            pid: self.pid.as_raw(),
            source,
        })?;

        if !ignored {
            // the only remaining explanation is a reap that raced us
            return Ok(ProcessPoll::Terminated);
        }

        // the child no longer belongs to us; probe for bare
        // existence. A new process reusing the pid between check and
        // conclusion is an accepted race; checking cmdline too would
        // be complex and still not reliable.
        if process_exists(self.pid.as_raw()) {
            Ok(ProcessPoll::Running)
        } else {
            Ok(ProcessPoll::Terminated)
        }
    }

    /// Send a termination signal: SIGKILL when `force`, SIGTERM
    /// otherwise. Fire-and-forget: the caller must still wait to
    /// reap the child and avoid a zombie. A process that is already
    /// gone counts as success.
    pub fn terminate(&self, force: bool) -> Result<(), SpawnError> {
        let signal = if force {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        debug!(pid = self.pid.as_raw(), signal = %signal, "process.kill");

        match kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SpawnError::Kill {
                pid: self.pid.as_raw(),
                source,
            }),
        }
    }

    /// Release the retained stream descriptors. Idempotent: each end
    /// is closed at most once.
    pub fn close(&mut self) {
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
    }
}

/// Whether this process currently ignores SIGCHLD.
fn sigchld_ignored() -> Result<bool, Errno> {
    let mut sa = std::mem::MaybeUninit::<libc::sigaction>::zeroed();
    let rc = unsafe { libc::sigaction(libc::SIGCHLD, std::ptr::null(), sa.as_mut_ptr()) };
    if rc != 0 {
        return Err(Errno::last());
    }
    let sa = unsafe { sa.assume_init() };
    Ok(sa.sa_sigaction == libc::SIG_IGN)
}

/// Existence probe for a process identifier.
#[cfg(target_os = "linux")]
fn process_exists(pid: i32) -> bool {
    // an absent /proc entry means the process is gone
    std::path::Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_exists(pid: i32) -> bool {
    // signal 0 probes without delivering; EPERM still proves existence
    !matches!(
        kill(nix::unistd::Pid::from_raw(pid), None),
        Err(Errno::ESRCH)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::spawn;
    use crate::startup::Startup;
    use std::time::Duration;

    fn startup(cmdline: &[&str]) -> Startup {
        Startup {
            cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
            ..Startup::default()
        }
    }

    #[test]
    fn test_exit_outcome_encoding() {
        assert!(ExitOutcome::SUCCESS.is_success());
        assert_eq!(ExitOutcome::from_signal(9), ExitOutcome(137));
        assert_eq!(ExitOutcome::from_signal(15), ExitOutcome(143));
        assert!(!ExitOutcome(1).is_success());
    }

    #[test]
    fn test_forced_terminate_reports_sigkill() {
        let handle = spawn(&startup(&["sleep", "5"])).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        handle.terminate(true).unwrap();
        let outcome = handle.wait().unwrap();
        assert_eq!(outcome, ExitOutcome::from_signal(libc::SIGKILL));
    }

    #[test]
    fn test_cooperative_terminate_reports_sigterm() {
        let handle = spawn(&startup(&["sleep", "5"])).unwrap();
        handle.terminate(false).unwrap();
        let outcome = handle.wait().unwrap();
        assert_eq!(outcome, ExitOutcome::from_signal(libc::SIGTERM));
    }

    #[test]
    fn test_terminate_is_fire_and_forget() {
        let handle = spawn(&startup(&["true"])).unwrap();
        handle.wait().unwrap();
        // the process is reaped; signalling it must still succeed
        handle.terminate(true).unwrap();
    }

    #[test]
    fn test_poll_running_then_terminated() {
        let handle = spawn(&startup(&["sleep", "5"])).unwrap();
        assert_eq!(handle.poll().unwrap(), ProcessPoll::Running);

        handle.terminate(true).unwrap();

        let mut polls = 0;
        loop {
            match handle.poll().unwrap() {
                ProcessPoll::Terminated => break,
                ProcessPoll::Running => {
                    polls += 1;
                    assert!(polls < 500, "child never observed as terminated");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        // once observed terminated, it stays terminated
        assert_eq!(handle.poll().unwrap(), ProcessPoll::Terminated);
    }

    #[test]
    fn test_double_wait_normalizes_to_success() {
        let handle = spawn(&startup(&["true"])).unwrap();
        assert_eq!(handle.wait().unwrap(), ExitOutcome::SUCCESS);
        // already reaped: ECHILD is an idempotent success
        assert_eq!(handle.wait().unwrap(), ExitOutcome::SUCCESS);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut handle = spawn(&startup(&["true"])).unwrap();
        handle.close();
        handle.close();
        handle.wait().unwrap();
    }
}
