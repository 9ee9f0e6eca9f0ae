//! Startup configuration for a child process.

use std::collections::HashMap;
use std::os::fd::RawFd;

/// Redirection choice for one standard stream.
///
/// Without a target the engine creates a pipe for the stream and the
/// parent keeps the far end. With a target, the child's stream is
/// wired to the caller-supplied descriptor; the caller stays its
/// owner and must close it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redirect {
    target: Option<RawFd>,
}

impl Redirect {
    /// Redirect the stream to a caller-owned descriptor.
    pub fn to(target: RawFd) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub fn redirected(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn target(&self) -> Option<RawFd> {
        self.target
    }
}

/// Immutable description of the child process to create.
///
/// `cmdline[0]` is the program name or path; a name without a path
/// separator is resolved against the parent's `PATH` snapshot. The
/// child's environment is exactly `env`, rendered `NAME=VALUE` — no
/// implicit inheritance.
#[derive(Debug, Clone)]
pub struct Startup {
    pub cmdline: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: String,
    pub stdin: Redirect,
    pub stdout: Redirect,
    pub stderr: Redirect,
    /// Duplicate the stdout stream onto stderr instead of giving
    /// stderr its own pipe.
    pub merge_outputs: bool,
}

impl Default for Startup {
    fn default() -> Self {
        Self {
            cmdline: Vec::new(),
            env: HashMap::new(),
            cwd: ".".to_string(),
            stdin: Redirect::default(),
            stdout: Redirect::default(),
            stderr: Redirect::default(),
            merge_outputs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_startup() {
        let startup = Startup::default();
        assert!(startup.cmdline.is_empty());
        assert!(startup.env.is_empty());
        assert_eq!(startup.cwd, ".");
        assert!(!startup.stdin.redirected());
        assert!(!startup.merge_outputs);
    }

    #[test]
    fn test_redirect_target() {
        let r = Redirect::to(5);
        assert!(r.redirected());
        assert_eq!(r.target(), Some(5));
        assert_eq!(Redirect::default().target(), None);
    }
}
