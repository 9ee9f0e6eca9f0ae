//! Stream pipe descriptor pairs shared between parent and child.

use std::os::fd::{IntoRawFd, RawFd};

use nix::errno::Errno;
use nix::unistd;

/// Index of the read-end slot.
pub const PIPE_READ: usize = 0;
/// Index of the write-end slot.
pub const PIPE_WRITE: usize = 1;

pub(crate) const FD_INVALID: RawFd = -1;

/// A read-end/write-end descriptor pair created before the fork.
///
/// Both ends are shared until the fork; afterwards each side must
/// close the end it does not use, or the other side never sees EOF.
#[derive(Debug, Clone, Copy)]
pub struct StreamPipe {
    fds: [RawFd; 2],
}

impl StreamPipe {
    /// Create a real pipe.
    pub fn create() -> Result<Self, Errno> {
        let (r, w) = unistd::pipe()?;
        Ok(Self {
            fds: [r.into_raw_fd(), w.into_raw_fd()],
        })
    }

    /// Alias both slots to a caller-owned descriptor (stream
    /// explicitly redirected by the caller, e.g. to a file).
    pub fn from_target(fd: RawFd) -> Self {
        Self { fds: [fd, fd] }
    }

    /// Placeholder for a stream that has no pipe at all (stderr when
    /// outputs are merged).
    pub(crate) fn invalid() -> Self {
        Self {
            fds: [FD_INVALID, FD_INVALID],
        }
    }

    pub fn read_end(&self) -> RawFd {
        self.fds[PIPE_READ]
    }

    pub fn write_end(&self) -> RawFd {
        self.fds[PIPE_WRITE]
    }
}

/// Close a raw descriptor, tolerating invalid and already-closed fds.
pub(crate) fn close_fd(fd: RawFd) {
    if fd >= 0 {
        unsafe {
            libc::close(fd);
        }
    }
}

/// Close both ends of an engine-created pipe.
pub(crate) fn close_pipe(pipe: &StreamPipe) {
    close_fd(pipe.read_end());
    if pipe.write_end() != pipe.read_end() {
        close_fd(pipe.write_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::fd::FromRawFd;

    #[test]
    fn test_pipe_roundtrip() {
        let pipe = StreamPipe::create().unwrap();
        let mut writer = unsafe { File::from_raw_fd(pipe.write_end()) };
        let mut reader = unsafe { File::from_raw_fd(pipe.read_end()) };

        writer.write_all(b"ping").unwrap();
        drop(writer);

        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "ping");
    }

    #[test]
    fn test_from_target_aliases_both_slots() {
        let pipe = StreamPipe::from_target(7);
        assert_eq!(pipe.read_end(), 7);
        assert_eq!(pipe.write_end(), 7);
    }

    #[test]
    fn test_close_fd_tolerates_invalid() {
        close_fd(FD_INVALID);
        close_pipe(&StreamPipe::invalid());
    }
}
