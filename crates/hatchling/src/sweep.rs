//! Inherited descriptor sweep, run between fork and exec.
//!
//! Closes every open descriptor above the standard three so nothing
//! leaks into the replaced image. Must not allocate: raw libc only.

use std::ffi::CStr;
use std::os::fd::RawFd;

#[cfg(target_os = "macos")]
const FD_DIR: &CStr = c"/dev/fd";
#[cfg(not(target_os = "macos"))]
const FD_DIR: &CStr = c"/proc/self/fd";

/// First descriptor above the standard streams.
const SWEEP_FROM: RawFd = libc::STDERR_FILENO + 1;

/// Close every open descriptor above the standard three.
///
/// # Safety
///
/// Only valid in a freshly forked child: descriptors are closed by
/// number with no regard for live owners elsewhere in this process.
pub(crate) unsafe fn close_inherited_descriptors() {
    if !close_from_fd_dir() {
        close_brute_force();
    }
}

/// Enumerate the per-process descriptor directory and close every
/// numerically-named entry above the threshold.
///
/// opendir may itself be backed by a descriptor, which would then
/// appear in its own listing and be skipped by mistake. Like open, it
/// takes the lowest free number, so two scratch slots are closed up
/// front and the listing skips everything below them.
unsafe fn close_from_fd_dir() -> bool {
    // scratch slot for possible use by opendir
    libc::close(SWEEP_FROM);
    // and a second one for good measure
    libc::close(SWEEP_FROM + 1);

    let dp = libc::opendir(FD_DIR.as_ptr());
    if dp.is_null() {
        return false;
    }

    loop {
        let entry = libc::readdir(dp);
        if entry.is_null() {
            break;
        }
        if let Some(fd) = parse_fd_name(&(*entry).d_name) {
            if fd >= SWEEP_FROM + 2 {
                libc::close(fd);
            }
        }
    }

    libc::closedir(dp);
    true
}

/// Walk every possible descriptor number up to the process ceiling,
/// tolerating slots that were never open.
unsafe fn close_brute_force() {
    let ceiling = libc::sysconf(libc::_SC_OPEN_MAX);
    let ceiling = if ceiling < 0 { 1024 } else { ceiling as RawFd };
    for fd in SWEEP_FROM..ceiling {
        libc::close(fd);
    }
}

/// Parse a decimal descriptor number from a directory entry name.
fn parse_fd_name(name: &[libc::c_char]) -> Option<RawFd> {
    let mut value: i64 = 0;
    let mut digits = 0;

    for &c in name {
        let b = c as u8;
        if b == 0 {
            break;
        }
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + i64::from(b - b'0');
        if value > i64::from(RawFd::MAX) {
            return None;
        }
        digits += 1;
    }

    (digits > 0).then(|| value as RawFd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Vec<libc::c_char> {
        let mut v: Vec<libc::c_char> = s.bytes().map(|b| b as libc::c_char).collect();
        v.push(0);
        v
    }

    #[test]
    fn test_parse_plain_numbers() {
        assert_eq!(parse_fd_name(&name("0")), Some(0));
        assert_eq!(parse_fd_name(&name("17")), Some(17));
        assert_eq!(parse_fd_name(&name("1024")), Some(1024));
    }

    #[test]
    fn test_parse_rejects_dot_entries() {
        assert_eq!(parse_fd_name(&name(".")), None);
        assert_eq!(parse_fd_name(&name("..")), None);
    }

    #[test]
    fn test_parse_rejects_mixed_names() {
        assert_eq!(parse_fd_name(&name("12x")), None);
        assert_eq!(parse_fd_name(&name("")), None);
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert_eq!(parse_fd_name(&name("99999999999999999999")), None);
    }
}
