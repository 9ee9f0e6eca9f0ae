//! Image replacement with interpreter fallback.
//!
//! Everything in this module runs between fork and exec. No
//! allocation: candidate paths are built in a fixed stack buffer and
//! the argv vector is reshaped in place.

use std::ffi::{CStr, CString};

use libc::c_char;
use nix::errno::Errno;

/// Interpreter invoked for scripts that lack an interpreter
/// directive. Historical execvp affordance, see exec(3).
const INTERPRETER: &CStr = c"/bin/sh";

const PATH_MAX: usize = libc::PATH_MAX as usize;

/// Replace the process image with `file`, retrying through the shell
/// when the kernel rejects the file as not a recognized binary
/// (ENOEXEC).
///
/// `argv` must carry one spare slot past its NUL terminator. The
/// fallback shifts the argument tail one slot right and inserts the
/// interpreter and the script path in front; if the interpreter exec
/// also fails the original layout is restored, so the caller's next
/// candidate sees the vector it prepared. Returns only on failure,
/// with errno describing the cause.
///
/// # Safety
///
/// `file`, `argv` and `envp` must point at NUL-terminated storage
/// that was materialized before the fork and outlives the call.
pub(crate) unsafe fn exec_or_interpreter(
    file: *const c_char,
    argv: &mut [*const c_char],
    envp: *const *const c_char,
) {
    libc::execve(file, argv.as_ptr(), envp);
    if Errno::last() != Errno::ENOEXEC {
        return;
    }

    // locate the NUL terminator; the spare slot sits right after it
    let mut end = 0;
    while !argv[end].is_null() {
        end += 1;
    }

    let argv0 = argv[0];
    for i in (1..=end).rev() {
        argv[i + 1] = argv[i];
    }
    argv[0] = INTERPRETER.as_ptr();
    argv[1] = file;
    libc::execve(argv[0], argv.as_ptr(), envp);

    // the shell itself could not be executed; undo the insertion
    for i in 1..=end {
        argv[i] = argv[i + 1];
    }
    argv[0] = argv0;
}

/// Attempt image replacement for `program` against every resolver
/// candidate. Returns only on failure, with the errno to report.
///
/// A name containing a path separator skips resolution and is used
/// as-is. Per candidate, EACCES is remembered and the search
/// continues; the errno values that fault the candidate rather than
/// the command (ENOENT, ENOTDIR, ELOOP, ESTALE, ENODEV, ETIMEDOUT)
/// move on to the next directory; anything else aborts immediately.
///
/// # Safety
///
/// Same contract as [`exec_or_interpreter`].
pub(crate) unsafe fn exec_candidates(
    program: &CStr,
    dirs: &[CString],
    argv: &mut [*const c_char],
    envp: *const *const c_char,
) -> Errno {
    let name = program.to_bytes();
    if name.is_empty() {
        return Errno::ENOENT;
    }

    if name.contains(&b'/') {
        exec_or_interpreter(program.as_ptr(), argv, envp);
        return Errno::last();
    }

    let mut buf = [0u8; PATH_MAX];
    let mut sticky: Option<Errno> = None;

    for dir in dirs {
        if !join_candidate(dir.to_bytes(), name, &mut buf) {
            // candidate path would exceed PATH_MAX, try the next one
            continue;
        }

        exec_or_interpreter(buf.as_ptr().cast::<c_char>(), argv, envp);

        match Errno::last() {
            // permission denied is "the" cause if nothing else works
            Errno::EACCES => sticky = Some(Errno::EACCES),
            Errno::ENOENT
            | Errno::ENOTDIR
            | Errno::ELOOP
            | Errno::ESTALE
            | Errno::ENODEV
            | Errno::ETIMEDOUT => {}
            other => return other,
        }
    }

    sticky.unwrap_or(Errno::ENOENT)
}

/// Join a directory prefix and a file name into `buf` as a
/// NUL-terminated path. Returns false when the result cannot fit.
fn join_candidate(dir: &[u8], name: &[u8], buf: &mut [u8]) -> bool {
    // +2 covers the joining '/' and the terminating NUL
    if dir.len() + name.len() + 2 > buf.len() {
        return false;
    }

    let mut len = dir.len();
    buf[..len].copy_from_slice(dir);
    if len > 0 && buf[len - 1] != b'/' {
        buf[len] = b'/';
        len += 1;
    }
    buf[len..len + name.len()].copy_from_slice(name);
    buf[len + name.len()] = 0;
    true
}
