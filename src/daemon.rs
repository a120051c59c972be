//! Daemonization and log redirection
//!
//! Detaches the process from its controlling terminal and redirects the
//! diagnostic stream to an append-only log file. Must run before the tokio
//! runtime is created, while the process is still single-threaded.
//!
//! The parent returns [`Forked::Parent`] immediately after the fork and is
//! expected to exit 0; the child becomes session leader, sets a restrictive
//! umask, and points stdout/stderr at the log file. Log writes go through
//! unbuffered `write(2)` calls, one per line, so nothing needs flushing on
//! exit.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::IntoRawFd;
use std::path::Path;

use crate::error::Result;

/// Which side of the fork this process is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    /// The original process; should exit 0 without touching the sockets
    Parent,
    /// The detached daemon; carries on into the relay loop
    Child,
}

/// Fork into the background and redirect stdout/stderr to `log_path`.
///
/// # Errors
///
/// Returns an I/O error if the fork or `setsid` fails, if the log file
/// cannot be opened for append, or if redirection fails. Errors in the
/// child are reported on the still-attached stderr.
pub fn daemonize(log_path: impl AsRef<Path>) -> Result<Forked> {
    // SAFETY: fork is called before any runtime threads exist.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error().into());
    }
    if pid > 0 {
        return Ok(Forked::Parent);
    }

    // SAFETY: plain syscall, no pointers involved.
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error().into());
    }

    // Log file should not be group-writable or world-readable.
    // SAFETY: plain syscall, no pointers involved.
    unsafe {
        libc::umask(0o027);
    }

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path.as_ref())?;
    let log_fd = log.into_raw_fd();

    for stdio_fd in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both fds are valid; dup2 closes stdio_fd first.
        if unsafe { libc::dup2(log_fd, stdio_fd) } < 0 {
            return Err(io::Error::last_os_error().into());
        }
    }

    // The log file is now reachable through fds 1 and 2; the original fd is
    // no longer needed.
    // SAFETY: log_fd was just obtained from into_raw_fd and not reused.
    unsafe {
        libc::close(log_fd);
    }

    Ok(Forked::Child)
}
