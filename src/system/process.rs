//! Thin process-control wrappers.
//!
//! Everything that touches fork/exec/pipes/waitpid lives here so the
//! executor reads as shell logic, not syscall plumbing. EINTR is retried
//! at this layer and nowhere else.

use std::ffi::CString;
use std::os::fd::BorrowedFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
pub use nix::unistd::ForkResult;
pub use nix::unistd::Pid;

pub type Result<T> = std::result::Result<T, Errno>;

/// Fork the current process.
///
/// # Safety
///
/// The caller must ensure the child only calls async-signal-safe
/// operations until it execs or exits; in practice the child code paths
/// below re-exec or run a fresh interpreter loop.
pub fn fork() -> Result<ForkResult> {
    unsafe { nix::unistd::fork() }
}

pub fn getpid() -> Pid {
    nix::unistd::getpid()
}

pub fn getpgrp() -> Pid {
    nix::unistd::getpgrp()
}

pub fn setpgid(pid: Pid, pgid: Pid) -> Result<()> {
    nix::unistd::setpgid(pid, pgid)
}

/// Create a pipe; both ends are plain (inheritable) descriptors.
pub fn pipe() -> Result<(RawFd, RawFd)> {
    let (reader, writer) = nix::unistd::pipe()?;
    Ok((reader.into_raw_fd(), writer.into_raw_fd()))
}

pub fn dup2(from: RawFd, to: RawFd) -> Result<RawFd> {
    use std::os::fd::BorrowedFd;
    use std::os::unix::io::IntoRawFd as _;
    loop {
        match unsafe { nix::unistd::dup2_raw(BorrowedFd::borrow_raw(from), to) } {
            Ok(fd) => return Ok(fd.into_raw_fd()),
            Err(Errno::EINTR) => (),
            Err(e) => return Err(e),
        }
    }
}

/// Duplicate `from` to the lowest free descriptor at or above `min`,
/// optionally close-on-exec. Used to stash fds in the ≥ 10 range while a
/// builtin runs redirected.
pub fn dup_above(from: RawFd, min: RawFd, cloexec: bool) -> Result<RawFd> {
    let arg = if cloexec {
        nix::fcntl::FcntlArg::F_DUPFD_CLOEXEC(min)
    } else {
        nix::fcntl::FcntlArg::F_DUPFD(min)
    };
    nix::fcntl::fcntl(unsafe { BorrowedFd::borrow_raw(from) }, arg)
}

pub fn set_cloexec(fd: RawFd) -> Result<()> {
    let bits = nix::fcntl::fcntl(unsafe { BorrowedFd::borrow_raw(fd) }, nix::fcntl::FcntlArg::F_GETFD)?;
    let mut flags = nix::fcntl::FdFlag::from_bits_truncate(bits);
    flags.insert(nix::fcntl::FdFlag::FD_CLOEXEC);
    nix::fcntl::fcntl(unsafe { BorrowedFd::borrow_raw(fd) }, nix::fcntl::FcntlArg::F_SETFD(flags))?;
    Ok(())
}

pub fn close(fd: RawFd) -> Result<()> {
    match nix::unistd::close(fd) {
        Ok(()) | Err(Errno::EBADF) => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn read_fd(fd: RawFd, buffer: &mut [u8]) -> Result<usize> {
    loop {
        match nix::unistd::read(unsafe { BorrowedFd::borrow_raw(fd) }, buffer) {
            Err(Errno::EINTR) => (),
            other => return other,
        }
    }
}

pub fn write_fd(fd: RawFd, buffer: &[u8]) -> Result<usize> {
    loop {
        match nix::unistd::write(unsafe { BorrowedFd::borrow_raw(fd) }, buffer) {
            Err(Errno::EINTR) => (),
            other => return other,
        }
    }
}

/// Write an entire buffer, retrying short writes.
pub fn write_all(fd: RawFd, mut buffer: &[u8]) -> Result<()> {
    while !buffer.is_empty() {
        let n = write_fd(fd, buffer)?;
        if n == 0 {
            return Err(Errno::EIO);
        }
        buffer = &buffer[n..];
    }
    Ok(())
}

/// Read until EOF.
pub fn read_to_end(fd: RawFd) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match read_fd(fd, &mut buf)? {
            0 => return Ok(out),
            n => out.extend_from_slice(&buf[..n]),
        }
    }
}

/// Exit without running atexit handlers or flushing; the only correct way
/// out of a forked child that must not unwind through parent state.
pub fn exit_immediately(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

// =============================================================================
// WAITING
// =============================================================================

/// One observed state change of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Exited(i32),
    /// Killed by a signal; status is 128 + signo.
    Signaled(i32),
    Stopped(i32),
    Continued,
}

impl ChildState {
    pub fn exit_status(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signo) | Self::Stopped(signo) => 128 + signo,
            Self::Continued => 0,
        }
    }
}

fn convert_status(status: WaitStatus) -> Option<(Pid, ChildState)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid, ChildState::Exited(code))),
        WaitStatus::Signaled(pid, signal, _core) => {
            Some((pid, ChildState::Signaled(signal as i32)))
        }
        WaitStatus::Stopped(pid, signal) => Some((pid, ChildState::Stopped(signal as i32))),
        WaitStatus::Continued(pid) => Some((pid, ChildState::Continued)),
        _ => None,
    }
}

/// Blocking wait for one specific child, reporting stops as well.
pub fn wait_for(pid: Pid) -> Result<(Pid, ChildState)> {
    loop {
        match nix::sys::wait::waitpid(Some(pid), Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => {
                if let Some(converted) = convert_status(status) {
                    return Ok(converted);
                }
            }
            Err(Errno::EINTR) => (),
            Err(e) => return Err(e),
        }
    }
}

/// Non-blocking reap of any child; `Ok(None)` when nothing changed state.
pub fn try_wait_any() -> Result<Option<(Pid, ChildState)>> {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    loop {
        match nix::sys::wait::waitpid(None, Some(flags)) {
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(status) => {
                if let Some(converted) = convert_status(status) {
                    return Ok(Some(converted));
                }
                return Ok(None);
            }
            Err(Errno::EINTR) => (),
            Err(Errno::ECHILD) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// EXEC & PATH SEARCH
// =============================================================================

/// Replace the process image. Only returns on error.
pub fn execve(path: &Path, argv: &[String], envp: &[String]) -> Errno {
    let c_path = match CString::new(path.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return Errno::ENOENT,
    };
    let c_args: Vec<CString> = argv
        .iter()
        .filter_map(|a| CString::new(a.as_bytes()).ok())
        .collect();
    let c_env: Vec<CString> = envp
        .iter()
        .filter_map(|e| CString::new(e.as_bytes()).ok())
        .collect();
    loop {
        match nix::unistd::execve(&c_path, &c_args, &c_env) {
            Err(Errno::EINTR) => (),
            Err(e) => return e,
            Ok(_) => unreachable!("execve returned Ok"),
        }
    }
}

pub fn is_executable_file(path: &Path) -> bool {
    path.is_file()
        && nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
}

/// Locate `name` on `PATH`. Names containing a slash bypass the search.
pub fn find_in_path(name: &str, path_var: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let p = PathBuf::from(name);
        return if p.exists() { Some(p) } else { None };
    }
    for dir in path_var.split(':') {
        let dir = if dir.is_empty() { "." } else { dir };
        let candidate = Path::new(dir).join(name);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

pub fn kill(pid: Pid, signal: i32) -> Result<()> {
    let sig = nix::sys::signal::Signal::try_from(signal).map_err(|_| Errno::EINVAL)?;
    nix::sys::signal::kill(pid, sig)
}

/// Signal a whole process group.
pub fn kill_group(pgid: Pid, signal: i32) -> Result<()> {
    kill(Pid::from_raw(-pgid.as_raw()), signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_state_exit_status() {
        assert_eq!(ChildState::Exited(3).exit_status(), 3);
        assert_eq!(ChildState::Signaled(2).exit_status(), 130);
        assert_eq!(ChildState::Stopped(19).exit_status(), 147);
    }

    #[test]
    fn find_in_path_requires_slash_or_search() {
        // `/` bypasses the search entirely.
        assert!(find_in_path("/definitely/not/here", "/usr/bin").is_none());
    }

    #[test]
    fn pipe_round_trip() {
        let (r, w) = pipe().expect("pipe");
        write_all(w, b"ping").expect("write");
        close(w).expect("close");
        let data = read_to_end(r).expect("read");
        close(r).expect("close");
        assert_eq!(data, b"ping");
    }
}
