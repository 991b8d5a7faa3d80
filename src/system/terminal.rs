//! Controlling-terminal handling.
//!
//! TTY capability is probed once at startup. Every `tcsetpgrp` failure
//! degrades to "no job control" instead of killing the shell; a script
//! piped into psh simply runs without a foreground process group.

use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::unistd::Pid;

/// The shell's view of its controlling terminal.
#[derive(Debug)]
pub struct Terminal {
    /// Terminal fd, conventionally stdin. None when not a tty.
    tty_fd: Option<RawFd>,
    /// The shell's own process group, to restore after foreground jobs.
    shell_pgid: Pid,
}

impl Terminal {
    /// Probe stdin once and cache the result.
    pub fn detect() -> Self {
        let tty_fd = match nix::unistd::isatty(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }) {
            Ok(true) => Some(libc::STDIN_FILENO),
            _ => None,
        };
        Self { tty_fd, shell_pgid: nix::unistd::getpgrp() }
    }

    pub fn is_tty(&self) -> bool {
        self.tty_fd.is_some()
    }

    /// Put the shell into its own process group and take the terminal.
    /// Called once when job control starts.
    pub fn take_control(&mut self) {
        if self.tty_fd.is_none() {
            return;
        }
        let pid = nix::unistd::getpid();
        if nix::unistd::setpgid(pid, pid).is_ok() {
            self.shell_pgid = pid;
        }
        self.give_to(self.shell_pgid);
    }

    /// Hand the terminal to `pgid`. Non-fatal on failure.
    pub fn give_to(&self, pgid: Pid) {
        if let Some(fd) = self.tty_fd {
            match nix::unistd::tcsetpgrp(unsafe { BorrowedFd::borrow_raw(fd) }, pgid) {
                Ok(()) | Err(Errno::ENOTTY) | Err(Errno::EINVAL) | Err(Errno::EPERM) => {}
                Err(_) => {}
            }
        }
    }

    /// Reclaim the terminal for the shell after a foreground job ends.
    pub fn reclaim(&self) {
        self.give_to(self.shell_pgid);
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_does_not_panic_without_tty() {
        let term = Terminal::detect();
        // In a test harness stdin is usually not a terminal; either way
        // the probe must succeed.
        let _ = term.is_tty();
    }
}
