//! Signal handling.
//!
//! Deferred discipline: the only thing a signal handler does is write one
//! byte (the signal number) to a close-on-exec self-pipe. The main loop
//! drains the pipe between commands and does the real work (reaping
//! children into the job table, queuing traps) outside handler context.
//! Nothing but `write(2)` happens inside the handler.

use std::mem::MaybeUninit;
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;

use crate::system::process;

/// Write end of the self-pipe; -1 until [`init`] runs.
static SELF_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);

/// Signals a job-control shell keeps ignored for itself.
pub const JOB_CONTROL_SIGNALS: &[i32] =
    &[libc::SIGTTOU, libc::SIGTTIN, libc::SIGTSTP];

extern "C" fn note_signal(signal: libc::c_int) {
    let fd = SELF_PIPE_WRITE.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = [signal as u8];
        // Best effort: a full pipe just drops the byte; the drain loop
        // reaps with WNOHANG anyway.
        unsafe {
            libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

/// How a signal is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Default,
    Ignore,
    /// Route through the self-pipe.
    Catch,
}

/// Owns the self-pipe read end and the dispositions this shell installed.
#[derive(Debug)]
pub struct SignalManager {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl SignalManager {
    /// Create the self-pipe and start catching `SIGCHLD`.
    pub fn new() -> Result<Self, Errno> {
        let (read_fd, write_fd) = process::pipe()?;
        process::set_cloexec(read_fd)?;
        process::set_cloexec(write_fd)?;
        set_nonblocking(write_fd)?;
        set_nonblocking(read_fd)?;
        SELF_PIPE_WRITE.store(write_fd, Ordering::SeqCst);
        set_disposition(libc::SIGCHLD, Disposition::Catch)?;
        Ok(Self { read_fd, write_fd })
    }

    /// Push a signal number through this manager's own pipe, exactly as
    /// the handler would. Test hook.
    #[cfg(test)]
    pub(crate) fn inject(&self, signal: i32) {
        let byte = [signal as u8];
        let _ = process::write_fd(self.write_fd, &byte);
    }

    /// Install the dispositions an interactive shell wants: keyboard
    /// signals routed through the pipe, job-control stops ignored.
    pub fn enter_interactive_mode(&self) -> Result<(), Errno> {
        set_disposition(libc::SIGINT, Disposition::Catch)?;
        set_disposition(libc::SIGTERM, Disposition::Ignore)?;
        set_disposition(libc::SIGQUIT, Disposition::Ignore)?;
        for &sig in JOB_CONTROL_SIGNALS {
            set_disposition(sig, Disposition::Ignore)?;
        }
        Ok(())
    }

    /// Drain the self-pipe, returning the raw signal numbers observed
    /// since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<i32> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match process::read_fd(self.read_fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => signals.extend(buf[..n].iter().map(|&b| b as i32)),
                Err(Errno::EAGAIN) => break,
                Err(_) => break,
            }
        }
        signals
    }
}

fn set_nonblocking(fd: RawFd) -> Result<(), Errno> {
    let bits = nix::fcntl::fcntl(unsafe { BorrowedFd::borrow_raw(fd) }, nix::fcntl::FcntlArg::F_GETFL)?;
    let mut flags = nix::fcntl::OFlag::from_bits_truncate(bits);
    flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
    nix::fcntl::fcntl(unsafe { BorrowedFd::borrow_raw(fd) }, nix::fcntl::FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Install a disposition with raw `sigaction`, the only interface safe to
/// pair with a hand-written `extern "C"` handler.
pub fn set_disposition(signal: i32, disposition: Disposition) -> Result<(), Errno> {
    unsafe {
        let mut action = MaybeUninit::<libc::sigaction>::zeroed().assume_init();
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        action.sa_sigaction = match disposition {
            Disposition::Default => libc::SIG_DFL,
            Disposition::Ignore => libc::SIG_IGN,
            Disposition::Catch => note_signal as libc::sighandler_t,
        };
        if libc::sigaction(signal, &action, std::ptr::null_mut()) == -1 {
            return Err(Errno::last());
        }
    }
    Ok(())
}

/// Reset every shell-managed signal back to its default in a forked
/// child, after it is done ignoring `SIGTTOU` for setup.
pub fn reset_for_child() {
    let all = [
        libc::SIGINT,
        libc::SIGQUIT,
        libc::SIGTERM,
        libc::SIGCHLD,
        libc::SIGTTOU,
        libc::SIGTTIN,
        libc::SIGTSTP,
        libc::SIGPIPE,
    ];
    for sig in all {
        let _ = set_disposition(sig, Disposition::Default);
    }
}

/// Ignore `SIGTTOU` so `tcsetpgrp` from a background group cannot stop
/// us mid-setup.
pub fn ignore_sigttou() {
    let _ = set_disposition(libc::SIGTTOU, Disposition::Ignore);
}

/// Block or unblock `SIGCHLD` delivery around critical wait sections.
pub fn block_sigchld(block: bool) -> Result<(), Errno> {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), libc::SIGCHLD);
        let how = if block { libc::SIG_BLOCK } else { libc::SIG_UNBLOCK };
        if libc::sigprocmask(how, set.as_ptr(), std::ptr::null_mut()) == -1 {
            return Err(Errno::last());
        }
    }
    Ok(())
}

// =============================================================================
// SIGNAL NAMES
// =============================================================================

/// Signal names accepted by `trap` and `kill`, without the `SIG` prefix.
pub const SIGNAL_NAMES: &[(&str, i32)] = &[
    ("HUP", libc::SIGHUP),
    ("INT", libc::SIGINT),
    ("QUIT", libc::SIGQUIT),
    ("ILL", libc::SIGILL),
    ("TRAP", libc::SIGTRAP),
    ("ABRT", libc::SIGABRT),
    ("BUS", libc::SIGBUS),
    ("FPE", libc::SIGFPE),
    ("KILL", libc::SIGKILL),
    ("USR1", libc::SIGUSR1),
    ("SEGV", libc::SIGSEGV),
    ("USR2", libc::SIGUSR2),
    ("PIPE", libc::SIGPIPE),
    ("ALRM", libc::SIGALRM),
    ("TERM", libc::SIGTERM),
    ("CHLD", libc::SIGCHLD),
    ("CONT", libc::SIGCONT),
    ("STOP", libc::SIGSTOP),
    ("TSTP", libc::SIGTSTP),
    ("TTIN", libc::SIGTTIN),
    ("TTOU", libc::SIGTTOU),
    ("URG", libc::SIGURG),
    ("XCPU", libc::SIGXCPU),
    ("XFSZ", libc::SIGXFSZ),
    ("VTALRM", libc::SIGVTALRM),
    ("PROF", libc::SIGPROF),
    ("WINCH", libc::SIGWINCH),
    ("IO", libc::SIGIO),
    ("SYS", libc::SIGSYS),
];

/// Parse a signal spec: `9`, `KILL` or `SIGKILL`.
pub fn parse_signal(spec: &str) -> Option<i32> {
    if let Ok(n) = spec.parse::<i32>() {
        return if (1..=64).contains(&n) { Some(n) } else { None };
    }
    let upper = spec.to_ascii_uppercase();
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    SIGNAL_NAMES.iter().find(|(n, _)| *n == name).map(|&(_, v)| v)
}

pub fn signal_name(signal: i32) -> String {
    SIGNAL_NAMES
        .iter()
        .find(|&&(_, v)| v == signal)
        .map(|&(n, _)| format!("SIG{}", n))
        .unwrap_or_else(|| signal.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_signal_specs() {
        assert_eq!(parse_signal("9"), Some(libc::SIGKILL));
        assert_eq!(parse_signal("KILL"), Some(libc::SIGKILL));
        assert_eq!(parse_signal("SIGKILL"), Some(libc::SIGKILL));
        assert_eq!(parse_signal("kill"), Some(libc::SIGKILL));
        assert_eq!(parse_signal("NOSUCH"), None);
        assert_eq!(parse_signal("0"), None);
    }

    #[test]
    fn signal_name_round_trip() {
        assert_eq!(signal_name(libc::SIGINT), "SIGINT");
    }

    #[test]
    fn self_pipe_delivers_in_order() {
        let manager = SignalManager::new().expect("signal manager");
        manager.inject(libc::SIGCHLD);
        manager.inject(libc::SIGINT);
        let drained = manager.drain();
        assert_eq!(drained, vec![libc::SIGCHLD, libc::SIGINT]);
        assert!(manager.drain().is_empty());
    }
}
