//! Redirection application.
//!
//! Two modes: *saved* (builtins, functions, compound commands running in
//! this process; original fds are stashed at slots >= 10 and restored
//! unconditionally afterwards) and *child* (forked processes about to
//! exec: plain dup2, nothing to restore). Heredocs and here-strings go
//! through unlinked temp files, so no writer can deadlock on pipe
//! capacity.

use std::fs::OpenOptions;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::{RedirectionNode, RedirectionOperator, RedirectionTarget};
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::interpreter::Interpreter;
use crate::system::process;

/// Fd slot where saved descriptors start.
const SAVED_FD_BASE: RawFd = 10;

static HEREDOC_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Restores the original fds when a builtin or compound finishes,
/// success or failure.
pub(crate) struct RedirectGuard {
    /// `(target_fd, saved_copy)`; `None` means the target was closed
    /// before the redirect.
    saved: Vec<(RawFd, Option<RawFd>)>,
}

impl RedirectGuard {
    pub(crate) fn empty() -> Self {
        Self { saved: Vec::new() }
    }
}

/// What a single redirect wants done.
enum Action {
    /// dup2(source, target); close source afterwards if it was opened
    /// here.
    Install { target: RawFd, source: RawFd, close_source: bool },
    /// `n>&-` / `n<&-`.
    Close(RawFd),
}

fn redirect_err(e: std::io::Error, what: &str) -> ControlFlow {
    ControlFlow::Error(ShellError::Redirect(format!("{}: {}", what, e)))
}

impl Interpreter {
    /// Apply redirects, saving originals for restore. Partial failure
    /// restores everything applied so far.
    pub(crate) fn apply_redirects_saved(
        &mut self,
        redirects: &[RedirectionNode],
    ) -> ExecResult<RedirectGuard> {
        let mut guard = RedirectGuard::empty();
        for redirect in redirects {
            let actions = match self.redirect_actions(redirect) {
                Ok(actions) => actions,
                Err(e) => {
                    self.restore_redirects(guard);
                    return Err(e);
                }
            };
            for action in actions {
                match action {
                    Action::Install { target, source, close_source } => {
                        let saved = process::dup_above(target, SAVED_FD_BASE, true).ok();
                        guard.saved.push((target, saved));
                        if let Err(e) = process::dup2(source, target) {
                            if close_source {
                                let _ = process::close(source);
                            }
                            self.restore_redirects(guard);
                            return Err(ControlFlow::Error(ShellError::Redirect(format!(
                                "cannot duplicate fd: {}",
                                e
                            ))));
                        }
                        if close_source {
                            let _ = process::close(source);
                        }
                    }
                    Action::Close(target) => {
                        let saved = process::dup_above(target, SAVED_FD_BASE, true).ok();
                        guard.saved.push((target, saved));
                        let _ = process::close(target);
                    }
                }
            }
        }
        Ok(guard)
    }

    /// Put the original fds back, newest first.
    pub(crate) fn restore_redirects(&mut self, guard: RedirectGuard) {
        for (target, saved) in guard.saved.into_iter().rev() {
            match saved {
                Some(copy) => {
                    let _ = process::dup2(copy, target);
                    let _ = process::close(copy);
                }
                None => {
                    let _ = process::close(target);
                }
            }
        }
    }

    /// Permanent application in a forked child.
    pub(crate) fn apply_redirects_in_child(
        &mut self,
        redirects: &[RedirectionNode],
    ) -> ExecResult<()> {
        for redirect in redirects {
            for action in self.redirect_actions(redirect)? {
                match action {
                    Action::Install { target, source, close_source } => {
                        process::dup2(source, target).map_err(|e| {
                            ControlFlow::Error(ShellError::Redirect(format!(
                                "cannot duplicate fd: {}",
                                e
                            )))
                        })?;
                        if close_source {
                            let _ = process::close(source);
                        }
                    }
                    Action::Close(target) => {
                        let _ = process::close(target);
                    }
                }
            }
        }
        Ok(())
    }

    /// Work out what one redirect node means, opening whatever needs
    /// opening.
    fn redirect_actions(&mut self, redirect: &RedirectionNode) -> ExecResult<Vec<Action>> {
        use RedirectionOperator::*;

        let default_fd = match redirect.operator {
            Less | LessAnd | LessGreat | TLess | DLess | DLessDash => libc::STDIN_FILENO,
            _ => libc::STDOUT_FILENO,
        };
        let target_fd = redirect.fd.unwrap_or(default_fd);

        match redirect.operator {
            Less => {
                let path = self.redirect_path(redirect)?;
                let file = OpenOptions::new()
                    .read(true)
                    .open(&path)
                    .map_err(|e| redirect_err(e, &path))?;
                Ok(vec![Action::Install {
                    target: target_fd,
                    source: file.into_raw_fd(),
                    close_source: true,
                }])
            }
            Great | Clobber => {
                let path = self.redirect_path(redirect)?;
                if redirect.operator == Great && self.state.options.noclobber {
                    if let Ok(meta) = std::fs::metadata(&path) {
                        if meta.is_file() {
                            return Err(ControlFlow::Error(ShellError::Redirect(format!(
                                "{}: cannot overwrite existing file",
                                path
                            ))));
                        }
                    }
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .map_err(|e| redirect_err(e, &path))?;
                Ok(vec![Action::Install {
                    target: target_fd,
                    source: file.into_raw_fd(),
                    close_source: true,
                }])
            }
            DGreat => {
                let path = self.redirect_path(redirect)?;
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .map_err(|e| redirect_err(e, &path))?;
                Ok(vec![Action::Install {
                    target: target_fd,
                    source: file.into_raw_fd(),
                    close_source: true,
                }])
            }
            LessGreat => {
                let path = self.redirect_path(redirect)?;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(&path)
                    .map_err(|e| redirect_err(e, &path))?;
                Ok(vec![Action::Install {
                    target: target_fd,
                    source: file.into_raw_fd(),
                    close_source: true,
                }])
            }
            LessAnd | GreatAnd => {
                let word = self.redirect_path(redirect)?;
                if word == "-" {
                    return Ok(vec![Action::Close(target_fd)]);
                }
                if let Ok(source) = word.parse::<RawFd>() {
                    return Ok(vec![Action::Install {
                        target: target_fd,
                        source,
                        close_source: false,
                    }]);
                }
                if redirect.operator == GreatAnd && redirect.fd.is_none() {
                    // `>&file` is `&>file`.
                    let file = OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(&word)
                        .map_err(|e| redirect_err(e, &word))?;
                    let fd = file.into_raw_fd();
                    return Ok(vec![
                        Action::Install { target: libc::STDOUT_FILENO, source: fd, close_source: false },
                        Action::Install { target: libc::STDERR_FILENO, source: fd, close_source: true },
                    ]);
                }
                Err(ControlFlow::Error(ShellError::Redirect(format!(
                    "{}: ambiguous redirect",
                    word
                ))))
            }
            AndGreat | AndDGreat => {
                let path = self.redirect_path(redirect)?;
                let mut options = OpenOptions::new();
                options.write(true).create(true);
                if redirect.operator == AndGreat {
                    options.truncate(true);
                } else {
                    options.append(true);
                }
                let file = options.open(&path).map_err(|e| redirect_err(e, &path))?;
                let fd = file.into_raw_fd();
                Ok(vec![
                    Action::Install { target: libc::STDOUT_FILENO, source: fd, close_source: false },
                    Action::Install { target: libc::STDERR_FILENO, source: fd, close_source: true },
                ])
            }
            TLess => {
                let word = match &redirect.target {
                    RedirectionTarget::Word(w) => self.expand_word_single(w)?,
                    RedirectionTarget::HereDoc(_) => String::new(),
                };
                let fd = anonymous_file(&format!("{}\n", word))?;
                Ok(vec![Action::Install { target: target_fd, source: fd, close_source: true }])
            }
            DLess | DLessDash => {
                let heredoc = match &redirect.target {
                    RedirectionTarget::HereDoc(h) => h,
                    RedirectionTarget::Word(_) => {
                        return Err(ControlFlow::Error(ShellError::Redirect(
                            "here-document body missing".into(),
                        )))
                    }
                };
                let body = if heredoc.quoted {
                    heredoc.content.as_literal().unwrap_or_default().to_string()
                } else {
                    self.expand_word_single(&heredoc.content)?
                };
                let fd = anonymous_file(&body)?;
                Ok(vec![Action::Install { target: target_fd, source: fd, close_source: true }])
            }
        }
    }

    fn redirect_path(&mut self, redirect: &RedirectionNode) -> ExecResult<String> {
        match &redirect.target {
            RedirectionTarget::Word(word) => self.expand_redirect_target(word),
            RedirectionTarget::HereDoc(_) => Err(ControlFlow::Error(ShellError::Redirect(
                "unexpected here-document".into(),
            ))),
        }
    }
}

/// Write content to an unlinked temp file, return a read fd at offset 0.
fn anonymous_file(content: &str) -> ExecResult<RawFd> {
    let path = std::env::temp_dir().join(format!(
        "psh-{}-{}",
        std::process::id(),
        HEREDOC_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, content)
        .map_err(|e| ControlFlow::Error(ShellError::Redirect(format!("here-document: {}", e))))?;
    let file = OpenOptions::new()
        .read(true)
        .open(&path)
        .map_err(|e| ControlFlow::Error(ShellError::Redirect(format!("here-document: {}", e))))?;
    let _ = std::fs::remove_file(&path);
    Ok(file.into_raw_fd())
}
