//! Control flow and runtime errors.
//!
//! `break`, `continue`, `return` and `exit` unwind through the executor
//! as the `Err` side of every execution result; each is caught at its
//! proper frame (loop, function, shell). Runtime failures that abort only
//! the current simple command travel the same channel as
//! `ControlFlow::Error` and are absorbed at the statement level.

use thiserror::Error;

/// Runtime errors that abort the current simple command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShellError {
    /// Bad substitution, `${var:?}` firing, and friends.
    #[error("{0}")]
    Expansion(String),

    /// Unbound variable under `set -u`.
    #[error("{0}: unbound variable")]
    Unbound(String),

    /// Arithmetic evaluation failure (syntax, division by zero).
    #[error("{0}")]
    Arithmetic(String),

    /// Redirection failure: open/dup errors, noclobber refusal.
    #[error("{0}")]
    Redirect(String),

    /// Assignment to a readonly variable.
    #[error("{0}: readonly variable")]
    Readonly(String),

    /// Pattern had no matches under `failglob`.
    #[error("no match: {0}")]
    NoGlobMatch(String),
}

impl ShellError {
    /// Exit status the failed command reports.
    pub fn status(&self) -> i32 {
        1
    }

    /// Whether a non-interactive shell must abort on this error even
    /// without `errexit` (POSIX says so for expansion and redirection
    /// errors of special builtins; we follow bash and stay alive except
    /// for unbound variables).
    pub fn is_fatal_in_script(&self) -> bool {
        matches!(self, ShellError::Unbound(_) | ShellError::Expansion(_))
    }
}

/// Unwinding carrier threaded through every executor function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFlow {
    /// `break [n]`: unwind n loop levels.
    Break(u32),
    /// `continue [n]`: unwind to the nth enclosing loop's next pass.
    Continue(u32),
    /// `return [code]`: unwind to the innermost function/source frame.
    Return(i32),
    /// `exit [code]`: unwind the whole shell.
    Exit(i32),
    /// Runtime error; absorbed at the statement boundary.
    Error(ShellError),
}

impl From<ShellError> for ControlFlow {
    fn from(e: ShellError) -> Self {
        ControlFlow::Error(e)
    }
}

/// Every executor function returns this: an exit status, or something
/// unwinding past it.
pub type ExecResult<T = i32> = Result<T, ControlFlow>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_error_converts_to_control_flow() {
        let cf: ControlFlow = ShellError::Readonly("PATH".into()).into();
        assert!(matches!(cf, ControlFlow::Error(ShellError::Readonly(_))));
    }

    #[test]
    fn error_messages() {
        assert_eq!(ShellError::Unbound("x".into()).to_string(), "x: unbound variable");
        assert_eq!(ShellError::Readonly("x".into()).to_string(), "x: readonly variable");
    }
}
