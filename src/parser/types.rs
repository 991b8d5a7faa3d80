//! Parser and lexer error types.

use thiserror::Error;

use crate::ast::ScriptNode;

/// Error produced while tokenizing input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// True when the input simply ended too early (unterminated quote or
    /// substitution) and more input could complete it.
    pub incomplete: bool,
}

impl LexerError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column, incomplete: false }
    }

    pub fn incomplete(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column, incomplete: true }
    }
}

/// Error produced while parsing a token stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: syntax error: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// True when the construct is merely unfinished (missing `fi`, `done`,
    /// `esac`, `}}`, heredoc body, …) and the REPL should prompt for more.
    pub incomplete: bool,
}

impl ParserError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column, incomplete: false }
    }

    pub fn incomplete(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column, incomplete: true }
    }
}

impl From<LexerError> for ParserError {
    fn from(e: LexerError) -> Self {
        Self { message: e.message, line: e.line, column: e.column, incomplete: e.incomplete }
    }
}

/// Result of a parse attempt, distinguishing "finished" from "feed me more".
///
/// The REPL keeps accumulating lines while the parser reports
/// `Incomplete`, re-parsing the whole buffer each time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Complete(ScriptNode),
    /// Unfinished construct; the payload names what is still open.
    Incomplete(String),
}

/// Knobs affecting tokenization.
#[derive(Debug, Clone)]
pub struct LexerOptions {
    /// Restrict identifiers to the POSIX portable character set.
    pub posix_mode: bool,
    /// Recognize `?( *( +( @( !(` as extended glob openers. On by
    /// default: `shopt -s extglob` can arrive mid-script, after parsing,
    /// so the lexer is permissive and the *matcher* consults the option.
    pub extglob: bool,
    /// After a syntax error, skip to the next newline/semicolon and continue.
    pub recovery_mode: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self { posix_mode: false, extglob: true, recovery_mode: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexer_error_display_includes_line() {
        let e = LexerError::new("unterminated quote", 3, 7);
        assert_eq!(e.to_string(), "line 3: unterminated quote");
        assert!(!e.incomplete);
    }

    #[test]
    fn incomplete_constructor_sets_flag() {
        let e = ParserError::incomplete("expected `fi`", 2, 1);
        assert!(e.incomplete);
    }
}
