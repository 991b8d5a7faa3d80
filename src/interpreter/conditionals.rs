//! `[[ … ]]` evaluation.
//!
//! Operands expand without word splitting or pathname expansion. The
//! right side of `==`/`!=` is a pattern, of `=~` a regex; quoted
//! segments match literally in both.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

use regex_lite::Regex;

use crate::ast::{CondBinaryOperator, CondExprNode, CondUnaryOperator, WordNode};
use crate::interpreter::errors::{ExecResult, ShellError};
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::vars::VarValue;
use crate::interpreter::word_expansion::Piece;

impl Interpreter {
    /// Returns the command status: 0 for true, 1 for false.
    pub(crate) fn eval_conditional_expression(
        &mut self,
        expression: &CondExprNode,
    ) -> ExecResult {
        Ok(if self.cond_truth(expression)? { 0 } else { 1 })
    }

    fn cond_truth(&mut self, expression: &CondExprNode) -> ExecResult<bool> {
        match expression {
            CondExprNode::Not(inner) => Ok(!self.cond_truth(inner)?),
            CondExprNode::And(left, right) => {
                Ok(self.cond_truth(left)? && self.cond_truth(right)?)
            }
            CondExprNode::Or(left, right) => {
                Ok(self.cond_truth(left)? || self.cond_truth(right)?)
            }
            CondExprNode::Group(inner) => self.cond_truth(inner),
            CondExprNode::Word(word) => {
                let value = self.expand_word_single(word)?;
                Ok(!value.is_empty())
            }
            CondExprNode::Unary { operator, operand } => self.cond_unary(*operator, operand),
            CondExprNode::Binary { operator, left, right } => {
                self.cond_binary(*operator, left, right)
            }
        }
    }

    fn cond_unary(&mut self, op: CondUnaryOperator, operand: &WordNode) -> ExecResult<bool> {
        use CondUnaryOperator::*;
        let value = self.expand_word_single(operand)?;
        let metadata = || std::fs::metadata(&value);
        let symlink_metadata = || std::fs::symlink_metadata(&value);

        Ok(match op {
            ZeroLength => value.is_empty(),
            NonZeroLength => !value.is_empty(),
            VarSet => self.state.is_set(&value),
            OptionSet => self.state.options.get_named(&value).unwrap_or(false),
            Exists => metadata().is_ok() || symlink_metadata().is_ok(),
            RegularFile => metadata().map_or(false, |m| m.is_file()),
            Directory => metadata().map_or(false, |m| m.is_dir()),
            Symlink => symlink_metadata().map_or(false, |m| m.file_type().is_symlink()),
            Pipe => metadata().map_or(false, |m| m.file_type().is_fifo()),
            Socket => metadata().map_or(false, |m| m.file_type().is_socket()),
            BlockSpecial => metadata().map_or(false, |m| m.file_type().is_block_device()),
            CharSpecial => metadata().map_or(false, |m| m.file_type().is_char_device()),
            NonEmptyFile => metadata().map_or(false, |m| m.len() > 0),
            SetUid => metadata().map_or(false, |m| m.permissions().mode() & 0o4000 != 0),
            SetGid => metadata().map_or(false, |m| m.permissions().mode() & 0o2000 != 0),
            Readable => {
                nix::unistd::access(value.as_str(), nix::unistd::AccessFlags::R_OK).is_ok()
            }
            Writable => {
                nix::unistd::access(value.as_str(), nix::unistd::AccessFlags::W_OK).is_ok()
            }
            Executable => {
                nix::unistd::access(value.as_str(), nix::unistd::AccessFlags::X_OK).is_ok()
            }
            Terminal => value
                .parse::<i32>()
                .ok()
                .map_or(false, |fd| {
                    nix::unistd::isatty(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })
                        .unwrap_or(false)
                }),
        })
    }

    fn cond_binary(
        &mut self,
        op: CondBinaryOperator,
        left: &WordNode,
        right: &WordNode,
    ) -> ExecResult<bool> {
        use CondBinaryOperator::*;

        match op {
            StrEq | StrNe => {
                let subject = self.expand_word_single(left)?;
                let pattern = self.expand_word_pattern(right)?;
                let matched = crate::interpreter::expansion::pattern::pattern_matches(
                    &pattern,
                    &subject,
                    true,
                    self.state.shopt.nocasematch,
                );
                Ok(if op == StrEq { matched } else { !matched })
            }
            Match => {
                let subject = self.expand_word_single(left)?;
                let regex_text = self.expand_word_regex(right)?;
                let regex = Regex::new(&regex_text).map_err(|e| {
                    ShellError::Expansion(format!("invalid regex `{}`: {}", regex_text, e))
                })?;
                match regex.captures(&subject) {
                    Some(captures) => {
                        let mut rematch = std::collections::BTreeMap::new();
                        for (i, group) in captures.iter().enumerate() {
                            rematch.insert(
                                i as i64,
                                group.map(|m| m.as_str().to_string()).unwrap_or_default(),
                            );
                        }
                        self.state
                            .scopes
                            .with_var("BASH_REMATCH", |v| v.value = VarValue::Indexed(rematch))
                            .ok();
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            StrLt | StrGt => {
                let l = self.expand_word_single(left)?;
                let r = self.expand_word_single(right)?;
                Ok(if op == StrLt { l < r } else { l > r })
            }
            NumEq | NumNe | NumLt | NumLe | NumGt | NumGe => {
                let l_text = self.expand_word_single(left)?;
                let r_text = self.expand_word_single(right)?;
                let l = self.eval_arith_text(&l_text)?;
                let r = self.eval_arith_text(&r_text)?;
                Ok(match op {
                    NumEq => l == r,
                    NumNe => l != r,
                    NumLt => l < r,
                    NumLe => l <= r,
                    NumGt => l > r,
                    NumGe => l >= r,
                    _ => unreachable!(),
                })
            }
            NewerThan | OlderThan => {
                let l = self.expand_word_single(left)?;
                let r = self.expand_word_single(right)?;
                let lm = std::fs::metadata(&l).and_then(|m| m.modified()).ok();
                let rm = std::fs::metadata(&r).and_then(|m| m.modified()).ok();
                Ok(match (op, lm, rm) {
                    (NewerThan, Some(a), Some(b)) => a > b,
                    (NewerThan, Some(_), None) => true,
                    (OlderThan, Some(a), Some(b)) => a < b,
                    (OlderThan, None, Some(_)) => true,
                    _ => false,
                })
            }
            SameFile => {
                let l = self.expand_word_single(left)?;
                let r = self.expand_word_single(right)?;
                match (std::fs::metadata(&l), std::fs::metadata(&r)) {
                    (Ok(a), Ok(b)) => Ok(a.dev() == b.dev() && a.ino() == b.ino()),
                    _ => Ok(false),
                }
            }
        }
    }

    /// Expand a word for the right side of `=~`: quoted segments have
    /// their regex metacharacters escaped.
    fn expand_word_regex(&mut self, word: &WordNode) -> ExecResult<String> {
        let pieces = self.expand_parts(&word.parts, false)?;
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Break => out.push(' '),
                Piece::Text(p) => {
                    if p.quoted {
                        out.push_str(&escape_regex(&p.text));
                    } else {
                        out.push_str(&p.text);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
