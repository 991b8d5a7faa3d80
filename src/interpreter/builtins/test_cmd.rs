//! `test` / `[`: the POSIX test expression evaluator.
//!
//! This is a separate little recursive-descent evaluator over the
//! already-expanded argv (unlike `[[ ]]`, whose expression is parsed at
//! parse time and whose operands do not word-split).

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

use crate::interpreter::builtins::eout;
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;

pub fn run_test(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut operands: Vec<&str> = args[1..].iter().map(String::as_str).collect();

    // `[` requires a closing `]`.
    if args[0] == "[" {
        match operands.pop() {
            Some("]") => {}
            _ => {
                eout("psh: [: missing `]'\n");
                return Ok(2);
            }
        }
    }

    let mut eval = TestEvaluator { operands: &operands, pos: 0, interp };
    match eval.expression() {
        Ok(value) => {
            if eval.pos < operands.len() {
                eout("psh: test: too many arguments\n");
                return Ok(2);
            }
            Ok(if value { 0 } else { 1 })
        }
        Err(message) => {
            eout(&format!("psh: test: {}\n", message));
            Ok(2)
        }
    }
}

struct TestEvaluator<'a> {
    operands: &'a [&'a str],
    pos: usize,
    interp: &'a mut Interpreter,
}

impl<'a> TestEvaluator<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.operands.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&str> {
        let v = self.peek();
        if v.is_some() {
            self.pos += 1;
        }
        v
    }

    /// `expr := and_expr (-o and_expr)*`
    fn expression(&mut self) -> Result<bool, String> {
        if self.operands.is_empty() {
            return Ok(false);
        }
        let mut value = self.and_expression()?;
        while self.peek() == Some("-o") {
            self.pos += 1;
            let right = self.and_expression()?;
            value = value || right;
        }
        Ok(value)
    }

    fn and_expression(&mut self) -> Result<bool, String> {
        let mut value = self.primary()?;
        while self.peek() == Some("-a") {
            self.pos += 1;
            let right = self.primary()?;
            value = value && right;
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<bool, String> {
        match self.peek() {
            Some("!") => {
                self.pos += 1;
                Ok(!self.primary()?)
            }
            Some("(") => {
                self.pos += 1;
                let value = self.expression()?;
                if self.next() != Some(")") {
                    return Err("`)' expected".into());
                }
                Ok(value)
            }
            Some(op) if is_unary(op) && self.operands.len() > self.pos + 1 => {
                let op = op.to_string();
                self.pos += 1;
                let operand = self.next().unwrap_or("").to_string();
                self.unary(&op, &operand)
            }
            Some(_) => {
                let left = self.next().unwrap_or("").to_string();
                match self.peek() {
                    Some(op) if is_binary(op) => {
                        let op = op.to_string();
                        self.pos += 1;
                        let right = match self.next() {
                            Some(r) => r.to_string(),
                            None => return Err(format!("{}: unary operator expected", op)),
                        };
                        self.binary(&left, &op, &right)
                    }
                    _ => Ok(!left.is_empty()),
                }
            }
            None => Err("argument expected".into()),
        }
    }

    fn unary(&mut self, op: &str, operand: &str) -> Result<bool, String> {
        let metadata = || std::fs::metadata(operand);
        Ok(match op {
            "-z" => operand.is_empty(),
            "-n" => !operand.is_empty(),
            "-v" => self.interp.state.is_set(operand),
            "-o" => self.interp.state.options.get_named(operand).unwrap_or(false),
            "-e" => metadata().is_ok() || std::fs::symlink_metadata(operand).is_ok(),
            "-f" => metadata().map_or(false, |m| m.is_file()),
            "-d" => metadata().map_or(false, |m| m.is_dir()),
            "-L" | "-h" => std::fs::symlink_metadata(operand)
                .map_or(false, |m| m.file_type().is_symlink()),
            "-p" => metadata().map_or(false, |m| m.file_type().is_fifo()),
            "-S" => metadata().map_or(false, |m| m.file_type().is_socket()),
            "-b" => metadata().map_or(false, |m| m.file_type().is_block_device()),
            "-c" => metadata().map_or(false, |m| m.file_type().is_char_device()),
            "-s" => metadata().map_or(false, |m| m.len() > 0),
            "-u" => metadata().map_or(false, |m| m.permissions().mode() & 0o4000 != 0),
            "-g" => metadata().map_or(false, |m| m.permissions().mode() & 0o2000 != 0),
            "-r" => nix::unistd::access(operand, nix::unistd::AccessFlags::R_OK).is_ok(),
            "-w" => nix::unistd::access(operand, nix::unistd::AccessFlags::W_OK).is_ok(),
            "-x" => nix::unistd::access(operand, nix::unistd::AccessFlags::X_OK).is_ok(),
            "-t" => operand
                .parse::<i32>()
                .ok()
                .map_or(false, |fd| {
                    nix::unistd::isatty(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })
                        .unwrap_or(false)
                }),
            _ => return Err(format!("{}: unary operator expected", op)),
        })
    }

    fn binary(&mut self, left: &str, op: &str, right: &str) -> Result<bool, String> {
        match op {
            "=" | "==" => Ok(left == right),
            "!=" => Ok(left != right),
            "<" => Ok(left < right),
            ">" => Ok(left > right),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let l = parse_number(left)?;
                let r = parse_number(right)?;
                Ok(match op {
                    "-eq" => l == r,
                    "-ne" => l != r,
                    "-lt" => l < r,
                    "-le" => l <= r,
                    "-gt" => l > r,
                    "-ge" => l >= r,
                    _ => unreachable!(),
                })
            }
            "-nt" | "-ot" => {
                let lm = std::fs::metadata(left).and_then(|m| m.modified()).ok();
                let rm = std::fs::metadata(right).and_then(|m| m.modified()).ok();
                Ok(match (op, lm, rm) {
                    ("-nt", Some(a), Some(b)) => a > b,
                    ("-nt", Some(_), None) => true,
                    ("-ot", Some(a), Some(b)) => a < b,
                    ("-ot", None, Some(_)) => true,
                    _ => false,
                })
            }
            "-ef" => match (std::fs::metadata(left), std::fs::metadata(right)) {
                (Ok(a), Ok(b)) => Ok(a.dev() == b.dev() && a.ino() == b.ino()),
                _ => Ok(false),
            },
            _ => Err(format!("{}: binary operator expected", op)),
        }
    }
}

fn is_unary(op: &str) -> bool {
    matches!(
        op,
        "-z" | "-n" | "-e" | "-f" | "-d" | "-L" | "-h" | "-p" | "-S" | "-b" | "-c" | "-s"
            | "-u" | "-g" | "-r" | "-w" | "-x" | "-t" | "-v" | "-o"
    )
}

fn is_binary(op: &str) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-nt"
            | "-ot" | "-ef"
    )
}

fn parse_number(text: &str) -> Result<i64, String> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| format!("{}: integer expression expected", text))
}

#[cfg(test)]
mod tests {
    use crate::interpreter::interpreter::Interpreter;
    use crate::parser::Parser;

    fn run(src: &str) -> i32 {
        let mut interp = Interpreter::new(false);
        let script = Parser::new().parse(src).expect("parse");
        crate::interpreter::pipeline::exit_status_of(interp.run_script(&script))
    }

    #[test]
    fn string_tests() {
        assert_eq!(run("test abc = abc"), 0);
        assert_eq!(run("test abc = abd"), 1);
        assert_eq!(run("test -z ''"), 0);
        assert_eq!(run("test -n ''"), 1);
        assert_eq!(run("[ x != y ]"), 0);
    }

    #[test]
    fn numeric_tests() {
        assert_eq!(run("[ 3 -lt 5 ]"), 0);
        assert_eq!(run("[ 5 -le 4 ]"), 1);
        assert_eq!(run("[ 2 -eq 2 ]"), 0);
    }

    #[test]
    fn bare_string_is_truthy() {
        assert_eq!(run("[ something ]"), 0);
        assert_eq!(run("[ '' ]"), 1);
        assert_eq!(run("test"), 1);
    }

    #[test]
    fn negation_and_connectives() {
        assert_eq!(run("[ ! -z full ]"), 0);
        assert_eq!(run("[ a = a -a b = b ]"), 0);
        assert_eq!(run("[ a = b -o b = b ]"), 0);
        assert_eq!(run("[ a = b -a b = b ]"), 1);
    }

    #[test]
    fn missing_bracket_is_usage_error() {
        assert_eq!(run("[ x = x"), 2);
    }

    #[test]
    fn non_numeric_comparison_is_an_error() {
        assert_eq!(run("[ abc -eq 3 ]"), 2);
    }

    #[test]
    fn file_tests() {
        assert_eq!(run("[ -d / ]"), 0);
        assert_eq!(run("[ -f / ]"), 1);
        assert_eq!(run("[ -e /definitely/not/there ]"), 1);
    }
}
