//! The shell front end.
//!
//! Owns an interpreter and a parser configuration, and drives the three
//! entry modes: `-c` command strings, script files (shebang- and
//! binary-aware), and the interactive REPL with PS1/PS2 prompting. The
//! line editor proper is out of scope; the REPL reads plain lines and
//! leans on `ParseOutcome::Incomplete` for continuation.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::interpreter::errors::ControlFlow;
use crate::interpreter::pipeline::exit_status_of;
use crate::interpreter::Interpreter;
use crate::parser::{ParseOutcome, Parser};
use crate::system::process;
use crate::system::signals::SignalManager;
use crate::system::traps::TrapCondition;

pub struct Shell {
    pub interp: Interpreter,
}

impl Shell {
    pub fn new(interactive: bool) -> Self {
        let mut interp = Interpreter::new(interactive);
        match SignalManager::new() {
            Ok(manager) => {
                if interactive {
                    let _ = manager.enter_interactive_mode();
                }
                interp.state.signals = Some(manager);
            }
            Err(_) => {
                // No self-pipe: children are still reaped on foreground
                // waits; background notification degrades.
            }
        }
        if interactive && interp.state.terminal.is_tty() {
            interp.state.options.monitor = true;
            interp.state.terminal.take_control();
        }
        Self { interp }
    }

    fn parser(&self) -> Parser {
        self.interp.new_parser()
    }

    // =========================================================================
    // ENTRY MODES
    // =========================================================================

    /// `psh -c 'commands'`.
    pub fn run_command(&mut self, text: &str, name: &str, args: &[String]) -> i32 {
        self.interp.state.script_name = name.to_string();
        self.interp.state.positional = args.to_vec();
        let status = self.run_source(text, name);
        self.finish(status)
    }

    /// Run a script file. Honors `#!` lines pointing at other
    /// interpreters and rejects binary files with 126.
    pub fn run_script_file(&mut self, path: &str, args: &[String]) -> i32 {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("psh: {}: {}", path, e);
                return 127;
            }
        };

        if looks_binary(&bytes) {
            eprintln!("psh: {}: cannot execute binary file", path);
            return 126;
        }

        if let Some((interpreter, arg)) = parse_shebang(&bytes) {
            if !is_self(&interpreter) {
                let mut argv = vec![interpreter.to_string_lossy().into_owned()];
                if let Some(arg) = arg {
                    argv.push(arg);
                }
                argv.push(path.to_string());
                argv.extend(args.iter().cloned());
                let env = self.interp.state.child_environment();
                let errno = process::execve(&interpreter, &argv, &env);
                eprintln!("psh: {}: {}", interpreter.display(), errno);
                return 126;
            }
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.interp.state.script_name = path.to_string();
        self.interp.state.positional = args.to_vec();
        let status = self.run_source(&text, path);
        self.finish(status)
    }

    /// `psh -s` / piped stdin.
    pub fn run_stdin(&mut self) -> i32 {
        let mut text = String::new();
        if std::io::stdin().read_line_loop(&mut text).is_err() {
            return 1;
        }
        let status = self.run_source(&text, "psh");
        self.finish(status)
    }

    /// Parse and run one source text; returns the exit status.
    pub fn run_source(&mut self, text: &str, origin: &str) -> i32 {
        let mut parser = self.parser();
        let script = match parser.parse(text) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("psh: {}:{}:{}: {}", origin, e.line, e.column, e.message);
                self.interp.state.last_status = 2;
                return 2;
            }
        };
        match self.interp.run_script(&script) {
            Ok(status) => status,
            Err(ControlFlow::Exit(code)) => {
                self.interp.state.last_status = code;
                code
            }
            Err(other) => exit_status_of(Err(other)),
        }
    }

    // =========================================================================
    // REPL
    // =========================================================================

    /// The interactive loop: PS1, accumulate while incomplete under PS2,
    /// execute, repeat. Ctrl-C aborts the current line, not the shell.
    pub fn repl(&mut self) -> i32 {
        let stdin = std::io::stdin();
        let mut buffer = String::new();

        loop {
            self.interp.poll_signals();
            let _ = self.interp.run_pending_traps();

            let prompt = if buffer.is_empty() {
                self.interp.state.lookup("PS1").unwrap_or_else(|| "psh$ ".into())
            } else {
                self.interp.state.lookup("PS2").unwrap_or_else(|| "> ".into())
            };
            eprint!("{}", prompt);
            let _ = std::io::stderr().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break, // EOF
                Ok(_) => {}
                Err(_) => break,
            }
            buffer.push_str(&line);

            let mut parser = self.parser();
            match parser.parse_outcome(&buffer) {
                Ok(ParseOutcome::Incomplete(_)) => continue,
                Ok(ParseOutcome::Complete(script)) => {
                    buffer.clear();
                    match self.interp.run_script(&script) {
                        Ok(status) => self.interp.state.last_status = status,
                        Err(ControlFlow::Exit(code)) => return self.finish(code),
                        Err(other) => {
                            self.interp.state.last_status = exit_status_of(Err(other));
                        }
                    }
                }
                Err(e) => {
                    buffer.clear();
                    eprintln!("psh: {}", e);
                    self.interp.state.last_status = 2;
                }
            }
        }
        let code = self.interp.state.last_status;
        self.finish(code)
    }

    // =========================================================================
    // RC FILE
    // =========================================================================

    /// `~/.pshrc` (or an explicit path) on interactive startup.
    pub fn load_rc(&mut self, explicit: Option<&Path>) {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let home = match self.interp.state.lookup("HOME") {
                    Some(home) => home,
                    None => return,
                };
                Path::new(&home).join(".pshrc")
            }
        };
        if let Ok(text) = std::fs::read_to_string(&path) {
            let origin = path.to_string_lossy().into_owned();
            let _ = self.run_source(&text, &origin);
        }
    }

    /// Run the EXIT trap once and hand back the final code.
    pub fn finish(&mut self, code: i32) -> i32 {
        if let Some(cmd) = self.interp.state.traps.command_for(TrapCondition::Exit) {
            self.interp.state.traps.set(TrapCondition::Exit, crate::system::traps::TrapAction::Default);
            let _ = self.interp.run_trap_command(&cmd);
        }
        code
    }
}

// =============================================================================
// SCRIPT FILE INSPECTION
// =============================================================================

/// Null byte in the first KiB, or less than 70% printable: not a script.
fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    if head.is_empty() {
        return false;
    }
    if head.contains(&0) {
        return true;
    }
    let printable = head
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\t' || b == b'\r' || (0x20..0x7f).contains(&b) || b >= 0x80)
        .count();
    (printable as f64) / (head.len() as f64) < 0.70
}

/// `#!interpreter [argument]` from line one.
fn parse_shebang(bytes: &[u8]) -> Option<(PathBuf, Option<String>)> {
    if !bytes.starts_with(b"#!") {
        return None;
    }
    let line_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let line = String::from_utf8_lossy(&bytes[2..line_end]);
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let interpreter = parts.next()?.trim();
    if interpreter.is_empty() {
        return None;
    }
    let argument = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Some((PathBuf::from(interpreter), argument))
}

/// Does a shebang point back at this shell?
fn is_self(interpreter: &Path) -> bool {
    match interpreter.file_name().and_then(|n| n.to_str()) {
        Some(name) => name == "psh" || name == "sh" || name == "bash",
        None => false,
    }
}

/// Read the whole of stdin; tiny extension trait to keep the call site
/// tidy.
trait ReadAll {
    fn read_line_loop(&self, into: &mut String) -> std::io::Result<()>;
}

impl ReadAll for std::io::Stdin {
    fn read_line_loop(&self, into: &mut String) -> std::io::Result<()> {
        use std::io::Read;
        self.lock().read_to_string(into)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_detection() {
        assert!(looks_binary(b"\x7fELF\x01\x02\x00\x00"));
        assert!(!looks_binary(b"#!/bin/sh\necho ok\n"));
        assert!(!looks_binary(b""));
        let mostly_junk: Vec<u8> = (0u8..16).cycle().take(512).collect();
        assert!(looks_binary(&mostly_junk));
    }

    #[test]
    fn shebang_parsing() {
        let (interp, arg) = parse_shebang(b"#!/usr/bin/env python3\nprint()\n").expect("shebang");
        assert_eq!(interp, PathBuf::from("/usr/bin/env"));
        assert_eq!(arg.as_deref(), Some("python3"));

        let (interp, arg) = parse_shebang(b"#!/bin/sh\n").expect("shebang");
        assert_eq!(interp, PathBuf::from("/bin/sh"));
        assert!(arg.is_none());

        assert!(parse_shebang(b"echo no shebang\n").is_none());
    }

    #[test]
    fn self_recognition() {
        assert!(is_self(Path::new("/bin/sh")));
        assert!(is_self(Path::new("/usr/local/bin/psh")));
        assert!(!is_self(Path::new("/usr/bin/python3")));
    }

    #[test]
    fn run_source_reports_syntax_errors_as_2() {
        let mut shell = Shell::new(false);
        assert_eq!(shell.run_source("fi", "test"), 2);
    }

    #[test]
    fn run_source_basic_assignment() {
        let mut shell = Shell::new(false);
        assert_eq!(shell.run_source("x=1; y=$((x+1))", "test"), 0);
        assert_eq!(shell.interp.state.lookup("y"), Some("2".into()));
    }
}
