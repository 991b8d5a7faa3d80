//! `eval`, `exec`, and `source`/`.`.

use crate::interpreter::builtins::fail;
use crate::interpreter::errors::{ControlFlow, ExecResult};
use crate::interpreter::interpreter::Interpreter;
use crate::system::process;

pub fn run_eval(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let text = args[1..].join(" ");
    if text.trim().is_empty() {
        return Ok(0);
    }
    let mut parser = interp.new_parser();
    let script = match parser.parse(&text) {
        Ok(script) => script,
        Err(e) => {
            super::eout(&format!("psh: eval: {}\n", e));
            return Ok(2);
        }
    };
    interp.run_script(&script)
}

pub fn run_exec(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 {
        // Redirect-only `exec`: the dispatcher applied the redirects
        // permanently, nothing else to do.
        return Ok(0);
    }
    let name = &args[1];
    let path = match process::find_in_path(name, &interp.state.path_var()) {
        Some(path) => path,
        None => {
            super::eout(&format!("psh: exec: {}: not found\n", name));
            if interp.state.interactive {
                return Ok(127);
            }
            return Err(ControlFlow::Exit(127));
        }
    };
    crate::system::signals::reset_for_child();
    let env = interp.state.child_environment();
    let errno = process::execve(&path, &args[1..], &env);
    let status = match errno {
        nix::errno::Errno::EACCES => 126,
        _ => 127,
    };
    super::eout(&format!("psh: exec: {}: cannot execute: {}\n", name, errno));
    if interp.state.interactive {
        Ok(status)
    } else {
        Err(ControlFlow::Exit(status))
    }
}

pub fn run_source(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let path = match args.get(1) {
        Some(path) => path.clone(),
        None => return fail("source", "filename argument required", 2),
    };

    // A bare name searches PATH, then the current directory.
    let resolved = if path.contains('/') {
        path.clone()
    } else {
        process::find_in_path(&path, &interp.state.path_var())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(path.clone())
    };

    let text = match std::fs::read_to_string(&resolved) {
        Ok(text) => text,
        Err(e) => return fail("source", &format!("{}: {}", path, e), 1),
    };

    let mut parser = interp.new_parser();
    let script = match parser.parse(&text) {
        Ok(script) => script,
        Err(e) => return fail("source", &format!("{}: {}", path, e), 2),
    };

    // Temporary positional parameters, if extra arguments were given.
    let saved_positional = if args.len() > 2 {
        Some(std::mem::replace(&mut interp.state.positional, args[2..].to_vec()))
    } else {
        None
    };
    let was_sourced = interp.state.in_sourced_file;
    interp.state.in_sourced_file = true;

    let result = interp.run_script(&script);

    interp.state.in_sourced_file = was_sourced;
    if let Some(saved) = saved_positional {
        interp.state.positional = saved;
    }

    match result {
        Ok(status) => Ok(status),
        // `return` in a sourced file ends the file, not the shell.
        Err(ControlFlow::Return(code)) => Ok(code),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::interpreter::Interpreter;
    use crate::parser::Parser;
    use std::io::Write;

    fn run(interp: &mut Interpreter, src: &str) -> i32 {
        let script = Parser::new().parse(src).expect("parse");
        crate::interpreter::pipeline::exit_status_of(interp.run_script(&script))
    }

    #[test]
    fn eval_runs_constructed_command() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "cmd='x=42'; eval $cmd");
        assert_eq!(interp.state.lookup("x"), Some("42".into()));
    }

    #[test]
    fn eval_joins_arguments() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "eval a= '1'");
        assert_eq!(interp.state.lookup("a"), Some("1".into()));
    }

    #[test]
    fn source_runs_file_in_current_shell() {
        let mut interp = Interpreter::new(false);
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "sourced_var=present").expect("write");
        let path = file.path().to_string_lossy().into_owned();
        let status = run(&mut interp, &format!("source {}", path));
        assert_eq!(status, 0);
        assert_eq!(interp.state.lookup("sourced_var"), Some("present".into()));
    }

    #[test]
    fn return_in_sourced_file_stops_the_file_only() {
        let mut interp = Interpreter::new(false);
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "early=yes\nreturn 5\nlate=yes").expect("write");
        let path = file.path().to_string_lossy().into_owned();
        let status = run(&mut interp, &format!(". {}; after=ran", path));
        assert_eq!(status, 0);
        assert_eq!(interp.state.lookup("early"), Some("yes".into()));
        assert_eq!(interp.state.lookup("late"), None);
        assert_eq!(interp.state.lookup("after"), Some("ran".into()));
    }

    #[test]
    fn source_missing_file_fails() {
        let mut interp = Interpreter::new(false);
        let status = run(&mut interp, "source /definitely/missing/file.sh");
        assert_eq!(status, 1);
    }
}
