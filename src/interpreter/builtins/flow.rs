//! Control-flow builtins: exit, return, break, continue, shift, and the
//! trivial trio.

use crate::interpreter::builtins::fail;
use crate::interpreter::errors::{ControlFlow, ExecResult};
use crate::interpreter::interpreter::Interpreter;

fn numeric_arg(args: &[String], default: i32) -> Result<i32, String> {
    match args.get(1) {
        None => Ok(default),
        Some(text) => text
            .parse::<i64>()
            .map(|n| n as i32)
            .map_err(|_| format!("{}: numeric argument required", text)),
    }
}

pub fn run_exit(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let code = match numeric_arg(args, interp.state.last_status) {
        Ok(code) => code & 0xff,
        Err(message) => {
            super::eout(&format!("psh: exit: {}\n", message));
            2
        }
    };
    Err(ControlFlow::Exit(code))
}

pub fn run_return(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if interp.state.call_depth == 0 && !interp.state.in_sourced_file {
        return fail("return", "can only `return' from a function or sourced script", 1);
    }
    let code = match numeric_arg(args, interp.state.last_status) {
        Ok(code) => code,
        Err(message) => {
            super::eout(&format!("psh: return: {}\n", message));
            return Err(ControlFlow::Return(2));
        }
    };
    Err(ControlFlow::Return(code & 0xff))
}

pub fn run_break(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if interp.state.loop_depth == 0 {
        return fail("break", "only meaningful in a `for', `while', or `until' loop", 0);
    }
    let levels = match numeric_arg(args, 1) {
        Ok(n) if n >= 1 => n as u32,
        _ => return fail("break", "loop count out of range", 1),
    };
    Err(ControlFlow::Break(levels.min(interp.state.loop_depth)))
}

pub fn run_continue(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if interp.state.loop_depth == 0 {
        return fail("continue", "only meaningful in a `for', `while', or `until' loop", 0);
    }
    let levels = match numeric_arg(args, 1) {
        Ok(n) if n >= 1 => n as u32,
        _ => return fail("continue", "loop count out of range", 1),
    };
    Err(ControlFlow::Continue(levels.min(interp.state.loop_depth)))
}

pub fn run_shift(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let n = match numeric_arg(args, 1) {
        Ok(n) if n >= 0 => n as usize,
        _ => return fail("shift", "shift count out of range", 1),
    };
    if n > interp.state.positional.len() {
        return Ok(1);
    }
    interp.state.positional.drain(..n);
    Ok(0)
}

pub fn run_true(_interp: &mut Interpreter, _args: &[String]) -> ExecResult {
    Ok(0)
}

pub fn run_false(_interp: &mut Interpreter, _args: &[String]) -> ExecResult {
    Ok(1)
}

pub fn run_colon(_interp: &mut Interpreter, _args: &[String]) -> ExecResult {
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn run(interp: &mut Interpreter, src: &str) -> i32 {
        let script = Parser::new().parse(src).expect("parse");
        crate::interpreter::pipeline::exit_status_of(interp.run_script(&script))
    }

    #[test]
    fn break_unwinds_n_levels() {
        let mut interp = Interpreter::new(false);
        run(
            &mut interp,
            "hits=0\nfor a in 1 2; do for b in 1 2; do hits=$((hits+1)); break 2; done; done",
        );
        assert_eq!(interp.state.lookup("hits"), Some("1".into()));
    }

    #[test]
    fn continue_skips_iteration() {
        let mut interp = Interpreter::new(false);
        run(
            &mut interp,
            "sum=0\nfor n in 1 2 3 4; do if [ $n = 2 ]; then continue; fi; sum=$((sum+n)); done",
        );
        assert_eq!(interp.state.lookup("sum"), Some("8".into()));
    }

    #[test]
    fn shift_drops_parameters() {
        let mut interp = Interpreter::new(false);
        interp.state.positional = vec!["a".into(), "b".into(), "c".into()];
        run(&mut interp, "shift 2");
        assert_eq!(interp.state.positional, vec!["c".to_string()]);
    }

    #[test]
    fn shift_too_far_fails_quietly() {
        let mut interp = Interpreter::new(false);
        interp.state.positional = vec!["a".into()];
        let status = run(&mut interp, "shift 5");
        assert_eq!(status, 1);
        assert_eq!(interp.state.positional.len(), 1);
    }

    #[test]
    fn exit_carries_status() {
        let mut interp = Interpreter::new(false);
        let script = Parser::new().parse("exit 3").expect("parse");
        let result = interp.run_script(&script);
        assert_eq!(result, Err(ControlFlow::Exit(3)));
    }

    #[test]
    fn break_outside_loop_is_nonfatal() {
        let mut interp = Interpreter::new(false);
        let status = run(&mut interp, "break");
        assert_eq!(status, 0);
    }
}
