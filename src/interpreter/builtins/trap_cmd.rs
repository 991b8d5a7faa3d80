//! The `trap` builtin.

use crate::interpreter::builtins::{eout, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;
use crate::system::signals::{self, Disposition};
use crate::system::traps::{TrapAction, TrapCondition};

pub fn run_trap(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let operands: Vec<&String> = args[1..].iter().filter(|a| a.as_str() != "--").collect();

    if operands.is_empty() || operands[0].as_str() == "-p" {
        for line in interp.state.traps.listing() {
            out(&format!("{}\n", line));
        }
        return Ok(0);
    }

    // `trap - SIG…` resets; `trap '' SIG…` ignores; otherwise the first
    // operand is the handler command. A single numeric/NAME operand also
    // means reset, per POSIX.
    let (action, conditions) = if operands[0].as_str() == "-" {
        (TrapAction::Default, &operands[1..])
    } else if operands.len() == 1 && TrapCondition::parse(operands[0]).is_some() {
        (TrapAction::Default, &operands[..])
    } else if operands[0].is_empty() {
        (TrapAction::Ignore, &operands[1..])
    } else {
        (TrapAction::Command(operands[0].clone()), &operands[1..])
    };

    if conditions.is_empty() {
        eout("psh: trap: usage: trap [-lp] [arg signal_spec …]\n");
        return Ok(2);
    }

    let mut status = 0;
    for spec in conditions {
        let condition = match TrapCondition::parse(spec) {
            Some(c) => c,
            None => {
                eout(&format!("psh: trap: {}: invalid signal specification\n", spec));
                status = 1;
                continue;
            }
        };
        // Keep the kernel disposition in line for real signals.
        if let TrapCondition::Signal(signo) = condition {
            let disposition = match &action {
                TrapAction::Default => Disposition::Default,
                TrapAction::Ignore => Disposition::Ignore,
                TrapAction::Command(_) => Disposition::Catch,
            };
            if signals::set_disposition(signo, disposition).is_err() {
                eout(&format!("psh: trap: {}: cannot set disposition\n", spec));
                status = 1;
                continue;
            }
        }
        interp.state.traps.set(condition, action.clone());
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::interpreter::Interpreter;
    use crate::parser::Parser;
    use crate::system::traps::{TrapAction, TrapCondition};

    fn run(interp: &mut Interpreter, src: &str) -> i32 {
        let script = Parser::new().parse(src).expect("parse");
        crate::interpreter::pipeline::exit_status_of(interp.run_script(&script))
    }

    #[test]
    fn register_and_reset() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "trap 'echo bye' EXIT");
        assert_eq!(
            interp.state.traps.command_for(TrapCondition::Exit),
            Some("echo bye".to_string())
        );
        run(&mut interp, "trap - EXIT");
        assert_eq!(interp.state.traps.command_for(TrapCondition::Exit), None);
    }

    #[test]
    fn ignore_with_empty_string() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "trap '' USR1");
        assert_eq!(
            *interp.state.traps.get(TrapCondition::Signal(libc::SIGUSR1)),
            TrapAction::Ignore
        );
    }

    #[test]
    fn invalid_signal_fails() {
        let mut interp = Interpreter::new(false);
        let status = run(&mut interp, "trap 'x' NOSUCHSIG");
        assert_eq!(status, 1);
    }
}
