//! Function calls.
//!
//! Each call pushes exactly one scope frame and pops exactly one on
//! every exit path: normal return, `return`, runtime error, `exit`.
//! Positional parameters and `FUNCNAME` shadow the caller's.

use crate::ast::{AssignmentNode, FunctionDefNode};
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::interpreter::Interpreter;
use crate::system::traps::TrapCondition;

const MAX_CALL_DEPTH: u32 = 1000;

impl Interpreter {
    pub(crate) fn call_function(
        &mut self,
        def: &FunctionDefNode,
        args: &[String],
        assignments: &[AssignmentNode],
    ) -> ExecResult {
        if self.state.call_depth >= MAX_CALL_DEPTH {
            return Err(ShellError::Expansion(format!(
                "{}: maximum function nesting level exceeded",
                def.name
            ))
            .into());
        }

        // Frame setup. Everything below must be undone on the way out.
        let saved_positional = std::mem::replace(&mut self.state.positional, args.to_vec());
        self.state.func_names.insert(0, def.name.clone());
        self.state.scopes.push_frame();
        self.state.call_depth += 1;

        let result = (|| -> ExecResult {
            // Prefix assignments on a function call bind in the new
            // scope, visible to the body only.
            for assignment in assignments {
                let value = match &assignment.value {
                    Some(word) => self.expand_word_single(word)?,
                    None => String::new(),
                };
                self.state
                    .scopes
                    .set_local(&assignment.name, crate::interpreter::vars::Variable::scalar(value))
                    .map_err(ControlFlow::from)?;
            }

            let guard = self.apply_redirects_saved(&def.redirections)?;
            let body_result = self.execute_compound(&def.body);
            self.restore_redirects(guard);
            body_result
        })();

        // Frame teardown, unconditionally.
        self.state.call_depth -= 1;
        self.state.scopes.pop_frame();
        self.state.func_names.remove(0);
        self.state.positional = saved_positional;

        let status = match result {
            Ok(status) => status,
            Err(ControlFlow::Return(code)) => code,
            Err(other) => return Err(other),
        };

        if let Some(cmd) = self.state.traps.command_for(TrapCondition::Return) {
            self.run_trap_command(&cmd)?;
        }
        self.state.last_status = status;
        Ok(status)
    }
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
    fn local_shadows_global_and_restores() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "x=global");
        run(&mut interp, "f() { local x=local; }; f");
        assert_eq!(interp.state.lookup("x"), Some("global".into()));
    }

    #[test]
    fn return_status_becomes_exit_status() {
        let mut interp = Interpreter::new(false);
        let status = run(&mut interp, "f() { return 42; }; f");
        assert_eq!(status, 42);
    }

    #[test]
    fn scope_depth_balanced_after_return() {
        let mut interp = Interpreter::new(false);
        let before = interp.state.scopes.depth();
        run(&mut interp, "f() { return 1; }; f; f; f");
        assert_eq!(interp.state.scopes.depth(), before);
    }

    #[test]
    fn positional_parameters_shadowed() {
        let mut interp = Interpreter::new(false);
        interp.state.positional = vec!["outer".into()];
        run(&mut interp, "f() { :; }; f inner1 inner2");
        assert_eq!(interp.state.positional, vec!["outer".to_string()]);
    }

    #[test]
    fn assignment_without_local_reaches_global() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "f() { y=from_fn; }; f");
        assert_eq!(interp.state.lookup("y"), Some("from_fn".into()));
    }

    #[test]
    fn funcname_stack() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "g() { FN=$FUNCNAME; }; f() { g; }; f");
        assert_eq!(interp.state.lookup("FN"), Some("g".into()));
    }
}
