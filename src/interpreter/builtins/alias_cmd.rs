//! `alias` and `unalias`.

use crate::interpreter::builtins::{eout, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;

pub fn run_alias(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 {
        let mut entries: Vec<(&String, &String)> = interp.state.aliases.iter().collect();
        entries.sort();
        for (name, value) in entries {
            out(&format!("alias {}='{}'\n", name, value.replace('\'', "'\\''")));
        }
        return Ok(0);
    }

    let mut status = 0;
    for arg in &args[1..] {
        if arg == "-p" {
            continue;
        }
        match arg.split_once('=') {
            Some((name, value)) => {
                interp.state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match interp.state.aliases.get(arg) {
                Some(value) => out(&format!("alias {}='{}'\n", arg, value.replace('\'', "'\\''"))),
                None => {
                    eout(&format!("psh: alias: {}: not found\n", arg));
                    status = 1;
                }
            },
        }
    }
    Ok(status)
}

pub fn run_unalias(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.get(1).map(String::as_str) == Some("-a") {
        interp.state.aliases.clear();
        return Ok(0);
    }
    let mut status = 0;
    for name in &args[1..] {
        if interp.state.aliases.remove(name).is_none() {
            eout(&format!("psh: unalias: {}: not found\n", name));
            status = 1;
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::interpreter::Interpreter;
    use crate::parser::Parser;

    fn run(interp: &mut Interpreter, src: &str) -> i32 {
        let script = Parser::new().parse(src).expect("parse");
        crate::interpreter::pipeline::exit_status_of(interp.run_script(&script))
    }

    #[test]
    fn define_and_remove() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "alias ll='ls -l'");
        assert_eq!(interp.state.aliases.get("ll").map(String::as_str), Some("ls -l"));
        run(&mut interp, "unalias ll");
        assert!(interp.state.aliases.is_empty());
    }

    #[test]
    fn alias_expansion_when_enabled() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "shopt -s expand_aliases; alias setx='x=aliased'; setx");
        assert_eq!(interp.state.lookup("x"), Some("aliased".into()));
    }

    #[test]
    fn unalias_all() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "alias a=1; alias b=2; unalias -a");
        assert!(interp.state.aliases.is_empty());
    }
}
