//! `set` and `shopt`.

use crate::interpreter::builtins::{eout, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::options::{ShellOptions, ShoptOptions};

pub fn run_set(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 {
        // Print variables, sorted.
        let mut names = interp.state.scopes.visible_names();
        names.sort();
        for name in names {
            if let Some(value) =
                interp.state.scopes.get(&name).and_then(|v| v.as_display_scalar())
            {
                out(&format!("{}='{}'\n", name, value.replace('\'', "'\\''")));
            }
        }
        return Ok(0);
    }

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                // Remaining args replace the positional parameters.
                interp.state.positional = args[i + 1..].to_vec();
                return Ok(0);
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match args.get(i + 1) {
                    Some(name) => {
                        if !interp.state.options.set_named(name, enable) {
                            eout(&format!("psh: set: {}: invalid option name\n", name));
                            return Ok(2);
                        }
                        i += 2;
                    }
                    None => {
                        for name in ShellOptions::NAMED {
                            let on = interp.state.options.get_named(name).unwrap_or(false);
                            if enable {
                                out(&format!("{:<15} {}\n", name, if on { "on" } else { "off" }));
                            } else {
                                out(&format!("set {}o {}\n", if on { "-" } else { "+" }, name));
                            }
                        }
                        i += 1;
                    }
                }
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                for flag in arg[1..].chars() {
                    if !interp.state.options.set_short(flag, true) {
                        eout(&format!("psh: set: -{}: invalid option\n", flag));
                        return Ok(2);
                    }
                }
                i += 1;
            }
            _ if arg.starts_with('+') && arg.len() > 1 => {
                for flag in arg[1..].chars() {
                    if !interp.state.options.set_short(flag, false) {
                        eout(&format!("psh: set: +{}: invalid option\n", flag));
                        return Ok(2);
                    }
                }
                i += 1;
            }
            _ => {
                // First non-option: the rest are positional parameters.
                interp.state.positional = args[i..].to_vec();
                return Ok(0);
            }
        }
    }
    Ok(0)
}

pub fn run_shopt(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut mode: Option<bool> = None;
    let mut quiet = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-s" => mode = Some(true),
            "-u" => mode = Some(false),
            "-q" => quiet = true,
            "-p" => {}
            _ => names.push(arg),
        }
    }

    if names.is_empty() {
        for name in ShoptOptions::NAMED {
            let on = interp.state.shopt.get_named(name).unwrap_or(false);
            match mode {
                Some(true) if !on => continue,
                Some(false) if on => continue,
                _ => {}
            }
            if !quiet {
                out(&format!("{:<15}\t{}\n", name, if on { "on" } else { "off" }));
            }
        }
        return Ok(0);
    }

    let mut status = 0;
    for name in names {
        match mode {
            Some(on) => {
                if !interp.state.shopt.set_named(name, on) {
                    eout(&format!("psh: shopt: {}: invalid shell option name\n", name));
                    status = 1;
                }
            }
            None => match interp.state.shopt.get_named(name) {
                Some(on) => {
                    if !quiet {
                        out(&format!("{:<15}\t{}\n", name, if on { "on" } else { "off" }));
                    }
                    if !on {
                        status = 1;
                    }
                }
                None => {
                    eout(&format!("psh: shopt: {}: invalid shell option name\n", name));
                    status = 1;
                }
            },
        }
    }
    Ok(status)
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
    fn set_short_flags() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "set -eu");
        assert!(interp.state.options.errexit);
        assert!(interp.state.options.nounset);
        run(&mut interp, "set +e");
        assert!(!interp.state.options.errexit);
    }

    #[test]
    fn set_o_named() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "set -o pipefail");
        assert!(interp.state.options.pipefail);
        run(&mut interp, "set +o pipefail");
        assert!(!interp.state.options.pipefail);
    }

    #[test]
    fn set_positional_parameters() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "set -- a b c");
        assert_eq!(interp.state.positional, vec!["a", "b", "c"]);
    }

    #[test]
    fn shopt_toggles() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "shopt -s extglob nullglob");
        assert!(interp.state.shopt.extglob);
        assert!(interp.state.shopt.nullglob);
        run(&mut interp, "shopt -u nullglob");
        assert!(!interp.state.shopt.nullglob);
    }

    #[test]
    fn shopt_query_status() {
        let mut interp = Interpreter::new(false);
        assert_eq!(run(&mut interp, "shopt -q extglob"), 1);
        run(&mut interp, "shopt -s extglob");
        assert_eq!(run(&mut interp, "shopt -q extglob"), 0);
    }
}
