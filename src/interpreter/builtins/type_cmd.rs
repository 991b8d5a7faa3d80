//! `type`: report how a name would be resolved.

use crate::interpreter::builtins::{eout, is_builtin, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;
use crate::system::process;

pub fn run_type(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut brief = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-t" => brief = true,
            "-a" | "-p" | "-P" => {}
            _ => names.push(arg),
        }
    }

    let mut status = 0;
    for name in names {
        if let Some(value) = interp.state.aliases.get(name.as_str()) {
            if brief {
                out("alias\n");
            } else {
                out(&format!("{} is aliased to `{}'\n", name, value));
            }
            continue;
        }
        if interp.state.functions.contains_key(name.as_str()) {
            if brief {
                out("function\n");
            } else {
                out(&format!("{} is a function\n", name));
            }
            continue;
        }
        if crate::parser::lexer::is_reserved_word(name) {
            if brief {
                out("keyword\n");
            } else {
                out(&format!("{} is a shell keyword\n", name));
            }
            continue;
        }
        if is_builtin(name) {
            if brief {
                out("builtin\n");
            } else {
                out(&format!("{} is a shell builtin\n", name));
            }
            continue;
        }
        match process::find_in_path(name, &interp.state.path_var()) {
            Some(path) => {
                if brief {
                    out("file\n");
                } else {
                    out(&format!("{} is {}\n", name, path.display()));
                }
            }
            None => {
                if !brief {
                    eout(&format!("psh: type: {}: not found\n", name));
                }
                status = 1;
            }
        }
    }
    Ok(status)
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
    fn builtin_and_keyword_and_missing() {
        assert_eq!(run("type cd"), 0);
        assert_eq!(run("type if"), 0);
        assert_eq!(run("type no-such-command-zz"), 1);
    }

    #[test]
    fn function_detection() {
        assert_eq!(run("f() { :; }; type f"), 0);
    }
}
