//! `cd` and `pwd`.

use crate::interpreter::builtins::{fail, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::vars::Variable;

pub fn run_cd(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut physical = false;
    let mut target: Option<&str> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "-P" => physical = true,
            "-L" => physical = false,
            other => {
                target = Some(other);
                break;
            }
        }
    }

    let oldpwd = interp.state.lookup("PWD").unwrap_or_default();
    let dest = match target {
        None => match interp.state.lookup("HOME") {
            Some(home) => home,
            None => return fail("cd", "HOME not set", 1),
        },
        Some("-") => match interp.state.lookup("OLDPWD") {
            Some(old) => {
                out(&format!("{}\n", old));
                old
            }
            None => return fail("cd", "OLDPWD not set", 1),
        },
        Some(path) => path.to_string(),
    };

    if let Err(e) = std::env::set_current_dir(&dest) {
        return fail("cd", &format!("{}: {}", dest, e), 1);
    }

    let new_pwd = if physical {
        std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| dest.clone())
    } else {
        normalize_logical(&oldpwd, &dest)
    };
    let _ = interp.state.scopes.set_var("OLDPWD", Variable::exported(oldpwd));
    let _ = interp.state.scopes.set_var("PWD", Variable::exported(new_pwd));
    Ok(0)
}

pub fn run_pwd(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let physical = args.iter().skip(1).any(|a| a == "-P");
    let pwd = if physical {
        std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        interp.state.lookup("PWD").unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    };
    out(&format!("{}\n", pwd));
    Ok(0)
}

/// Logical path arithmetic: resolve `.` and `..` textually against the
/// previous `$PWD` without consulting symlinks.
fn normalize_logical(base: &str, dest: &str) -> String {
    let joined = if dest.starts_with('/') {
        dest.to_string()
    } else {
        format!("{}/{}", base, dest)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_normalization() {
        assert_eq!(normalize_logical("/home/me", ".."), "/home");
        assert_eq!(normalize_logical("/home/me", "../other"), "/home/other");
        assert_eq!(normalize_logical("/a/b", "/tmp"), "/tmp");
        assert_eq!(normalize_logical("/", "x/./y"), "/x/y");
        assert_eq!(normalize_logical("/a", "../../.."), "/");
    }
}
