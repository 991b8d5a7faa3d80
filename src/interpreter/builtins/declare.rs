//! Variable-declaration builtins: declare/typeset, local, export,
//! readonly, unset.

use crate::interpreter::builtins::{eout, fail, out};
use crate::interpreter::errors::{ControlFlow, ExecResult};
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::vars::{VarAttrs, Variable, VarValue};
use crate::parser::lexer::assignment_eq_index;

#[derive(Default, Clone, Copy)]
struct DeclareFlags {
    indexed: bool,
    assoc: bool,
    readonly: bool,
    export: bool,
    integer: bool,
    lowercase: bool,
    uppercase: bool,
    nameref: bool,
    print: bool,
    /// `+x` style removals.
    remove_export: bool,
}

fn parse_flags(args: &[String]) -> Result<(DeclareFlags, usize), String> {
    let mut flags = DeclareFlags::default();
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        let (on, body) = if let Some(b) = arg.strip_prefix('-') {
            (true, b)
        } else if let Some(b) = arg.strip_prefix('+') {
            (false, b)
        } else {
            break;
        };
        if body.is_empty() || body.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
        if body == "-" {
            i += 1;
            break;
        }
        for c in body.chars() {
            match c {
                'a' => flags.indexed = on,
                'A' => flags.assoc = on,
                'r' => flags.readonly = on,
                'x' => {
                    if on {
                        flags.export = true;
                    } else {
                        flags.remove_export = true;
                    }
                }
                'i' => flags.integer = on,
                'l' => flags.lowercase = on,
                'u' => flags.uppercase = on,
                'n' => flags.nameref = on,
                'p' => flags.print = on,
                'g' | 'f' | 'F' => {}
                other => return Err(format!("-{}: invalid option", other)),
            }
        }
        i += 1;
    }
    if flags.lowercase && flags.uppercase {
        return Err("cannot use `-l' and `-u' together".into());
    }
    if flags.indexed && flags.assoc {
        return Err("cannot use `-a' and `-A' together".into());
    }
    Ok((flags, i))
}

fn apply_attrs(var: &mut Variable, flags: DeclareFlags) {
    if flags.readonly {
        var.attrs.insert(VarAttrs::READONLY);
    }
    if flags.export {
        var.attrs.insert(VarAttrs::EXPORT);
    }
    if flags.remove_export {
        var.attrs.remove(VarAttrs::EXPORT);
    }
    if flags.integer {
        var.attrs.insert(VarAttrs::INTEGER);
    }
    if flags.lowercase {
        var.attrs.insert(VarAttrs::LOWERCASE);
        var.attrs.remove(VarAttrs::UPPERCASE);
    }
    if flags.uppercase {
        var.attrs.insert(VarAttrs::UPPERCASE);
        var.attrs.remove(VarAttrs::LOWERCASE);
    }
    if flags.nameref {
        var.attrs.insert(VarAttrs::NAMEREF);
    }
    if flags.indexed && !matches!(var.value, VarValue::Indexed(_)) {
        let mut map = std::collections::BTreeMap::new();
        if let Some(existing) = var.as_display_scalar() {
            if !existing.is_empty() {
                map.insert(0, existing.to_string());
            }
        }
        var.value = VarValue::Indexed(map);
    }
    if flags.assoc && !matches!(var.value, VarValue::Assoc(_)) {
        var.value = VarValue::Assoc(indexmap::IndexMap::new());
    }
}

/// `NAME` or `NAME=value` operands shared by declare/local/export/readonly.
fn declare_operand(
    interp: &mut Interpreter,
    operand: &str,
    flags: DeclareFlags,
    local: bool,
) -> ExecResult<i32> {
    let (name, value) = match assignment_eq_index(operand) {
        Some(eq) => {
            let append = operand.as_bytes().get(eq.wrapping_sub(1)) == Some(&b'+');
            let name_end = if append { eq - 1 } else { eq };
            let name = operand[..name_end].to_string();
            let raw = &operand[eq + 1..];
            let value = interp.expand_text_as_word(raw)?;
            (name, Some((value, append)))
        }
        None => (operand.to_string(), None),
    };

    if !is_valid_name(&name) {
        eout(&format!("psh: declare: `{}': not a valid identifier\n", operand));
        return Ok(1);
    }

    if local {
        let mut var = match interp.state.scopes.get(&name) {
            Some(existing) => existing.clone(),
            None => Variable::scalar(""),
        };
        apply_attrs(&mut var, flags);
        if let Some((value, append)) = value {
            let value = if flags.integer {
                interp.eval_arith_text(&value)?.to_string()
            } else {
                var.transform(value)
            };
            let value = if append {
                format!("{}{}", var.as_display_scalar().unwrap_or(""), value)
            } else {
                value
            };
            var.value = VarValue::Scalar(value);
        } else if !matches!(var.value, VarValue::Indexed(_) | VarValue::Assoc(_)) && interp.state.scopes.get(&name).is_none() {
            var.value = VarValue::Scalar(String::new());
        }
        interp.state.scopes.set_local(&name, var).map_err(ControlFlow::from)?;
        return Ok(0);
    }

    interp
        .state
        .scopes
        .with_var(&name, |var| apply_attrs(var, flags))
        .map_err(ControlFlow::from)?;
    if let Some((value, append)) = value {
        let value = if flags.integer {
            interp.eval_arith_text(&value)?.to_string()
        } else {
            value
        };
        let assignment = crate::ast::Ast::assignment(
            name.clone(),
            None,
            Some(crate::ast::Ast::word(vec![crate::ast::Ast::literal(value)])),
            append,
            None,
        );
        interp.apply_assignment(&assignment, false)?;
    }
    Ok(0)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

pub fn run_declare(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let (flags, first_operand) = match parse_flags(args) {
        Ok(x) => x,
        Err(message) => return fail("declare", &message, 2),
    };

    if flags.print || first_operand >= args.len() {
        return print_declarations(interp, &args[first_operand..]);
    }

    let mut status = 0;
    let operands: Vec<String> = args[first_operand..].to_vec();
    let local = interp.state.call_depth > 0;
    for operand in &operands {
        status = declare_operand(interp, operand, flags, local && is_declare_local(args))?;
    }
    Ok(status)
}

/// Inside a function, plain `declare` behaves like `local`.
fn is_declare_local(args: &[String]) -> bool {
    !args.iter().any(|a| a == "-g")
}

pub fn run_local(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if interp.state.call_depth == 0 {
        return fail("local", "can only be used in a function", 1);
    }
    let (flags, first_operand) = match parse_flags(args) {
        Ok(x) => x,
        Err(message) => return fail("local", &message, 2),
    };
    let mut status = 0;
    let operands: Vec<String> = args[first_operand..].to_vec();
    for operand in &operands {
        status = declare_operand(interp, operand, flags, true)?;
    }
    Ok(status)
}

pub fn run_export(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 || args.get(1).map(String::as_str) == Some("-p") {
        let mut env = interp.state.child_environment();
        env.sort();
        for entry in env {
            match entry.split_once('=') {
                Some((name, value)) => out(&format!("declare -x {}=\"{}\"\n", name, value)),
                None => out(&format!("declare -x {}\n", entry)),
            }
        }
        return Ok(0);
    }
    let flags = DeclareFlags { export: true, ..Default::default() };
    let mut status = 0;
    let operands: Vec<String> =
        args[1..].iter().filter(|a| a.as_str() != "-n").cloned().collect();
    for operand in &operands {
        status = declare_operand(interp, operand, flags, false)?;
    }
    Ok(status)
}

pub fn run_readonly(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 || args.get(1).map(String::as_str) == Some("-p") {
        for name in interp.state.scopes.visible_names() {
            if interp.state.scopes.get(&name).map_or(false, |v| v.is_readonly()) {
                let value = interp
                    .state
                    .scopes
                    .get(&name)
                    .and_then(|v| v.as_display_scalar())
                    .unwrap_or("")
                    .to_string();
                out(&format!("declare -r {}=\"{}\"\n", name, value));
            }
        }
        return Ok(0);
    }
    let flags = DeclareFlags { readonly: true, ..Default::default() };
    let mut status = 0;
    let operands: Vec<String> = args[1..].to_vec();
    for operand in &operands {
        status = declare_operand(interp, operand, flags, false)?;
    }
    Ok(status)
}

pub fn run_unset(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut unset_function = false;
    let mut start = 1;
    match args.get(1).map(String::as_str) {
        Some("-f") => {
            unset_function = true;
            start = 2;
        }
        Some("-v") => start = 2,
        _ => {}
    }

    let mut status = 0;
    let names: Vec<String> = args[start..].to_vec();
    for name in &names {
        if unset_function {
            interp.state.functions.remove(name);
            continue;
        }
        // `unset arr[3]` removes one element.
        if let Some((base, sub)) = name.strip_suffix(']').and_then(|s| s.split_once('[')) {
            let base = base.to_string();
            let is_assoc = matches!(
                interp.state.scopes.get(&base).map(|v| &v.value),
                Some(VarValue::Assoc(_))
            );
            if is_assoc {
                let key = interp.expand_text_as_word(sub)?;
                let _ = interp.state.scopes.with_var(&base, |v| {
                    if let VarValue::Assoc(map) = &mut v.value {
                        map.shift_remove(&key);
                    }
                });
            } else {
                let index = interp.eval_arith_text(sub)?;
                let _ = interp.state.scopes.with_var(&base, |v| {
                    if let VarValue::Indexed(map) = &mut v.value {
                        map.remove(&index);
                    }
                });
            }
            continue;
        }
        if interp.state.scopes.unset(name).is_err() {
            eout(&format!("psh: unset: {}: cannot unset: readonly variable\n", name));
            status = 1;
        } else if interp.state.functions.contains_key(name)
            && interp.state.scopes.get(name).is_none()
        {
            // POSIX: unset without -v falls back to functions when no
            // variable exists.
        }
    }
    Ok(status)
}

fn print_declarations(interp: &mut Interpreter, names: &[String]) -> ExecResult {
    let mut all: Vec<String> = if names.is_empty() {
        interp.state.scopes.visible_names()
    } else {
        names.to_vec()
    };
    all.sort();
    let mut status = 0;
    for name in all {
        match interp.state.scopes.get(&name) {
            Some(var) => out(&format_declaration(&name, var)),
            None => {
                if !names.is_empty() {
                    eout(&format!("psh: declare: {}: not found\n", name));
                    status = 1;
                }
            }
        }
    }
    Ok(status)
}

fn format_declaration(name: &str, var: &Variable) -> String {
    let mut flags = String::new();
    if matches!(var.value, VarValue::Indexed(_)) {
        flags.push('a');
    }
    if matches!(var.value, VarValue::Assoc(_)) {
        flags.push('A');
    }
    if var.attrs.contains(VarAttrs::INTEGER) {
        flags.push('i');
    }
    if var.attrs.contains(VarAttrs::LOWERCASE) {
        flags.push('l');
    }
    if var.attrs.contains(VarAttrs::NAMEREF) {
        flags.push('n');
    }
    if var.attrs.contains(VarAttrs::READONLY) {
        flags.push('r');
    }
    if var.attrs.contains(VarAttrs::UPPERCASE) {
        flags.push('u');
    }
    if var.attrs.contains(VarAttrs::EXPORT) {
        flags.push('x');
    }
    if flags.is_empty() {
        flags.push('-');
    }

    match &var.value {
        VarValue::Scalar(s) => format!("declare -{} {}=\"{}\"\n", flags, name, s),
        VarValue::Indexed(map) => {
            let elems: Vec<String> =
                map.iter().map(|(k, v)| format!("[{}]=\"{}\"", k, v)).collect();
            format!("declare -{} {}=({})\n", flags, name, elems.join(" "))
        }
        VarValue::Assoc(map) => {
            let elems: Vec<String> =
                map.iter().map(|(k, v)| format!("[{}]=\"{}\"", k, v)).collect();
            format!("declare -{} {}=({})\n", flags, name, elems.join(" "))
        }
        VarValue::Tombstone => format!("declare -{} {}\n", flags, name),
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
    fn declare_integer_evaluates() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "declare -i n=2+3");
        assert_eq!(interp.state.lookup("n"), Some("5".into()));
        run(&mut interp, "n=10/2");
        assert_eq!(interp.state.lookup("n"), Some("5".into()));
    }

    #[test]
    fn declare_uppercase() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "declare -u loud=hello");
        assert_eq!(interp.state.lookup("loud"), Some("HELLO".into()));
    }

    #[test]
    fn readonly_rejects_reassignment() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "readonly fixed=1");
        let status = run(&mut interp, "fixed=2");
        assert_ne!(status, 0);
        assert_eq!(interp.state.lookup("fixed"), Some("1".into()));
    }

    #[test]
    fn export_marks_variable() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "export MARKED=yes");
        assert!(interp.state.scopes.get("MARKED").map_or(false, |v| v.is_exported()));
    }

    #[test]
    fn declare_assoc_array() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "declare -A m; m[alpha]=1; m[beta]=2");
        match interp.state.scopes.get("m").map(|v| v.value.clone()) {
            Some(VarValue::Assoc(map)) => {
                assert_eq!(map.get("alpha").map(String::as_str), Some("1"));
                assert_eq!(map.get("beta").map(String::as_str), Some("2"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unset_array_element() {
        let mut interp = Interpreter::new(false);
        run(&mut interp, "arr=(a b c); unset arr[1]");
        match interp.state.scopes.get("arr").map(|v| v.value.clone()) {
            Some(VarValue::Indexed(map)) => {
                assert_eq!(map.len(), 2);
                assert!(!map.contains_key(&1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_identifier_rejected() {
        let mut interp = Interpreter::new(false);
        let status = run(&mut interp, "declare 1abc=x");
        assert_eq!(status, 1);
    }
}
