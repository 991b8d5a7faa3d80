//! `printf`, with its own little format-string parser.
//!
//! The format is applied repeatedly until the arguments run out, as
//! POSIX requires; missing string arguments print empty, missing
//! numeric arguments print zero.

use crate::interpreter::builtins::{eout, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;

pub fn run_printf(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut args_iter = args[1..].iter();
    let mut assign_var: Option<String> = None;

    let mut format = match args_iter.next() {
        Some(first) if first == "-v" => {
            assign_var = args_iter.next().cloned();
            if assign_var.is_none() {
                eout("psh: printf: -v: option requires an argument\n");
                return Ok(2);
            }
            match args_iter.next() {
                Some(f) => f.clone(),
                None => {
                    eout("psh: printf: usage: printf [-v var] format [arguments]\n");
                    return Ok(2);
                }
            }
        }
        Some(first) => first.clone(),
        None => {
            eout("psh: printf: usage: printf [-v var] format [arguments]\n");
            return Ok(2);
        }
    };
    if format == "--" {
        format = match args_iter.next() {
            Some(f) => f.clone(),
            None => String::new(),
        };
    }

    let arguments: Vec<&String> = args_iter.collect();
    let mut output = String::new();
    let mut index = 0;
    let mut status = 0;

    loop {
        let consumed = render_format(&format, &arguments, &mut index, &mut output, &mut status);
        // Repeat the format while arguments remain, but only if it
        // consumes at least one per pass (else infinite loop).
        if index >= arguments.len() || consumed == 0 {
            break;
        }
    }

    match assign_var {
        Some(name) => {
            interp
                .state
                .assign(&name, output)
                .map_err(crate::interpreter::errors::ControlFlow::from)?;
        }
        None => out(&output),
    }
    Ok(status)
}

/// One pass over the format string. Returns how many arguments were
/// consumed.
fn render_format(
    format: &str,
    arguments: &[&String],
    index: &mut usize,
    output: &mut String,
    status: &mut i32,
) -> usize {
    let chars: Vec<char> = format.chars().collect();
    let start_index = *index;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let (decoded, len) = decode_escape(&chars[i..]);
                output.push_str(&decoded);
                i += len;
            }
            '%' => {
                if chars.get(i + 1) == Some(&'%') {
                    output.push('%');
                    i += 2;
                    continue;
                }
                match parse_spec(&chars[i..]) {
                    Some(spec) => {
                        let arg = arguments.get(*index).map(|s| s.as_str());
                        if spec.conversion != '%' {
                            *index += 1;
                        }
                        render_one(&spec, arg, output, status);
                        i += spec.length;
                    }
                    None => {
                        output.push('%');
                        i += 1;
                    }
                }
            }
            c => {
                output.push(c);
                i += 1;
            }
        }
    }
    *index - start_index
}

struct Spec {
    flags: String,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
    /// Chars consumed from the format, `%` included.
    length: usize,
}

fn parse_spec(chars: &[char]) -> Option<Spec> {
    debug_assert_eq!(chars.first(), Some(&'%'));
    let mut i = 1;
    let mut flags = String::new();
    while matches!(chars.get(i), Some('-') | Some('+') | Some(' ') | Some('#') | Some('0')) {
        flags.push(chars[i]);
        i += 1;
    }
    let mut width = String::new();
    while matches!(chars.get(i), Some(c) if c.is_ascii_digit()) {
        width.push(chars[i]);
        i += 1;
    }
    let mut precision: Option<usize> = None;
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut digits = String::new();
        while matches!(chars.get(i), Some(c) if c.is_ascii_digit()) {
            digits.push(chars[i]);
            i += 1;
        }
        precision = Some(digits.parse().unwrap_or(0));
    }
    let conversion = *chars.get(i)?;
    if !matches!(conversion, 'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'c' | 's' | 'b' | 'q' | 'e' | 'f' | 'g' | '%') {
        return None;
    }
    Some(Spec {
        flags,
        width: width.parse().ok(),
        precision,
        conversion,
        length: i + 1,
    })
}

fn render_one(spec: &Spec, arg: Option<&str>, output: &mut String, status: &mut i32) {
    let text = match spec.conversion {
        'd' | 'i' => format_integer(arg, spec, status, |n| n.to_string()),
        'u' => format_integer(arg, spec, status, |n| (n as u64).to_string()),
        'o' => format_integer(arg, spec, status, |n| format!("{:o}", n)),
        'x' => format_integer(arg, spec, status, |n| format!("{:x}", n)),
        'X' => format_integer(arg, spec, status, |n| format!("{:X}", n)),
        'e' | 'f' | 'g' => {
            let value: f64 = arg.and_then(|a| a.trim().parse().ok()).unwrap_or_else(|| {
                if arg.map_or(false, |a| !a.trim().is_empty()) {
                    *status = 1;
                }
                0.0
            });
            let precision = spec.precision.unwrap_or(6);
            match spec.conversion {
                'e' => format!("{:.*e}", precision, value),
                'g' => format!("{}", value),
                _ => format!("{:.*}", precision, value),
            }
        }
        'c' => arg.and_then(|a| a.chars().next()).map(|c| c.to_string()).unwrap_or_default(),
        'b' => {
            // Like %s but interprets escapes in the argument.
            let raw = arg.unwrap_or("");
            let chars: Vec<char> = raw.chars().collect();
            let mut decoded = String::new();
            let mut i = 0;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    let (piece, len) = decode_escape(&chars[i..]);
                    decoded.push_str(&piece);
                    i += len;
                } else {
                    decoded.push(chars[i]);
                    i += 1;
                }
            }
            decoded
        }
        'q' => shell_quote(arg.unwrap_or("")),
        's' => {
            let mut s = arg.unwrap_or("").to_string();
            if let Some(p) = spec.precision {
                s = s.chars().take(p).collect();
            }
            s
        }
        _ => String::new(),
    };

    match spec.width {
        Some(width) if text.chars().count() < width => {
            let pad = width - text.chars().count();
            if spec.flags.contains('-') {
                output.push_str(&text);
                output.push_str(&" ".repeat(pad));
            } else if spec.flags.contains('0')
                && matches!(spec.conversion, 'd' | 'i' | 'u' | 'o' | 'x' | 'X')
            {
                if let Some(stripped) = text.strip_prefix('-') {
                    output.push('-');
                    output.push_str(&"0".repeat(pad));
                    output.push_str(stripped);
                } else {
                    output.push_str(&"0".repeat(pad));
                    output.push_str(&text);
                }
            } else {
                output.push_str(&" ".repeat(pad));
                output.push_str(&text);
            }
        }
        _ => output.push_str(&text),
    }
}

fn format_integer<F>(arg: Option<&str>, spec: &Spec, status: &mut i32, render: F) -> String
where
    F: Fn(i64) -> String,
{
    let value = match arg.map(str::trim) {
        None | Some("") => 0,
        // A leading quote means "character code of the next char".
        Some(s) if s.starts_with('\'') || s.starts_with('"') => {
            s.chars().nth(1).map_or(0, |c| c as i64)
        }
        Some(s) => match crate::interpreter::arithmetic::parse_literal(s) {
            Ok(n) => n,
            Err(_) => {
                *status = 1;
                0
            }
        },
    };
    let mut text = render(value);
    if spec.flags.contains('+') && value >= 0 && matches!(spec.conversion, 'd' | 'i') {
        text = format!("+{}", text);
    }
    text
}

/// `%q`: quote so the result survives re-parsing.
fn shell_quote(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    if text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '%' | '+' | ',' | '@'))
    {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// Backslash escapes in the format string.
fn decode_escape(chars: &[char]) -> (String, usize) {
    debug_assert_eq!(chars.first(), Some(&'\\'));
    match chars.get(1) {
        Some('n') => ("\n".into(), 2),
        Some('t') => ("\t".into(), 2),
        Some('r') => ("\r".into(), 2),
        Some('a') => ("\x07".into(), 2),
        Some('b') => ("\x08".into(), 2),
        Some('f') => ("\x0c".into(), 2),
        Some('v') => ("\x0b".into(), 2),
        Some('e') => ("\x1b".into(), 2),
        Some('\\') => ("\\".into(), 2),
        Some('"') => ("\"".into(), 2),
        Some('\'') => ("'".into(), 2),
        Some('0'..='7') => {
            let mut value = 0u32;
            let mut n = 1;
            while n <= 3 {
                match chars.get(n).and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        n += 1;
                    }
                    None => break,
                }
            }
            (char::from_u32(value).map(String::from).unwrap_or_default(), n)
        }
        Some('x') => {
            let mut value = 0u32;
            let mut n = 2;
            while n < 4 {
                match chars.get(n).and_then(|c| c.to_digit(16)) {
                    Some(d) => {
                        value = value * 16 + d;
                        n += 1;
                    }
                    None => break,
                }
            }
            if n == 2 {
                ("\\x".into(), 2)
            } else {
                (char::from_u32(value).map(String::from).unwrap_or_default(), n)
            }
        }
        Some(other) => (format!("\\{}", other), 2),
        None => ("\\".into(), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(format: &str, args: &[&str]) -> String {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let refs: Vec<&String> = owned.iter().collect();
        let mut out = String::new();
        let mut index = 0;
        let mut status = 0;
        loop {
            let consumed = render_format(format, &refs, &mut index, &mut out, &mut status);
            if index >= refs.len() || consumed == 0 {
                break;
            }
        }
        out
    }

    #[test]
    fn string_and_integer() {
        assert_eq!(render("%s=%d\n", &["x", "42"]), "x=42\n");
    }

    #[test]
    fn format_repeats_until_args_exhausted() {
        assert_eq!(render("<%s>\n", &["a", "b", "c"]), "<a>\n<b>\n<c>\n");
    }

    #[test]
    fn missing_args_render_empty_and_zero() {
        assert_eq!(render("%s:%d", &[]), ":0");
    }

    #[test]
    fn width_and_alignment() {
        assert_eq!(render("[%5s]", &["ab"]), "[   ab]");
        assert_eq!(render("[%-5s]", &["ab"]), "[ab   ]");
        assert_eq!(render("[%05d]", &["42"]), "[00042]");
        assert_eq!(render("[%05d]", &["-42"]), "[-0042]");
    }

    #[test]
    fn precision_truncates_strings() {
        assert_eq!(render("%.3s", &["abcdef"]), "abc");
    }

    #[test]
    fn hex_octal() {
        assert_eq!(render("%x %o %X", &["255", "8", "255"]), "ff 10 FF");
    }

    #[test]
    fn percent_literal() {
        assert_eq!(render("100%%", &[]), "100%");
    }

    #[test]
    fn escapes_in_format() {
        assert_eq!(render("a\\tb\\n", &[]), "a\tb\n");
    }

    #[test]
    fn char_code_argument() {
        assert_eq!(render("%d", &["'A"]), "65");
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote(""), "''");
    }
}
