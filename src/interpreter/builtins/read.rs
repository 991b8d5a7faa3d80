//! `read`: one line from stdin into variables, IFS-split.

use crate::interpreter::builtins::eout;
use crate::interpreter::errors::{ControlFlow, ExecResult};
use crate::interpreter::interpreter::Interpreter;
use crate::system::process;

pub fn run_read(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut raw = false;
    let mut prompt: Option<String> = None;
    let mut names: Vec<&String> = Vec::new();
    let mut silent = false;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-r" => raw = true,
            "-s" => silent = true,
            "-p" => {
                prompt = iter.next().cloned();
                if prompt.is_none() {
                    eout("psh: read: -p: option requires an argument\n");
                    return Ok(2);
                }
            }
            "--" => {
                names.extend(iter.by_ref());
                break;
            }
            _ => names.push(arg),
        }
    }
    let _ = silent; // terminal echo control is the line editor's concern

    if let Some(p) = &prompt {
        let _ = process::write_all(libc::STDERR_FILENO, p.as_bytes());
    }

    let line = match read_logical_line(raw) {
        Some(line) => line,
        None => return Ok(1), // EOF
    };

    if names.is_empty() {
        interp
            .state
            .assign("REPLY", line)
            .map_err(ControlFlow::from)?;
        return Ok(0);
    }

    // Split into at most `names.len()` fields; the last name takes the
    // remainder unsplit (with trailing IFS whitespace trimmed).
    let ifs = interp.state.ifs();
    let fields = split_for_read(&line, &ifs, names.len());
    for (i, name) in names.iter().enumerate() {
        let value = fields.get(i).cloned().unwrap_or_default();
        interp.state.assign(name, value).map_err(ControlFlow::from)?;
    }
    Ok(0)
}

/// Read one logical line; without `-r`, `\` escapes the newline (line
/// continuation) and any other character.
fn read_logical_line(raw: bool) -> Option<String> {
    let mut line = String::new();
    let mut buf = [0u8; 1];
    let mut pending = Vec::new();
    let mut got_any = false;
    loop {
        match process::read_fd(libc::STDIN_FILENO, &mut buf) {
            Ok(0) => {
                if !got_any {
                    return None;
                }
                break;
            }
            Ok(_) => {
                got_any = true;
                let c = buf[0];
                if c == b'\n' {
                    if !raw && pending.last() == Some(&b'\\') {
                        pending.pop();
                        continue;
                    }
                    break;
                }
                pending.push(c);
            }
            Err(_) => {
                if !got_any {
                    return None;
                }
                break;
            }
        }
    }
    let text = String::from_utf8_lossy(&pending).into_owned();
    if raw {
        line.push_str(&text);
    } else {
        // Drop backslashes that escape the next character.
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    line.push(next);
                }
            } else {
                line.push(c);
            }
        }
    }
    Some(line)
}

/// Field splitting for `read`: like IFS splitting, but the last
/// variable swallows the rest of the line.
fn split_for_read(line: &str, ifs: &str, nfields: usize) -> Vec<String> {
    if nfields == 1 {
        return vec![trim_ifs(line, ifs).to_string()];
    }
    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let trimmed = trim_ifs(line, ifs);
    let chars: Vec<char> = trimmed.chars().collect();

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        if fields.len() + 1 == nfields {
            // Last field: take everything left.
            let rest: String = chars[i..].iter().collect();
            current.push_str(&rest);
            break;
        }
        let c = chars[i];
        if ifs.contains(c) {
            fields.push(std::mem::take(&mut current));
            i += 1;
            // Collapse the whitespace around the boundary.
            while i < chars.len() && ws.contains(&chars[i]) {
                i += 1;
            }
            continue;
        }
        current.push(c);
        i += 1;
    }
    fields.push(current);
    fields
}

fn trim_ifs<'a>(line: &'a str, ifs: &str) -> &'a str {
    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    line.trim_matches(|c| ws.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_basic() {
        assert_eq!(split_for_read("a b c", " \t\n", 2), vec!["a", "b c"]);
        assert_eq!(split_for_read("a b c", " \t\n", 3), vec!["a", "b", "c"]);
    }

    #[test]
    fn last_field_takes_remainder() {
        assert_eq!(split_for_read("one two three four", " \t\n", 2), vec!["one", "two three four"]);
    }

    #[test]
    fn fewer_fields_than_names() {
        assert_eq!(split_for_read("only", " \t\n", 1), vec!["only"]);
    }

    #[test]
    fn whitespace_trimmed() {
        assert_eq!(split_for_read("  x  y  ", " \t\n", 2), vec!["x", "y"]);
    }
}
