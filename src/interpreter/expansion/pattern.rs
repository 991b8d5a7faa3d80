//! Shell pattern matching.
//!
//! Glob patterns (`*`, `?`, `[…]`, and the extglob forms) are translated
//! to regexes and compiled with `regex-lite`. Used by parameter
//! expansion (`${v#pat}`, `${v/pat/rep}`), `case`, `[[ == ]]`, and as
//! the matching core of pathname expansion.

use std::collections::HashMap;

use regex_lite::Regex;

lazy_static::lazy_static! {
    /// POSIX character-class bodies, as regex class fragments.
    static ref POSIX_CLASSES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("alnum", "a-zA-Z0-9");
        m.insert("alpha", "a-zA-Z");
        m.insert("ascii", "\\x00-\\x7f");
        m.insert("blank", " \\t");
        m.insert("cntrl", "\\x00-\\x1f\\x7f");
        m.insert("digit", "0-9");
        m.insert("graph", "!-~");
        m.insert("lower", "a-z");
        m.insert("print", " -~");
        m.insert("punct", "!-/:-@\\[-`{-~");
        m.insert("space", " \\t\\n\\r\\x0b\\x0c");
        m.insert("upper", "A-Z");
        m.insert("word", "a-zA-Z0-9_");
        m.insert("xdigit", "0-9A-Fa-f");
        m
    };
}

fn is_regex_special(c: char) -> bool {
    matches!(
        c,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    )
}

fn push_literal(out: &mut String, c: char) {
    if is_regex_special(c) {
        out.push('\\');
    }
    out.push(c);
}

/// Translate a shell pattern to a regex fragment (unanchored).
///
/// `greedy` selects whether `*`/`?` translate greedy or lazy: shortest
/// prefix/suffix removal needs the lazy forms.
pub fn pattern_to_regex(pattern: &str, greedy: bool, extglob: bool) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Extglob group: `@( … | … )` and friends.
        if extglob
            && matches!(c, '@' | '*' | '+' | '?' | '!')
            && chars.get(i + 1) == Some(&'(')
        {
            if let Some(close) = find_group_end(&chars, i + 2) {
                let body: String = chars[i + 2..close].iter().collect();
                let alternatives = split_alternatives(&body);
                let alt_regex: Vec<String> = alternatives
                    .iter()
                    .map(|alt| pattern_to_regex(alt, greedy, extglob))
                    .collect();
                let joined = alt_regex.join("|");
                match c {
                    '@' => out.push_str(&format!("(?:{})", joined)),
                    '*' => out.push_str(&format!("(?:{})*", joined)),
                    '+' => out.push_str(&format!("(?:{})+", joined)),
                    '?' => out.push_str(&format!("(?:{})?", joined)),
                    // regex-lite has no look-around; an embedded
                    // complement over-matches. Whole-pattern complements
                    // are inverted exactly in `pattern_matches`.
                    '!' => out.push_str(".*"),
                    _ => unreachable!(),
                }
                i = close + 1;
                continue;
            }
        }

        match c {
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    push_literal(&mut out, next);
                    i += 2;
                } else {
                    out.push_str("\\\\");
                    i += 1;
                }
            }
            '*' => {
                out.push_str(if greedy { ".*" } else { ".*?" });
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => {
                match translate_bracket(&chars, i) {
                    Some((fragment, next)) => {
                        out.push_str(&fragment);
                        i = next;
                    }
                    None => {
                        // Unclosed class: literal `[`.
                        out.push_str("\\[");
                        i += 1;
                    }
                }
            }
            c => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
    }
    out
}

/// Translate `[…]` starting at `chars[open] == '['`. Returns the regex
/// fragment and the index just past the closing bracket.
fn translate_bracket(chars: &[char], open: usize) -> Option<(String, usize)> {
    let mut i = open + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut body = String::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            i += 1;
            break;
        }
        first = false;
        // POSIX class: [:alpha:]
        if c == '['
            && chars.get(i + 1) == Some(&':')
        {
            if let Some(end) = find_class_end(chars, i + 2) {
                let name: String = chars[i + 2..end].iter().collect();
                if let Some(expansion) = POSIX_CLASSES.get(name.as_str()) {
                    body.push_str(expansion);
                }
                i = end + 2; // past `:]`
                continue;
            }
        }
        match c {
            '\\' => {
                body.push('\\');
                body.push('\\');
                i += 1;
            }
            '^' => {
                body.push_str("\\^");
                i += 1;
            }
            c => {
                if c == '[' {
                    body.push_str("\\[");
                } else {
                    body.push(c);
                }
                i += 1;
            }
        }
    }
    let prefix = if negated { "^" } else { "" };
    Some((format!("[{}{}]", prefix, body), i))
}

fn find_class_end(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == ':' && chars[i + 1] == ']' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Matching `)` for an extglob group, extglob-nesting aware.
fn find_group_end(chars: &[char], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split extglob alternatives on `|` at depth zero.
fn split_alternatives(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut iter = body.chars().peekable();
    while let Some(c) = iter.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(&n) = iter.peek() {
                    current.push(n);
                    iter.next();
                }
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if depth == 0 => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

/// Compile a shell pattern for whole-string matching.
pub fn compile_pattern(pattern: &str, extglob: bool, nocase: bool) -> Option<Regex> {
    let body = pattern_to_regex(pattern, true, extglob);
    let flags = if nocase { "(?is)" } else { "(?s)" };
    Regex::new(&format!("{}^{}$", flags, body)).ok()
}

/// Whole-string pattern match.
pub fn pattern_matches(pattern: &str, text: &str, extglob: bool, nocase: bool) -> bool {
    if extglob {
        // `!(a|b)` covering the whole pattern: true iff no alternative
        // matches the whole string.
        if let Some(inner) = sole_complement(pattern) {
            return !split_alternatives(inner)
                .iter()
                .any(|alt| pattern_matches(alt, text, extglob, nocase));
        }
    }
    compile_pattern(pattern, extglob, nocase).map_or(false, |re| re.is_match(text))
}

/// The body of `!(…)` when it spans the entire pattern.
fn sole_complement(pattern: &str) -> Option<&str> {
    let chars: Vec<char> = pattern.chars().collect();
    if chars.len() < 3 || chars[0] != '!' || chars[1] != '(' {
        return None;
    }
    let close = find_group_end(&chars, 2)?;
    if close != chars.len() - 1 {
        return None;
    }
    Some(&pattern[2..pattern.len() - 1])
}

/// Does the text contain unquoted glob metacharacters?
pub fn has_glob_chars(text: &str, extglob: bool) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '*' | '?' | '[' => return true,
            c if extglob
                && matches!(c, '@' | '+' | '!')
                && chars.get(i + 1) == Some(&'(') =>
            {
                return true;
            }
            _ => {}
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        pattern_matches(pattern, text, false, false)
    }

    fn ext_matches(pattern: &str, text: &str) -> bool {
        pattern_matches(pattern, text, true, false)
    }

    #[test]
    fn basic_globs() {
        assert!(matches("*.txt", "notes.txt"));
        assert!(!matches("*.txt", "notes.text"));
        assert!(matches("a?c", "abc"));
        assert!(!matches("a?c", "abbc"));
        assert!(matches("*", ""));
    }

    #[test]
    fn bracket_classes() {
        assert!(matches("[abc]x", "bx"));
        assert!(!matches("[abc]x", "dx"));
        assert!(matches("[a-z]*", "hello"));
        assert!(matches("[!0-9]", "x"));
        assert!(!matches("[!0-9]", "5"));
    }

    #[test]
    fn posix_classes() {
        assert!(matches("[[:digit:]][[:digit:]]", "42"));
        assert!(!matches("[[:alpha:]]", "4"));
        assert!(matches("[[:space:]]", " "));
    }

    #[test]
    fn escaped_metachars_are_literal() {
        assert!(matches("a\\*b", "a*b"));
        assert!(!matches("a\\*b", "axb"));
    }

    #[test]
    fn dot_is_not_special() {
        assert!(!matches("a.c", "abc"));
        assert!(matches("a.c", "a.c"));
    }

    #[test]
    fn extglob_forms() {
        assert!(ext_matches("@(abc|xyz)", "abc"));
        assert!(ext_matches("@(abc|xyz)", "xyz"));
        assert!(!ext_matches("@(abc|xyz)", "abcxyz"));
        assert!(ext_matches("*(ab)", ""));
        assert!(ext_matches("*(ab)", "abab"));
        assert!(ext_matches("+(ab)", "ab"));
        assert!(!ext_matches("+(ab)", ""));
        assert!(ext_matches("?(ab)c", "c"));
        assert!(ext_matches("?(ab)c", "abc"));
    }

    #[test]
    fn extglob_complement() {
        assert!(ext_matches("!(abc)", "xyz"));
        assert!(!ext_matches("!(abc)", "abc"));
        assert!(ext_matches("!(abc)", ""));
    }

    #[test]
    fn nested_extglob() {
        assert!(ext_matches("@(a|b@(c|d))", "bd"));
        assert!(ext_matches("@(a|b@(c|d))", "a"));
        assert!(!ext_matches("@(a|b@(c|d))", "bx"));
    }

    #[test]
    fn nocase_matching() {
        assert!(pattern_matches("*.TXT", "file.txt", false, true));
        assert!(!pattern_matches("*.TXT", "file.txt", false, false));
    }

    #[test]
    fn lazy_star_for_shortest_match() {
        // Shortest-prefix removal relies on lazy `*`.
        let re = Regex::new(&format!("^{}", pattern_to_regex("*/", false, false))).expect("regex");
        let m = re.find("a/b/c").expect("match");
        assert_eq!(m.as_str(), "a/");
    }

    #[test]
    fn glob_char_detection() {
        assert!(has_glob_chars("*.rs", false));
        assert!(!has_glob_chars("plain", false));
        assert!(!has_glob_chars("\\*", false));
        assert!(has_glob_chars("@(x)", true));
        assert!(!has_glob_chars("@(x)", false));
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        assert!(matches("a[b", "a[b"));
    }
}
