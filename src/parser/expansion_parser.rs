//! `${…}` parameter-expansion parsing.
//!
//! The lexer hands over the raw text between the braces; this module
//! recognizes the operator and parses operands into words. Operand words
//! keep full quote context: `${v:-"a b"}` must remember that its default
//! value was quoted.

use crate::ast::{
    Ast, ParameterOperation, PatternAnchor, PatternSide, WordNode, WordPart,
};
use crate::parser::lexer::{QuoteKind, QuotePart};
use crate::parser::scanner::{
    dollar_construct_end, skip_backtick, skip_double_quoted, skip_single_quoted,
};
use crate::parser::types::{LexerOptions, ParserError};
use crate::parser::word_parser::parse_word_parts;

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-' | '_') || c.is_ascii_digit()
}

/// Parse `inner`, the text between `${` and `}`, into a parameter
/// expansion part.
pub fn parse_parameter_expansion(inner: &str, line: usize) -> Result<WordPart, ParserError> {
    let chars: Vec<char> = inner.chars().collect();
    if chars.is_empty() {
        return Ok(bad(inner));
    }

    // ${#…}: length, unless it is the `#` parameter itself or `${#-…}` style.
    if chars[0] == '#' && chars.len() > 1 {
        let rest: String = chars[1..].iter().collect();
        if let Some(len) = parameter_name_len(&chars[1..]) {
            if len == chars.len() - 1 {
                return Ok(Ast::parameter_expansion(rest, Some(ParameterOperation::Length)));
            }
        }
        // `${#var:1}` and friends are invalid.
        return Ok(bad(inner));
    }

    // ${!…}: indirection, name-prefix listing, or array keys.
    if chars[0] == '!' && chars.len() > 1 {
        let rest: Vec<char> = chars[1..].to_vec();
        let last = *rest.last().expect("nonempty");
        if (last == '*' || last == '@') && rest.len() > 1 {
            let body: String = rest[..rest.len() - 1].iter().collect();
            if body.chars().all(is_name_char) {
                return Ok(Ast::parameter_expansion(
                    body.clone(),
                    Some(ParameterOperation::NamePrefix { prefix: body, star: last == '*' }),
                ));
            }
        }
        let rest_str: String = rest.iter().collect();
        if let Some(stripped) = rest_str.strip_suffix("[@]") {
            if !stripped.is_empty() && stripped.chars().all(is_name_char) {
                return Ok(Ast::parameter_expansion(
                    stripped.to_string(),
                    Some(ParameterOperation::ArrayKeys { array: stripped.to_string(), star: false }),
                ));
            }
        }
        if let Some(stripped) = rest_str.strip_suffix("[*]") {
            if !stripped.is_empty() && stripped.chars().all(is_name_char) {
                return Ok(Ast::parameter_expansion(
                    stripped.to_string(),
                    Some(ParameterOperation::ArrayKeys { array: stripped.to_string(), star: true }),
                ));
            }
        }
        if rest_str.chars().all(is_name_char) && rest_str.starts_with(is_name_start) {
            return Ok(Ast::parameter_expansion(
                rest_str,
                Some(ParameterOperation::Indirect),
            ));
        }
        return Ok(bad(inner));
    }

    // Ordinary parameter, possibly subscripted, possibly with an operator.
    let name_len = match parameter_name_len(&chars) {
        Some(n) => n,
        None => return Ok(bad(inner)),
    };
    let parameter: String = chars[..name_len].iter().collect();
    if name_len == chars.len() {
        return Ok(Ast::parameter_expansion(parameter, None));
    }

    let op_chars = &chars[name_len..];
    let operation = parse_operation(op_chars, line)?;
    match operation {
        Some(op) => Ok(Ast::parameter_expansion(parameter, Some(op))),
        None => Ok(bad(inner)),
    }
}

/// Length of the parameter name at the start of `chars`: a plain name, a
/// special parameter, or either followed by `[subscript]`.
fn parameter_name_len(chars: &[char]) -> Option<usize> {
    let mut i = if is_name_start(chars[0]) {
        let mut i = 1;
        while i < chars.len() && is_name_char(chars[i]) {
            i += 1;
        }
        i
    } else if is_special_param(chars[0]) {
        1
    } else {
        return None;
    };
    if chars.get(i) == Some(&'[') {
        let close = crate::parser::scanner::find_balanced(chars, i + 1, '[', ']')?;
        i = close + 1;
    }
    Some(i)
}

/// Parse the operator and operand that follow the parameter name.
fn parse_operation(
    chars: &[char],
    line: usize,
) -> Result<Option<ParameterOperation>, ParserError> {
    let text: String = chars.iter().collect();
    let options = LexerOptions::default();

    // Two-character and colon-prefixed operators first.
    if let Some(rest) = strip_op(&text, ":-") {
        return Ok(Some(ParameterOperation::DefaultValue {
            word: operand_word(rest, &options, line)?,
            check_empty: true,
        }));
    }
    if let Some(rest) = strip_op(&text, ":=") {
        return Ok(Some(ParameterOperation::AssignDefault {
            word: operand_word(rest, &options, line)?,
            check_empty: true,
        }));
    }
    if let Some(rest) = strip_op(&text, ":?") {
        return Ok(Some(ParameterOperation::ErrorIfUnset {
            word: if rest.is_empty() { None } else { Some(operand_word(rest, &options, line)?) },
            check_empty: true,
        }));
    }
    if let Some(rest) = strip_op(&text, ":+") {
        return Ok(Some(ParameterOperation::UseAlternative {
            word: operand_word(rest, &options, line)?,
            check_empty: true,
        }));
    }
    match chars[0] {
        '-' => {
            return Ok(Some(ParameterOperation::DefaultValue {
                word: operand_word(&text[1..], &options, line)?,
                check_empty: false,
            }))
        }
        '=' => {
            return Ok(Some(ParameterOperation::AssignDefault {
                word: operand_word(&text[1..], &options, line)?,
                check_empty: false,
            }))
        }
        '?' => {
            let rest = &text[1..];
            return Ok(Some(ParameterOperation::ErrorIfUnset {
                word: if rest.is_empty() { None } else { Some(operand_word(rest, &options, line)?) },
                check_empty: false,
            }));
        }
        '+' => {
            return Ok(Some(ParameterOperation::UseAlternative {
                word: operand_word(&text[1..], &options, line)?,
                check_empty: false,
            }))
        }
        ':' => {
            // Substring: `:offset[:length]`, split at a depth-0 colon.
            let rest = &chars[1..];
            let split = find_colon(rest);
            let (offset, length) = match split {
                Some(idx) => {
                    let off: String = rest[..idx].iter().collect();
                    let len: String = rest[idx + 1..].iter().collect();
                    (off, Some(len))
                }
                None => (rest.iter().collect(), None),
            };
            return Ok(Some(ParameterOperation::Substring { offset, length }));
        }
        '#' => {
            let (longest, rest) =
                if chars.get(1) == Some(&'#') { (true, &text[2..]) } else { (false, &text[1..]) };
            return Ok(Some(ParameterOperation::RemovePattern {
                pattern: operand_word(rest, &options, line)?,
                side: PatternSide::Prefix,
                longest,
            }));
        }
        '%' => {
            let (longest, rest) =
                if chars.get(1) == Some(&'%') { (true, &text[2..]) } else { (false, &text[1..]) };
            return Ok(Some(ParameterOperation::RemovePattern {
                pattern: operand_word(rest, &options, line)?,
                side: PatternSide::Suffix,
                longest,
            }));
        }
        '/' => return parse_replacement(chars, line).map(Some),
        '^' | ',' => {
            let upper = chars[0] == '^';
            let all = chars.get(1) == Some(&chars[0]);
            let rest = if all { &text[2..] } else { &text[1..] };
            let pattern =
                if rest.is_empty() { None } else { Some(operand_word(rest, &options, line)?) };
            return Ok(Some(ParameterOperation::CaseModify { upper, all, pattern }));
        }
        _ => {}
    }
    Ok(None)
}

/// `${VAR/pat/rep}` family. `chars[0] == '/'`.
fn parse_replacement(chars: &[char], line: usize) -> Result<ParameterOperation, ParserError> {
    let options = LexerOptions::default();
    let mut i = 1;
    let mut all = false;
    let mut anchor = None;
    match chars.get(i) {
        Some('/') => {
            all = true;
            i += 1;
        }
        Some('#') => {
            anchor = Some(PatternAnchor::Start);
            i += 1;
        }
        Some('%') => {
            anchor = Some(PatternAnchor::End);
            i += 1;
        }
        _ => {}
    }
    // The pattern runs to the next unquoted `/`; a pattern may not be
    // empty unless the whole operand is (`${v//}` replaces nothing).
    let mut j = i;
    let mut consumed_any = false;
    while j < chars.len() {
        match chars[j] {
            '/' if consumed_any => break,
            '\\' => j += 2,
            '\'' => match skip_single_quoted(chars, j + 1) {
                Some(after) => j = after,
                None => j = chars.len(),
            },
            '"' => match skip_double_quoted(chars, j + 1) {
                Some(after) => j = after,
                None => j = chars.len(),
            },
            '`' => match skip_backtick(chars, j + 1) {
                Some(after) => j = after,
                None => j = chars.len(),
            },
            '$' => match dollar_construct_end(chars, j) {
                Some(Ok(end)) => j = end,
                _ => j += 1,
            },
            _ => j += 1,
        }
        consumed_any = true;
    }
    let pattern_text: String = chars[i..j.min(chars.len())].iter().collect();
    let replacement = if j < chars.len() {
        let rep: String = chars[j + 1..].iter().collect();
        Some(operand_word(&rep, &options, line)?)
    } else {
        None
    };
    Ok(ParameterOperation::ReplacePattern {
        pattern: operand_word(&pattern_text, &options, line)?,
        replacement,
        all,
        anchor,
    })
}

fn strip_op<'a>(text: &'a str, op: &str) -> Option<&'a str> {
    text.strip_prefix(op)
}

/// Depth-0, quote-aware colon search for the substring operator.
fn find_colon(chars: &[char]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '?' => {
                // Skip the ternary's colon: scan forward past its match.
                depth += 1;
            }
            ':' if depth == 0 => return Some(i),
            ':' => depth -= 1,
            '\\' => i += 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Lex free-form operand text into quote parts without word-boundary
/// splitting (spaces are ordinary characters inside `${…}` operands),
/// then parse it into a word.
pub fn operand_word(
    text: &str,
    options: &LexerOptions,
    line: usize,
) -> Result<WordNode, ParserError> {
    let parts = lex_operand_parts(text, line)?;
    parse_word_parts(&parts, options, line, false)
}

/// Build `QuotePart`s from arbitrary text. Mirrors the lexer's word
/// reader minus the boundary set.
fn lex_operand_parts(text: &str, line: usize) -> Result<Vec<QuotePart>, ParserError> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts: Vec<QuotePart> = Vec::new();
    let mut lit = String::new();
    let mut i = 0;

    let flush = |lit: &mut String, parts: &mut Vec<QuotePart>| {
        if !lit.is_empty() {
            parts.push(QuotePart {
                text: std::mem::take(lit),
                kind: QuoteKind::None,
                is_expansion: false,
            });
        }
    };

    while i < chars.len() {
        match chars[i] {
            '\'' => {
                flush(&mut lit, &mut parts);
                let after = skip_single_quoted(&chars, i + 1).ok_or_else(|| {
                    ParserError::incomplete("unterminated single quote", line, 1)
                })?;
                let inner: String = chars[i + 1..after - 1].iter().collect();
                parts.push(QuotePart { text: inner, kind: QuoteKind::Single, is_expansion: false });
                i = after;
            }
            '"' => {
                flush(&mut lit, &mut parts);
                let after = skip_double_quoted(&chars, i + 1).ok_or_else(|| {
                    ParserError::incomplete("unterminated double quote", line, 1)
                })?;
                // Re-split the quoted region into literal and expansion runs.
                let inner = &chars[i + 1..after - 1];
                let mut k = 0;
                let mut dlit = String::new();
                while k < inner.len() {
                    match inner[k] {
                        '\\' if k + 1 < inner.len() => {
                            dlit.push('\\');
                            dlit.push(inner[k + 1]);
                            k += 2;
                        }
                        '$' => match dollar_construct_end(inner, k) {
                            Some(Ok(end)) => {
                                if !dlit.is_empty() {
                                    parts.push(QuotePart {
                                        text: std::mem::take(&mut dlit),
                                        kind: QuoteKind::Double,
                                        is_expansion: false,
                                    });
                                }
                                let raw: String = inner[k..end].iter().collect();
                                parts.push(QuotePart {
                                    text: raw,
                                    kind: QuoteKind::Double,
                                    is_expansion: true,
                                });
                                k = end;
                            }
                            _ => {
                                dlit.push('$');
                                k += 1;
                            }
                        },
                        '`' => match skip_backtick(inner, k + 1) {
                            Some(end) => {
                                if !dlit.is_empty() {
                                    parts.push(QuotePart {
                                        text: std::mem::take(&mut dlit),
                                        kind: QuoteKind::Double,
                                        is_expansion: false,
                                    });
                                }
                                let raw: String = inner[k..end].iter().collect();
                                parts.push(QuotePart {
                                    text: raw,
                                    kind: QuoteKind::Double,
                                    is_expansion: true,
                                });
                                k = end;
                            }
                            None => {
                                dlit.push('`');
                                k += 1;
                            }
                        },
                        c => {
                            dlit.push(c);
                            k += 1;
                        }
                    }
                }
                parts.push(QuotePart {
                    text: dlit,
                    kind: QuoteKind::Double,
                    is_expansion: false,
                });
                i = after;
            }
            '$' if chars.get(i + 1) == Some(&'\'') => {
                flush(&mut lit, &mut parts);
                let mut j = i + 2;
                loop {
                    match chars.get(j) {
                        Some('\\') => j += 2,
                        Some('\'') => break,
                        Some(_) => j += 1,
                        None => {
                            return Err(ParserError::incomplete(
                                "unterminated $'…' quote",
                                line,
                                1,
                            ))
                        }
                    }
                }
                let inner: String = chars[i + 2..j].iter().collect();
                parts.push(QuotePart {
                    text: inner,
                    kind: QuoteKind::DollarSingle,
                    is_expansion: false,
                });
                i = j + 1;
            }
            '$' => match dollar_construct_end(&chars, i) {
                Some(Ok(end)) => {
                    flush(&mut lit, &mut parts);
                    let raw: String = chars[i..end].iter().collect();
                    parts.push(QuotePart { text: raw, kind: QuoteKind::None, is_expansion: true });
                    i = end;
                }
                Some(Err(_)) => {
                    return Err(ParserError::incomplete("unexpected EOF in substitution", line, 1))
                }
                None => {
                    lit.push('$');
                    i += 1;
                }
            },
            '`' => match skip_backtick(&chars, i + 1) {
                Some(end) => {
                    flush(&mut lit, &mut parts);
                    let raw: String = chars[i..end].iter().collect();
                    parts.push(QuotePart {
                        text: raw,
                        kind: QuoteKind::Backtick,
                        is_expansion: true,
                    });
                    i = end;
                }
                None => {
                    return Err(ParserError::incomplete(
                        "unterminated backquote substitution",
                        line,
                        1,
                    ))
                }
            },
            '\\' if i + 1 < chars.len() => {
                lit.push('\\');
                lit.push(chars[i + 1]);
                i += 2;
            }
            c => {
                lit.push(c);
                i += 1;
            }
        }
    }
    flush(&mut lit, &mut parts);
    Ok(parts)
}

fn bad(inner: &str) -> WordPart {
    Ast::parameter_expansion(
        String::new(),
        Some(ParameterOperation::BadSubstitution { text: format!("${{{}}}", inner) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ParameterOperation as Op, WordPart};
    use assert_matches::assert_matches;

    fn parse(inner: &str) -> (String, Option<Op>) {
        match parse_parameter_expansion(inner, 1).expect("parse") {
            WordPart::ParameterExpansion(pe) => (pe.parameter, pe.operation),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn plain_name() {
        let (name, op) = parse("HOME");
        assert_eq!(name, "HOME");
        assert!(op.is_none());
    }

    #[test]
    fn subscripted_name() {
        let (name, op) = parse("arr[@]");
        assert_eq!(name, "arr[@]");
        assert!(op.is_none());
    }

    #[test]
    fn default_value_colon() {
        let (_, op) = parse("v:-fallback");
        assert_matches!(op, Some(Op::DefaultValue { check_empty: true, .. }));
    }

    #[test]
    fn default_value_no_colon() {
        let (_, op) = parse("v-fallback");
        assert_matches!(op, Some(Op::DefaultValue { check_empty: false, .. }));
    }

    #[test]
    fn assign_default() {
        let (_, op) = parse("v:=x");
        assert_matches!(op, Some(Op::AssignDefault { check_empty: true, .. }));
    }

    #[test]
    fn error_if_unset_without_message() {
        let (_, op) = parse("v:?");
        assert_matches!(op, Some(Op::ErrorIfUnset { word: None, check_empty: true }));
    }

    #[test]
    fn length() {
        let (name, op) = parse("#var");
        assert_eq!(name, "var");
        assert_matches!(op, Some(Op::Length));
    }

    #[test]
    fn length_of_array() {
        let (name, op) = parse("#arr[@]");
        assert_eq!(name, "arr[@]");
        assert_matches!(op, Some(Op::Length));
    }

    #[test]
    fn length_slice_is_bad_substitution() {
        let (_, op) = parse("#var:1:2");
        assert_matches!(op, Some(Op::BadSubstitution { .. }));
    }

    #[test]
    fn substring() {
        let (_, op) = parse("v:2:5");
        match op {
            Some(Op::Substring { offset, length }) => {
                assert_eq!(offset, "2");
                assert_eq!(length.as_deref(), Some("5"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn substring_no_length() {
        let (_, op) = parse("v:3");
        assert_matches!(op, Some(Op::Substring { length: None, .. }));
    }

    #[test]
    fn remove_prefix_shortest_and_longest() {
        let (_, op) = parse("v#*/");
        assert_matches!(op, Some(Op::RemovePattern { side: PatternSide::Prefix, longest: false, .. }));
        let (_, op) = parse("v##*/");
        assert_matches!(op, Some(Op::RemovePattern { side: PatternSide::Prefix, longest: true, .. }));
    }

    #[test]
    fn remove_suffix() {
        let (_, op) = parse("v%%.txt");
        assert_matches!(op, Some(Op::RemovePattern { side: PatternSide::Suffix, longest: true, .. }));
    }

    #[test]
    fn replacement() {
        let (_, op) = parse("v/foo/bar");
        match op {
            Some(Op::ReplacePattern { all, anchor, replacement, .. }) => {
                assert!(!all);
                assert!(anchor.is_none());
                assert!(replacement.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn replace_all_and_anchored() {
        let (_, op) = parse("v//a/b");
        assert_matches!(op, Some(Op::ReplacePattern { all: true, .. }));
        let (_, op) = parse("v/#a/b");
        assert_matches!(op, Some(Op::ReplacePattern { anchor: Some(PatternAnchor::Start), .. }));
        let (_, op) = parse("v/%a/b");
        assert_matches!(op, Some(Op::ReplacePattern { anchor: Some(PatternAnchor::End), .. }));
    }

    #[test]
    fn replacement_slash_inside_quotes_is_not_a_separator() {
        let (_, op) = parse("v/'a/b'/c");
        match op {
            Some(Op::ReplacePattern { pattern, replacement, .. }) => {
                // Pattern is the quoted a/b, replacement c.
                assert_eq!(pattern.parts.len(), 1);
                assert!(replacement.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_modification() {
        let (_, op) = parse("v^^");
        assert_matches!(op, Some(Op::CaseModify { upper: true, all: true, pattern: None }));
        let (_, op) = parse("v,");
        assert_matches!(op, Some(Op::CaseModify { upper: false, all: false, pattern: None }));
    }

    #[test]
    fn indirection() {
        let (_, op) = parse("!ref");
        assert_matches!(op, Some(Op::Indirect));
    }

    #[test]
    fn name_prefix_listing() {
        let (_, op) = parse("!PS*");
        assert_matches!(op, Some(Op::NamePrefix { star: true, .. }));
        let (_, op) = parse("!PS@");
        assert_matches!(op, Some(Op::NamePrefix { star: false, .. }));
    }

    #[test]
    fn array_keys() {
        let (_, op) = parse("!arr[@]");
        assert_matches!(op, Some(Op::ArrayKeys { star: false, .. }));
        let (_, op) = parse("!arr[*]");
        assert_matches!(op, Some(Op::ArrayKeys { star: true, .. }));
    }

    #[test]
    fn invalid_is_bad_substitution() {
        let (_, op) = parse("%bogus");
        assert_matches!(op, Some(Op::BadSubstitution { .. }));
    }

    #[test]
    fn operand_preserves_spaces() {
        let (_, op) = parse("v:-a b c");
        match op {
            Some(Op::DefaultValue { word, .. }) => {
                assert_eq!(word.as_literal(), Some("a b c"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
