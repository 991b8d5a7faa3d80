//! Word construction.
//!
//! Takes the quote-part map the lexer attached to a word token and builds
//! the `WordNode` the expander consumes. Quote boundaries recorded by the
//! lexer are never merged away: `"a"$b'c'` stays three parts with three
//! different quote contexts.

use crate::ast::{
    Ast, CommandSubstitutionPart, ProcessDirection, ProcessSubstitutionPart, ScriptNode, WordNode,
    WordPart,
};
use crate::parser::expansion_parser::parse_parameter_expansion;
use crate::parser::lexer::{QuoteKind, QuotePart, Token};
use crate::parser::scanner::dollar_construct_end;
use crate::parser::types::{LexerOptions, ParserError};

/// Parse a full recursive script for `$(…)` / `<(…)` bodies.
fn parse_subscript_body(text: &str, line: usize) -> Result<ScriptNode, ParserError> {
    let mut parser = crate::parser::parser::Parser::new();
    parser.parse(text).map_err(|mut e| {
        // Positions inside the substitution are relative; anchor them to
        // the line the construct started on.
        e.line += line.saturating_sub(1);
        e
    })
}

/// Build a `WordNode` from a lexed word token.
pub fn parse_word(token: &Token, options: &LexerOptions) -> Result<WordNode, ParserError> {
    parse_word_parts(&token.quote_parts, options, token.line, true)
}

/// Build a `WordNode` from raw quote parts.
///
/// `word_start` is true when the parts begin a word (enables tilde
/// detection on the leading literal).
pub fn parse_word_parts(
    quote_parts: &[QuotePart],
    options: &LexerOptions,
    line: usize,
    word_start: bool,
) -> Result<WordNode, ParserError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut i = 0;

    while i < quote_parts.len() {
        let qp = &quote_parts[i];
        match qp.kind {
            QuoteKind::Single => {
                parts.push(Ast::single_quoted(qp.text.clone()));
                i += 1;
            }
            QuoteKind::DollarSingle => {
                parts.push(Ast::single_quoted(decode_ansi_c(&qp.text)));
                i += 1;
            }
            QuoteKind::Backtick => {
                parts.push(parse_backtick(&qp.text, line)?);
                i += 1;
            }
            QuoteKind::Double => {
                // Group the consecutive double-quoted segments into one
                // quoted region.
                let mut inner: Vec<WordPart> = Vec::new();
                while i < quote_parts.len() && quote_parts[i].kind == QuoteKind::Double {
                    let dq = &quote_parts[i];
                    if dq.is_expansion {
                        inner.push(parse_expansion_text(&dq.text, line)?);
                    } else if !dq.text.is_empty() || inner.is_empty() {
                        inner.push(Ast::literal(decode_double_quoted(&dq.text)));
                    }
                    i += 1;
                }
                parts.push(Ast::double_quoted(inner));
            }
            QuoteKind::None => {
                if qp.is_expansion {
                    parts.push(parse_expansion_text(&qp.text, line)?);
                } else {
                    let at_start = word_start && parts.is_empty();
                    split_literal_run(&qp.text, at_start, options, &mut parts);
                }
                i += 1;
            }
        }
    }

    Ok(Ast::word(parts))
}

/// Parse one expansion construct from its raw text: `$var`, `${…}`,
/// `$(…)`, `$((…))`, a backtick substitution, or `<(…)`/`>(…)`.
fn parse_expansion_text(text: &str, line: usize) -> Result<WordPart, ParserError> {
    let chars: Vec<char> = text.chars().collect();
    if chars.first() == Some(&'`') {
        return parse_backtick(text, line);
    }
    if chars.first() == Some(&'<') || chars.first() == Some(&'>') {
        let direction = if chars[0] == '<' { ProcessDirection::In } else { ProcessDirection::Out };
        let inner: String = chars[2..chars.len() - 1].iter().collect();
        let body = parse_subscript_body(&inner, line)?;
        return Ok(WordPart::ProcessSubstitution(ProcessSubstitutionPart { body, direction }));
    }
    debug_assert_eq!(chars.first(), Some(&'$'));
    match chars.get(1) {
        Some('(') if chars.get(2) == Some(&'(') && text.ends_with("))") => {
            let inner: String = chars[3..chars.len() - 2].iter().collect();
            Ok(Ast::arithmetic_expansion(inner))
        }
        Some('(') => {
            let inner: String = chars[2..chars.len() - 1].iter().collect();
            let body = parse_subscript_body(&inner, line)?;
            Ok(Ast::command_substitution(body, false))
        }
        Some('{') => {
            let inner: String = chars[2..chars.len() - 1].iter().collect();
            parse_parameter_expansion(&inner, line)
        }
        Some(_) => {
            let name: String = chars[1..].iter().collect();
            Ok(Ast::variable(name))
        }
        None => Ok(Ast::literal("$")),
    }
}

/// Backtick command substitution: strip delimiters, undo the `\$`, `` \` ``
/// and `\\` escapes, and parse the inner script.
fn parse_backtick(text: &str, line: usize) -> Result<WordPart, ParserError> {
    let chars: Vec<char> = text.chars().collect();
    debug_assert!(chars.len() >= 2);
    let inner = &chars[1..chars.len() - 1];
    let mut cmd = String::new();
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == '\\' && i + 1 < inner.len() {
            match inner[i + 1] {
                '$' | '`' | '\\' => {
                    cmd.push(inner[i + 1]);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        cmd.push(inner[i]);
        i += 1;
    }
    let body = parse_subscript_body(&cmd, line)?;
    Ok(WordPart::CommandSubstitution(CommandSubstitutionPart { body, backtick_style: true }))
}

/// Split an unquoted literal run into Literal / Escaped / Tilde / Glob
/// parts.
fn split_literal_run(
    text: &str,
    at_word_start: bool,
    options: &LexerOptions,
    parts: &mut Vec<WordPart>,
) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    // Tilde expansion candidate: `~` or `~user` at the start of the word.
    if at_word_start && chars.first() == Some(&'~') {
        let mut j = 1;
        while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '-' || chars[j] == '.') {
            j += 1;
        }
        if j >= chars.len() || chars[j] == '/' {
            let user: String = chars[1..j].iter().collect();
            parts.push(WordPart::Tilde(crate::ast::TildePart {
                user: if user.is_empty() { None } else { Some(user) },
            }));
            i = j;
        }
    }

    let mut run = String::new();
    let mut run_has_glob = false;
    let flush = |run: &mut String, has_glob: &mut bool, parts: &mut Vec<WordPart>| {
        if run.is_empty() {
            return;
        }
        let text = std::mem::take(run);
        if *has_glob {
            parts.push(WordPart::Glob(crate::ast::GlobPart { pattern: text }));
        } else {
            parts.push(Ast::literal(text));
        }
        *has_glob = false;
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            flush(&mut run, &mut run_has_glob, parts);
            parts.push(Ast::escaped(chars[i + 1].to_string()));
            i += 2;
            continue;
        }
        if matches!(c, '*' | '?' | '[') {
            run_has_glob = true;
        }
        // Extglob opener keeps its group inside the same pattern run.
        if options.extglob
            && matches!(c, '?' | '*' | '+' | '@' | '!')
            && chars.get(i + 1) == Some(&'(')
        {
            run_has_glob = true;
        }
        run.push(c);
        i += 1;
    }
    flush(&mut run, &mut run_has_glob, parts);
}

/// Decode escapes valid inside double quotes: backslash before
/// `$`, `` ` ``, `"`, `\` or newline is removed; otherwise it stays.
pub fn decode_double_quoted(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                '$' | '`' | '"' | '\\' => {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                '\n' => {
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Decode `$'…'` ANSI-C escapes.
pub fn decode_ansi_c(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let esc = chars[i + 1];
        i += 2;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' | 'E' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '?' => out.push('?'),
            'x' => {
                let mut val = 0u32;
                let mut n = 0;
                while n < 2 {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            val = val * 16 + d;
                            i += 1;
                            n += 1;
                        }
                        None => break,
                    }
                }
                if n == 0 {
                    out.push('\\');
                    out.push('x');
                } else if let Some(c) = char::from_u32(val) {
                    out.push(c);
                }
            }
            'u' | 'U' => {
                let max = if esc == 'u' { 4 } else { 8 };
                let mut val = 0u32;
                let mut n = 0;
                while n < max {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            val = val * 16 + d;
                            i += 1;
                            n += 1;
                        }
                        None => break,
                    }
                }
                if n == 0 {
                    out.push('\\');
                    out.push(esc);
                } else if let Some(c) = char::from_u32(val) {
                    out.push(c);
                }
            }
            'c' => {
                // Control character: \cX
                if let Some(&c) = chars.get(i) {
                    let upper = c.to_ascii_uppercase() as u32;
                    if let Some(ctrl) = char::from_u32(upper ^ 0x40) {
                        out.push(ctrl);
                    }
                    i += 1;
                } else {
                    out.push('\\');
                    out.push('c');
                }
            }
            d if d.is_digit(8) => {
                let mut val = d.to_digit(8).unwrap_or(0);
                let mut n = 1;
                while n < 3 {
                    match chars.get(i).and_then(|c| c.to_digit(8)) {
                        Some(o) => {
                            val = val * 8 + o;
                            i += 1;
                            n += 1;
                        }
                        None => break,
                    }
                }
                if let Some(c) = char::from_u32(val) {
                    out.push(c);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Parse a here-document body with an unquoted delimiter: `$`-constructs
/// and backticks expand, quotes are ordinary characters, and backslash
/// escapes `$`, `` ` `` and `\`.
pub fn parse_heredoc_body(text: &str, line: usize) -> Result<WordNode, ParserError> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();
    let mut i = 0;

    let flush = |lit: &mut String, parts: &mut Vec<WordPart>| {
        if !lit.is_empty() {
            parts.push(Ast::literal(std::mem::take(lit)));
        }
    };

    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some('$') | Some('`') | Some('\\')) => {
                lit.push(chars[i + 1]);
                i += 2;
            }
            '`' => match crate::parser::scanner::skip_backtick(&chars, i + 1) {
                Some(after) => {
                    flush(&mut lit, &mut parts);
                    let raw: String = chars[i..after].iter().collect();
                    parts.push(parse_backtick(&raw, line)?);
                    i = after;
                }
                None => {
                    lit.push('`');
                    i += 1;
                }
            },
            '$' => match dollar_construct_end(&chars, i) {
                Some(Ok(end)) => {
                    flush(&mut lit, &mut parts);
                    let raw: String = chars[i..end].iter().collect();
                    parts.push(parse_expansion_text(&raw, line)?);
                    i = end;
                }
                _ => {
                    lit.push('$');
                    i += 1;
                }
            },
            c => {
                lit.push(c);
                i += 1;
            }
        }
    }
    flush(&mut lit, &mut parts);
    Ok(Ast::word(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WordPart;
    use crate::parser::lexer::Lexer;

    fn word_of(input: &str) -> WordNode {
        let out = Lexer::new(input).tokenize().expect("lex");
        parse_word(&out.tokens[0], &LexerOptions::default()).expect("parse word")
    }

    #[test]
    fn plain_literal() {
        let w = word_of("hello");
        assert_eq!(w.as_literal(), Some("hello"));
    }

    #[test]
    fn quote_boundaries_survive() {
        let w = word_of("pre'mid'post");
        assert_eq!(w.parts.len(), 3);
        assert!(matches!(w.parts[0], WordPart::Literal(_)));
        assert!(matches!(w.parts[1], WordPart::SingleQuoted(_)));
        assert!(matches!(w.parts[2], WordPart::Literal(_)));
    }

    #[test]
    fn double_quoted_with_expansion() {
        let w = word_of("\"a $x b\"");
        assert_eq!(w.parts.len(), 1);
        match &w.parts[0] {
            WordPart::DoubleQuoted(dq) => {
                assert_eq!(dq.parts.len(), 3);
                assert!(matches!(dq.parts[1], WordPart::ParameterExpansion(_)));
            }
            other => panic!("expected double-quoted part, got {:?}", other),
        }
    }

    #[test]
    fn bare_variable() {
        let w = word_of("$foo");
        match &w.parts[0] {
            WordPart::ParameterExpansion(pe) => assert_eq!(pe.parameter, "foo"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn command_substitution_parses_body() {
        let w = word_of("$(echo hi)");
        match &w.parts[0] {
            WordPart::CommandSubstitution(cs) => {
                assert!(!cs.backtick_style);
                assert_eq!(cs.body.statements.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn backtick_substitution() {
        let w = word_of("`echo hi`");
        match &w.parts[0] {
            WordPart::CommandSubstitution(cs) => assert!(cs.backtick_style),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arithmetic_keeps_raw_text() {
        let w = word_of("$((1 + 2))");
        match &w.parts[0] {
            WordPart::ArithmeticExpansion(a) => assert_eq!(a.expression, "1 + 2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tilde_at_word_start() {
        let w = word_of("~/bin");
        assert!(matches!(w.parts[0], WordPart::Tilde(_)));
        let w = word_of("~alice/src");
        match &w.parts[0] {
            WordPart::Tilde(t) => assert_eq!(t.user.as_deref(), Some("alice")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tilde_mid_word_is_literal() {
        let w = word_of("a~b");
        assert_eq!(w.as_literal(), Some("a~b"));
    }

    #[test]
    fn glob_detection() {
        let w = word_of("*.txt");
        assert!(matches!(w.parts[0], WordPart::Glob(_)));
        let w = word_of("plain");
        assert!(matches!(w.parts[0], WordPart::Literal(_)));
    }

    #[test]
    fn escape_becomes_escaped_part() {
        let w = word_of("a\\*b");
        assert_eq!(w.parts.len(), 3);
        assert!(matches!(w.parts[1], WordPart::Escaped(_)));
    }

    #[test]
    fn ansi_c_escapes() {
        assert_eq!(decode_ansi_c("a\\nb"), "a\nb");
        assert_eq!(decode_ansi_c("\\t"), "\t");
        assert_eq!(decode_ansi_c("\\x41"), "A");
        assert_eq!(decode_ansi_c("\\101"), "A");
        assert_eq!(decode_ansi_c("\\u0041"), "A");
        assert_eq!(decode_ansi_c("\\cA"), "\x01");
    }

    #[test]
    fn double_quote_escapes() {
        assert_eq!(decode_double_quoted("a\\$b"), "a$b");
        assert_eq!(decode_double_quoted("a\\nb"), "a\\nb");
        assert_eq!(decode_double_quoted("\\\\"), "\\");
    }

    #[test]
    fn heredoc_body_expansions() {
        let w = parse_heredoc_body("hello $name\n", 1).expect("parse");
        assert_eq!(w.parts.len(), 3);
        assert!(matches!(w.parts[1], WordPart::ParameterExpansion(_)));
    }

    #[test]
    fn heredoc_body_quotes_are_literal() {
        let w = parse_heredoc_body("say 'hi'\n", 1).expect("parse");
        assert_eq!(w.as_literal(), Some("say 'hi'\n"));
    }

    #[test]
    fn empty_double_quotes_yield_empty_quoted_part() {
        let w = word_of("\"\"");
        match &w.parts[0] {
            WordPart::DoubleQuoted(dq) => {
                assert_eq!(dq.parts.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
