//! The POSIX expansion pipeline.
//!
//! Each word expands into a sequence of *pieces*: text fragments tagged
//! with their quote context and splittability, separated by hard field
//! breaks (produced by `"$@"` and friends). The pipeline then runs in
//! order: field splitting over splittable pieces, field assembly,
//! pathname expansion, quote removal. Per-part quote context recorded by
//! the parser drives every step.

use crate::ast::{WordNode, WordPart};
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::expansion::pattern::has_glob_chars;
use crate::interpreter::expansion::split::split_fields;
use crate::interpreter::expansion::tilde::expand_tilde;
use crate::interpreter::interpreter::Interpreter;
use crate::shell::glob_expander::{GlobExpander, GlobOptions, GlobOutcome};

/// One expanded fragment.
#[derive(Debug, Clone)]
pub(crate) struct TextPiece {
    pub text: String,
    /// Quoted text never splits and its glob characters are literal.
    pub quoted: bool,
    /// Subject to IFS splitting (unquoted expansion results).
    pub splittable: bool,
    /// Counts as a field even when empty (quoted empties, and empty
    /// fields produced by non-whitespace IFS separators).
    pub hard: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum Piece {
    Text(TextPiece),
    /// Hard field boundary, regardless of IFS.
    Break,
}

impl Piece {
    pub(crate) fn text(text: impl Into<String>, quoted: bool, splittable: bool) -> Self {
        let text = text.into();
        Piece::Text(TextPiece { text, quoted, splittable, hard: quoted })
    }
}

impl Interpreter {
    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Expand a list of words into argv fields.
    pub fn expand_words(&mut self, words: &[WordNode]) -> ExecResult<Vec<String>> {
        let refs: Vec<&WordNode> = words.iter().collect();
        self.expand_word_list(&refs)
    }

    pub fn expand_word_list(&mut self, words: &[&WordNode]) -> ExecResult<Vec<String>> {
        let mut fields = Vec::new();
        for word in words {
            fields.extend(self.expand_word(word)?);
        }
        Ok(fields)
    }

    /// Expand one word into zero or more fields (splitting and pathname
    /// expansion included).
    pub fn expand_word(&mut self, word: &WordNode) -> ExecResult<Vec<String>> {
        let pieces = self.expand_parts(&word.parts, false)?;
        let pieces = split_pieces(pieces, &self.state.ifs());
        self.assemble_fields(pieces)
    }

    /// Expand a word to a single string: no field splitting, no pathname
    /// expansion. Assignment values, case subjects, redirect targets for
    /// heredocs, and `[[ ]]` operands use this.
    pub fn expand_word_single(&mut self, word: &WordNode) -> ExecResult<String> {
        let pieces = self.expand_parts(&word.parts, false)?;
        Ok(join_pieces(pieces))
    }

    /// Expand a word for use as a pattern: quoted segments have their
    /// glob characters escaped so they match literally.
    pub fn expand_word_pattern(&mut self, word: &WordNode) -> ExecResult<String> {
        let pieces = self.expand_parts(&word.parts, false)?;
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Break => out.push(' '),
                Piece::Text(p) => {
                    if p.quoted {
                        out.push_str(&escape_pattern(&p.text));
                    } else {
                        out.push_str(&p.text);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Parse free-form text as one word (quotes, `$`-constructs) and
    /// expand it to a single string. Arithmetic pre-expansion and array
    /// subscripts go through here.
    pub fn expand_text_as_word(&mut self, text: &str) -> ExecResult<String> {
        let options = crate::parser::LexerOptions { extglob: true, ..Default::default() };
        let word = crate::parser::expansion_parser::operand_word(text, &options, 1)
            .map_err(|e| ShellError::Expansion(e.to_string()))?;
        self.expand_word_single(&word)
    }

    /// Expand a redirect target: one field exactly.
    pub fn expand_redirect_target(&mut self, word: &WordNode) -> ExecResult<String> {
        let fields = self.expand_word(word)?;
        match fields.len() {
            1 => Ok(fields.into_iter().next().expect("len checked")),
            0 => Err(ShellError::Redirect(format!("{}: ambiguous redirect", word)).into()),
            _ => Err(ShellError::Redirect(format!("{}: ambiguous redirect", word)).into()),
        }
    }

    // =========================================================================
    // PART EXPANSION
    // =========================================================================

    pub(crate) fn expand_parts(
        &mut self,
        parts: &[WordPart],
        in_quotes: bool,
    ) -> ExecResult<Vec<Piece>> {
        let mut pieces = Vec::new();
        for part in parts {
            self.expand_part(part, in_quotes, &mut pieces)?;
        }
        Ok(pieces)
    }

    fn expand_part(
        &mut self,
        part: &WordPart,
        in_quotes: bool,
        pieces: &mut Vec<Piece>,
    ) -> ExecResult<()> {
        match part {
            WordPart::Literal(p) => {
                pieces.push(Piece::text(p.value.clone(), in_quotes, false));
            }
            WordPart::SingleQuoted(p) => {
                pieces.push(Piece::text(p.value.clone(), true, false));
            }
            WordPart::Escaped(p) => {
                pieces.push(Piece::text(p.value.clone(), true, false));
            }
            WordPart::DoubleQuoted(p) => {
                let inner = self.expand_parts(&p.parts, true)?;
                if inner.is_empty() {
                    // `"$@"` with no positional parameters: nothing at
                    // all, not an empty field.
                } else if inner.iter().all(|pc| matches!(pc, Piece::Text(t) if t.text.is_empty()))
                {
                    // `""` anchors one empty field.
                    pieces.push(Piece::text("", true, false));
                } else {
                    pieces.extend(inner);
                }
            }
            WordPart::Tilde(p) => {
                let home = self.state.lookup("HOME");
                let expanded = expand_tilde(p.user.as_deref(), home.as_deref());
                pieces.push(Piece::text(expanded, false, false));
            }
            WordPart::Glob(p) => {
                pieces.push(Piece::text(p.pattern.clone(), in_quotes, false));
            }
            WordPart::ParameterExpansion(p) => {
                let expanded = self.expand_parameter(p, in_quotes)?;
                pieces.extend(expanded);
            }
            WordPart::CommandSubstitution(p) => {
                let output = self.command_substitute(&p.body)?;
                pieces.push(Piece::text(output, in_quotes, !in_quotes));
            }
            WordPart::ArithmeticExpansion(p) => {
                let value = self.eval_arith_text(&p.expression)?;
                pieces.push(Piece::text(value.to_string(), in_quotes, !in_quotes));
            }
            WordPart::ProcessSubstitution(p) => {
                let path = self.setup_process_substitution(p)?;
                pieces.push(Piece::text(path, false, false));
            }
        }
        Ok(())
    }

    // =========================================================================
    // FIELD ASSEMBLY & PATHNAME EXPANSION
    // =========================================================================

    fn assemble_fields(&mut self, pieces: Vec<Piece>) -> ExecResult<Vec<String>> {
        let mut fields: Vec<String> = Vec::new();
        let mut run: Vec<TextPiece> = Vec::new();

        let mut flush =
            |run: &mut Vec<TextPiece>, fields: &mut Vec<String>, interp: &mut Self| -> ExecResult<()> {
                if run.is_empty() {
                    return Ok(());
                }
                let keep = run.iter().any(|p| p.hard) || run.iter().any(|p| !p.text.is_empty());
                let pieces = std::mem::take(run);
                if !keep {
                    return Ok(());
                }
                fields.extend(interp.glob_field(&pieces)?);
                Ok(())
            };

        for piece in pieces {
            match piece {
                Piece::Break => flush(&mut run, &mut fields, self)?,
                Piece::Text(p) => run.push(p),
            }
        }
        flush(&mut run, &mut fields, self)?;
        Ok(fields)
    }

    /// Pathname-expand one assembled field.
    fn glob_field(&mut self, pieces: &[TextPiece]) -> ExecResult<Vec<String>> {
        let display: String = pieces.iter().map(|p| p.text.as_str()).collect();

        if self.state.options.noglob {
            return Ok(vec![display]);
        }
        let extglob = self.state.shopt.extglob;
        let has_unquoted_glob = pieces
            .iter()
            .any(|p| !p.quoted && has_glob_chars(&p.text, extglob));
        if !has_unquoted_glob {
            return Ok(vec![display]);
        }

        // Build the pattern: quoted segments contribute escaped text.
        let pattern: String = pieces
            .iter()
            .map(|p| if p.quoted { escape_pattern(&p.text) } else { p.text.clone() })
            .collect();

        let options = GlobOptions {
            nullglob: self.state.shopt.nullglob,
            failglob: self.state.shopt.failglob,
            dotglob: self.state.shopt.dotglob,
            globstar: self.state.shopt.globstar,
            extglob,
            nocaseglob: self.state.shopt.nocaseglob,
        };
        let cwd = std::env::current_dir().unwrap_or_else(|_| "/".into());
        match GlobExpander::new(options).expand(&pattern, &cwd) {
            GlobOutcome::Matches(matches) => Ok(matches),
            GlobOutcome::NoMatch => {
                if self.state.shopt.failglob {
                    Err(ControlFlow::Error(ShellError::NoGlobMatch(display)))
                } else if self.state.shopt.nullglob {
                    Ok(Vec::new())
                } else {
                    Ok(vec![display])
                }
            }
        }
    }
}

// =============================================================================
// PIECE HELPERS
// =============================================================================

/// Run IFS splitting over the splittable pieces.
pub(crate) fn split_pieces(pieces: Vec<Piece>, ifs: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Break => out.push(Piece::Break),
            Piece::Text(p) if p.splittable && !p.quoted && !ifs.is_empty() => {
                let result = split_fields(&p.text, ifs);
                if result.leading_boundary {
                    out.push(Piece::Break);
                }
                for (i, field) in result.fields.iter().enumerate() {
                    if i > 0 {
                        out.push(Piece::Break);
                    }
                    out.push(Piece::Text(TextPiece {
                        text: field.clone(),
                        quoted: false,
                        splittable: false,
                        // Explicit empty fields from hard separators stay.
                        hard: field.is_empty(),
                    }));
                }
                if result.trailing_boundary {
                    out.push(Piece::Break);
                }
            }
            Piece::Text(p) => out.push(Piece::Text(p)),
        }
    }
    out
}

/// Join pieces into a single string (field breaks become spaces).
pub(crate) fn join_pieces(pieces: Vec<Piece>) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Break => out.push(' '),
            Piece::Text(p) => out.push_str(&p.text),
        }
    }
    out
}

/// Escape glob metacharacters so quoted text matches literally.
pub(crate) fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '(' | ')' | '|' | '!' | '@' | '+') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, WordNode};
    use crate::parser::Parser;

    fn interp() -> Interpreter {
        Interpreter::new(false)
    }

    /// Parse `input` as a single simple command and return its words.
    fn words_of(input: &str) -> Vec<WordNode> {
        let script = Parser::new().parse(input).expect("parse");
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Simple(simple) => {
                let mut words = Vec::new();
                if let Some(name) = &simple.name {
                    words.push(name.clone());
                }
                words.extend(simple.args.iter().cloned());
                words
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    fn expand(interp: &mut Interpreter, input: &str) -> Vec<String> {
        let words = words_of(input);
        interp.expand_words(&words).expect("expand")
    }

    #[test]
    fn literals_pass_through() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo a b"), vec!["echo", "a", "b"]);
    }

    #[test]
    fn unquoted_variable_splits() {
        let mut i = interp();
        i.state.assign("v", "one two".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo $v"), vec!["echo", "one", "two"]);
    }

    #[test]
    fn quoted_variable_does_not_split() {
        let mut i = interp();
        i.state.assign("v", "one two".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo \"$v\""), vec!["echo", "one two"]);
    }

    #[test]
    fn single_quotes_never_expand() {
        let mut i = interp();
        i.state.assign("v", "value".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo '$v'"), vec!["echo", "$v"]);
    }

    #[test]
    fn unset_unquoted_var_vanishes() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo $missing end"), vec!["echo", "end"]);
    }

    #[test]
    fn quoted_empty_stays_a_field() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo \"\" end"), vec!["echo", "", "end"]);
    }

    #[test]
    fn at_with_no_params_in_quotes_yields_no_field() {
        let mut i = interp();
        i.state.positional = Vec::new();
        assert_eq!(expand(&mut i, "echo \"$@\""), vec!["echo"]);
    }

    #[test]
    fn at_with_affixes_and_no_params_joins() {
        let mut i = interp();
        i.state.positional = Vec::new();
        assert_eq!(expand(&mut i, "echo \"a$@b\""), vec!["echo", "ab"]);
    }

    #[test]
    fn quoted_at_produces_one_field_per_param() {
        let mut i = interp();
        i.state.positional = vec!["one".into(), "two words".into(), "three".into()];
        assert_eq!(
            expand(&mut i, "echo \"$@\""),
            vec!["echo", "one", "two words", "three"]
        );
    }

    #[test]
    fn double_at_with_affixes() {
        // printf '<%s>\n' "a$@b$@c" with 1 2 3:
        // fields a1, 2, 3b1, 2, 3c.
        let mut i = interp();
        i.state.positional = vec!["1".into(), "2".into(), "3".into()];
        assert_eq!(
            expand(&mut i, "x \"a$@b$@c\""),
            vec!["x", "a1", "2", "3b1", "2", "3c"]
        );
    }

    #[test]
    fn star_in_quotes_joins_with_ifs_first_char() {
        let mut i = interp();
        i.state.positional = vec!["a".into(), "b".into()];
        i.state.assign("IFS", ":".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo \"$*\""), vec!["echo", "a:b"]);
    }

    #[test]
    fn non_whitespace_ifs_preserves_empty_fields() {
        let mut i = interp();
        i.state.assign("IFS", ":".into()).expect("assign");
        i.state.assign("v", "a::b".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo $v"), vec!["echo", "a", "", "b"]);
    }

    #[test]
    fn empty_ifs_means_no_split() {
        let mut i = interp();
        i.state.assign("IFS", "".into()).expect("assign");
        i.state.assign("v", "a b c".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo $v"), vec!["echo", "a b c"]);
    }

    #[test]
    fn mixed_quoted_and_splittable_parts_join_at_edges() {
        let mut i = interp();
        i.state.assign("a", "1 2".into()).expect("assign");
        i.state.assign("b", "3 4".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo $a\"$b\""), vec!["echo", "1", "23 4"]);
    }

    #[test]
    fn arithmetic_expansion() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo $((2 + 3 * 4))"), vec!["echo", "14"]);
    }

    #[test]
    fn parameter_default_used_when_unset() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo ${missing:-fallback}"), vec!["echo", "fallback"]);
        i.state.assign("present", "x".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${present:-fallback}"), vec!["echo", "x"]);
    }

    #[test]
    fn parameter_length_and_removal() {
        let mut i = interp();
        i.state.assign("path", "/usr/local/bin".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${#path}"), vec!["echo", "14"]);
        assert_eq!(expand(&mut i, "echo ${path##*/}"), vec!["echo", "bin"]);
        assert_eq!(expand(&mut i, "echo ${path%/*}"), vec!["echo", "/usr/local"]);
        assert_eq!(expand(&mut i, "echo ${path#*/}"), vec!["echo", "usr/local/bin"]);
    }

    #[test]
    fn parameter_replacement() {
        let mut i = interp();
        i.state.assign("v", "aXbXc".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${v/X/-}"), vec!["echo", "a-bXc"]);
        assert_eq!(expand(&mut i, "echo ${v//X/-}"), vec!["echo", "a-b-c"]);
    }

    #[test]
    fn substring_expansion() {
        let mut i = interp();
        i.state.assign("v", "abcdef".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${v:1:3}"), vec!["echo", "bcd"]);
        assert_eq!(expand(&mut i, "echo ${v: -2}"), vec!["echo", "ef"]);
    }

    #[test]
    fn case_modification() {
        let mut i = interp();
        i.state.assign("v", "hello".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${v^}"), vec!["echo", "Hello"]);
        assert_eq!(expand(&mut i, "echo ${v^^}"), vec!["echo", "HELLO"]);
    }

    #[test]
    fn indirect_expansion() {
        let mut i = interp();
        i.state.assign("target", "value".into()).expect("assign");
        i.state.assign("ref", "target".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ${!ref}"), vec!["echo", "value"]);
    }

    #[test]
    fn array_expansion_rules() {
        let mut i = interp();
        let script = Parser::new().parse("arr=(x 'y z' w)").expect("parse");
        i.run_script(&script).expect("run");
        assert_eq!(expand(&mut i, "echo \"${arr[@]}\""), vec!["echo", "x", "y z", "w"]);
        assert_eq!(expand(&mut i, "echo ${#arr[@]}"), vec!["echo", "3"]);
        assert_eq!(expand(&mut i, "echo ${!arr[@]}"), vec!["echo", "0", "1", "2"]);
        assert_eq!(expand(&mut i, "echo ${arr[1]}"), vec!["echo", "y", "z"]);
        assert_eq!(expand(&mut i, "echo \"${arr[1]}\""), vec!["echo", "y z"]);
    }

    #[test]
    fn tilde_expansion_uses_home() {
        let mut i = interp();
        i.state.assign("HOME", "/home/tester".into()).expect("assign");
        assert_eq!(expand(&mut i, "echo ~/bin"), vec!["echo", "/home/tester/bin"]);
        assert_eq!(expand(&mut i, "echo \"~\""), vec!["echo", "~"]);
    }

    #[test]
    fn escaped_glob_char_stays_literal() {
        let mut i = interp();
        assert_eq!(expand(&mut i, "echo \\*"), vec!["echo", "*"]);
    }

    #[test]
    fn unmatched_glob_stays_literal_by_default() {
        let mut i = interp();
        assert_eq!(
            expand(&mut i, "echo /nonexistent-dir-zz/*"),
            vec!["echo", "/nonexistent-dir-zz/*"]
        );
    }

    #[test]
    fn nullglob_drops_unmatched() {
        let mut i = interp();
        i.state.shopt.nullglob = true;
        assert_eq!(expand(&mut i, "echo /nonexistent-dir-zz/*"), vec!["echo"]);
    }

    #[test]
    fn command_substitution_strips_all_trailing_newlines() {
        let mut i = interp();
        let script = Parser::new().parse("v=$(printf 'out\\n\\n\\n')").expect("parse");
        i.run_script(&script).expect("run");
        assert_eq!(i.state.lookup("v"), Some("out".into()));
    }

    #[test]
    fn command_substitution_with_quoted_paren() {
        // The lexer property behind scenario 1: the quoted `)` does not
        // close the substitution.
        let mut i = interp();
        let script = Parser::new().parse("v=$(echo ')')").expect("parse");
        i.run_script(&script).expect("run");
        assert_eq!(i.state.lookup("v"), Some(")".into()));
    }

    #[test]
    fn nounset_errors_on_unset() {
        let mut i = interp();
        i.state.options.nounset = true;
        let words = words_of("echo $nope");
        let result = i.expand_words(&words);
        assert!(result.is_err());
    }

    #[test]
    fn assignment_values_do_not_split_or_glob() {
        let mut i = interp();
        let script = Parser::new().parse("v='a b'; w=$v").expect("parse");
        i.run_script(&script).expect("run");
        assert_eq!(i.state.lookup("w"), Some("a b".into()));
    }
}
