//! Simple-command parsing: words, assignment words, and redirections.

use crate::ast::{
    ArrayElementNode, Ast, AssignmentNode, HereDocNode, RedirectionNode, RedirectionOperator,
    RedirectionTarget, SimpleCommandNode, WordNode,
};
use crate::parser::lexer::{assignment_eq_index, Lexer, QuoteKind, Token, TokenType};
use crate::parser::parser::Parser;
use crate::parser::types::ParserError;
use crate::parser::word_parser::{parse_heredoc_body, parse_word, parse_word_parts};

/// Token types that act as ordinary words in argument position.
const WORDISH: &[TokenType] = &[
    TokenType::Word,
    TokenType::AssignmentWord,
    TokenType::Number,
    TokenType::If,
    TokenType::Then,
    TokenType::Else,
    TokenType::Elif,
    TokenType::Fi,
    TokenType::For,
    TokenType::While,
    TokenType::Until,
    TokenType::Do,
    TokenType::Done,
    TokenType::Case,
    TokenType::Esac,
    TokenType::In,
    TokenType::Function,
    TokenType::Select,
    TokenType::LBrace,
    TokenType::RBrace,
    TokenType::Bang,
];

const REDIRECT_OPS: &[TokenType] = &[
    TokenType::Less,
    TokenType::Great,
    TokenType::DGreat,
    TokenType::LessAnd,
    TokenType::GreatAnd,
    TokenType::LessGreat,
    TokenType::Clobber,
    TokenType::AndGreat,
    TokenType::AndDGreat,
    TokenType::TLess,
    TokenType::DLess,
    TokenType::DLessDash,
];

impl Parser {
    pub(crate) fn is_wordish(&self) -> bool {
        WORDISH.contains(&self.current().token_type)
    }

    pub(crate) fn at_redirect(&self) -> bool {
        let tt = self.current().token_type;
        if REDIRECT_OPS.contains(&tt) {
            return true;
        }
        tt == TokenType::Number && REDIRECT_OPS.contains(&self.peek_type(1))
    }

    /// Convert the current token to a word and consume it.
    pub(crate) fn take_word(&mut self) -> Result<WordNode, ParserError> {
        let token = self.advance();
        self.word_from_token(&token)
    }

    pub(crate) fn word_from_token(&self, token: &Token) -> Result<WordNode, ParserError> {
        match token.token_type {
            TokenType::Word | TokenType::AssignmentWord => parse_word(token, &self.options),
            // Keywords and friends demoted to plain words.
            _ => Ok(Ast::word(vec![Ast::literal(token.value.clone())])),
        }
    }

    pub(crate) fn parse_simple_command(&mut self) -> Result<SimpleCommandNode, ParserError> {
        let line = self.current().line;
        let mut assignments: Vec<AssignmentNode> = Vec::new();
        let mut words: Vec<WordNode> = Vec::new();
        let mut redirections: Vec<RedirectionNode> = Vec::new();
        let mut seen_command_word = false;

        loop {
            self.check_iterations()?;
            if self.at_redirect() {
                redirections.push(self.parse_redirection()?);
                continue;
            }
            let tt = self.current().token_type;
            if tt == TokenType::AssignmentWord && !seen_command_word {
                let token = self.advance();
                assignments.push(self.parse_assignment(&token)?);
                continue;
            }
            if self.is_wordish() {
                let token = self.advance();
                words.push(self.word_from_token(&token)?);
                seen_command_word = true;
                continue;
            }
            break;
        }

        if assignments.is_empty() && words.is_empty() && redirections.is_empty() {
            let t = self.current().clone();
            return self.syntax_error(format!("unexpected token `{}`", t.value));
        }

        let mut iter = words.into_iter();
        let name = iter.next();
        let args: Vec<WordNode> = iter.collect();
        Ok(Ast::simple_command(assignments, name, args, redirections, line))
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    /// Parse an `AssignmentWord` token into its pieces.
    pub(crate) fn parse_assignment(&mut self, token: &Token) -> Result<AssignmentNode, ParserError> {
        let raw = token.value.as_str();
        let eq = assignment_eq_index(raw).ok_or_else(|| {
            ParserError::new(format!("`{}` is not a valid assignment", raw), token.line, token.column)
        })?;
        let chars: Vec<char> = raw.chars().collect();
        let append = eq > 0 && chars[eq - 1] == '+';
        let lhs_end = if append { eq - 1 } else { eq };
        let lhs: String = chars[..lhs_end].iter().collect();

        let (name, subscript) = match lhs.find('[') {
            Some(open) => {
                let name = lhs[..open].to_string();
                let sub = lhs[open + 1..lhs.len() - 1].to_string();
                (name, Some(sub))
            }
            None => (lhs, None),
        };

        let value_text: String = chars[eq + 1..].iter().collect();

        // Array initializer: the lexer kept `(…)` inside the token.
        if value_text.starts_with('(') && value_text.ends_with(')') && subscript.is_none() {
            let inner = &value_text[1..value_text.len() - 1];
            let elements = self.parse_array_elements(inner, token.line)?;
            return Ok(Ast::assignment(name, None, None, append, Some(elements)));
        }

        // Scalar value: strip the `name=` prefix off the first quote part.
        let prefix_len = eq + 1;
        let mut parts = token.quote_parts.clone();
        if let Some(first) = parts.first_mut() {
            debug_assert_eq!(first.kind, QuoteKind::None);
            first.text = first.text.chars().skip(prefix_len).collect();
            if first.text.is_empty() {
                parts.remove(0);
            }
        }
        let value = parse_word_parts(&parts, &self.options, token.line, true)?;
        Ok(Ast::assignment(name, subscript, Some(value), append, None))
    }

    /// Parse the space-separated elements of `name=(…)`, each optionally
    /// `[key]=`-prefixed.
    fn parse_array_elements(
        &mut self,
        inner: &str,
        line: usize,
    ) -> Result<Vec<ArrayElementNode>, ParserError> {
        let out = Lexer::with_options(inner, self.options.clone())
            .tokenize()
            .map_err(ParserError::from)?;
        let mut elements = Vec::new();
        for token in &out.tokens {
            if matches!(token.token_type, TokenType::Eof | TokenType::Newline) {
                continue;
            }
            // `[key]=value` element; the key is raw text, the value a word.
            if token.value.starts_with('[') && token.quote_parts.first().map_or(false, |p| p.kind == QuoteKind::None) {
                if let Some(close) = token.value.find("]=") {
                    let key = token.value[1..close].to_string();
                    let rest = &token.value[close + 2..];
                    let word = single_word_from_text(rest, line, self)?;
                    elements.push(ArrayElementNode { key: Some(key), value: word });
                    continue;
                }
            }
            let word = self.word_from_token(token)?;
            elements.push(ArrayElementNode { key: None, value: word });
        }
        Ok(elements)
    }

    // =========================================================================
    // REDIRECTIONS
    // =========================================================================

    /// Parse trailing redirections after a compound command.
    pub(crate) fn parse_trailing_redirections(
        &mut self,
    ) -> Result<Vec<RedirectionNode>, ParserError> {
        let mut redirections = Vec::new();
        while self.at_redirect() {
            redirections.push(self.parse_redirection()?);
        }
        Ok(redirections)
    }

    pub(crate) fn parse_redirection(&mut self) -> Result<RedirectionNode, ParserError> {
        let fd = if self.check(TokenType::Number) {
            let token = self.advance();
            Some(token.value.parse::<i32>().map_err(|_| {
                ParserError::new(format!("bad file descriptor `{}`", token.value), token.line, token.column)
            })?)
        } else {
            None
        };

        let op_token = self.advance();
        let operator = match op_token.token_type {
            TokenType::Less => RedirectionOperator::Less,
            TokenType::Great => RedirectionOperator::Great,
            TokenType::DGreat => RedirectionOperator::DGreat,
            TokenType::LessAnd => RedirectionOperator::LessAnd,
            TokenType::GreatAnd => RedirectionOperator::GreatAnd,
            TokenType::LessGreat => RedirectionOperator::LessGreat,
            TokenType::Clobber => RedirectionOperator::Clobber,
            TokenType::AndGreat => RedirectionOperator::AndGreat,
            TokenType::AndDGreat => RedirectionOperator::AndDGreat,
            TokenType::TLess => RedirectionOperator::TLess,
            TokenType::DLess => RedirectionOperator::DLess,
            TokenType::DLessDash => RedirectionOperator::DLessDash,
            _ => {
                return Err(ParserError::new(
                    format!("expected redirection operator, found `{}`", op_token.value),
                    op_token.line,
                    op_token.column,
                ))
            }
        };

        // Heredocs: consume the delimiter word and attach the payload the
        // lexer collected for this `<<` in order.
        if matches!(operator, RedirectionOperator::DLess | RedirectionOperator::DLessDash) {
            if !self.is_wordish() {
                return self.syntax_error("expected here-document delimiter");
            }
            let delim_token = self.advance();
            let payload = self
                .heredocs
                .get(self.next_heredoc)
                .cloned()
                .ok_or_else(|| {
                    ParserError::new(
                        "here-document body missing",
                        delim_token.line,
                        delim_token.column,
                    )
                })?;
            self.next_heredoc += 1;
            let content = if payload.quoted {
                Ast::word(vec![Ast::literal(payload.body.clone())])
            } else {
                parse_heredoc_body(&payload.body, delim_token.line)?
            };
            let heredoc = HereDocNode {
                delimiter: payload.delimiter,
                content,
                strip_tabs: payload.strip_tabs,
                quoted: payload.quoted,
            };
            return Ok(Ast::redirection(operator, RedirectionTarget::HereDoc(heredoc), fd));
        }

        if !self.is_wordish() {
            let t = self.current().clone();
            if t.token_type == TokenType::Eof || t.token_type == TokenType::Newline {
                return Err(ParserError::new(
                    "syntax error near unexpected token `newline'",
                    t.line,
                    t.column,
                ));
            }
            return self.syntax_error(format!("unexpected token `{}` after redirection", t.value));
        }
        let target = self.take_word()?;
        Ok(Ast::redirection(operator, RedirectionTarget::Word(target), fd))
    }
}

/// Parse a standalone piece of text as one word.
fn single_word_from_text(text: &str, line: usize, parser: &Parser) -> Result<WordNode, ParserError> {
    let out = Lexer::with_options(text, parser.options.clone())
        .tokenize()
        .map_err(ParserError::from)?;
    match out.tokens.first() {
        Some(t) if t.token_type != TokenType::Eof => parser.word_from_token(t),
        _ => Ok(WordNode::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, RedirectionOperator as Op, RedirectionTarget};

    fn simple(input: &str) -> SimpleCommandNode {
        let script = Parser::new().parse(input).expect("parse");
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Simple(s) => s.clone(),
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn name_and_args() {
        let c = simple("grep -r pattern dir");
        assert_eq!(c.name.as_ref().and_then(|w| w.as_literal()), Some("grep"));
        assert_eq!(c.args.len(), 3);
    }

    #[test]
    fn prefix_assignments() {
        let c = simple("FOO=1 BAR=2 env");
        assert_eq!(c.assignments.len(), 2);
        assert_eq!(c.assignments[0].name, "FOO");
        assert!(c.name.is_some());
    }

    #[test]
    fn assignment_after_command_is_a_word() {
        let c = simple("env FOO=1");
        assert!(c.assignments.is_empty());
        assert_eq!(c.args.len(), 1);
    }

    #[test]
    fn assignment_only() {
        let c = simple("X=hello");
        assert!(c.name.is_none());
        assert_eq!(c.assignments[0].value.as_ref().and_then(|w| w.as_literal()), Some("hello"));
    }

    #[test]
    fn append_assignment() {
        let c = simple("X+=more");
        assert!(c.assignments[0].append);
    }

    #[test]
    fn array_element_assignment() {
        let c = simple("arr[3]=x");
        assert_eq!(c.assignments[0].subscript.as_deref(), Some("3"));
    }

    #[test]
    fn array_initializer() {
        let c = simple("arr=(a b c)");
        let elems = c.assignments[0].array.as_ref().expect("array");
        assert_eq!(elems.len(), 3);
        assert!(elems.iter().all(|e| e.key.is_none()));
    }

    #[test]
    fn keyed_array_initializer() {
        let c = simple("m=([alpha]=1 [beta]=2)");
        let elems = c.assignments[0].array.as_ref().expect("array");
        assert_eq!(elems[0].key.as_deref(), Some("alpha"));
        assert_eq!(elems[1].key.as_deref(), Some("beta"));
    }

    #[test]
    fn output_redirect() {
        let c = simple("echo hi > out.txt");
        assert_eq!(c.redirections.len(), 1);
        assert_eq!(c.redirections[0].operator, Op::Great);
        assert!(c.redirections[0].fd.is_none());
    }

    #[test]
    fn fd_redirect() {
        let c = simple("cmd 2>errors");
        assert_eq!(c.redirections[0].fd, Some(2));
    }

    #[test]
    fn dup_redirect() {
        let c = simple("cmd 2>&1");
        assert_eq!(c.redirections[0].operator, Op::GreatAnd);
        match &c.redirections[0].target {
            RedirectionTarget::Word(w) => assert_eq!(w.as_literal(), Some("1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn here_string() {
        let c = simple("cat <<<hello");
        assert_eq!(c.redirections[0].operator, Op::TLess);
    }

    #[test]
    fn heredoc_attached() {
        let script = Parser::new().parse("cat <<EOF\nhello $x\nEOF\n").expect("parse");
        let c = match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Simple(s) => s.clone(),
            other => panic!("unexpected {:?}", other),
        };
        match &c.redirections[0].target {
            RedirectionTarget::HereDoc(h) => {
                assert_eq!(h.delimiter, "EOF");
                assert!(!h.quoted);
                assert_eq!(h.content.parts.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn quoted_heredoc_is_literal() {
        let script = Parser::new().parse("cat <<'EOF'\n$x\nEOF\n").expect("parse");
        let c = match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Simple(s) => s.clone(),
            other => panic!("unexpected {:?}", other),
        };
        match &c.redirections[0].target {
            RedirectionTarget::HereDoc(h) => {
                assert!(h.quoted);
                assert_eq!(h.content.as_literal(), Some("$x\n"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keyword_in_arg_position_is_word() {
        let c = simple("echo done");
        assert_eq!(c.args[0].as_literal(), Some("done"));
    }

    #[test]
    fn redirect_before_command_name() {
        let c = simple("> out echo hi");
        assert_eq!(c.redirections.len(), 1);
        assert_eq!(c.name.as_ref().and_then(|w| w.as_literal()), Some("echo"));
    }
}
