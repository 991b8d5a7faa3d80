//! Recursive-descent parser.
//!
//! Consumes the token stream and produces the Command AST. Grammar
//! (simplified):
//!
//! ```text
//!   script       ::= statement*
//!   statement    ::= pipeline ((&& | '||') pipeline)* [&]
//!   pipeline     ::= [!] command (| command)*
//!   command      ::= compound_command redirect* | function_def | simple_command
//! ```
//!
//! Unclosed structures (missing `fi`, `done`, `esac`, `}`) surface as
//! *incomplete* errors, which the REPL turns into a PS2 continuation
//! prompt; everything else is a hard syntax error.

use crate::ast::{
    Ast, CommandNode, PipelineNode, Position, ScriptNode, Span, StatementNode, StatementOperator,
};
use crate::parser::lexer::{HeredocPayload, Lexer, Token, TokenType};
use crate::parser::types::{LexerOptions, ParseOutcome, ParserError};

/// Hard ceiling on parser loop iterations; a stuck parser is a bug, not a
/// reason to spin forever.
const MAX_PARSE_ITERATIONS: usize = 1_000_000;

pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) heredocs: Vec<HeredocPayload>,
    pub(crate) next_heredoc: usize,
    pub(crate) options: LexerOptions,
    /// Errors collected while continuing in recovery mode.
    pub(crate) errors: Vec<ParserError>,
    iterations: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::with_options(LexerOptions::default())
    }

    pub fn with_options(options: LexerOptions) -> Self {
        Self {
            tokens: Vec::new(),
            pos: 0,
            heredocs: Vec::new(),
            next_heredoc: 0,
            options,
            errors: Vec::new(),
            iterations: 0,
        }
    }

    /// Parse a complete script.
    pub fn parse(&mut self, input: &str) -> Result<ScriptNode, ParserError> {
        let out = Lexer::with_options(input, self.options.clone()).tokenize()?;
        self.tokens = out.tokens;
        self.heredocs = out.heredocs;
        self.pos = 0;
        self.next_heredoc = 0;
        self.errors.clear();
        self.iterations = 0;
        self.parse_script()
    }

    /// Parse, reporting unfinished constructs as `Incomplete` instead of
    /// an error so a REPL can keep reading lines.
    pub fn parse_outcome(&mut self, input: &str) -> Result<ParseOutcome, ParserError> {
        match self.parse(input) {
            Ok(script) => Ok(ParseOutcome::Complete(script)),
            Err(e) if e.incomplete => Ok(ParseOutcome::Incomplete(e.message)),
            Err(e) => Err(e),
        }
    }

    /// Errors collected in recovery mode during the last parse.
    pub fn collected_errors(&self) -> &[ParserError] {
        &self.errors
    }

    // =========================================================================
    // TOKEN HELPERS
    // =========================================================================

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_type(&self, offset: usize) -> TokenType {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[idx].token_type
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, tt: TokenType) -> bool {
        self.current().token_type == tt
    }

    pub(crate) fn check_any(&self, types: &[TokenType]) -> bool {
        types.contains(&self.current().token_type)
    }

    pub(crate) fn expect(&mut self, tt: TokenType) -> Result<Token, ParserError> {
        if self.check(tt) {
            Ok(self.advance())
        } else {
            let t = self.current();
            if t.token_type == TokenType::Eof {
                Err(ParserError::incomplete(
                    format!("unexpected end of input, expected `{}`", tt.as_str()),
                    t.line,
                    t.column,
                ))
            } else {
                Err(ParserError::new(
                    format!("expected `{}`, found `{}`", tt.as_str(), t.value),
                    t.line,
                    t.column,
                ))
            }
        }
    }

    pub(crate) fn syntax_error<T>(&self, message: impl Into<String>) -> Result<T, ParserError> {
        let t = self.current();
        Err(ParserError::new(message, t.line, t.column))
    }

    pub(crate) fn check_iterations(&mut self) -> Result<(), ParserError> {
        self.iterations += 1;
        if self.iterations > MAX_PARSE_ITERATIONS {
            let t = self.current();
            return Err(ParserError::new("parser iteration limit exceeded", t.line, t.column));
        }
        Ok(())
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(TokenType::Newline) {
            self.advance();
        }
    }

    pub(crate) fn skip_separators(&mut self) {
        while self.check_any(&[TokenType::Newline, TokenType::Semicolon]) {
            self.advance();
        }
    }

    fn position_of(token: &Token) -> Position {
        Position { offset: token.start, line: token.line, column: token.column }
    }

    // =========================================================================
    // SCRIPT & STATEMENTS
    // =========================================================================

    fn parse_script(&mut self) -> Result<ScriptNode, ParserError> {
        let mut statements = Vec::new();
        loop {
            self.check_iterations()?;
            self.skip_separators();
            if self.check(TokenType::Eof) {
                break;
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) if self.options.recovery_mode && !e.incomplete => {
                    self.errors.push(e);
                    self.recover_to_separator();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Ast::script(statements))
    }

    /// Skip to the next statement separator after a syntax error.
    fn recover_to_separator(&mut self) {
        while !self.check_any(&[TokenType::Newline, TokenType::Semicolon, TokenType::Eof]) {
            self.advance();
        }
    }

    /// One and-or list, optionally `&`-terminated.
    pub(crate) fn parse_statement(&mut self) -> Result<StatementNode, ParserError> {
        let start = Self::position_of(self.current());
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut operators = Vec::new();

        loop {
            self.check_iterations()?;
            let op = match self.current().token_type {
                TokenType::AndAnd => StatementOperator::And,
                TokenType::OrOr => StatementOperator::Or,
                _ => break,
            };
            self.advance();
            // Operators may be followed by a line break.
            self.skip_newlines();
            operators.push(op);
            pipelines.push(self.parse_pipeline()?);
        }

        let background = if self.check(TokenType::Amp) {
            self.advance();
            true
        } else {
            false
        };

        let end = Self::position_of(self.current());
        Ok(Ast::statement(pipelines, operators, background, Span { start, end }))
    }

    /// `[!] command (| command)*`
    pub(crate) fn parse_pipeline(&mut self) -> Result<PipelineNode, ParserError> {
        let mut negated = false;
        while self.check(TokenType::Bang) {
            self.advance();
            negated = !negated;
        }

        let mut commands = vec![self.parse_command()?];
        while self.check(TokenType::Pipe) {
            self.advance();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }
        Ok(Ast::pipeline(commands, negated))
    }

    /// Dispatch to compound, function definition, or simple command.
    pub(crate) fn parse_command(&mut self) -> Result<CommandNode, ParserError> {
        self.check_iterations()?;
        match self.current().token_type {
            TokenType::If
            | TokenType::While
            | TokenType::Until
            | TokenType::For
            | TokenType::Case
            | TokenType::Select
            | TokenType::LParen
            | TokenType::LBrace
            | TokenType::DBrackStart
            | TokenType::ArithCommand => {
                let compound = self.parse_compound_command()?;
                Ok(CommandNode::Compound(compound))
            }
            TokenType::Function => {
                let def = self.parse_function_def(true)?;
                Ok(CommandNode::FunctionDef(def))
            }
            TokenType::Word
                if self.peek_type(1) == TokenType::LParen && self.peek_type(2) == TokenType::RParen =>
            {
                let def = self.parse_function_def(false)?;
                Ok(CommandNode::FunctionDef(def))
            }
            TokenType::Eof => {
                let t = self.current();
                Err(ParserError::incomplete("unexpected end of input", t.line, t.column))
            }
            // Closing keywords with nothing open are hard errors.
            TokenType::Then
            | TokenType::Else
            | TokenType::Elif
            | TokenType::Fi
            | TokenType::Do
            | TokenType::Done
            | TokenType::Esac
            | TokenType::In
            | TokenType::RBrace
            | TokenType::RParen
            | TokenType::DSemi
            | TokenType::SemiAnd
            | TokenType::SemiSemiAnd => {
                let t = self.current().clone();
                self.syntax_error(format!("unexpected token `{}`", t.value))
            }
            _ => {
                let simple = self.parse_simple_command()?;
                Ok(CommandNode::Simple(simple))
            }
        }
    }

    /// Parse statements until one of `stops` is the current token. The
    /// stop token is not consumed. EOF before a stop token means the
    /// construct is unfinished.
    pub(crate) fn parse_statement_list(
        &mut self,
        stops: &[TokenType],
        what: &str,
    ) -> Result<Vec<StatementNode>, ParserError> {
        let mut statements = Vec::new();
        loop {
            self.check_iterations()?;
            self.skip_separators();
            if self.check_any(stops) {
                break;
            }
            if self.check(TokenType::Eof) {
                let t = self.current();
                return Err(ParserError::incomplete(
                    format!("unexpected end of input in {}", what),
                    t.line,
                    t.column,
                ));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, CompoundCommandNode, StatementOperator};

    fn parse(input: &str) -> ScriptNode {
        Parser::new().parse(input).expect("parse failed")
    }

    #[test]
    fn single_command() {
        let s = parse("echo hi");
        assert_eq!(s.statements.len(), 1);
        assert_eq!(s.statements[0].pipelines.len(), 1);
    }

    #[test]
    fn and_or_list() {
        let s = parse("a && b || c");
        let st = &s.statements[0];
        assert_eq!(st.pipelines.len(), 3);
        assert_eq!(st.operators, vec![StatementOperator::And, StatementOperator::Or]);
    }

    #[test]
    fn background_statement() {
        let s = parse("sleep 5 &");
        assert!(s.statements[0].background);
    }

    #[test]
    fn pipeline_with_negation() {
        let s = parse("! grep x | wc -l");
        let p = &s.statements[0].pipelines[0];
        assert!(p.negated);
        assert_eq!(p.commands.len(), 2);
    }

    #[test]
    fn semicolons_separate_statements() {
        let s = parse("a; b; c");
        assert_eq!(s.statements.len(), 3);
    }

    #[test]
    fn newline_after_and_and() {
        let s = parse("a &&\nb");
        assert_eq!(s.statements[0].pipelines.len(), 2);
    }

    #[test]
    fn incomplete_if_reports_incomplete() {
        let err = Parser::new().parse("if true; then echo hi\n").unwrap_err();
        assert!(err.incomplete, "error should be incomplete: {}", err);
    }

    #[test]
    fn parse_outcome_incomplete() {
        let outcome = Parser::new().parse_outcome("while true; do\n").expect("no hard error");
        assert!(matches!(outcome, ParseOutcome::Incomplete(_)));
    }

    #[test]
    fn parse_outcome_complete() {
        let outcome = Parser::new().parse_outcome("echo ok").expect("no error");
        assert!(matches!(outcome, ParseOutcome::Complete(_)));
    }

    #[test]
    fn hard_error_is_not_incomplete() {
        let err = Parser::new().parse("fi").unwrap_err();
        assert!(!err.incomplete);
    }

    #[test]
    fn recovery_mode_collects_errors() {
        let mut p = Parser::with_options(LexerOptions {
            recovery_mode: true,
            ..Default::default()
        });
        let script = p.parse("fi\necho ok").expect("recovered parse");
        assert_eq!(p.collected_errors().len(), 1);
        assert_eq!(script.statements.len(), 1);
    }

    #[test]
    fn function_definition_short_form() {
        let s = parse("greet() { echo hi; }");
        assert!(matches!(s.statements[0].pipelines[0].commands[0], CommandNode::FunctionDef(_)));
    }

    #[test]
    fn function_definition_keyword_form() {
        let s = parse("function greet { echo hi; }");
        match &s.statements[0].pipelines[0].commands[0] {
            CommandNode::FunctionDef(def) => assert_eq!(def.name, "greet"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subshell_vs_arith() {
        let s = parse("((1 + 2))");
        assert!(matches!(
            s.statements[0].pipelines[0].commands[0],
            CommandNode::Compound(CompoundCommandNode::Arithmetic(_))
        ));
        let s = parse("( (echo a) )");
        assert!(matches!(
            s.statements[0].pipelines[0].commands[0],
            CommandNode::Compound(CompoundCommandNode::Subshell(_))
        ));
    }

    #[test]
    fn double_negation() {
        let s = parse("! ! true");
        assert!(!s.statements[0].pipelines[0].negated);
    }
}
