//! Compound commands: control structures, groups, subshells, functions.

use crate::ast::{
    ArithmeticCommandNode, CaseItemNode, CaseNode, CaseTerminator, CompoundCommandNode,
    ConditionalCommandNode, CStyleForNode, ForNode, FunctionDefNode, GroupNode, IfClause, IfNode,
    SelectNode, SubshellNode, UntilNode, WhileNode, WordNode,
};
use crate::parser::lexer::TokenType;
use crate::parser::parser::Parser;
use crate::parser::types::ParserError;

impl Parser {
    pub(crate) fn parse_compound_command(&mut self) -> Result<CompoundCommandNode, ParserError> {
        let mut compound = match self.current().token_type {
            TokenType::If => CompoundCommandNode::If(self.parse_if()?),
            TokenType::While => {
                let (condition, body) = self.parse_loop(TokenType::While)?;
                CompoundCommandNode::While(WhileNode { condition, body, redirections: Vec::new() })
            }
            TokenType::Until => {
                let (condition, body) = self.parse_loop(TokenType::Until)?;
                CompoundCommandNode::Until(UntilNode { condition, body, redirections: Vec::new() })
            }
            TokenType::For => self.parse_for()?,
            TokenType::Select => CompoundCommandNode::Select(self.parse_select()?),
            TokenType::Case => CompoundCommandNode::Case(self.parse_case()?),
            TokenType::LParen => {
                self.advance();
                let body = self.parse_statement_list(&[TokenType::RParen], "subshell")?;
                self.expect(TokenType::RParen)?;
                CompoundCommandNode::Subshell(SubshellNode { body, redirections: Vec::new() })
            }
            TokenType::LBrace => {
                self.advance();
                let body = self.parse_statement_list(&[TokenType::RBrace], "brace group")?;
                self.expect(TokenType::RBrace)?;
                CompoundCommandNode::Group(GroupNode { body, redirections: Vec::new() })
            }
            TokenType::DBrackStart => {
                let line = self.current().line;
                self.advance();
                let expression = self.parse_conditional_expression()?;
                self.expect(TokenType::DBrackEnd)?;
                CompoundCommandNode::Conditional(ConditionalCommandNode {
                    expression,
                    redirections: Vec::new(),
                    line,
                })
            }
            TokenType::ArithCommand => {
                let token = self.advance();
                CompoundCommandNode::Arithmetic(ArithmeticCommandNode {
                    expression: token.value,
                    redirections: Vec::new(),
                    line: token.line,
                })
            }
            _ => {
                let t = self.current().clone();
                return self.syntax_error(format!("unexpected token `{}`", t.value));
            }
        };

        let redirections = self.parse_trailing_redirections()?;
        if !redirections.is_empty() {
            match &mut compound {
                CompoundCommandNode::If(n) => n.redirections = redirections,
                CompoundCommandNode::While(n) => n.redirections = redirections,
                CompoundCommandNode::Until(n) => n.redirections = redirections,
                CompoundCommandNode::For(n) => n.redirections = redirections,
                CompoundCommandNode::CStyleFor(n) => n.redirections = redirections,
                CompoundCommandNode::Case(n) => n.redirections = redirections,
                CompoundCommandNode::Select(n) => n.redirections = redirections,
                CompoundCommandNode::Subshell(n) => n.redirections = redirections,
                CompoundCommandNode::Group(n) => n.redirections = redirections,
                CompoundCommandNode::Arithmetic(n) => n.redirections = redirections,
                CompoundCommandNode::Conditional(n) => n.redirections = redirections,
            }
        }
        Ok(compound)
    }

    // =========================================================================
    // IF
    // =========================================================================

    fn parse_if(&mut self) -> Result<IfNode, ParserError> {
        self.expect(TokenType::If)?;
        let mut clauses = Vec::new();

        let condition = self.parse_statement_list(&[TokenType::Then], "if condition")?;
        self.expect(TokenType::Then)?;
        let body =
            self.parse_statement_list(&[TokenType::Elif, TokenType::Else, TokenType::Fi], "if body")?;
        clauses.push(IfClause { condition, body });

        while self.check(TokenType::Elif) {
            self.advance();
            let condition = self.parse_statement_list(&[TokenType::Then], "elif condition")?;
            self.expect(TokenType::Then)?;
            let body = self.parse_statement_list(
                &[TokenType::Elif, TokenType::Else, TokenType::Fi],
                "elif body",
            )?;
            clauses.push(IfClause { condition, body });
        }

        let else_body = if self.check(TokenType::Else) {
            self.advance();
            Some(self.parse_statement_list(&[TokenType::Fi], "else body")?)
        } else {
            None
        };
        self.expect(TokenType::Fi)?;

        Ok(IfNode { clauses, else_body, redirections: Vec::new() })
    }

    // =========================================================================
    // WHILE / UNTIL
    // =========================================================================

    fn parse_loop(
        &mut self,
        keyword: TokenType,
    ) -> Result<(Vec<crate::ast::StatementNode>, Vec<crate::ast::StatementNode>), ParserError> {
        self.expect(keyword)?;
        let condition = self.parse_statement_list(&[TokenType::Do], "loop condition")?;
        self.expect(TokenType::Do)?;
        let body = self.parse_statement_list(&[TokenType::Done], "loop body")?;
        self.expect(TokenType::Done)?;
        Ok((condition, body))
    }

    // =========================================================================
    // FOR / SELECT
    // =========================================================================

    fn parse_for(&mut self) -> Result<CompoundCommandNode, ParserError> {
        self.expect(TokenType::For)?;

        // C-style: `for ((init; cond; update))`.
        if self.check(TokenType::ArithCommand) {
            let token = self.advance();
            let mut sections = split_arith_sections(&token.value);
            if sections.len() != 3 {
                return Err(ParserError::new(
                    "expected `((init; condition; update))`",
                    token.line,
                    token.column,
                ));
            }
            let update = sections.pop().unwrap_or_default();
            let condition = sections.pop().unwrap_or_default();
            let init = sections.pop().unwrap_or_default();
            let body = self.parse_do_block()?;
            return Ok(CompoundCommandNode::CStyleFor(CStyleForNode {
                init: non_blank(init),
                condition: non_blank(condition),
                update: non_blank(update),
                body,
                redirections: Vec::new(),
                line: token.line,
            }));
        }

        let (variable, words) = self.parse_iteration_head()?;
        let body = self.parse_do_block()?;
        Ok(CompoundCommandNode::For(ForNode { variable, words, body, redirections: Vec::new() }))
    }

    fn parse_select(&mut self) -> Result<SelectNode, ParserError> {
        self.expect(TokenType::Select)?;
        let (variable, words) = self.parse_iteration_head()?;
        let body = self.parse_do_block()?;
        Ok(SelectNode { variable, words, body, redirections: Vec::new() })
    }

    /// `NAME [in word…]` shared by `for` and `select`. `words == None`
    /// means "iterate the positional parameters".
    fn parse_iteration_head(&mut self) -> Result<(String, Option<Vec<WordNode>>), ParserError> {
        if !self.check(TokenType::Word) {
            let t = self.current().clone();
            return self.syntax_error(format!("expected variable name, found `{}`", t.value));
        }
        let name_token = self.advance();
        let variable = name_token.value.clone();

        self.skip_newlines();
        let words = if self.check(TokenType::In) {
            self.advance();
            let mut words = Vec::new();
            while self.is_wordish() {
                words.push(self.take_word()?);
            }
            Some(words)
        } else {
            None
        };
        Ok((variable, words))
    }

    /// Separator, `do`, body, `done`.
    fn parse_do_block(&mut self) -> Result<Vec<crate::ast::StatementNode>, ParserError> {
        self.skip_separators();
        self.expect(TokenType::Do)?;
        let body = self.parse_statement_list(&[TokenType::Done], "loop body")?;
        self.expect(TokenType::Done)?;
        Ok(body)
    }

    // =========================================================================
    // CASE
    // =========================================================================

    fn parse_case(&mut self) -> Result<CaseNode, ParserError> {
        self.expect(TokenType::Case)?;
        if !self.is_wordish() {
            return self.syntax_error("expected word after `case`");
        }
        let word = self.take_word()?;
        self.skip_newlines();
        self.expect(TokenType::In)?;

        let mut items = Vec::new();
        loop {
            self.check_iterations()?;
            self.skip_separators();
            if self.check(TokenType::Esac) {
                break;
            }
            if self.check(TokenType::Eof) {
                let t = self.current();
                return Err(ParserError::incomplete(
                    "unexpected end of input in case statement",
                    t.line,
                    t.column,
                ));
            }
            items.push(self.parse_case_item()?);
        }
        self.expect(TokenType::Esac)?;
        Ok(CaseNode { word, items, redirections: Vec::new() })
    }

    fn parse_case_item(&mut self) -> Result<CaseItemNode, ParserError> {
        if self.check(TokenType::LParen) {
            self.advance();
        }
        let mut patterns = Vec::new();
        loop {
            if !self.is_wordish() {
                return self.syntax_error("expected case pattern");
            }
            patterns.push(self.take_word()?);
            if self.check(TokenType::Pipe) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(TokenType::RParen)?;

        let body = self.parse_statement_list(
            &[TokenType::DSemi, TokenType::SemiAnd, TokenType::SemiSemiAnd, TokenType::Esac],
            "case item",
        )?;

        let terminator = match self.current().token_type {
            TokenType::DSemi => {
                self.advance();
                CaseTerminator::Break
            }
            TokenType::SemiAnd => {
                self.advance();
                CaseTerminator::FallThrough
            }
            TokenType::SemiSemiAnd => {
                self.advance();
                CaseTerminator::Continue
            }
            // Last item may omit the terminator before `esac`.
            _ => CaseTerminator::Break,
        };
        Ok(CaseItemNode { patterns, body, terminator })
    }

    // =========================================================================
    // FUNCTIONS
    // =========================================================================

    pub(crate) fn parse_function_def(
        &mut self,
        keyword_form: bool,
    ) -> Result<FunctionDefNode, ParserError> {
        let line = self.current().line;
        if keyword_form {
            self.expect(TokenType::Function)?;
        }
        if !self.check(TokenType::Word) {
            let t = self.current().clone();
            return self.syntax_error(format!("expected function name, found `{}`", t.value));
        }
        let name_token = self.advance();
        let name = name_token.value.clone();

        if self.check(TokenType::LParen) {
            self.advance();
            self.expect(TokenType::RParen)?;
        }
        self.skip_newlines();

        let body = self.parse_compound_command()?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(FunctionDefNode { name, body: Box::new(body), redirections, line })
    }
}

/// Split `init; cond; update` at depth-0 semicolons.
fn split_arith_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => sections.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    sections.push(current);
    sections
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, CompoundCommandNode as C};

    fn compound(input: &str) -> C {
        let script = Parser::new().parse(input).expect("parse");
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(c) => c.clone(),
            other => panic!("expected compound, got {:?}", other),
        }
    }

    #[test]
    fn if_elif_else() {
        let c = compound("if a; then b; elif c; then d; else e; fi");
        match c {
            C::If(n) => {
                assert_eq!(n.clauses.len(), 2);
                assert!(n.else_body.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nested_if_in_while() {
        let c = compound("while a; do if b; then c; fi; done");
        match c {
            C::While(n) => {
                assert_eq!(n.body.len(), 1);
                assert!(matches!(
                    n.body[0].pipelines[0].commands[0],
                    CommandNode::Compound(C::If(_))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn until_loop() {
        assert!(matches!(compound("until x; do y; done"), C::Until(_)));
    }

    #[test]
    fn for_in_words() {
        let c = compound("for f in a b c; do echo $f; done");
        match c {
            C::For(n) => {
                assert_eq!(n.variable, "f");
                assert_eq!(n.words.as_ref().map(|w| w.len()), Some(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn for_without_in_iterates_positionals() {
        let c = compound("for arg; do echo $arg; done");
        match c {
            C::For(n) => assert!(n.words.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn c_style_for() {
        let c = compound("for ((i=0; i<3; i++)); do echo $i; done");
        match c {
            C::CStyleFor(n) => {
                assert_eq!(n.init.as_deref(), Some("i=0"));
                assert_eq!(n.condition.as_deref(), Some(" i<3"));
                assert_eq!(n.update.as_deref(), Some(" i++"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn c_style_for_empty_sections() {
        let c = compound("for ((;;)); do break; done");
        match c {
            C::CStyleFor(n) => {
                assert!(n.init.is_none());
                assert!(n.condition.is_none());
                assert!(n.update.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn select_loop() {
        let c = compound("select opt in a b; do echo $opt; done");
        match c {
            C::Select(n) => {
                assert_eq!(n.variable, "opt");
                assert_eq!(n.words.as_ref().map(|w| w.len()), Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_items_and_terminators() {
        let c = compound("case $x in a) echo a ;; b|c) echo bc ;& d) echo d ;;& e) echo e ;; esac");
        match c {
            C::Case(n) => {
                assert_eq!(n.items.len(), 4);
                assert_eq!(n.items[0].terminator, CaseTerminator::Break);
                assert_eq!(n.items[1].patterns.len(), 2);
                assert_eq!(n.items[1].terminator, CaseTerminator::FallThrough);
                assert_eq!(n.items[2].terminator, CaseTerminator::Continue);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_with_leading_paren_pattern() {
        let c = compound("case x in (a) echo a ;; esac");
        match c {
            C::Case(n) => assert_eq!(n.items.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_default_pattern() {
        let c = compound("case y in *) echo default ;; esac");
        match c {
            C::Case(n) => assert_eq!(n.items.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn brace_group_with_redirect() {
        let c = compound("{ echo a; echo b; } > out");
        match c {
            C::Group(n) => {
                assert_eq!(n.body.len(), 2);
                assert_eq!(n.redirections.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subshell() {
        let c = compound("(cd /tmp; pwd)");
        assert!(matches!(c, C::Subshell(_)));
    }

    #[test]
    fn arithmetic_command() {
        let c = compound("(( x += 1 ))");
        match c {
            C::Arithmetic(n) => assert_eq!(n.expression, " x += 1 "),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_done_is_incomplete() {
        let err = Parser::new().parse("for x in a b; do echo $x\n").unwrap_err();
        assert!(err.incomplete);
    }

    #[test]
    fn missing_esac_is_incomplete() {
        let err = Parser::new().parse("case x in a) echo a ;;\n").unwrap_err();
        assert!(err.incomplete);
    }

    #[test]
    fn function_with_subshell_body() {
        let script = Parser::new().parse("f() (echo isolated)").expect("parse");
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::FunctionDef(def) => {
                assert!(matches!(*def.body, C::Subshell(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
