//! `[[ … ]]` conditional-expression parsing.
//!
//! Standard precedence: `||` < `&&` < `!` < primaries. Words are parsed
//! with full quote context; whether the right side of `==`/`!=` is
//! treated as a pattern is the evaluator's business.

use crate::ast::{CondBinaryOperator, CondExprNode, CondUnaryOperator};
use crate::parser::lexer::TokenType;
use crate::parser::parser::Parser;
use crate::parser::types::ParserError;

fn unary_operator(text: &str) -> Option<CondUnaryOperator> {
    use CondUnaryOperator::*;
    Some(match text {
        "-b" => BlockSpecial,
        "-c" => CharSpecial,
        "-d" => Directory,
        "-e" => Exists,
        "-f" => RegularFile,
        "-g" => SetGid,
        "-h" | "-L" => Symlink,
        "-p" => Pipe,
        "-r" => Readable,
        "-s" => NonEmptyFile,
        "-t" => Terminal,
        "-u" => SetUid,
        "-w" => Writable,
        "-x" => Executable,
        "-S" => Socket,
        "-z" => ZeroLength,
        "-n" => NonZeroLength,
        "-v" => VarSet,
        "-o" => OptionSet,
        _ => return None,
    })
}

fn binary_operator(text: &str) -> Option<CondBinaryOperator> {
    use CondBinaryOperator::*;
    Some(match text {
        "=" | "==" => StrEq,
        "!=" => StrNe,
        "=~" => Match,
        "-eq" => NumEq,
        "-ne" => NumNe,
        "-lt" => NumLt,
        "-le" => NumLe,
        "-gt" => NumGt,
        "-ge" => NumGe,
        "-nt" => NewerThan,
        "-ot" => OlderThan,
        "-ef" => SameFile,
        _ => return None,
    })
}

impl Parser {
    pub(crate) fn parse_conditional_expression(&mut self) -> Result<CondExprNode, ParserError> {
        self.skip_newlines();
        self.parse_cond_or()
    }

    fn parse_cond_or(&mut self) -> Result<CondExprNode, ParserError> {
        let mut left = self.parse_cond_and()?;
        while self.check(TokenType::OrOr) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_cond_and()?;
            left = CondExprNode::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cond_and(&mut self) -> Result<CondExprNode, ParserError> {
        let mut left = self.parse_cond_not()?;
        while self.check(TokenType::AndAnd) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_cond_not()?;
            left = CondExprNode::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cond_not(&mut self) -> Result<CondExprNode, ParserError> {
        if self.check(TokenType::Bang) {
            self.advance();
            let operand = self.parse_cond_not()?;
            return Ok(CondExprNode::Not(Box::new(operand)));
        }
        self.parse_cond_primary()
    }

    fn parse_cond_primary(&mut self) -> Result<CondExprNode, ParserError> {
        self.check_iterations()?;

        if self.check(TokenType::LParen) {
            self.advance();
            self.skip_newlines();
            let inner = self.parse_cond_or()?;
            self.skip_newlines();
            self.expect(TokenType::RParen)?;
            return Ok(CondExprNode::Group(Box::new(inner)));
        }

        if self.check(TokenType::Eof) {
            let t = self.current();
            return Err(ParserError::incomplete(
                "unexpected end of input in conditional expression",
                t.line,
                t.column,
            ));
        }

        // Unary operator followed by an operand word.
        if self.check(TokenType::Word) {
            if let Some(op) = unary_operator(&self.current().value) {
                // `-z` with nothing after it is the bare word `-z`.
                let next_is_operand = {
                    let next = self.peek_type(1);
                    next != TokenType::DBrackEnd
                        && next != TokenType::AndAnd
                        && next != TokenType::OrOr
                        && next != TokenType::RParen
                        && next != TokenType::Eof
                };
                if next_is_operand {
                    self.advance();
                    let operand = self.take_cond_word()?;
                    return Ok(CondExprNode::Unary { operator: op, operand });
                }
            }
        }

        let left = self.take_cond_word()?;

        // Binary operator?
        let op = match self.current().token_type {
            TokenType::Less => Some(CondBinaryOperator::StrLt),
            TokenType::Great => Some(CondBinaryOperator::StrGt),
            TokenType::Word => binary_operator(&self.current().value),
            _ => None,
        };
        if let Some(operator) = op {
            self.advance();
            let right = self.take_cond_word()?;
            return Ok(CondExprNode::Binary { operator, left, right });
        }

        Ok(CondExprNode::Word(left))
    }

    fn take_cond_word(&mut self) -> Result<crate::ast::WordNode, ParserError> {
        if !self.is_wordish() {
            let t = self.current().clone();
            if t.token_type == TokenType::Eof {
                return Err(ParserError::incomplete(
                    "unexpected end of input in conditional expression",
                    t.line,
                    t.column,
                ));
            }
            return self.syntax_error(format!(
                "unexpected token `{}` in conditional expression",
                t.value
            ));
        }
        self.take_word()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, CompoundCommandNode, CondExprNode as E};

    fn cond(input: &str) -> E {
        let script = Parser::new().parse(input).expect("parse");
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::Conditional(c)) => c.expression.clone(),
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn unary_file_test() {
        match cond("[[ -f /etc/passwd ]]") {
            E::Unary { operator, .. } => assert_eq!(operator, CondUnaryOperator::RegularFile),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn string_equality() {
        match cond("[[ $a == hello ]]") {
            E::Binary { operator, .. } => assert_eq!(operator, CondBinaryOperator::StrEq),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn regex_match() {
        match cond("[[ $a =~ ^h(i|o)$ ]]") {
            E::Binary { operator, right, .. } => {
                assert_eq!(operator, CondBinaryOperator::Match);
                assert_eq!(right.as_literal(), Some("^h(i|o)$"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn string_comparison_operators() {
        match cond("[[ a < b ]]") {
            E::Binary { operator, .. } => assert_eq!(operator, CondBinaryOperator::StrLt),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn numeric_comparison() {
        match cond("[[ 3 -lt 5 ]]") {
            E::Binary { operator, .. } => assert_eq!(operator, CondBinaryOperator::NumLt),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn logical_combination_precedence() {
        // a && b || c parses as (a && b) || c
        match cond("[[ -n a && -n b || -n c ]]") {
            E::Or(left, _) => assert!(matches!(*left, E::And(_, _))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn negation_and_group() {
        match cond("[[ ! ( -z a ) ]]") {
            E::Not(inner) => assert!(matches!(*inner, E::Group(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bare_word() {
        assert!(matches!(cond("[[ nonempty ]]"), E::Word(_)));
    }

    #[test]
    fn unary_op_without_operand_is_a_word() {
        assert!(matches!(cond("[[ -z ]]"), E::Word(_)));
    }

    #[test]
    fn unterminated_is_incomplete() {
        let err = Parser::new().parse("[[ -n a").unwrap_err();
        assert!(err.incomplete);
    }
}
