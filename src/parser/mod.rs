//! Lexing and parsing: source text → token stream → Command AST.

pub mod command_parser;
pub mod compound_parser;
pub mod conditional_parser;
pub mod expansion_parser;
pub mod lexer;
pub mod parser;
pub mod scanner;
pub mod types;
pub mod word_parser;

pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use types::{LexerError, LexerOptions, ParseOutcome, ParserError};
