//! Lexer for shell input.
//!
//! Turns a character stream into tokens. Words carry a per-segment quote
//! map (`QuotePart`) so the parser and expander always know which pieces
//! of a composite word like `"pre"$var'post'` were quoted, and how.
//!
//! Balanced constructs (`$(…)`, `$((…))`, `${…}`, backticks, `<(…)`,
//! `>(…)`) are delimited with the shared quote-aware scanner; the lexer
//! never counts parentheses on its own.

use std::collections::HashMap;

use crate::parser::scanner::{
    dollar_construct_end, find_arith_end, find_balanced, skip_backtick, skip_double_quoted,
    skip_single_quoted, Unterminated,
};
use crate::parser::types::{LexerError, LexerOptions};

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,
    Newline,
    Semicolon,
    Amp, // &

    Pipe,   // |
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>

    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&

    DBrackStart, // [[
    DBrackEnd,   // ]]
    /// A whole `((expr))`: the token value is the raw expression text.
    ArithCommand,

    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    While,
    Until,
    Do,
    Done,
    Case,
    Esac,
    In,
    Function,
    Select,

    Word,
    /// `NAME=…` / `NAME[sub]=…` / `NAME+=…` at any position; the parser
    /// decides whether it is actually an assignment.
    AssignmentWord,
    /// Digits immediately preceding a redirection operator (`2>`).
    Number,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
            Self::DBrackStart => "[[",
            Self::DBrackEnd => "]]",
            Self::ArithCommand => "((",
            Self::If => "if",
            Self::Then => "then",
            Self::Else => "else",
            Self::Elif => "elif",
            Self::Fi => "fi",
            Self::For => "for",
            Self::While => "while",
            Self::Until => "until",
            Self::Do => "do",
            Self::Done => "done",
            Self::Case => "case",
            Self::Esac => "esac",
            Self::In => "in",
            Self::Function => "function",
            Self::Select => "select",
            Self::Word => "WORD",
            Self::AssignmentWord => "ASSIGNMENT_WORD",
            Self::Number => "NUMBER",
        }
    }
}

/// Quote context of one segment of a word token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    None,
    Single,
    Double,
    DollarSingle,
    Backtick,
}

/// One segment of a word with its quote context.
///
/// For `Single`/`DollarSingle` segments `text` is the inner content with
/// the quotes stripped. For `None` and `Double` literal segments it is the
/// raw text (backslash escapes intact, to be decoded by the word parser).
/// For expansion segments (`is_expansion`) it is the full raw construct
/// including its delimiters (`$var`, `$(…)`, `` `…` ``, `<(…)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePart {
    pub text: String,
    pub kind: QuoteKind,
    pub is_expansion: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Raw source text of the token.
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// Per-segment quote map; populated for Word/AssignmentWord tokens.
    pub quote_parts: Vec<QuotePart>,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            line,
            column,
            quote_parts: Vec::new(),
        }
    }

    /// True when the whole token was unquoted (operators, keywords, and
    /// words with no quoted segment).
    pub fn is_unquoted(&self) -> bool {
        self.quote_parts.iter().all(|p| p.kind == QuoteKind::None)
    }
}

/// Collected body of one here-document, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeredocPayload {
    pub delimiter: String,
    pub body: String,
    pub strip_tabs: bool,
    pub quoted: bool,
}

/// Full result of tokenization.
#[derive(Debug, Clone)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    /// Heredoc bodies in the order their `<<` operators appeared.
    pub heredocs: Vec<HeredocPayload>,
}

// =============================================================================
// TABLES
// =============================================================================

lazy_static::lazy_static! {
    static ref RESERVED_WORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("if", TokenType::If);
        m.insert("then", TokenType::Then);
        m.insert("else", TokenType::Else);
        m.insert("elif", TokenType::Elif);
        m.insert("fi", TokenType::Fi);
        m.insert("for", TokenType::For);
        m.insert("while", TokenType::While);
        m.insert("until", TokenType::Until);
        m.insert("do", TokenType::Do);
        m.insert("done", TokenType::Done);
        m.insert("case", TokenType::Case);
        m.insert("esac", TokenType::Esac);
        m.insert("in", TokenType::In);
        m.insert("function", TokenType::Function);
        m.insert("select", TokenType::Select);
        m
    };
}

const THREE_CHAR_OPS: &[(&str, TokenType)] = &[
    (";;&", TokenType::SemiSemiAnd),
    ("<<<", TokenType::TLess),
    ("&>>", TokenType::AndDGreat),
    ("<<-", TokenType::DLessDash),
];

const TWO_CHAR_OPS: &[(&str, TokenType)] = &[
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    (";&", TokenType::SemiAnd),
    ("<<", TokenType::DLess),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
    ("&>", TokenType::AndGreat),
];

/// Characters that end an unquoted word.
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True when `word` is one of the shell's reserved words.
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains_key(word)
}

/// Check whether raw word text is `NAME=…`, `NAME+=…` or `NAME[sub]=…`.
/// Returns the index of `=` when it is.
pub fn assignment_eq_index(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() || !is_name_start(chars[0]) {
        return None;
    }
    let mut i = 1;
    while i < chars.len() && is_name_char(chars[i]) {
        i += 1;
    }
    // Optional [subscript]
    if chars.get(i) == Some(&'[') {
        let close = find_balanced(&chars, i + 1, '[', ']')?;
        i = close + 1;
    }
    match chars.get(i) {
        Some('=') => Some(i),
        Some('+') if chars.get(i + 1) == Some(&'=') => Some(i + 1),
        _ => None,
    }
}

// =============================================================================
// PENDING HEREDOCS
// =============================================================================

#[derive(Debug, Clone)]
struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

// =============================================================================
// LEXER
// =============================================================================

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    options: LexerOptions,
    pending_heredocs: Vec<PendingHeredoc>,
    heredocs: Vec<HeredocPayload>,
    /// Inside `[[ … ]]`, where `<`/`>` compare instead of redirect.
    in_dbrack: bool,
    /// The next word is the right-hand side of `=~`: parens and pipes
    /// belong to the regex.
    expect_regex: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::with_options(input, LexerOptions::default())
    }

    pub fn with_options(input: &str, options: LexerOptions) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            options,
            pending_heredocs: Vec::new(),
            heredocs: Vec::new(),
            in_dbrack: false,
            expect_regex: false,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> Result<LexOutput, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_blanks();
            if self.pos >= self.input.len() {
                break;
            }
            let token = self.next_token()?;
            let was_newline = token.token_type == TokenType::Newline;
            tokens.push(token);
            if was_newline && !self.pending_heredocs.is_empty() {
                self.collect_heredocs()?;
            }
        }

        if !self.pending_heredocs.is_empty() {
            // `cmd <<EOF` with no newline after it: the body never started.
            let delim = self.pending_heredocs[0].delimiter.clone();
            return Err(LexerError::incomplete(
                format!("here-document delimited by `{}` not terminated", delim),
                self.line,
                self.column,
            ));
        }

        tokens.push(Token::new(TokenType::Eof, "", self.pos, self.pos, self.line, self.column));
        Ok(LexOutput { tokens, heredocs: self.heredocs })
    }

    // -------------------------------------------------------------------------
    // Character helpers
    // -------------------------------------------------------------------------

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advance one char, keeping line/column in sync.
    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Move `pos` to `target`, updating line/column across the skipped text.
    fn advance_to(&mut self, target: usize) {
        while self.pos < target && self.pos < self.input.len() {
            self.advance();
        }
    }

    fn skip_blanks(&mut self) {
        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' => {
                    self.advance();
                }
                '\\' if self.peek(1) == Some('\n') => {
                    // Line continuation: consume both, emit nothing.
                    self.advance();
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn raw(&self, start: usize, end: usize) -> String {
        self.input[start..end.min(self.input.len())].iter().collect()
    }

    // -------------------------------------------------------------------------
    // Token dispatch
    // -------------------------------------------------------------------------

    fn next_token(&mut self) -> Result<Token, LexerError> {
        let (start, line, column) = (self.pos, self.line, self.column);
        let c0 = match self.current() {
            Some(c) => c,
            None => return Ok(Token::new(TokenType::Eof, "", start, start, line, column)),
        };
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        if c0 == '\n' {
            self.advance();
            return Ok(Token::new(TokenType::Newline, "\n", start, self.pos, line, column));
        }

        // `((…))` at token position: raw-text arithmetic, unless it is
        // really two nested subshells.
        if c0 == '(' && c1 == Some('(') {
            if let Some(close) = find_arith_end(&self.input, start + 2) {
                let expr = self.raw(start + 2, close);
                self.advance_to(close + 2);
                return Ok(Token::new(TokenType::ArithCommand, expr, start, self.pos, line, column));
            }
            // Fall through: single LParen (nested subshell).
        }

        // `[[` / `]]` at a word boundary.
        if c0 == '[' && c1 == Some('[') && c2.map_or(true, is_word_boundary) {
            self.advance();
            self.advance();
            self.in_dbrack = true;
            return Ok(Token::new(TokenType::DBrackStart, "[[", start, self.pos, line, column));
        }
        if c0 == ']' && c1 == Some(']') && c2.map_or(true, is_word_boundary) {
            self.advance();
            self.advance();
            self.in_dbrack = false;
            self.expect_regex = false;
            return Ok(Token::new(TokenType::DBrackEnd, "]]", start, self.pos, line, column));
        }

        // Right-hand side of `=~`: one word running to unquoted blank or
        // `]]`, parens and pipes included.
        if self.expect_regex {
            self.expect_regex = false;
            return self.read_regex_word(start, line, column);
        }

        // Process substitution starts a word.
        if (c0 == '<' || c0 == '>') && c1 == Some('(') {
            return self.read_word(start, line, column);
        }

        // Three-character operators.
        for (op, tt) in THREE_CHAR_OPS {
            let mut it = op.chars();
            if Some(c0) == it.next() && c1 == it.next() && c2 == it.next() {
                self.advance();
                self.advance();
                self.advance();
                if *tt == TokenType::DLessDash {
                    self.register_heredoc(true)?;
                }
                return Ok(Token::new(*tt, *op, start, self.pos, line, column));
            }
        }

        // Two-character operators.
        for (op, tt) in TWO_CHAR_OPS {
            let mut it = op.chars();
            if Some(c0) == it.next() && c1 == it.next() {
                self.advance();
                self.advance();
                if *tt == TokenType::DLess {
                    self.register_heredoc(false)?;
                }
                return Ok(Token::new(*tt, *op, start, self.pos, line, column));
            }
        }

        // Single-character operators.
        let single = match c0 {
            '|' => Some(TokenType::Pipe),
            '&' => Some(TokenType::Amp),
            ';' => Some(TokenType::Semicolon),
            '(' => Some(TokenType::LParen),
            ')' => Some(TokenType::RParen),
            '<' => Some(TokenType::Less),
            '>' => Some(TokenType::Great),
            _ => None,
        };
        if let Some(tt) = single {
            self.advance();
            return Ok(Token::new(tt, c0.to_string(), start, self.pos, line, column));
        }

        // `{` / `}` are grouping tokens only when standing alone.
        if c0 == '{' && c1.map_or(true, |c| c == ' ' || c == '\t' || c == '\n') {
            self.advance();
            return Ok(Token::new(TokenType::LBrace, "{", start, self.pos, line, column));
        }
        if c0 == '}' && c1.map_or(true, is_word_boundary) {
            self.advance();
            return Ok(Token::new(TokenType::RBrace, "}", start, self.pos, line, column));
        }

        // `!` negates a pipeline when standing alone.
        if c0 == '!' && c1.map_or(true, |c| c == ' ' || c == '\t' || c == '\n') {
            self.advance();
            return Ok(Token::new(TokenType::Bang, "!", start, self.pos, line, column));
        }

        let token = self.read_word(start, line, column)?;
        if self.in_dbrack && token.value == "=~" {
            self.expect_regex = true;
        }
        Ok(token)
    }

    // -------------------------------------------------------------------------
    // Words
    // -------------------------------------------------------------------------

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> Result<Token, LexerError> {
        self.read_word_until(start, line, column, is_word_boundary)
    }

    /// The `=~` right-hand side: only blanks end the word, so regex
    /// grouping like `^(a|b)$` stays in one token.
    fn read_regex_word(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<Token, LexerError> {
        let mut token =
            self.read_word_until(start, line, column, |c| matches!(c, ' ' | '\t' | '\n'))?;
        token.token_type = TokenType::Word;
        Ok(token)
    }

    fn read_word_until(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        boundary: fn(char) -> bool,
    ) -> Result<Token, LexerError> {
        let mut parts: Vec<QuotePart> = Vec::new();
        let mut lit = String::new();
        let mut saw_array_init = false;

        let flush = |lit: &mut String, parts: &mut Vec<QuotePart>| {
            if !lit.is_empty() {
                parts.push(QuotePart {
                    text: std::mem::take(lit),
                    kind: QuoteKind::None,
                    is_expansion: false,
                });
            }
        };

        while let Some(c) = self.current() {
            match c {
                '\'' => {
                    flush(&mut lit, &mut parts);
                    let open = self.pos;
                    match skip_single_quoted(&self.input, open + 1) {
                        Some(after) => {
                            let inner = self.raw(open + 1, after - 1);
                            self.advance_to(after);
                            parts.push(QuotePart {
                                text: inner,
                                kind: QuoteKind::Single,
                                is_expansion: false,
                            });
                        }
                        None => {
                            return Err(LexerError::incomplete(
                                "unterminated single quote",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                '$' if self.peek(1) == Some('\'') => {
                    flush(&mut lit, &mut parts);
                    let open = self.pos + 1;
                    match self.scan_dollar_single(open + 1) {
                        Some(after) => {
                            let inner = self.raw(open + 1, after - 1);
                            self.advance_to(after);
                            parts.push(QuotePart {
                                text: inner,
                                kind: QuoteKind::DollarSingle,
                                is_expansion: false,
                            });
                        }
                        None => {
                            return Err(LexerError::incomplete(
                                "unterminated $'…' quote",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                '"' => {
                    flush(&mut lit, &mut parts);
                    self.read_double_quoted(&mut parts)?;
                }
                '`' => {
                    flush(&mut lit, &mut parts);
                    let open = self.pos;
                    match skip_backtick(&self.input, open + 1) {
                        Some(after) => {
                            let text = self.raw(open, after);
                            self.advance_to(after);
                            parts.push(QuotePart {
                                text,
                                kind: QuoteKind::Backtick,
                                is_expansion: true,
                            });
                        }
                        None => {
                            return Err(LexerError::incomplete(
                                "unterminated backquote substitution",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                '$' => match dollar_construct_end(&self.input, self.pos) {
                    Some(Ok(end)) => {
                        flush(&mut lit, &mut parts);
                        let text = self.raw(self.pos, end);
                        self.advance_to(end);
                        parts.push(QuotePart {
                            text,
                            kind: QuoteKind::None,
                            is_expansion: true,
                        });
                    }
                    Some(Err(which)) => {
                        let what = match which {
                            Unterminated::CommandSub => "unexpected EOF looking for matching `)'",
                            Unterminated::BraceExpansion => "unexpected EOF looking for matching `}'",
                        };
                        return Err(LexerError::incomplete(what, self.line, self.column));
                    }
                    None => {
                        lit.push('$');
                        self.advance();
                    }
                },
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        // Line continuation inside a word.
                        self.advance();
                        self.advance();
                    } else {
                        lit.push('\\');
                        self.advance();
                        if let Some(next) = self.current() {
                            lit.push(next);
                            self.advance();
                        }
                    }
                }
                '<' | '>' if self.peek(1) == Some('(') && parts.is_empty() && lit.is_empty() => {
                    match find_balanced(&self.input, self.pos + 2, '(', ')') {
                        Some(close) => {
                            let text = self.raw(self.pos, close + 1);
                            self.advance_to(close + 1);
                            parts.push(QuotePart {
                                text,
                                kind: QuoteKind::None,
                                is_expansion: true,
                            });
                        }
                        None => {
                            return Err(LexerError::incomplete(
                                "unterminated process substitution",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                '(' => {
                    // Extglob group continues the word: `?( *( +( @( !(`.
                    let ext = self.options.extglob
                        && lit
                            .chars()
                            .last()
                            .map_or(false, |p| matches!(p, '?' | '*' | '+' | '@' | '!'));
                    // Array initializer: `name=(…)` / `name+=(…)`.
                    let arr = !saw_array_init
                        && parts.is_empty()
                        && lit.ends_with('=')
                        && assignment_eq_index(&lit).map_or(false, |i| i + 1 == lit.chars().count());
                    if ext || arr {
                        match find_balanced(&self.input, self.pos + 1, '(', ')') {
                            Some(close) => {
                                lit.push_str(&self.raw(self.pos, close + 1));
                                self.advance_to(close + 1);
                                if arr {
                                    saw_array_init = true;
                                }
                            }
                            None => {
                                return Err(LexerError::incomplete(
                                    "unexpected EOF looking for matching `)'",
                                    self.line,
                                    self.column,
                                ))
                            }
                        }
                    } else if boundary('(') {
                        break;
                    } else {
                        lit.push('(');
                        self.advance();
                    }
                }
                c if boundary(c) => break,
                c => {
                    lit.push(c);
                    self.advance();
                }
            }
        }
        flush(&mut lit, &mut parts);

        let value = self.raw(start, self.pos);
        let mut token = Token::new(TokenType::Word, value, start, self.pos, line, column);
        token.quote_parts = parts;

        // Reserved words: a single unquoted literal segment.
        if token.quote_parts.len() == 1
            && token.quote_parts[0].kind == QuoteKind::None
            && !token.quote_parts[0].is_expansion
        {
            if let Some(&tt) = RESERVED_WORDS.get(token.value.as_str()) {
                token.token_type = tt;
                return Ok(token);
            }
        }

        // Digits immediately followed by a redirection operator: `2>`…
        if token.is_unquoted()
            && !token.value.is_empty()
            && token.value.chars().all(|c| c.is_ascii_digit())
            && matches!(self.current(), Some('<') | Some('>'))
        {
            token.token_type = TokenType::Number;
            return Ok(token);
        }

        // Assignment words, checked on the raw text.
        if let Some(eq) = assignment_eq_index(&token.value) {
            // Only when the name/subscript prefix was unquoted.
            let prefix_len: usize = eq + 1;
            let unquoted_prefix = token
                .quote_parts
                .first()
                .map_or(false, |p| p.kind == QuoteKind::None && !p.is_expansion && p.text.chars().count() >= prefix_len);
            if unquoted_prefix {
                token.token_type = TokenType::AssignmentWord;
            }
        }

        Ok(token)
    }

    /// Read a `"…"` region, pushing one `QuotePart` per literal run and per
    /// embedded expansion, all tagged `QuoteKind::Double`.
    fn read_double_quoted(&mut self, parts: &mut Vec<QuotePart>) -> Result<(), LexerError> {
        debug_assert_eq!(self.current(), Some('"'));
        self.advance(); // opening quote
        let mut lit = String::new();
        let mut any = false;

        let flush = |lit: &mut String, parts: &mut Vec<QuotePart>, any: &mut bool| {
            if !lit.is_empty() {
                parts.push(QuotePart {
                    text: std::mem::take(lit),
                    kind: QuoteKind::Double,
                    is_expansion: false,
                });
                *any = true;
            }
        };

        loop {
            let c = match self.current() {
                Some(c) => c,
                None => {
                    return Err(LexerError::incomplete(
                        "unterminated double quote",
                        self.line,
                        self.column,
                    ))
                }
            };
            match c {
                '"' => {
                    self.advance();
                    break;
                }
                '\\' => {
                    lit.push('\\');
                    self.advance();
                    if let Some(next) = self.current() {
                        lit.push(next);
                        self.advance();
                    }
                }
                '`' => {
                    flush(&mut lit, parts, &mut any);
                    let open = self.pos;
                    match skip_backtick(&self.input, open + 1) {
                        Some(after) => {
                            let text = self.raw(open, after);
                            self.advance_to(after);
                            parts.push(QuotePart {
                                text,
                                kind: QuoteKind::Double,
                                is_expansion: true,
                            });
                            any = true;
                        }
                        None => {
                            return Err(LexerError::incomplete(
                                "unterminated backquote substitution",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                '$' => match dollar_construct_end(&self.input, self.pos) {
                    Some(Ok(end)) => {
                        flush(&mut lit, parts, &mut any);
                        let text = self.raw(self.pos, end);
                        self.advance_to(end);
                        parts.push(QuotePart {
                            text,
                            kind: QuoteKind::Double,
                            is_expansion: true,
                        });
                        any = true;
                    }
                    Some(Err(_)) => {
                        return Err(LexerError::incomplete(
                            "unexpected EOF in substitution",
                            self.line,
                            self.column,
                        ))
                    }
                    None => {
                        lit.push('$');
                        self.advance();
                    }
                },
                c => {
                    lit.push(c);
                    self.advance();
                }
            }
        }
        flush(&mut lit, parts, &mut any);
        if !any {
            // `""` still contributes an (empty) quoted segment.
            parts.push(QuotePart {
                text: String::new(),
                kind: QuoteKind::Double,
                is_expansion: false,
            });
        }
        Ok(())
    }

    /// End of a `$'…'` region; `from` is just past the opening quote.
    /// Backslash escapes an embedded quote.
    fn scan_dollar_single(&self, from: usize) -> Option<usize> {
        let mut i = from;
        while i < self.input.len() {
            match self.input[i] {
                '\\' => i += 2,
                '\'' => return Some(i + 1),
                _ => i += 1,
            }
        }
        None
    }

    // -------------------------------------------------------------------------
    // Heredocs
    // -------------------------------------------------------------------------

    /// Record a pending heredoc at `<<`/`<<-`. The delimiter word is *not*
    /// consumed here (it is lexed normally), but its text and quoting are
    /// read ahead so the body can be collected after the next newline.
    fn register_heredoc(&mut self, strip_tabs: bool) -> Result<(), LexerError> {
        let mut i = self.pos;
        while matches!(self.input.get(i), Some(' ') | Some('\t')) {
            i += 1;
        }
        let mut delimiter = String::new();
        let mut quoted = false;
        while let Some(&c) = self.input.get(i) {
            match c {
                '\'' => {
                    quoted = true;
                    let after = skip_single_quoted(&self.input, i + 1).ok_or_else(|| {
                        LexerError::incomplete("unterminated single quote", self.line, self.column)
                    })?;
                    delimiter.extend(&self.input[i + 1..after - 1]);
                    i = after;
                }
                '"' => {
                    quoted = true;
                    let after = skip_double_quoted(&self.input, i + 1).ok_or_else(|| {
                        LexerError::incomplete("unterminated double quote", self.line, self.column)
                    })?;
                    delimiter.extend(&self.input[i + 1..after - 1]);
                    i = after;
                }
                '\\' => {
                    quoted = true;
                    if let Some(&next) = self.input.get(i + 1) {
                        delimiter.push(next);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                c if is_word_boundary(c) => break,
                c => {
                    delimiter.push(c);
                    i += 1;
                }
            }
        }
        if delimiter.is_empty() {
            return Err(LexerError::new(
                "syntax error near unexpected token `newline'",
                self.line,
                self.column,
            ));
        }
        self.pending_heredocs.push(PendingHeredoc { delimiter, strip_tabs, quoted });
        Ok(())
    }

    /// Consume heredoc bodies line by line until each pending delimiter.
    fn collect_heredocs(&mut self) -> Result<(), LexerError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for doc in pending {
            let mut body = String::new();
            let mut closed = false;
            while self.pos < self.input.len() {
                let line_start = self.pos;
                while self.pos < self.input.len() && self.input[self.pos] != '\n' {
                    self.advance();
                }
                let mut line = self.raw(line_start, self.pos);
                if self.pos < self.input.len() {
                    self.advance(); // the newline
                }
                let check = if doc.strip_tabs {
                    line.trim_start_matches('\t').to_string()
                } else {
                    line.clone()
                };
                if check == doc.delimiter {
                    closed = true;
                    break;
                }
                if doc.strip_tabs {
                    line = line.trim_start_matches('\t').to_string();
                }
                body.push_str(&line);
                body.push('\n');
            }
            if !closed {
                return Err(LexerError::incomplete(
                    format!("here-document delimited by `{}` not terminated", doc.delimiter),
                    self.line,
                    self.column,
                ));
            }
            self.heredocs.push(HeredocPayload {
                delimiter: doc.delimiter,
                body,
                strip_tabs: doc.strip_tabs,
                quoted: doc.quoted,
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().expect("lex failed").tokens
    }

    fn kinds(input: &str) -> Vec<TokenType> {
        lex(input).into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn simple_command() {
        assert_eq!(
            kinds("echo hello world"),
            vec![TokenType::Word, TokenType::Word, TokenType::Word, TokenType::Eof]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a && b || c | d ; e &"),
            vec![
                TokenType::Word,
                TokenType::AndAnd,
                TokenType::Word,
                TokenType::OrOr,
                TokenType::Word,
                TokenType::Pipe,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Word,
                TokenType::Amp,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn keywords_are_tagged() {
        assert_eq!(
            kinds("if true; then echo; fi"),
            vec![
                TokenType::If,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Then,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Fi,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn quoted_keyword_is_a_word() {
        let toks = lex("'if'");
        assert_eq!(toks[0].token_type, TokenType::Word);
    }

    #[test]
    fn word_quote_parts() {
        let toks = lex("pre'mid'\"end $x\"");
        let parts = &toks[0].quote_parts;
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].kind, QuoteKind::None);
        assert_eq!(parts[0].text, "pre");
        assert_eq!(parts[1].kind, QuoteKind::Single);
        assert_eq!(parts[1].text, "mid");
        assert_eq!(parts[2].kind, QuoteKind::Double);
        assert_eq!(parts[2].text, "end ");
        assert_eq!(parts[3].kind, QuoteKind::Double);
        assert!(parts[3].is_expansion);
        assert_eq!(parts[3].text, "$x");
    }

    #[test]
    fn command_sub_with_quoted_paren() {
        // The `)` inside single quotes must not close the substitution.
        let toks = lex("echo $(echo ')')");
        assert_eq!(toks[1].token_type, TokenType::Word);
        assert_eq!(toks[1].value, "$(echo ')')");
        assert!(toks[1].quote_parts[0].is_expansion);
    }

    #[test]
    fn arith_in_assignment_with_quoted_paren() {
        // Scenario: x=$(( $(echo ')') + 1 ))
        let toks = lex("x=$(( $(echo ')') + 1 ))");
        assert_eq!(toks[0].token_type, TokenType::AssignmentWord);
        assert_eq!(toks[0].value, "x=$(( $(echo ')') + 1 ))");
    }

    #[test]
    fn arith_command_captures_raw_text() {
        let toks = lex("(( x + 1 ))");
        assert_eq!(toks[0].token_type, TokenType::ArithCommand);
        assert_eq!(toks[0].value, " x + 1 ");
    }

    #[test]
    fn nested_subshells_are_not_arith() {
        assert_eq!(
            kinds("((echo a); (echo b))"),
            vec![
                TokenType::LParen,
                TokenType::LParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::RParen,
                TokenType::Semicolon,
                TokenType::LParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::RParen,
                TokenType::RParen,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn fd_number_before_redirect() {
        let toks = lex("cmd 2>out");
        assert_eq!(toks[1].token_type, TokenType::Number);
        assert_eq!(toks[2].token_type, TokenType::Great);
    }

    #[test]
    fn plain_number_is_word() {
        let toks = lex("echo 2");
        assert_eq!(toks[1].token_type, TokenType::Word);
    }

    #[test]
    fn assignment_word() {
        assert_eq!(lex("FOO=bar")[0].token_type, TokenType::AssignmentWord);
        assert_eq!(lex("FOO+=bar")[0].token_type, TokenType::AssignmentWord);
        assert_eq!(lex("arr[3]=x")[0].token_type, TokenType::AssignmentWord);
        assert_eq!(lex("=bar")[0].token_type, TokenType::Word);
    }

    #[test]
    fn array_initializer_is_one_token() {
        let toks = lex("arr=(a b c)");
        assert_eq!(toks[0].token_type, TokenType::AssignmentWord);
        assert_eq!(toks[0].value, "arr=(a b c)");
        assert_eq!(toks[1].token_type, TokenType::Eof);
    }

    #[test]
    fn line_continuation() {
        assert_eq!(kinds("echo \\\nfoo"), vec![TokenType::Word, TokenType::Word, TokenType::Eof]);
    }

    #[test]
    fn comment_is_skipped() {
        assert_eq!(kinds("echo hi # comment"), vec![TokenType::Word, TokenType::Word, TokenType::Eof]);
    }

    #[test]
    fn heredoc_collection() {
        let out = Lexer::new("cat <<EOF\nhello\nworld\nEOF\necho done\n")
            .tokenize()
            .expect("lex failed");
        assert_eq!(out.heredocs.len(), 1);
        assert_eq!(out.heredocs[0].body, "hello\nworld\n");
        assert!(!out.heredocs[0].quoted);
    }

    #[test]
    fn heredoc_quoted_delimiter() {
        let out = Lexer::new("cat <<'EOF'\n$x\nEOF\n").tokenize().expect("lex failed");
        assert!(out.heredocs[0].quoted);
        assert_eq!(out.heredocs[0].body, "$x\n");
    }

    #[test]
    fn heredoc_strip_tabs() {
        let out = Lexer::new("cat <<-EOF\n\thello\n\tEOF\n").tokenize().expect("lex failed");
        assert_eq!(out.heredocs[0].body, "hello\n");
    }

    #[test]
    fn multiple_heredocs_queue_in_order() {
        let out = Lexer::new("cat <<A <<B\none\nA\ntwo\nB\n").tokenize().expect("lex failed");
        assert_eq!(out.heredocs.len(), 2);
        assert_eq!(out.heredocs[0].body, "one\n");
        assert_eq!(out.heredocs[1].body, "two\n");
    }

    #[test]
    fn unterminated_heredoc_is_incomplete() {
        let err = Lexer::new("cat <<EOF\nbody\n").tokenize().unwrap_err();
        assert!(err.incomplete);
    }

    #[test]
    fn unterminated_quote_is_incomplete() {
        let err = Lexer::new("echo 'oops").tokenize().unwrap_err();
        assert!(err.incomplete);
    }

    #[test]
    fn process_substitution_word() {
        let toks = lex("diff <(sort a) <(sort b)");
        assert_eq!(toks[1].token_type, TokenType::Word);
        assert_eq!(toks[1].value, "<(sort a)");
        assert!(toks[1].quote_parts[0].is_expansion);
    }

    #[test]
    fn extglob_continues_word_by_default() {
        let toks = lex("ls @(a|b).txt");
        assert_eq!(toks[1].value, "@(a|b).txt");
    }

    #[test]
    fn extglob_splits_word_when_disabled() {
        let opts = LexerOptions { extglob: false, ..Default::default() };
        let out = Lexer::with_options("ls @(a|b)", opts).tokenize().expect("lex");
        // Without extglob the `(` terminates the word.
        assert_eq!(out.tokens[1].value, "@");
        assert_eq!(out.tokens[2].token_type, TokenType::LParen);
    }

    #[test]
    fn positions_track_lines() {
        let toks = lex("a\nb");
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[2].line, 2);
        assert_eq!(toks[2].column, 1);
    }

    #[test]
    fn regex_rhs_is_one_word() {
        let toks = lex("[[ $x =~ ^(a|b)+$ ]]");
        assert_eq!(toks[0].token_type, TokenType::DBrackStart);
        assert_eq!(toks[2].value, "=~");
        assert_eq!(toks[3].value, "^(a|b)+$");
        assert_eq!(toks[4].token_type, TokenType::DBrackEnd);
    }

    #[test]
    fn dbrack_less_than_is_operator_token() {
        let toks = lex("[[ a < b ]]");
        assert_eq!(toks[2].token_type, TokenType::Less);
    }

    #[test]
    fn dollar_single_quote_part() {
        let toks = lex("echo $'a\\nb'");
        let parts = &toks[1].quote_parts;
        assert_eq!(parts[0].kind, QuoteKind::DollarSingle);
        assert_eq!(parts[0].text, "a\\nb");
    }
}
