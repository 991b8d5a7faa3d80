//! Abstract syntax tree for shell scripts.
//!
//! The parser produces these nodes; the expansion pipeline and executor
//! consume them. Per-part quote context on words is the one invariant
//! everything downstream depends on: a part that was single-quoted must
//! still look single-quoted when the expander sees it.

use std::fmt;

// =============================================================================
// POSITIONS
// =============================================================================

/// Position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// Half-open range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

// =============================================================================
// SCRIPT & STATEMENTS
// =============================================================================

/// Root node: a complete script or command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub statements: Vec<StatementNode>,
}

/// An and-or list: pipelines joined by `&&`, `||` or `;`, optionally
/// terminated with `&` for background execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    pub pipelines: Vec<PipelineNode>,
    /// Operators between pipelines; `operators.len() == pipelines.len() - 1`.
    pub operators: Vec<StatementOperator>,
    pub background: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOperator {
    And, // &&
    Or,  // ||
    Semi,
}

// =============================================================================
// PIPELINES & COMMANDS
// =============================================================================

/// A pipeline: `cmd1 | cmd2 | cmd3`, optionally negated with `!`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub commands: Vec<CommandNode>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    Simple(SimpleCommandNode),
    Compound(CompoundCommandNode),
    FunctionDef(FunctionDefNode),
}

/// Simple command: assignments, name, args, redirections.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommandNode {
    pub assignments: Vec<AssignmentNode>,
    /// None for an assignment-only command line.
    pub name: Option<WordNode>,
    pub args: Vec<WordNode>,
    pub redirections: Vec<RedirectionNode>,
    /// Source line, for `$LINENO` and error prefixes.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompoundCommandNode {
    If(IfNode),
    While(WhileNode),
    Until(UntilNode),
    For(ForNode),
    CStyleFor(CStyleForNode),
    Case(CaseNode),
    Select(SelectNode),
    Subshell(SubshellNode),
    Group(GroupNode),
    Arithmetic(ArithmeticCommandNode),
    Conditional(ConditionalCommandNode),
}

impl CompoundCommandNode {
    pub fn redirections(&self) -> &[RedirectionNode] {
        match self {
            Self::If(n) => &n.redirections,
            Self::While(n) => &n.redirections,
            Self::Until(n) => &n.redirections,
            Self::For(n) => &n.redirections,
            Self::CStyleFor(n) => &n.redirections,
            Self::Case(n) => &n.redirections,
            Self::Select(n) => &n.redirections,
            Self::Subshell(n) => &n.redirections,
            Self::Group(n) => &n.redirections,
            Self::Arithmetic(n) => &n.redirections,
            Self::Conditional(n) => &n.redirections,
        }
    }
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// `if`/`elif` arms in order.
    pub clauses: Vec<IfClause>,
    pub else_body: Option<Vec<StatementNode>>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UntilNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

/// `for VAR in WORDS; do …; done`. `words == None` means iterate `"$@"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub variable: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

/// `for ((init; cond; update)); do …; done`. The three expressions are
/// stored as raw arithmetic text and evaluated each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CStyleForNode {
    pub init: Option<String>,
    pub condition: Option<String>,
    pub update: Option<String>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub word: WordNode,
    pub items: Vec<CaseItemNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseItemNode {
    pub patterns: Vec<WordNode>,
    pub body: Vec<StatementNode>,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    /// `;;`: stop after this item.
    Break,
    /// `;&`: fall through into the next body without matching.
    FallThrough,
    /// `;;&`: keep testing subsequent patterns.
    Continue,
}

/// `select VAR in WORDS; do …; done`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    pub variable: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

/// `(( expr ))`: the expression text is evaluated at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticCommandNode {
    pub expression: String,
    pub redirections: Vec<RedirectionNode>,
    pub line: usize,
}

/// `[[ expr ]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalCommandNode {
    pub expression: CondExprNode,
    pub redirections: Vec<RedirectionNode>,
    pub line: usize,
}

// =============================================================================
// FUNCTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefNode {
    pub name: String,
    pub body: Box<CompoundCommandNode>,
    pub redirections: Vec<RedirectionNode>,
    pub line: usize,
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// `NAME=value`, `NAME+=value`, `NAME[sub]=value` or `NAME=(…)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentNode {
    pub name: String,
    /// Raw subscript text for `NAME[sub]=…`; evaluated per array flavour.
    pub subscript: Option<String>,
    pub value: Option<WordNode>,
    pub append: bool,
    /// `NAME=(a b c)` / `NAME=([k]=v …)` initializer elements.
    pub array: Option<Vec<ArrayElementNode>>,
}

/// One element of an array initializer, optionally `[key]=`-prefixed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElementNode {
    pub key: Option<String>,
    pub value: WordNode,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectionNode {
    /// Explicit fd, as in `2>file`; None means the operator default.
    pub fd: Option<i32>,
    pub operator: RedirectionOperator,
    pub target: RedirectionTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectionTarget {
    Word(WordNode),
    HereDoc(HereDocNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionOperator {
    Less,      // <
    Great,     // >
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>
    TLess,     // <<<
    DLess,     // <<
    DLessDash, // <<-
}

impl fmt::Display for RedirectionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Less => "<",
            Self::Great => ">",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::Clobber => ">|",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::TLess => "<<<",
            Self::DLess => "<<",
            Self::DLessDash => "<<-",
        };
        f.write_str(s)
    }
}

/// Here-document body, attached by the lexer once the registering line ends.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDocNode {
    pub delimiter: String,
    /// The body as a word: a single literal part when the delimiter was
    /// quoted, otherwise literal/expansion parts parsed for substitution.
    pub content: WordNode,
    pub strip_tabs: bool,
    pub quoted: bool,
}

// =============================================================================
// WORDS
// =============================================================================

/// A shell word: an ordered sequence of parts with per-part quote context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WordNode {
    pub parts: Vec<WordPart>,
}

impl WordNode {
    /// True when every part is quoted (no field splitting, no globbing).
    pub fn is_fully_quoted(&self) -> bool {
        !self.parts.is_empty()
            && self.parts.iter().all(|p| {
                matches!(
                    p,
                    WordPart::SingleQuoted(_) | WordPart::DoubleQuoted(_) | WordPart::Escaped(_)
                )
            })
    }

    /// Literal text if the word is a single unquoted literal.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(l)] => Some(&l.value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    Literal(LiteralPart),
    SingleQuoted(SingleQuotedPart),
    DoubleQuoted(DoubleQuotedPart),
    Escaped(EscapedPart),
    Tilde(TildePart),
    Glob(GlobPart),
    ParameterExpansion(ParameterExpansionPart),
    CommandSubstitution(CommandSubstitutionPart),
    ArithmeticExpansion(ArithmeticExpansionPart),
    ProcessSubstitution(ProcessSubstitutionPart),
}

/// Unquoted literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralPart {
    pub value: String,
}

/// `'…'`: passes through expansion untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleQuotedPart {
    pub value: String,
}

/// `"…"`: inner parts expand but are never split or globbed.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleQuotedPart {
    pub parts: Vec<WordPart>,
}

/// `\x`: the character without its backslash, quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapedPart {
    pub value: String,
}

/// Leading `~` or `~user` in an unquoted word prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TildePart {
    pub user: Option<String>,
}

/// An unquoted segment containing glob metacharacters, kept verbatim so
/// pathname expansion sees the raw pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPart {
    pub pattern: String,
}

// =============================================================================
// PARAMETER EXPANSION
// =============================================================================

/// `$NAME`, `${NAME}` or `${NAME<op>…}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterExpansionPart {
    /// Parameter name, possibly with an array subscript (`arr[2]`, `arr[@]`).
    pub parameter: String,
    pub operation: Option<ParameterOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterOperation {
    /// `${VAR:-word}` / `${VAR-word}`
    DefaultValue { word: WordNode, check_empty: bool },
    /// `${VAR:=word}` / `${VAR=word}`
    AssignDefault { word: WordNode, check_empty: bool },
    /// `${VAR:?word}` / `${VAR?word}`
    ErrorIfUnset { word: Option<WordNode>, check_empty: bool },
    /// `${VAR:+word}` / `${VAR+word}`
    UseAlternative { word: WordNode, check_empty: bool },
    /// `${#VAR}`
    Length,
    /// `${VAR:offset[:length]}`: raw arithmetic text, evaluated at run time.
    Substring { offset: String, length: Option<String> },
    /// `${VAR#pat}` `${VAR##pat}` `${VAR%pat}` `${VAR%%pat}`
    RemovePattern { pattern: WordNode, side: PatternSide, longest: bool },
    /// `${VAR/pat/rep}` and the `//`, `/#`, `/%` variants.
    ReplacePattern {
        pattern: WordNode,
        replacement: Option<WordNode>,
        all: bool,
        anchor: Option<PatternAnchor>,
    },
    /// `${VAR^pat}` `${VAR^^pat}` `${VAR,pat}` `${VAR,,pat}`
    CaseModify { upper: bool, all: bool, pattern: Option<WordNode> },
    /// `${!VAR}`: indirect expansion.
    Indirect,
    /// `${!prefix*}` / `${!prefix@}`
    NamePrefix { prefix: String, star: bool },
    /// `${!arr[@]}` / `${!arr[*]}`
    ArrayKeys { array: String, star: bool },
    /// Parsed but invalid; reported when expanded.
    BadSubstitution { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSide {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternAnchor {
    Start,
    End,
}

// =============================================================================
// SUBSTITUTIONS
// =============================================================================

/// `$(cmd)` or `` `cmd` ``.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSubstitutionPart {
    pub body: ScriptNode,
    pub backtick_style: bool,
}

/// `$((expr))`: expression text kept verbatim for run-time evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArithmeticExpansionPart {
    pub expression: String,
}

/// `<(cmd)` or `>(cmd)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSubstitutionPart {
    pub body: ScriptNode,
    pub direction: ProcessDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessDirection {
    /// `<(…)`: the command's stdout is readable at the expanded path.
    In,
    /// `>(…)`: writes to the expanded path reach the command's stdin.
    Out,
}

// =============================================================================
// CONDITIONAL EXPRESSIONS ([[ ]])
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CondExprNode {
    Binary { operator: CondBinaryOperator, left: WordNode, right: WordNode },
    Unary { operator: CondUnaryOperator, operand: WordNode },
    Not(Box<CondExprNode>),
    And(Box<CondExprNode>, Box<CondExprNode>),
    Or(Box<CondExprNode>, Box<CondExprNode>),
    Group(Box<CondExprNode>),
    /// A bare word: true when non-empty.
    Word(WordNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondBinaryOperator {
    StrEq,     // = or ==  (right side is a pattern)
    StrNe,     // !=       (right side is a pattern)
    Match,     // =~
    StrLt,     // <
    StrGt,     // >
    NumEq,     // -eq
    NumNe,     // -ne
    NumLt,     // -lt
    NumLe,     // -le
    NumGt,     // -gt
    NumGe,     // -ge
    NewerThan, // -nt
    OlderThan, // -ot
    SameFile,  // -ef
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondUnaryOperator {
    BlockSpecial,  // -b
    CharSpecial,   // -c
    Directory,     // -d
    Exists,        // -e
    RegularFile,   // -f
    SetGid,        // -g
    Symlink,       // -h / -L
    Pipe,          // -p
    Readable,      // -r
    NonEmptyFile,  // -s
    Terminal,      // -t
    SetUid,        // -u
    Writable,      // -w
    Executable,    // -x
    Socket,        // -S
    ZeroLength,    // -z
    NonZeroLength, // -n
    VarSet,        // -v
    OptionSet,     // -o
}

// =============================================================================
// BUILDERS
// =============================================================================

/// Node factory used by the parser and by tests.
pub struct Ast;

impl Ast {
    pub fn script(statements: Vec<StatementNode>) -> ScriptNode {
        ScriptNode { statements }
    }

    pub fn statement(
        pipelines: Vec<PipelineNode>,
        operators: Vec<StatementOperator>,
        background: bool,
        span: Span,
    ) -> StatementNode {
        StatementNode { pipelines, operators, background, span }
    }

    pub fn pipeline(commands: Vec<CommandNode>, negated: bool) -> PipelineNode {
        PipelineNode { commands, negated }
    }

    pub fn simple_command(
        assignments: Vec<AssignmentNode>,
        name: Option<WordNode>,
        args: Vec<WordNode>,
        redirections: Vec<RedirectionNode>,
        line: usize,
    ) -> SimpleCommandNode {
        SimpleCommandNode { assignments, name, args, redirections, line }
    }

    pub fn word(parts: Vec<WordPart>) -> WordNode {
        WordNode { parts }
    }

    pub fn literal(value: impl Into<String>) -> WordPart {
        WordPart::Literal(LiteralPart { value: value.into() })
    }

    pub fn single_quoted(value: impl Into<String>) -> WordPart {
        WordPart::SingleQuoted(SingleQuotedPart { value: value.into() })
    }

    pub fn double_quoted(parts: Vec<WordPart>) -> WordPart {
        WordPart::DoubleQuoted(DoubleQuotedPart { parts })
    }

    pub fn escaped(value: impl Into<String>) -> WordPart {
        WordPart::Escaped(EscapedPart { value: value.into() })
    }

    pub fn variable(name: impl Into<String>) -> WordPart {
        WordPart::ParameterExpansion(ParameterExpansionPart {
            parameter: name.into(),
            operation: None,
        })
    }

    pub fn parameter_expansion(
        parameter: impl Into<String>,
        operation: Option<ParameterOperation>,
    ) -> WordPart {
        WordPart::ParameterExpansion(ParameterExpansionPart {
            parameter: parameter.into(),
            operation,
        })
    }

    pub fn command_substitution(body: ScriptNode, backtick_style: bool) -> WordPart {
        WordPart::CommandSubstitution(CommandSubstitutionPart { body, backtick_style })
    }

    pub fn arithmetic_expansion(expression: impl Into<String>) -> WordPart {
        WordPart::ArithmeticExpansion(ArithmeticExpansionPart { expression: expression.into() })
    }

    pub fn assignment(
        name: impl Into<String>,
        subscript: Option<String>,
        value: Option<WordNode>,
        append: bool,
        array: Option<Vec<ArrayElementNode>>,
    ) -> AssignmentNode {
        AssignmentNode { name: name.into(), subscript, value, append, array }
    }

    pub fn redirection(
        operator: RedirectionOperator,
        target: RedirectionTarget,
        fd: Option<i32>,
    ) -> RedirectionNode {
        RedirectionNode { fd, operator, target }
    }
}
