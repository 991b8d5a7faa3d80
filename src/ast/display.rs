//! Best-effort unparsing, for job listings and trace output.
//!
//! This is display text, not round-trippable source: quoting is
//! reconstructed conservatively and compound bodies are abbreviated.

use std::fmt;

use crate::ast::types::*;

impl fmt::Display for WordNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl fmt::Display for WordPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordPart::Literal(p) => write!(f, "{}", p.value),
            WordPart::SingleQuoted(p) => write!(f, "'{}'", p.value),
            WordPart::DoubleQuoted(p) => {
                write!(f, "\"")?;
                for part in &p.parts {
                    write!(f, "{}", part)?;
                }
                write!(f, "\"")
            }
            WordPart::Escaped(p) => write!(f, "\\{}", p.value),
            WordPart::Tilde(p) => match &p.user {
                Some(user) => write!(f, "~{}", user),
                None => write!(f, "~"),
            },
            WordPart::Glob(p) => write!(f, "{}", p.pattern),
            WordPart::ParameterExpansion(p) => {
                if p.operation.is_some() {
                    write!(f, "${{{}…}}", p.parameter)
                } else {
                    write!(f, "${}", p.parameter)
                }
            }
            WordPart::CommandSubstitution(p) => {
                if p.backtick_style {
                    write!(f, "`…`")
                } else {
                    write!(f, "$(…)")
                }
            }
            WordPart::ArithmeticExpansion(p) => write!(f, "$(({}))", p.expression),
            WordPart::ProcessSubstitution(p) => match p.direction {
                ProcessDirection::In => write!(f, "<(…)"),
                ProcessDirection::Out => write!(f, ">(…)"),
            },
        }
    }
}

impl fmt::Display for SimpleCommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for a in &self.assignments {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}=…", a.name)?;
        }
        if let Some(name) = &self.name {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", name)?;
        }
        for arg in &self.args {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandNode::Simple(s) => write!(f, "{}", s),
            CommandNode::Compound(c) => write!(f, "{}", compound_label(c)),
            CommandNode::FunctionDef(d) => write!(f, "{}()", d.name),
        }
    }
}

fn compound_label(c: &CompoundCommandNode) -> &'static str {
    match c {
        CompoundCommandNode::If(_) => "if …",
        CompoundCommandNode::While(_) => "while …",
        CompoundCommandNode::Until(_) => "until …",
        CompoundCommandNode::For(_) => "for …",
        CompoundCommandNode::CStyleFor(_) => "for ((…))",
        CompoundCommandNode::Case(_) => "case …",
        CompoundCommandNode::Select(_) => "select …",
        CompoundCommandNode::Subshell(_) => "( … )",
        CompoundCommandNode::Group(_) => "{ …; }",
        CompoundCommandNode::Arithmetic(_) => "(( … ))",
        CompoundCommandNode::Conditional(_) => "[[ … ]]",
    }
}

impl fmt::Display for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "! ")?;
        }
        for (i, cmd) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", cmd)?;
        }
        Ok(())
    }
}

impl fmt::Display for StatementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.pipelines.iter().enumerate() {
            if i > 0 {
                let op = match self.operators.get(i - 1) {
                    Some(StatementOperator::And) => " && ",
                    Some(StatementOperator::Or) => " || ",
                    _ => "; ",
                };
                write!(f, "{}", op)?;
            }
            write!(f, "{}", p)?;
        }
        if self.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;

    #[test]
    fn statement_display_reads_like_the_source() {
        let script = Parser::new().parse("echo one 'two words' | wc -l &").expect("parse");
        assert_eq!(script.statements[0].to_string(), "echo one 'two words' | wc -l &");
    }

    #[test]
    fn and_or_display() {
        let script = Parser::new().parse("true && echo yes").expect("parse");
        assert_eq!(script.statements[0].to_string(), "true && echo yes");
    }
}
