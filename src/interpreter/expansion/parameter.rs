//! Parameter expansion: `$var`, `${var}` and the whole operator zoo.

use crate::ast::{
    ParameterExpansionPart, ParameterOperation, PatternAnchor, PatternSide, WordNode,
};
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::expansion::pattern::{compile_pattern, pattern_to_regex};
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::vars::VarValue;
use crate::interpreter::word_expansion::Piece;
use regex_lite::Regex;

/// What a parameter reference resolves to, before any operator runs.
#[derive(Debug, Clone)]
enum Subject {
    Unset,
    Scalar(String),
    /// `$@`, `${arr[@]}` and friends: a field list, plus how it joins
    /// inside double quotes.
    Fields(Vec<String>, JoinStyle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinStyle {
    /// `@`: one field per element inside quotes.
    Separate,
    /// `*`: joined with the first IFS character inside quotes.
    Join,
}

impl Subject {
    fn is_unset(&self) -> bool {
        matches!(self, Subject::Unset)
    }

    fn is_null(&self) -> bool {
        match self {
            Subject::Unset => true,
            Subject::Scalar(s) => s.is_empty(),
            Subject::Fields(f, _) => f.is_empty() || (f.len() == 1 && f[0].is_empty()),
        }
    }
}

impl Interpreter {
    /// Expand one parameter reference into pieces.
    pub(crate) fn expand_parameter(
        &mut self,
        part: &ParameterExpansionPart,
        in_quotes: bool,
    ) -> ExecResult<Vec<Piece>> {
        let subject = self.resolve_subject(&part.parameter)?;

        let operation = match &part.operation {
            None => {
                self.check_nounset(&part.parameter, &subject)?;
                return Ok(self.subject_pieces(subject, in_quotes));
            }
            Some(op) => op,
        };

        match operation {
            ParameterOperation::BadSubstitution { text } => {
                Err(ShellError::Expansion(format!("{}: bad substitution", text)).into())
            }

            ParameterOperation::DefaultValue { word, check_empty } => {
                let use_default =
                    if *check_empty { subject.is_null() } else { subject.is_unset() };
                if use_default {
                    self.operand_pieces(word, in_quotes)
                } else {
                    Ok(self.subject_pieces(subject, in_quotes))
                }
            }

            ParameterOperation::AssignDefault { word, check_empty } => {
                let assign = if *check_empty { subject.is_null() } else { subject.is_unset() };
                if assign {
                    let value = self.expand_word_single(word)?;
                    let name = base_name(&part.parameter);
                    self.state.assign(name, value.clone()).map_err(ControlFlow::from)?;
                    Ok(vec![Piece::text(value, in_quotes, !in_quotes)])
                } else {
                    Ok(self.subject_pieces(subject, in_quotes))
                }
            }

            ParameterOperation::ErrorIfUnset { word, check_empty } => {
                let fail = if *check_empty { subject.is_null() } else { subject.is_unset() };
                if fail {
                    let message = match word {
                        Some(w) => self.expand_word_single(w)?,
                        None => "parameter null or not set".to_string(),
                    };
                    Err(ShellError::Expansion(format!("{}: {}", part.parameter, message)).into())
                } else {
                    Ok(self.subject_pieces(subject, in_quotes))
                }
            }

            ParameterOperation::UseAlternative { word, check_empty } => {
                let use_alt = if *check_empty { !subject.is_null() } else { !subject.is_unset() };
                if use_alt {
                    self.operand_pieces(word, in_quotes)
                } else {
                    Ok(Vec::new())
                }
            }

            ParameterOperation::Length => {
                let length = match &subject {
                    Subject::Unset => 0,
                    Subject::Scalar(s) => s.chars().count(),
                    Subject::Fields(f, _) => f.len(),
                };
                Ok(vec![Piece::text(length.to_string(), in_quotes, false)])
            }

            ParameterOperation::Substring { offset, length } => {
                self.substring(&part.parameter, subject, offset, length.as_deref(), in_quotes)
            }

            ParameterOperation::RemovePattern { pattern, side, longest } => {
                let pattern = self.expand_word_pattern(pattern)?;
                self.map_subject(subject, in_quotes, |text, interp| {
                    Ok(remove_pattern(text, &pattern, *side, *longest, interp.state.shopt.extglob))
                })
            }

            ParameterOperation::ReplacePattern { pattern, replacement, all, anchor } => {
                let pattern = self.expand_word_pattern(pattern)?;
                let replacement = match replacement {
                    Some(word) => self.expand_word_single(word)?,
                    None => String::new(),
                };
                self.map_subject(subject, in_quotes, |text, interp| {
                    replace_pattern(
                        text,
                        &pattern,
                        &replacement,
                        *all,
                        *anchor,
                        interp.state.shopt.extglob,
                    )
                })
            }

            ParameterOperation::CaseModify { upper, all, pattern } => {
                let pattern = match pattern {
                    Some(word) => Some(self.expand_word_pattern(word)?),
                    None => None,
                };
                self.map_subject(subject, in_quotes, |text, interp| {
                    Ok(case_modify(
                        text,
                        *upper,
                        *all,
                        pattern.as_deref(),
                        interp.state.shopt.extglob,
                    ))
                })
            }

            ParameterOperation::Indirect => {
                let target = match &subject {
                    Subject::Scalar(s) => s.clone(),
                    _ => String::new(),
                };
                if target.is_empty() {
                    self.check_nounset(&part.parameter, &Subject::Unset)?;
                    return Ok(Vec::new());
                }
                let indirect = self.resolve_subject(&target)?;
                self.check_nounset(&target, &indirect)?;
                Ok(self.subject_pieces(indirect, in_quotes))
            }

            ParameterOperation::NamePrefix { prefix, star } => {
                let names = self.state.scopes.names_with_prefix(prefix);
                let style = if *star { JoinStyle::Join } else { JoinStyle::Separate };
                Ok(self.subject_pieces(Subject::Fields(names, style), in_quotes))
            }

            ParameterOperation::ArrayKeys { array, star } => {
                let keys = match self.state.scopes.get(array).map(|v| &v.value) {
                    Some(VarValue::Indexed(map)) => map.keys().map(|k| k.to_string()).collect(),
                    Some(VarValue::Assoc(map)) => map.keys().cloned().collect(),
                    Some(VarValue::Scalar(_)) => vec!["0".to_string()],
                    _ => Vec::new(),
                };
                let style = if *star { JoinStyle::Join } else { JoinStyle::Separate };
                Ok(self.subject_pieces(Subject::Fields(keys, style), in_quotes))
            }
        }
    }

    // =========================================================================
    // SUBJECT RESOLUTION
    // =========================================================================

    fn resolve_subject(&mut self, parameter: &str) -> ExecResult<Subject> {
        // `name[subscript]` forms.
        if let Some((name, subscript)) = split_subscript(parameter) {
            return self.resolve_subscripted(name, subscript);
        }

        match parameter {
            "@" => Ok(Subject::Fields(self.state.positional.clone(), JoinStyle::Separate)),
            "*" => Ok(Subject::Fields(self.state.positional.clone(), JoinStyle::Join)),
            name => match self.state.lookup(name) {
                Some(value) => Ok(Subject::Scalar(value)),
                None => Ok(Subject::Unset),
            },
        }
    }

    fn resolve_subscripted(&mut self, name: &str, subscript: &str) -> ExecResult<Subject> {
        let value = match self.state.scopes.get(name) {
            Some(var) => var.value.clone(),
            None => {
                return if subscript == "@" || subscript == "*" {
                    let style =
                        if subscript == "@" { JoinStyle::Separate } else { JoinStyle::Join };
                    Ok(Subject::Fields(Vec::new(), style))
                } else {
                    Ok(Subject::Unset)
                };
            }
        };
        match subscript {
            "@" | "*" => {
                let style = if subscript == "@" { JoinStyle::Separate } else { JoinStyle::Join };
                let fields = match value {
                    VarValue::Indexed(map) => map.values().cloned().collect(),
                    VarValue::Assoc(map) => map.values().cloned().collect(),
                    VarValue::Scalar(s) => vec![s],
                    VarValue::Tombstone => Vec::new(),
                };
                Ok(Subject::Fields(fields, style))
            }
            _ => match value {
                VarValue::Assoc(map) => {
                    let key = self.expand_text_as_word(subscript)?;
                    Ok(map.get(&key).cloned().map_or(Subject::Unset, Subject::Scalar))
                }
                VarValue::Indexed(map) => {
                    let mut index = self.eval_arith_text(subscript)?;
                    if index < 0 {
                        let max = map.keys().next_back().copied().unwrap_or(-1);
                        index += max + 1;
                    }
                    Ok(map.get(&index).cloned().map_or(Subject::Unset, Subject::Scalar))
                }
                VarValue::Scalar(s) => {
                    let index = self.eval_arith_text(subscript)?;
                    if index == 0 {
                        Ok(Subject::Scalar(s))
                    } else {
                        Ok(Subject::Unset)
                    }
                }
                VarValue::Tombstone => Ok(Subject::Unset),
            },
        }
    }

    fn check_nounset(&self, parameter: &str, subject: &Subject) -> ExecResult<()> {
        if self.state.options.nounset
            && subject.is_unset()
            && !matches!(parameter, "@" | "*")
        {
            return Err(ShellError::Unbound(parameter.to_string()).into());
        }
        Ok(())
    }

    // =========================================================================
    // PIECE PRODUCTION
    // =========================================================================

    fn subject_pieces(&self, subject: Subject, in_quotes: bool) -> Vec<Piece> {
        match subject {
            Subject::Unset => {
                if in_quotes {
                    // An unset scalar in quotes still contributes quoted
                    // emptiness only through surrounding text; itself it
                    // is an empty quoted run.
                    vec![Piece::text("", true, false)]
                } else {
                    vec![Piece::text("", false, true)]
                }
            }
            Subject::Scalar(value) => vec![Piece::text(value, in_quotes, !in_quotes)],
            Subject::Fields(fields, style) => {
                self.fields_pieces(fields, style, in_quotes)
            }
        }
    }

    fn fields_pieces(&self, fields: Vec<String>, style: JoinStyle, in_quotes: bool) -> Vec<Piece> {
        if in_quotes && style == JoinStyle::Join {
            let sep = self.state.ifs().chars().next().map(|c| c.to_string()).unwrap_or_default();
            return vec![Piece::text(fields.join(&sep), true, false)];
        }
        if fields.is_empty() {
            // `"$@"` with no parameters: no field at all: the
            // surrounding literals still join into one field.
            return Vec::new();
        }
        let mut pieces = Vec::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                pieces.push(Piece::Break);
            }
            pieces.push(Piece::text(field, in_quotes, !in_quotes));
        }
        pieces
    }

    /// Operand of `:-`/`:+`: expands like a word; splittable only when
    /// the outer context is unquoted and the operand itself is not
    /// fully quoted.
    fn operand_pieces(&mut self, word: &WordNode, in_quotes: bool) -> ExecResult<Vec<Piece>> {
        let fully_quoted = word.is_fully_quoted();
        let value = self.expand_word_single(word)?;
        Ok(vec![Piece::text(value, in_quotes || fully_quoted, !in_quotes && !fully_quoted)])
    }

    /// Apply `f` to the scalar, or to every field of an array subject.
    fn map_subject<F>(
        &mut self,
        subject: Subject,
        in_quotes: bool,
        mut f: F,
    ) -> ExecResult<Vec<Piece>>
    where
        F: FnMut(&str, &mut Self) -> ExecResult<String>,
    {
        match subject {
            Subject::Unset => Ok(self.subject_pieces(Subject::Scalar(String::new()), in_quotes)),
            Subject::Scalar(s) => {
                let mapped = f(&s, self)?;
                Ok(self.subject_pieces(Subject::Scalar(mapped), in_quotes))
            }
            Subject::Fields(fields, style) => {
                let mut mapped = Vec::with_capacity(fields.len());
                for field in &fields {
                    mapped.push(f(field, self)?);
                }
                Ok(self.subject_pieces(Subject::Fields(mapped, style), in_quotes))
            }
        }
    }

    // =========================================================================
    // SUBSTRING
    // =========================================================================

    fn substring(
        &mut self,
        parameter: &str,
        subject: Subject,
        offset: &str,
        length: Option<&str>,
        in_quotes: bool,
    ) -> ExecResult<Vec<Piece>> {
        let offset = self.eval_arith_text(offset)?;
        let length = match length {
            Some(text) => Some(self.eval_arith_text(text)?),
            None => None,
        };

        match subject {
            Subject::Fields(fields, style) => {
                // Positional/array slice: offset counts elements; for
                // `$@` offset 0 is `$0`.
                let includes_zero = matches!(parameter, "@" | "*");
                let mut all: Vec<String> = if includes_zero {
                    let mut v = vec![self.state.script_name.clone()];
                    v.extend(fields);
                    v
                } else {
                    fields
                };
                let len = all.len() as i64;
                let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
                let mut sliced: Vec<String> = all.drain(..).skip(start as usize).collect();
                if let Some(l) = length {
                    if l < 0 {
                        return Err(ShellError::Expansion(format!(
                            "{}: substring expression < 0",
                            parameter
                        ))
                        .into());
                    }
                    sliced.truncate(l as usize);
                }
                Ok(self.fields_pieces(sliced, style, in_quotes))
            }
            subject => {
                let value = match subject {
                    Subject::Scalar(s) => s,
                    _ => String::new(),
                };
                let chars: Vec<char> = value.chars().collect();
                let len = chars.len() as i64;
                let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
                let end = match length {
                    None => len,
                    Some(l) if l < 0 => {
                        let e = len + l;
                        if e < start {
                            return Err(ShellError::Expansion(format!(
                                "{}: substring expression < 0",
                                parameter
                            ))
                            .into());
                        }
                        e
                    }
                    Some(l) => (start + l).min(len),
                };
                let result: String = chars[start as usize..end as usize].iter().collect();
                Ok(vec![Piece::text(result, in_quotes, !in_quotes)])
            }
        }
    }
}

// =============================================================================
// PATTERN OPERATIONS
// =============================================================================

fn base_name(parameter: &str) -> &str {
    match parameter.find('[') {
        Some(i) => &parameter[..i],
        None => parameter,
    }
}

fn split_subscript(parameter: &str) -> Option<(&str, &str)> {
    let open = parameter.find('[')?;
    let close = parameter.rfind(']')?;
    if close <= open || close != parameter.len() - 1 {
        return None;
    }
    Some((&parameter[..open], &parameter[open + 1..close]))
}

/// `${v#pat}` family.
fn remove_pattern(text: &str, pattern: &str, side: PatternSide, longest: bool, extglob: bool) -> String {
    let body = pattern_to_regex(pattern, longest, extglob);
    let regex = match side {
        PatternSide::Prefix => Regex::new(&format!("(?s)^{}", body)),
        PatternSide::Suffix => {
            if longest {
                // Longest suffix: anchor lazily from the start.
                match Regex::new(&format!("(?s)^(.*?)(?:{})$", pattern_to_regex(pattern, true, extglob))) {
                    Ok(re) => {
                        if let Some(caps) = re.captures(text) {
                            if let Some(m) = caps.get(1) {
                                return m.as_str().to_string();
                            }
                        }
                        return text.to_string();
                    }
                    Err(_) => return text.to_string(),
                }
            }
            // Shortest suffix: greedy keep-prefix.
            match Regex::new(&format!("(?s)^(.*)(?:{})$", pattern_to_regex(pattern, false, extglob))) {
                Ok(re) => {
                    if let Some(caps) = re.captures(text) {
                        if let Some(m) = caps.get(1) {
                            return m.as_str().to_string();
                        }
                    }
                    return text.to_string();
                }
                Err(_) => return text.to_string(),
            }
        }
    };
    match regex {
        Ok(re) => match re.find(text) {
            Some(m) if m.start() == 0 => text[m.end()..].to_string(),
            _ => text.to_string(),
        },
        Err(_) => text.to_string(),
    }
}

/// `${v/pat/rep}` family.
fn replace_pattern(
    text: &str,
    pattern: &str,
    replacement: &str,
    all: bool,
    anchor: Option<PatternAnchor>,
    extglob: bool,
) -> ExecResult<String> {
    let body = pattern_to_regex(pattern, true, extglob);
    let anchored = match anchor {
        Some(PatternAnchor::Start) => format!("(?s)^(?:{})", body),
        Some(PatternAnchor::End) => format!("(?s)(?:{})$", body),
        None => format!("(?s){}", body),
    };
    let regex = Regex::new(&anchored)
        .map_err(|_| ShellError::Expansion(format!("bad pattern: {}", pattern)))?;
    // Closure replacement keeps `$` in the replacement text literal.
    let result = if all && anchor.is_none() {
        regex
            .replace_all(text, |_: &regex_lite::Captures| replacement.to_string())
            .into_owned()
    } else {
        regex
            .replace(text, |_: &regex_lite::Captures| replacement.to_string())
            .into_owned()
    };
    Ok(result)
}

/// `${v^pat}` / `${v,pat}` family. Without a pattern the first character
/// (or all of them) transforms; with one, only matching characters do.
fn case_modify(text: &str, upper: bool, all: bool, pattern: Option<&str>, extglob: bool) -> String {
    let matcher = pattern.and_then(|p| compile_pattern(p, extglob, false));
    let transform = |c: char| -> String {
        let matched = match &matcher {
            Some(re) => re.is_match(&c.to_string()),
            None => true,
        };
        if !matched {
            return c.to_string();
        }
        if upper {
            c.to_uppercase().to_string()
        } else {
            c.to_lowercase().to_string()
        }
    };

    if all {
        text.chars().map(transform).collect()
    } else {
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => format!("{}{}", transform(first), chars.as_str()),
            None => String::new(),
        }
    }
}

