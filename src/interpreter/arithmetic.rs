//! Arithmetic evaluation for `$((…))`, `((…))`, C-style `for`, and
//! array subscripts.
//!
//! The expression text arrives pre-expanded (`$var` and `$(…)` already
//! substituted by the expander); this module tokenizes and evaluates it
//! with C precedence over 64-bit signed integers. Branches skipped by
//! `&&`, `||` and `?:` are parsed but produce no side effects.

use crate::interpreter::errors::ShellError;

/// Variable access the evaluator needs, kept as a trait so tests can run
/// against a plain map.
pub trait ArithEnv {
    fn get_scalar(&mut self, name: &str) -> Option<String>;
    fn set_scalar(&mut self, name: &str, value: &str) -> Result<(), ShellError>;
    fn is_assoc(&self, name: &str) -> bool;
    fn get_index(&mut self, name: &str, index: i64) -> Option<String>;
    fn set_index(&mut self, name: &str, index: i64, value: &str) -> Result<(), ShellError>;
    fn get_key(&mut self, name: &str, key: &str) -> Option<String>;
    fn set_key(&mut self, name: &str, key: &str, value: &str) -> Result<(), ShellError>;
}

pub type ArithResult<T = i64> = Result<T, ShellError>;

fn err<T>(message: impl Into<String>) -> ArithResult<T> {
    Err(ShellError::Arithmetic(message.into()))
}

/// Evaluate an expression. An empty (or blank) expression is 0.
pub fn evaluate(env: &mut dyn ArithEnv, text: &str) -> ArithResult {
    if text.trim().is_empty() {
        return Ok(0);
    }
    let mut eval = Evaluator { chars: text.chars().collect(), pos: 0, env, depth: 0 };
    let value = eval.comma(true)?;
    eval.skip_ws();
    if eval.pos < eval.chars.len() {
        let rest: String = eval.chars[eval.pos..].iter().collect();
        return err(format!("syntax error in expression (error token is \"{}\")", rest.trim()));
    }
    Ok(value)
}

/// An lvalue the assignment and increment operators can write back to.
#[derive(Debug, Clone)]
enum Place {
    Var(String),
    Index(String, i64),
    Key(String, String),
}

struct Evaluator<'a> {
    chars: Vec<char>,
    pos: usize,
    env: &'a mut dyn ArithEnv,
    depth: u32,
}

const MAX_RECURSION: u32 = 128;

impl<'a> Evaluator<'a> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.get(self.pos), Some(' ') | Some('\t') | Some('\n')) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let sc: Vec<char> = s.chars().collect();
        if self.chars[self.pos.min(self.chars.len())..]
            .starts_with(&sc)
        {
            self.pos += sc.len();
            true
        } else {
            false
        }
    }

    // -------------------------------------------------------------------------
    // Precedence ladder
    // -------------------------------------------------------------------------

    /// `active` is false inside unevaluated branches: everything parses,
    /// nothing assigns.
    fn comma(&mut self, active: bool) -> ArithResult {
        let mut value = self.assignment(active)?;
        while self.peek() == Some(',') {
            self.pos += 1;
            value = self.assignment(active)?;
        }
        Ok(value)
    }

    fn assignment(&mut self, active: bool) -> ArithResult {
        // Probe for `place op …` without side effects; only a confirmed
        // assignment re-parses the place for real, so a subscript like
        // `arr[i++]` never evaluates twice.
        let save = self.pos;
        let probe = self.try_place(false)?.is_some();
        let is_assignment = probe && {
            self.skip_ws();
            let found = self.assignment_operator().is_some();
            found
        };
        self.pos = save;
        if is_assignment {
            let place = match self.try_place(active)? {
                Some(p) => p,
                None => return err("invalid assignment target"),
            };
            self.skip_ws();
            if let Some(op) = self.assignment_operator() {
                let rhs = self.assignment(active)?;
                if !active {
                    return Ok(rhs);
                }
                let mut current = || -> ArithResult { self.read_place_value(&place) };
                let new = match op {
                    "=" => rhs,
                    "+=" => current()?.wrapping_add(rhs),
                    "-=" => current()?.wrapping_sub(rhs),
                    "*=" => current()?.wrapping_mul(rhs),
                    "/=" => {
                        if rhs == 0 {
                            return err("division by 0");
                        }
                        current()?.wrapping_div(rhs)
                    }
                    "%=" => {
                        if rhs == 0 {
                            return err("division by 0");
                        }
                        current()?.wrapping_rem(rhs)
                    }
                    "<<=" => current()?.wrapping_shl(rhs as u32),
                    ">>=" => current()?.wrapping_shr(rhs as u32),
                    "&=" => current()? & rhs,
                    "|=" => current()? | rhs,
                    "^=" => current()? ^ rhs,
                    _ => unreachable!(),
                };
                self.write_place(&place, new)?;
                return Ok(new);
            }
            return err("invalid assignment");
        }
        self.ternary(active)
    }

    fn assignment_operator(&mut self) -> Option<&'static str> {
        for op in ["<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^="] {
            if self.eat_str(op) {
                return Some(op);
            }
        }
        // Lone `=`, but not `==`.
        if self.peek() == Some('=') && self.peek2() != Some('=') {
            self.pos += 1;
            return Some("=");
        }
        None
    }

    fn ternary(&mut self, active: bool) -> ArithResult {
        let cond = self.logical_or(active)?;
        if self.peek() == Some('?') {
            self.pos += 1;
            let take_then = cond != 0;
            let then_val = self.assignment(active && take_then)?;
            self.skip_ws();
            if !self.eat(':') {
                return err("expected `:' in conditional expression");
            }
            let else_val = self.assignment(active && !take_then)?;
            return Ok(if take_then { then_val } else { else_val });
        }
        Ok(cond)
    }

    fn logical_or(&mut self, active: bool) -> ArithResult {
        let mut left = self.logical_and(active)?;
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'|') && self.peek2() == Some('|') {
                self.pos += 2;
                let rhs_active = active && left == 0;
                let right = self.logical_and(rhs_active)?;
                left = if left != 0 || right != 0 { 1 } else { 0 };
            } else {
                return Ok(left);
            }
        }
    }

    fn logical_and(&mut self, active: bool) -> ArithResult {
        let mut left = self.bit_or(active)?;
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'&') && self.peek2() == Some('&') {
                self.pos += 2;
                let rhs_active = active && left != 0;
                let right = self.bit_or(rhs_active)?;
                left = if left != 0 && right != 0 { 1 } else { 0 };
            } else {
                return Ok(left);
            }
        }
    }

    fn bit_or(&mut self, active: bool) -> ArithResult {
        let mut left = self.bit_xor(active)?;
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'|')
                && self.peek2() != Some('|')
                && self.peek2() != Some('=')
            {
                self.pos += 1;
                left |= self.bit_xor(active)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn bit_xor(&mut self, active: bool) -> ArithResult {
        let mut left = self.bit_and(active)?;
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'^') && self.peek2() != Some('=') {
                self.pos += 1;
                left ^= self.bit_and(active)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn bit_and(&mut self, active: bool) -> ArithResult {
        let mut left = self.equality(active)?;
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'&')
                && self.peek2() != Some('&')
                && self.peek2() != Some('=')
            {
                self.pos += 1;
                left &= self.equality(active)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn equality(&mut self, active: bool) -> ArithResult {
        let mut left = self.relational(active)?;
        loop {
            if self.eat_str("==") {
                let right = self.relational(active)?;
                left = (left == right) as i64;
            } else if self.eat_str("!=") {
                let right = self.relational(active)?;
                left = (left != right) as i64;
            } else {
                return Ok(left);
            }
        }
    }

    fn relational(&mut self, active: bool) -> ArithResult {
        let mut left = self.shift(active)?;
        loop {
            self.skip_ws();
            let c = self.chars.get(self.pos).copied();
            let c2 = self.peek2();
            match (c, c2) {
                (Some('<'), Some('=')) => {
                    self.pos += 2;
                    left = (left <= self.shift(active)?) as i64;
                }
                (Some('>'), Some('=')) => {
                    self.pos += 2;
                    left = (left >= self.shift(active)?) as i64;
                }
                (Some('<'), n) if n != Some('<') => {
                    self.pos += 1;
                    left = (left < self.shift(active)?) as i64;
                }
                (Some('>'), n) if n != Some('>') => {
                    self.pos += 1;
                    left = (left > self.shift(active)?) as i64;
                }
                _ => return Ok(left),
            }
        }
    }

    fn shift(&mut self, active: bool) -> ArithResult {
        let mut left = self.additive(active)?;
        loop {
            self.skip_ws();
            let c = self.chars.get(self.pos).copied();
            let c2 = self.peek2();
            match (c, c2) {
                (Some('<'), Some('<')) if self.chars.get(self.pos + 2) != Some(&'=') => {
                    self.pos += 2;
                    let right = self.additive(active)?;
                    left = left.wrapping_shl(right as u32);
                }
                (Some('>'), Some('>')) if self.chars.get(self.pos + 2) != Some(&'=') => {
                    self.pos += 2;
                    let right = self.additive(active)?;
                    left = left.wrapping_shr(right as u32);
                }
                _ => return Ok(left),
            }
        }
    }

    fn additive(&mut self, active: bool) -> ArithResult {
        let mut left = self.multiplicative(active)?;
        loop {
            self.skip_ws();
            let c = self.chars.get(self.pos).copied();
            let c2 = self.peek2();
            match c {
                Some('+') if c2 != Some('+') && c2 != Some('=') => {
                    self.pos += 1;
                    left = left.wrapping_add(self.multiplicative(active)?);
                }
                Some('-') if c2 != Some('-') && c2 != Some('=') => {
                    self.pos += 1;
                    left = left.wrapping_sub(self.multiplicative(active)?);
                }
                _ => return Ok(left),
            }
        }
    }

    fn multiplicative(&mut self, active: bool) -> ArithResult {
        let mut left = self.power(active)?;
        loop {
            self.skip_ws();
            let c = self.chars.get(self.pos).copied();
            let c2 = self.peek2();
            match c {
                Some('*') if c2 != Some('*') && c2 != Some('=') => {
                    self.pos += 1;
                    left = left.wrapping_mul(self.power(active)?);
                }
                Some('/') if c2 != Some('=') => {
                    self.pos += 1;
                    let right = self.power(active)?;
                    if active && right == 0 {
                        return err("division by 0");
                    }
                    left = if active { left.wrapping_div(right) } else { 0 };
                }
                Some('%') if c2 != Some('=') => {
                    self.pos += 1;
                    let right = self.power(active)?;
                    if active && right == 0 {
                        return err("division by 0");
                    }
                    left = if active { left.wrapping_rem(right) } else { 0 };
                }
                _ => return Ok(left),
            }
        }
    }

    /// `**`, right-associative.
    fn power(&mut self, active: bool) -> ArithResult {
        let base = self.unary(active)?;
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&'*') && self.peek2() == Some('*') {
            self.pos += 2;
            let exp = self.power(active)?;
            if exp < 0 {
                return err("exponent less than 0");
            }
            let mut result: i64 = 1;
            for _ in 0..exp {
                result = result.wrapping_mul(base);
            }
            return Ok(result);
        }
        Ok(base)
    }

    fn unary(&mut self, active: bool) -> ArithResult {
        self.skip_ws();
        let c = self.chars.get(self.pos).copied();
        match c {
            Some('!') if self.peek2() != Some('=') => {
                self.pos += 1;
                Ok((self.unary(active)? == 0) as i64)
            }
            Some('~') => {
                self.pos += 1;
                Ok(!self.unary(active)?)
            }
            Some('+') if self.peek2() == Some('+') => {
                self.pos += 2;
                self.prefix_incdec(1, active)
            }
            Some('-') if self.peek2() == Some('-') => {
                self.pos += 2;
                self.prefix_incdec(-1, active)
            }
            Some('+') => {
                self.pos += 1;
                self.unary(active)
            }
            Some('-') => {
                self.pos += 1;
                Ok(self.unary(active)?.wrapping_neg())
            }
            _ => self.postfix(active),
        }
    }

    fn prefix_incdec(&mut self, delta: i64, active: bool) -> ArithResult {
        self.skip_ws();
        match self.try_place(active)? {
            Some(place) => {
                if !active {
                    return Ok(0);
                }
                let value = self.read_place_value(&place)?.wrapping_add(delta);
                self.write_place(&place, value)?;
                Ok(value)
            }
            None => err("`++' and `--' require a variable"),
        }
    }

    fn postfix(&mut self, active: bool) -> ArithResult {
        self.skip_ws();
        let save = self.pos;
        if let Some(place) = self.try_place(active)? {
            self.skip_ws();
            let c = self.chars.get(self.pos).copied();
            let c2 = self.peek2();
            if c == Some('+') && c2 == Some('+') {
                self.pos += 2;
                if !active {
                    return Ok(0);
                }
                let value = self.read_place_value(&place)?;
                self.write_place(&place, value.wrapping_add(1))?;
                return Ok(value);
            }
            if c == Some('-') && c2 == Some('-') {
                self.pos += 2;
                if !active {
                    return Ok(0);
                }
                let value = self.read_place_value(&place)?;
                self.write_place(&place, value.wrapping_sub(1))?;
                return Ok(value);
            }
            // Just a variable reference.
            if !active {
                return Ok(0);
            }
            return self.read_place_value(&place);
        }
        self.pos = save;
        self.primary(active)
    }

    fn primary(&mut self, active: bool) -> ArithResult {
        self.skip_ws();
        match self.chars.get(self.pos).copied() {
            Some('(') => {
                self.pos += 1;
                let value = self.comma(active)?;
                self.skip_ws();
                if !self.eat(')') {
                    return err("missing `)'");
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) => err(format!("syntax error: operand expected (error token is \"{}\")", c)),
            None => err("syntax error: operand expected"),
        }
    }

    // -------------------------------------------------------------------------
    // Operands
    // -------------------------------------------------------------------------

    /// Parse `name`, `name[expr]`: the things assignments can target.
    fn try_place(&mut self, active: bool) -> ArithResult<Option<Place>> {
        self.skip_ws();
        match self.chars.get(self.pos) {
            Some(&c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Ok(None),
        }
        let start = self.pos;
        while matches!(self.chars.get(self.pos), Some(c) if c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if self.chars.get(self.pos) == Some(&'[') {
            let open = self.pos;
            match crate::parser::scanner::find_balanced(&self.chars, open + 1, '[', ']') {
                Some(close) => {
                    let subscript: String = self.chars[open + 1..close].iter().collect();
                    self.pos = close + 1;
                    if self.env.is_assoc(&name) {
                        return Ok(Some(Place::Key(name, subscript.trim().to_string())));
                    }
                    let index = if active { evaluate(self.env, &subscript)? } else { 0 };
                    return Ok(Some(Place::Index(name, index)));
                }
                None => return err("missing `]'"),
            }
        }
        Ok(Some(Place::Var(name)))
    }

    fn read_place_value(&mut self, place: &Place) -> ArithResult {
        if self.depth >= MAX_RECURSION {
            return err("expression recursion level exceeded");
        }
        let raw = match place {
            Place::Var(name) => self.env.get_scalar(name),
            Place::Index(name, index) => self.env.get_index(name, *index),
            Place::Key(name, key) => self.env.get_key(name, key),
        };
        let raw = match raw {
            Some(s) => s,
            None => return Ok(0),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        // Values that are not plain numbers re-evaluate as expressions,
        // so `a="b+1"` works like in bash.
        if let Ok(parsed) = parse_literal(trimmed) {
            return Ok(parsed);
        }
        self.depth += 1;
        let mut inner = Evaluator {
            chars: trimmed.chars().collect(),
            pos: 0,
            env: self.env,
            depth: self.depth,
        };
        let result = inner.comma(true);
        self.depth -= 1;
        result
    }

    fn write_place(&mut self, place: &Place, value: i64) -> ArithResult<()> {
        let text = value.to_string();
        match place {
            Place::Var(name) => self.env.set_scalar(name, &text),
            Place::Index(name, index) => self.env.set_index(name, *index, &text),
            Place::Key(name, key) => self.env.set_key(name, key, &text),
        }
    }

    fn number(&mut self) -> ArithResult {
        let start = self.pos;
        while matches!(self.chars.get(self.pos), Some(c) if c.is_ascii_alphanumeric() || *c == '#')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        parse_literal(&text)
    }
}

/// Parse an integer literal: decimal, `0x` hex, leading-zero octal, or
/// `base#digits` with base 2–64.
pub fn parse_literal(text: &str) -> ArithResult {
    let negative = text.starts_with('-');
    let body = if negative { &text[1..] } else { text };

    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
            .map_err(|_| ShellError::Arithmetic(format!("invalid number: {}", text)))?
    } else if let Some((base, digits)) = body.split_once('#') {
        let base: u32 = base
            .parse()
            .map_err(|_| ShellError::Arithmetic(format!("invalid arithmetic base: {}", text)))?;
        if !(2..=64).contains(&base) {
            return err(format!("invalid arithmetic base: {}", base));
        }
        parse_base_n(digits, base)?
    } else if body.len() > 1 && body.starts_with('0') && body.bytes().all(|b| b.is_ascii_digit()) {
        i64::from_str_radix(&body[1..], 8)
            .map_err(|_| ShellError::Arithmetic(format!("value too great for base: {}", text)))?
    } else if body.bytes().all(|b| b.is_ascii_digit()) && !body.is_empty() {
        body.parse::<i64>()
            .map_err(|_| ShellError::Arithmetic(format!("invalid number: {}", text)))?
    } else {
        return err(format!("invalid number: {}", text));
    };
    Ok(if negative { -value } else { value })
}

/// Digits for bases up to 64: 0-9, a-z, A-Z, `@`, `_`.
fn parse_base_n(digits: &str, base: u32) -> ArithResult {
    if digits.is_empty() {
        return err("missing digits after base");
    }
    let mut value: i64 = 0;
    for c in digits.chars() {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'a'..='z' => c as u32 - 'a' as u32 + 10,
            'A'..='Z' => {
                if base <= 36 {
                    c as u32 - 'A' as u32 + 10
                } else {
                    c as u32 - 'A' as u32 + 36
                }
            }
            '@' => 62,
            '_' => 63,
            _ => return err(format!("invalid digit: {}", c)),
        };
        if d >= base {
            return err(format!("value too great for base (error token is \"{}\")", digits));
        }
        value = value.wrapping_mul(base as i64).wrapping_add(d as i64);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapEnv {
        vars: HashMap<String, String>,
        arrays: HashMap<String, HashMap<i64, String>>,
    }

    impl ArithEnv for MapEnv {
        fn get_scalar(&mut self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }
        fn set_scalar(&mut self, name: &str, value: &str) -> Result<(), ShellError> {
            self.vars.insert(name.into(), value.into());
            Ok(())
        }
        fn is_assoc(&self, _name: &str) -> bool {
            false
        }
        fn get_index(&mut self, name: &str, index: i64) -> Option<String> {
            self.arrays.get(name).and_then(|a| a.get(&index)).cloned()
        }
        fn set_index(&mut self, name: &str, index: i64, value: &str) -> Result<(), ShellError> {
            self.arrays.entry(name.into()).or_default().insert(index, value.into());
            Ok(())
        }
        fn get_key(&mut self, _name: &str, _key: &str) -> Option<String> {
            None
        }
        fn set_key(&mut self, _name: &str, _key: &str, _value: &str) -> Result<(), ShellError> {
            Ok(())
        }
    }

    fn eval(text: &str) -> i64 {
        evaluate(&mut MapEnv::default(), text).expect("eval")
    }

    fn eval_with(env: &mut MapEnv, text: &str) -> i64 {
        evaluate(env, text).expect("eval")
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 + 2) * 3"), 9);
        assert_eq!(eval("10 / 3"), 3);
        assert_eq!(eval("10 % 3"), 1);
        assert_eq!(eval("2 ** 10"), 1024);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(eval(""), 0);
        assert_eq!(eval("   "), 0);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-5 + 3"), -2);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("!7"), 0);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("- - 4"), 4);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("3 < 5"), 1);
        assert_eq!(eval("3 >= 5"), 0);
        assert_eq!(eval("1 && 2"), 1);
        assert_eq!(eval("0 || 0"), 0);
        assert_eq!(eval("2 == 2 && 3 != 4"), 1);
    }

    #[test]
    fn bitwise() {
        assert_eq!(eval("5 & 3"), 1);
        assert_eq!(eval("5 | 3"), 7);
        assert_eq!(eval("5 ^ 3"), 6);
        assert_eq!(eval("1 << 4"), 16);
        assert_eq!(eval("256 >> 4"), 16);
    }

    #[test]
    fn ternary() {
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 ? 10 : 20"), 20);
    }

    #[test]
    fn ternary_skips_side_effects() {
        let mut env = MapEnv::default();
        assert_eq!(eval_with(&mut env, "1 ? 5 : (x = 99)"), 5);
        assert_eq!(env.vars.get("x"), None);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let mut env = MapEnv::default();
        assert_eq!(eval_with(&mut env, "0 && (x = 1)"), 0);
        assert_eq!(eval_with(&mut env, "1 || (y = 1)"), 1);
        assert!(env.vars.is_empty());
    }

    #[test]
    fn assignment_and_compound() {
        let mut env = MapEnv::default();
        assert_eq!(eval_with(&mut env, "x = 5"), 5);
        assert_eq!(eval_with(&mut env, "x += 3"), 8);
        assert_eq!(eval_with(&mut env, "x <<= 2"), 32);
        assert_eq!(env.vars.get("x").map(String::as_str), Some("32"));
    }

    #[test]
    fn increment_decrement() {
        let mut env = MapEnv::default();
        env.vars.insert("i".into(), "5".into());
        assert_eq!(eval_with(&mut env, "i++"), 5);
        assert_eq!(env.vars.get("i").map(String::as_str), Some("6"));
        assert_eq!(eval_with(&mut env, "++i"), 7);
        assert_eq!(eval_with(&mut env, "--i"), 6);
        assert_eq!(eval_with(&mut env, "i--"), 6);
        assert_eq!(env.vars.get("i").map(String::as_str), Some("5"));
    }

    #[test]
    fn unset_variable_is_zero() {
        assert_eq!(eval("nosuch + 1"), 1);
    }

    #[test]
    fn variable_value_reevaluates() {
        let mut env = MapEnv::default();
        env.vars.insert("a".into(), "b + 1".into());
        env.vars.insert("b".into(), "2".into());
        assert_eq!(eval_with(&mut env, "a * 10"), 30);
    }

    #[test]
    fn array_element_arithmetic() {
        let mut env = MapEnv::default();
        assert_eq!(eval_with(&mut env, "arr[2] = 7"), 7);
        assert_eq!(eval_with(&mut env, "arr[1+1] * 2"), 14);
    }

    #[test]
    fn number_bases() {
        assert_eq!(eval("0x1f"), 31);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("2#1010"), 10);
        assert_eq!(eval("16#ff"), 255);
        assert_eq!(eval("36#z"), 35);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let e = evaluate(&mut MapEnv::default(), "1 / 0").unwrap_err();
        assert!(matches!(e, ShellError::Arithmetic(_)));
        let e = evaluate(&mut MapEnv::default(), "1 % 0").unwrap_err();
        assert!(matches!(e, ShellError::Arithmetic(_)));
    }

    #[test]
    fn syntax_error_reports_token() {
        let e = evaluate(&mut MapEnv::default(), "1 + @").unwrap_err();
        assert!(matches!(e, ShellError::Arithmetic(_)));
    }

    #[test]
    fn comma_evaluates_left_to_right() {
        let mut env = MapEnv::default();
        assert_eq!(eval_with(&mut env, "x = 1, x + 10"), 11);
    }

    #[test]
    fn precedence_of_power_vs_unary_minus() {
        assert_eq!(eval("-2 ** 2"), 4);
    }
}
