//! Variables, attributes, and the scope stack.
//!
//! A scope frame is pushed on every function call and popped on every
//! exit path. Lookup walks innermost → outermost and stops dead at a
//! tombstone: `unset` inside a function shadows outer definitions rather
//! than deleting them. Plain assignment follows the bash rule: write to
//! the nearest frame that already holds the name, else the global frame.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::interpreter::errors::ShellError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VarAttrs: u8 {
        const READONLY  = 1 << 0;
        const EXPORT    = 1 << 1;
        const INTEGER   = 1 << 2;
        const LOWERCASE = 1 << 3;
        const UPPERCASE = 1 << 4;
        const NAMEREF   = 1 << 5;
    }
}

/// A variable's value. Array-ness is part of the value, not an attribute
/// flag, so a variable cannot be both flavours at once.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Scalar(String),
    /// Sparse integer-keyed array; BTreeMap keeps keys ordered, max index
    /// is the last key.
    Indexed(BTreeMap<i64, String>),
    /// Insertion-ordered string-keyed array.
    Assoc(IndexMap<String, String>),
    /// `unset` marker that shadows outer-scope definitions.
    Tombstone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VarValue,
    pub attrs: VarAttrs,
}

impl Variable {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self { value: VarValue::Scalar(value.into()), attrs: VarAttrs::empty() }
    }

    pub fn exported(value: impl Into<String>) -> Self {
        Self { value: VarValue::Scalar(value.into()), attrs: VarAttrs::EXPORT }
    }

    pub fn is_readonly(&self) -> bool {
        self.attrs.contains(VarAttrs::READONLY)
    }

    pub fn is_exported(&self) -> bool {
        self.attrs.contains(VarAttrs::EXPORT)
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.value, VarValue::Tombstone)
    }

    /// The string a bare `$name` reference produces: the scalar, or
    /// element 0 / first element for arrays.
    pub fn as_display_scalar(&self) -> Option<&str> {
        match &self.value {
            VarValue::Scalar(s) => Some(s),
            VarValue::Indexed(map) => map.get(&0).map(|s| s.as_str()),
            VarValue::Assoc(map) => map.get("0").map(|s| s.as_str()),
            VarValue::Tombstone => None,
        }
    }

    /// Apply the case-transform attributes to a new value.
    pub fn transform(&self, value: String) -> String {
        if self.attrs.contains(VarAttrs::UPPERCASE) {
            value.to_uppercase()
        } else if self.attrs.contains(VarAttrs::LOWERCASE) {
            value.to_lowercase()
        } else {
            value
        }
    }
}

// =============================================================================
// SCOPE STACK
// =============================================================================

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Variable>,
}

/// The variable store: a stack of frames, global at the bottom.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { frames: vec![Frame::default()] }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the global frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Visible variable, if any. A tombstone hides outer frames.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        for frame in self.frames.iter().rev() {
            if let Some(var) = frame.vars.get(name) {
                return if var.is_tombstone() { None } else { Some(var) };
            }
        }
        None
    }

    /// Mutable access following the same visibility walk.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.get_mut(name) {
                return if var.is_tombstone() { None } else { Some(var) };
            }
        }
        None
    }

    /// The frame index that holds `name` (tombstones included), walking
    /// inward → outward.
    fn owning_frame(&self, name: &str) -> Option<usize> {
        (0..self.frames.len())
            .rev()
            .find(|&i| self.frames[i].vars.contains_key(name))
    }

    /// Assign without `local`: overwrite in the owning frame, else the
    /// global frame. Readonly refuses.
    pub fn set(&mut self, name: &str, value: String) -> Result<(), ShellError> {
        let idx = match self.owning_frame(name) {
            Some(i) if !self.frames[i].vars[name].is_tombstone() => i,
            Some(i) => i, // overwrite the tombstone in place
            None => 0,
        };
        let frame = &mut self.frames[idx];
        match frame.vars.get_mut(name) {
            Some(var) => {
                if var.is_readonly() {
                    return Err(ShellError::Readonly(name.to_string()));
                }
                let value = var.transform(value);
                var.value = VarValue::Scalar(value);
            }
            None => {
                frame.vars.insert(name.to_string(), Variable::scalar(value));
            }
        }
        Ok(())
    }

    /// `local`: always the current frame.
    pub fn set_local(&mut self, name: &str, var: Variable) -> Result<(), ShellError> {
        let frame = self.frames.last_mut().expect("stack never empty");
        if let Some(existing) = frame.vars.get(name) {
            if existing.is_readonly() && !existing.is_tombstone() {
                return Err(ShellError::Readonly(name.to_string()));
            }
        }
        frame.vars.insert(name.to_string(), var);
        Ok(())
    }

    /// Replace or insert a whole variable in the frame that owns the
    /// name (global if none). Used by declare/export/readonly.
    pub fn set_var(&mut self, name: &str, var: Variable) -> Result<(), ShellError> {
        let idx = self.owning_frame(name).unwrap_or(0);
        let frame = &mut self.frames[idx];
        if let Some(existing) = frame.vars.get(name) {
            if existing.is_readonly() && !var.is_readonly() {
                return Err(ShellError::Readonly(name.to_string()));
            }
        }
        frame.vars.insert(name.to_string(), var);
        Ok(())
    }

    /// Modify attributes of an existing variable, or create it unset.
    pub fn with_var<F>(&mut self, name: &str, f: F) -> Result<(), ShellError>
    where
        F: FnOnce(&mut Variable),
    {
        let idx = self.owning_frame(name).unwrap_or(0);
        let frame = &mut self.frames[idx];
        let var = frame
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::scalar(""));
        f(var);
        Ok(())
    }

    /// `unset`: at global scope the variable disappears; inside a
    /// function a tombstone shadows whatever the outer scopes define.
    pub fn unset(&mut self, name: &str) -> Result<(), ShellError> {
        if let Some(var) = self.get(name) {
            if var.is_readonly() {
                return Err(ShellError::Readonly(name.to_string()));
            }
        }
        if self.frames.len() == 1 {
            self.frames[0].vars.remove(name);
        } else {
            let last = self.frames.last_mut().expect("stack never empty");
            last.vars.insert(
                name.to_string(),
                Variable { value: VarValue::Tombstone, attrs: VarAttrs::empty() },
            );
        }
        Ok(())
    }

    /// All visible names with a given prefix, sorted. For `${!prefix*}`.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .visible_names()
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect();
        names.sort();
        names
    }

    /// Every visible (non-tombstoned) name.
    pub fn visible_names(&self) -> Vec<String> {
        let mut seen: HashMap<&str, bool> = HashMap::new();
        for frame in self.frames.iter().rev() {
            for (name, var) in &frame.vars {
                seen.entry(name).or_insert_with(|| !var.is_tombstone());
            }
        }
        seen.into_iter().filter(|&(_, visible)| visible).map(|(n, _)| n.to_string()).collect()
    }

    /// `NAME=value` strings for the environment of an exec'd child.
    pub fn environment(&self) -> Vec<String> {
        let mut env = Vec::new();
        for name in self.visible_names() {
            if let Some(var) = self.get(&name) {
                if var.is_exported() {
                    if let Some(value) = var.as_display_scalar() {
                        env.push(format!("{}={}", name, value));
                    }
                }
            }
        }
        env.sort();
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_set_and_get() {
        let mut s = ScopeStack::new();
        s.set("x", "1".into()).expect("set");
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("1"));
    }

    #[test]
    fn assignment_in_function_writes_outer_var() {
        let mut s = ScopeStack::new();
        s.set("x", "global".into()).expect("set");
        s.push_frame();
        s.set("x", "changed".into()).expect("set");
        s.pop_frame();
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("changed"));
    }

    #[test]
    fn local_shadows_and_pops() {
        let mut s = ScopeStack::new();
        s.set("x", "global".into()).expect("set");
        s.push_frame();
        s.set_local("x", Variable::scalar("local")).expect("local");
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("local"));
        s.pop_frame();
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("global"));
    }

    #[test]
    fn new_var_in_function_lands_in_global() {
        let mut s = ScopeStack::new();
        s.push_frame();
        s.set("fresh", "v".into()).expect("set");
        s.pop_frame();
        assert_eq!(s.get("fresh").and_then(|v| v.as_display_scalar()), Some("v"));
    }

    #[test]
    fn tombstone_shadows_outer() {
        let mut s = ScopeStack::new();
        s.set("x", "global".into()).expect("set");
        s.push_frame();
        s.unset("x").expect("unset");
        assert!(s.get("x").is_none());
        s.pop_frame();
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("global"));
    }

    #[test]
    fn unset_at_global_removes() {
        let mut s = ScopeStack::new();
        s.set("x", "1".into()).expect("set");
        s.unset("x").expect("unset");
        assert!(s.get("x").is_none());
        // Can be set again afterwards.
        s.set("x", "2".into()).expect("set");
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("2"));
    }

    #[test]
    fn readonly_refuses_assignment() {
        let mut s = ScopeStack::new();
        s.set("x", "1".into()).expect("set");
        s.with_var("x", |v| v.attrs.insert(VarAttrs::READONLY)).expect("attr");
        assert!(matches!(s.set("x", "2".into()), Err(ShellError::Readonly(_))));
        assert!(matches!(s.unset("x"), Err(ShellError::Readonly(_))));
    }

    #[test]
    fn uppercase_attr_transforms_on_assignment() {
        let mut s = ScopeStack::new();
        s.set("x", "".into()).expect("set");
        s.with_var("x", |v| v.attrs.insert(VarAttrs::UPPERCASE)).expect("attr");
        s.set("x", "hello".into()).expect("set");
        assert_eq!(s.get("x").and_then(|v| v.as_display_scalar()), Some("HELLO"));
    }

    #[test]
    fn environment_lists_exports_only() {
        let mut s = ScopeStack::new();
        s.set_var("PATH", Variable::exported("/bin")).expect("set");
        s.set("secret", "x".into()).expect("set");
        assert_eq!(s.environment(), vec!["PATH=/bin".to_string()]);
    }

    #[test]
    fn indexed_array_display_scalar_is_element_zero() {
        let mut map = BTreeMap::new();
        map.insert(0, "first".to_string());
        map.insert(5, "sparse".to_string());
        let var = Variable { value: VarValue::Indexed(map), attrs: VarAttrs::empty() };
        assert_eq!(var.as_display_scalar(), Some("first"));
    }

    #[test]
    fn names_with_prefix_sorted() {
        let mut s = ScopeStack::new();
        s.set("PS1", "$ ".into()).expect("set");
        s.set("PS2", "> ".into()).expect("set");
        s.set("PATH", "/bin".into()).expect("set");
        assert_eq!(s.names_with_prefix("PS"), vec!["PS1".to_string(), "PS2".to_string()]);
    }
}
