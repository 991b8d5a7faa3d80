//! Trap table.
//!
//! Maps signals and the EXIT/DEBUG/ERR/RETURN pseudo-conditions to
//! handler command strings. Handlers never run inside signal-handler
//! context: signals arrive through the self-pipe, get queued here, and
//! the executor runs the queue between commands.

use std::collections::HashMap;

use crate::system::signals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapCondition {
    Signal(i32),
    Exit,
    Debug,
    Err,
    Return,
}

impl TrapCondition {
    /// Parse a `trap` argument: name, `SIG`-prefixed name, or number.
    pub fn parse(spec: &str) -> Option<Self> {
        let upper = spec.to_ascii_uppercase();
        match upper.as_str() {
            "EXIT" | "0" => return Some(Self::Exit),
            "DEBUG" => return Some(Self::Debug),
            "ERR" => return Some(Self::Err),
            "RETURN" => return Some(Self::Return),
            _ => {}
        }
        signals::parse_signal(spec).map(Self::Signal)
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Signal(n) => signals::signal_name(*n),
            Self::Exit => "EXIT".into(),
            Self::Debug => "DEBUG".into(),
            Self::Err => "ERR".into(),
            Self::Return => "RETURN".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapAction {
    Default,
    Ignore,
    Command(String),
}

#[derive(Debug, Default)]
pub struct TrapTable {
    actions: HashMap<TrapCondition, TrapAction>,
    /// Signals seen on the self-pipe whose trap commands are waiting to
    /// run at the next safe point.
    pending: Vec<i32>,
}

impl TrapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, condition: TrapCondition, action: TrapAction) {
        match action {
            TrapAction::Default => {
                self.actions.remove(&condition);
            }
            other => {
                self.actions.insert(condition, other);
            }
        }
    }

    pub fn get(&self, condition: TrapCondition) -> &TrapAction {
        self.actions.get(&condition).unwrap_or(&TrapAction::Default)
    }

    /// Command string to run for a condition, if one is set.
    pub fn command_for(&self, condition: TrapCondition) -> Option<String> {
        match self.actions.get(&condition) {
            Some(TrapAction::Command(cmd)) => Some(cmd.clone()),
            _ => None,
        }
    }

    pub fn is_ignored(&self, signal: i32) -> bool {
        matches!(self.actions.get(&TrapCondition::Signal(signal)), Some(TrapAction::Ignore))
    }

    /// Queue a delivered signal for trap execution.
    pub fn note_signal(&mut self, signal: i32) {
        if self.command_for(TrapCondition::Signal(signal)).is_some() {
            self.pending.push(signal);
        }
    }

    /// Take the queued signals, oldest first.
    pub fn take_pending(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.pending)
    }

    /// Entering a subshell: traps reset to default, except that ignored
    /// signals stay ignored.
    pub fn reset_for_subshell(&mut self) {
        self.actions.retain(|cond, action| {
            matches!(cond, TrapCondition::Signal(_)) && *action == TrapAction::Ignore
        });
        self.pending.clear();
    }

    /// Lines for `trap` with no arguments, in a stable order.
    pub fn listing(&self) -> Vec<String> {
        let mut entries: Vec<(String, &TrapAction)> = self
            .actions
            .iter()
            .map(|(c, a)| (c.display_name(), a))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(name, action)| match action {
                TrapAction::Ignore => format!("trap -- '' {}", name),
                TrapAction::Command(cmd) => format!("trap -- '{}' {}", cmd.replace('\'', "'\\''"), name),
                TrapAction::Default => unreachable!("defaults are not stored"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_conditions() {
        assert_eq!(TrapCondition::parse("EXIT"), Some(TrapCondition::Exit));
        assert_eq!(TrapCondition::parse("0"), Some(TrapCondition::Exit));
        assert_eq!(TrapCondition::parse("INT"), Some(TrapCondition::Signal(libc::SIGINT)));
        assert_eq!(TrapCondition::parse("SIGTERM"), Some(TrapCondition::Signal(libc::SIGTERM)));
        assert_eq!(TrapCondition::parse("15"), Some(TrapCondition::Signal(libc::SIGTERM)));
        assert_eq!(TrapCondition::parse("debug"), Some(TrapCondition::Debug));
        assert_eq!(TrapCondition::parse("BOGUS"), None);
    }

    #[test]
    fn set_default_removes_entry() {
        let mut t = TrapTable::new();
        t.set(TrapCondition::Exit, TrapAction::Command("echo bye".into()));
        assert!(t.command_for(TrapCondition::Exit).is_some());
        t.set(TrapCondition::Exit, TrapAction::Default);
        assert!(t.command_for(TrapCondition::Exit).is_none());
    }

    #[test]
    fn pending_queue_only_for_trapped_signals() {
        let mut t = TrapTable::new();
        t.set(TrapCondition::Signal(libc::SIGUSR1), TrapAction::Command("echo usr1".into()));
        t.note_signal(libc::SIGUSR1);
        t.note_signal(libc::SIGUSR2);
        assert_eq!(t.take_pending(), vec![libc::SIGUSR1]);
        assert!(t.take_pending().is_empty());
    }

    #[test]
    fn subshell_reset_keeps_ignored() {
        let mut t = TrapTable::new();
        t.set(TrapCondition::Signal(libc::SIGINT), TrapAction::Ignore);
        t.set(TrapCondition::Signal(libc::SIGTERM), TrapAction::Command("cleanup".into()));
        t.set(TrapCondition::Exit, TrapAction::Command("bye".into()));
        t.reset_for_subshell();
        assert!(t.is_ignored(libc::SIGINT));
        assert!(t.command_for(TrapCondition::Signal(libc::SIGTERM)).is_none());
        assert!(t.command_for(TrapCondition::Exit).is_none());
    }

    #[test]
    fn listing_format() {
        let mut t = TrapTable::new();
        t.set(TrapCondition::Signal(libc::SIGINT), TrapAction::Command("echo int".into()));
        let lines = t.listing();
        assert_eq!(lines, vec!["trap -- 'echo int' SIGINT"]);
    }
}
