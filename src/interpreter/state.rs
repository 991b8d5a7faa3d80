//! Composed shell state.
//!
//! One value owns everything the executor and expander consult: the
//! scope stack, options, functions, aliases, traps, the job table, the
//! signal manager and the terminal. Subshell children fork with a clone
//! of the in-memory parts and reset what POSIX says resets.

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::FunctionDefNode;
use crate::interpreter::errors::ShellError;
use crate::interpreter::options::{ShellOptions, ShoptOptions};
use crate::interpreter::vars::{ScopeStack, VarAttrs, Variable, VarValue};
use crate::system::jobs::JobTable;
use crate::system::signals::SignalManager;
use crate::system::terminal::Terminal;
use crate::system::traps::TrapTable;

pub struct ShellState {
    pub scopes: ScopeStack,
    pub options: ShellOptions,
    pub shopt: ShoptOptions,
    pub functions: HashMap<String, FunctionDefNode>,
    pub aliases: HashMap<String, String>,
    pub traps: TrapTable,
    pub jobs: JobTable,
    /// None in a forked child after exec preparation, and in unit tests.
    pub signals: Option<SignalManager>,
    pub terminal: Terminal,

    /// `$1..$N`. Function calls shadow this, saving and restoring.
    pub positional: Vec<String>,
    /// `$0`.
    pub script_name: String,
    /// `$?`.
    pub last_status: i32,
    /// `$_`.
    pub last_arg: String,
    /// `$LINENO`.
    pub current_line: usize,
    /// `FUNCNAME` stack, innermost first.
    pub func_names: Vec<String>,
    pub loop_depth: u32,
    pub call_depth: u32,
    /// Inside `source`/`.`, where `return` is legal.
    pub in_sourced_file: bool,
    pub interactive: bool,
    /// Set in forked subshell children; changes job-control behaviour.
    pub is_subshell: bool,
    /// This process is already a forked pipeline member: external
    /// commands exec in place instead of forking again.
    pub exec_in_place: bool,
    /// True while evaluating an `if`/`while`/`until` condition or the
    /// left side of `&&`/`||` (errexit is suspended there).
    pub in_condition: bool,

    /// `$$`: the main shell's pid, inherited across subshells.
    pub shell_pid: i32,

    started: Instant,
    seconds_offset: i64,
    rng: Option<StdRng>,
}

impl ShellState {
    /// Build the initial state from the process environment.
    pub fn new(interactive: bool) -> Self {
        let mut scopes = ScopeStack::new();
        for (name, value) in std::env::vars() {
            let _ = scopes.set_var(&name, Variable::exported(value));
        }
        if scopes.get("PATH").is_none() {
            let _ = scopes.set_var("PATH", Variable::exported("/usr/bin:/bin"));
        }
        if scopes.get("IFS").is_none() {
            let _ = scopes.set("IFS", " \t\n".into());
        }
        if scopes.get("PS1").is_none() {
            let _ = scopes.set("PS1", "psh$ ".into());
        }
        if scopes.get("PS2").is_none() {
            let _ = scopes.set("PS2", "> ".into());
        }
        if scopes.get("PS4").is_none() {
            let _ = scopes.set("PS4", "+ ".into());
        }
        if let Ok(pwd) = std::env::current_dir() {
            let _ = scopes.set_var("PWD", Variable::exported(pwd.to_string_lossy().into_owned()));
        }

        Self {
            scopes,
            options: ShellOptions::default(),
            shopt: ShoptOptions::default(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            traps: TrapTable::new(),
            jobs: JobTable::new(),
            signals: None,
            terminal: Terminal::detect(),
            positional: Vec::new(),
            script_name: "psh".into(),
            last_status: 0,
            last_arg: String::new(),
            current_line: 0,
            func_names: Vec::new(),
            loop_depth: 0,
            call_depth: 0,
            in_sourced_file: false,
            interactive,
            is_subshell: false,
            exec_in_place: false,
            in_condition: false,
            shell_pid: std::process::id() as i32,
            started: Instant::now(),
            seconds_offset: 0,
            rng: None,
        }
    }

    // =========================================================================
    // VARIABLE ACCESS
    // =========================================================================

    /// The string value a `$name` reference produces, special parameters
    /// included. `None` means unset.
    pub fn lookup(&mut self, name: &str) -> Option<String> {
        if let Some(special) = self.special_var(name) {
            return Some(special);
        }
        self.scopes.get(name).and_then(|v| v.as_display_scalar().map(str::to_string))
    }

    /// Special parameters and dynamic variables, computed at read time.
    fn special_var(&mut self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "$" => Some(self.shell_pid.to_string()),
            "!" => self.jobs.last_async_pid().map(|p| p.as_raw().to_string()),
            "#" => Some(self.positional.len().to_string()),
            "0" => Some(self.script_name.clone()),
            "-" => Some(self.options.flag_string(self.interactive)),
            "_" => Some(self.last_arg.clone()),
            "*" | "@" => Some(self.positional.join(" ")),
            "LINENO" => Some(self.current_line.to_string()),
            "RANDOM" => Some(self.next_random().to_string()),
            "SECONDS" => {
                let elapsed = self.started.elapsed().as_secs() as i64;
                Some((elapsed + self.seconds_offset).to_string())
            }
            "BASHPID" => Some((std::process::id() as i32).to_string()),
            "FUNCNAME" => self.func_names.first().cloned(),
            _ if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) => {
                let n: usize = name.parse().ok()?;
                if n == 0 {
                    Some(self.script_name.clone())
                } else {
                    self.positional.get(n - 1).cloned()
                }
            }
            _ => None,
        }
    }

    fn next_random(&mut self) -> u16 {
        match &mut self.rng {
            Some(rng) => rng.gen_range(0..32768u32) as u16,
            None => rand::thread_rng().gen_range(0..32768u32) as u16,
        }
    }

    /// Positional parameter by index (1-based).
    pub fn positional_at(&self, n: usize) -> Option<&str> {
        self.positional.get(n.checked_sub(1)?).map(String::as_str)
    }

    /// Scalar assignment with attribute handling (case transforms are in
    /// the scope layer; dynamic variables intercepted here).
    pub fn assign(&mut self, name: &str, value: String) -> Result<(), ShellError> {
        match name {
            "SECONDS" => {
                let v = value.parse::<i64>().unwrap_or(0);
                self.seconds_offset = v - self.started.elapsed().as_secs() as i64;
                return Ok(());
            }
            "RANDOM" => {
                let seed = value.parse::<u64>().unwrap_or(0);
                self.rng = Some(StdRng::seed_from_u64(seed));
                return Ok(());
            }
            _ => {}
        }
        self.scopes.set(name, value)?;
        if self.options.allexport {
            let _ = self.scopes.with_var(name, |v| v.attrs.insert(VarAttrs::EXPORT));
        }
        Ok(())
    }

    /// `$IFS` with the POSIX default when unset.
    pub fn ifs(&self) -> String {
        match self.scopes.get("IFS") {
            Some(var) => var.as_display_scalar().unwrap_or("").to_string(),
            None => " \t\n".to_string(),
        }
    }

    pub fn path_var(&self) -> String {
        self.scopes
            .get("PATH")
            .and_then(|v| v.as_display_scalar().map(str::to_string))
            .unwrap_or_default()
    }

    /// Environment strings for an exec'd child.
    pub fn child_environment(&self) -> Vec<String> {
        self.scopes.environment()
    }

    /// Whether `name` names a set variable (for `[[ -v name ]]` and
    /// `test -v`).
    pub fn is_set(&mut self, name: &str) -> bool {
        if let Some(base) = name.strip_suffix("]").and_then(|s| s.split_once('[')) {
            let (arr, idx) = base;
            return match self.scopes.get(arr).map(|v| &v.value) {
                Some(VarValue::Indexed(map)) => {
                    idx.parse::<i64>().ok().map_or(false, |i| map.contains_key(&i))
                }
                Some(VarValue::Assoc(map)) => map.contains_key(idx),
                _ => false,
            };
        }
        self.lookup(name).is_some()
    }

    // =========================================================================
    // SUBSHELL PREPARATION
    // =========================================================================

    /// Called in a freshly forked child that will run shell code:
    /// traps reset, job table cleared, interactive handlers dropped.
    pub fn enter_subshell(&mut self) {
        self.is_subshell = true;
        self.interactive = false;
        self.traps.reset_for_subshell();
        self.jobs = JobTable::new();
        self.signals = None;
        crate::system::signals::reset_for_child();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ShellState {
        ShellState::new(false)
    }

    #[test]
    fn question_mark_reflects_last_status() {
        let mut s = state();
        s.last_status = 42;
        assert_eq!(s.lookup("?"), Some("42".into()));
    }

    #[test]
    fn positional_parameters() {
        let mut s = state();
        s.positional = vec!["one".into(), "two".into()];
        assert_eq!(s.lookup("1"), Some("one".into()));
        assert_eq!(s.lookup("2"), Some("two".into()));
        assert_eq!(s.lookup("3"), None);
        assert_eq!(s.lookup("#"), Some("2".into()));
    }

    #[test]
    fn random_is_seedable() {
        let mut s = state();
        s.assign("RANDOM", "7".into()).expect("assign");
        let a = s.lookup("RANDOM").expect("random");
        s.assign("RANDOM", "7".into()).expect("assign");
        let b = s.lookup("RANDOM").expect("random");
        assert_eq!(a, b);
    }

    #[test]
    fn seconds_assignment_offsets() {
        let mut s = state();
        s.assign("SECONDS", "100".into()).expect("assign");
        let v: i64 = s.lookup("SECONDS").expect("seconds").parse().expect("number");
        assert!((100..=102).contains(&v));
    }

    #[test]
    fn ifs_default() {
        let mut s = state();
        s.scopes.unset("IFS").expect("unset");
        assert_eq!(s.ifs(), " \t\n");
    }

    #[test]
    fn allexport_marks_new_vars() {
        let mut s = state();
        s.options.allexport = true;
        s.assign("NEWVAR", "x".into()).expect("assign");
        assert!(s.scopes.get("NEWVAR").map_or(false, |v| v.is_exported()));
    }

    #[test]
    fn subshell_reset() {
        let mut s = state();
        s.traps.set(
            crate::system::traps::TrapCondition::Exit,
            crate::system::traps::TrapAction::Command("echo bye".into()),
        );
        s.enter_subshell();
        assert!(s.is_subshell);
        assert!(s
            .traps
            .command_for(crate::system::traps::TrapCondition::Exit)
            .is_none());
    }
}
