//! The executor.
//!
//! A visitor over the Command AST. Exit statuses flow back as `Ok`;
//! `break`/`continue`/`return`/`exit` and runtime errors unwind through
//! `Err(ControlFlow)` and are caught at the frame that owns them.

use std::collections::HashSet;

use crate::ast::{
    CaseNode, CaseTerminator, CommandNode, CompoundCommandNode, ScriptNode, SelectNode,
    SimpleCommandNode, StatementNode, StatementOperator, WordNode,
};
use crate::interpreter::arithmetic;
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::state::ShellState;
use crate::interpreter::vars::{Variable, VarValue};
use crate::system::process;
use crate::system::traps::TrapCondition;

pub struct Interpreter {
    pub state: ShellState,
    /// Alias names currently being expanded, to stop recursion.
    pub(crate) expanding_aliases: HashSet<String>,
    /// Process-substitution fds owned by the command being executed.
    pub(crate) held_fds: Vec<i32>,
    /// A trap body is running; DEBUG/ERR/signal traps stay quiet inside.
    pub(crate) in_trap: bool,
}

impl Interpreter {
    pub fn new(interactive: bool) -> Self {
        Self::with_state(ShellState::new(interactive))
    }

    pub fn with_state(state: ShellState) -> Self {
        Self { state, expanding_aliases: HashSet::new(), held_fds: Vec::new(), in_trap: false }
    }

    // =========================================================================
    // TOP LEVEL
    // =========================================================================

    /// Run a whole script node; the result is the last statement's status.
    pub fn run_script(&mut self, script: &ScriptNode) -> ExecResult {
        self.run_statements(&script.statements)
    }

    pub fn run_statements(&mut self, statements: &[StatementNode]) -> ExecResult {
        let mut status = self.state.last_status;
        for statement in statements {
            status = self.execute_statement(statement)?;
        }
        Ok(status)
    }

    /// Between-command housekeeping: drain the signal pipe, reap
    /// children into the job table, queue traps.
    pub fn poll_signals(&mut self) {
        let signals = match &self.state.signals {
            Some(manager) => manager.drain(),
            None => Vec::new(),
        };
        let mut saw_chld = signals.is_empty();
        for signal in signals {
            if signal == libc::SIGCHLD {
                saw_chld = true;
            } else {
                self.state.traps.note_signal(signal);
            }
        }
        if saw_chld {
            while let Ok(Some((pid, state))) = process::try_wait_any() {
                self.state.jobs.update_process(pid, state);
            }
        }
    }

    /// Run queued signal traps. Called between commands, never from
    /// handler context.
    pub fn run_pending_traps(&mut self) -> ExecResult<()> {
        for signal in self.state.traps.take_pending() {
            if let Some(command) = self.state.traps.command_for(TrapCondition::Signal(signal)) {
                self.run_trap_command(&command)?;
            }
        }
        Ok(())
    }

    /// Parse and run a trap body, preserving `$?`. Traps do not nest.
    pub(crate) fn run_trap_command(&mut self, command: &str) -> ExecResult<()> {
        if self.in_trap {
            return Ok(());
        }
        let saved_status = self.state.last_status;
        self.in_trap = true;
        let mut parser = self.new_parser();
        let result = match parser.parse(command) {
            Ok(script) => self.run_script(&script).map(|_| ()),
            Err(_) => Ok(()),
        };
        self.in_trap = false;
        self.state.last_status = saved_status;
        result
    }

    pub(crate) fn new_parser(&self) -> crate::parser::Parser {
        crate::parser::Parser::with_options(crate::parser::LexerOptions {
            extglob: true,
            posix_mode: self.state.options.posix,
            recovery_mode: false,
        })
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    pub(crate) fn execute_statement(&mut self, statement: &StatementNode) -> ExecResult {
        self.poll_signals();
        self.run_pending_traps()?;
        self.report_job_changes();

        if statement.background {
            return self.execute_background_statement(statement);
        }

        let mut status = 0;
        let mut skip = false;
        for (i, pipeline) in statement.pipelines.iter().enumerate() {
            if skip {
                skip = false;
                // Chain skipping: && after failure skips one pipeline,
                // then the next operator re-decides.
            } else {
                let is_last = i + 1 == statement.pipelines.len();
                let was_condition = self.state.in_condition;
                if !is_last {
                    self.state.in_condition = true;
                }
                let result = self.execute_pipeline_node(pipeline);
                self.state.in_condition = was_condition;
                status = result?;
                self.state.last_status = status;
            }
            if let Some(op) = statement.operators.get(i) {
                let skip_next = match op {
                    StatementOperator::And => status != 0,
                    StatementOperator::Or => status == 0,
                    StatementOperator::Semi => false,
                };
                if skip_next {
                    skip = true;
                }
            }
        }
        self.state.last_status = status;
        self.maybe_errexit(status, statement)?;
        Ok(status)
    }

    fn maybe_errexit(&mut self, status: i32, statement: &StatementNode) -> ExecResult<()> {
        if status == 0 || !self.state.options.errexit || self.state.in_condition {
            return Ok(());
        }
        if statement.pipelines.last().map_or(false, |p| p.negated) {
            return Ok(());
        }
        if let Some(command) = self.state.traps.command_for(TrapCondition::Err) {
            self.run_trap_command(&command)?;
        }
        Err(ControlFlow::Exit(status))
    }

    /// Print finished/stopped background job notices, interactive only.
    fn report_job_changes(&mut self) {
        if !self.state.interactive {
            // Still reap done jobs so the table does not grow.
            self.state.jobs.reap_done();
            return;
        }
        for (id, state, command, status) in self.state.jobs.unnotified() {
            let marker = self.state.jobs.marker(id);
            let detail = if status != 0 && state == crate::system::jobs::JobState::Done {
                format!("Exit {}", status)
            } else {
                state.to_string()
            };
            let line = format!("[{}]{} {:<24}{}\n", id, marker, detail, command);
            let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
        }
        self.state.jobs.reap_done();
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    pub(crate) fn execute_command(&mut self, command: &CommandNode) -> ExecResult {
        match command {
            CommandNode::Simple(simple) => self.execute_simple(simple),
            CommandNode::Compound(compound) => self.execute_compound(compound),
            CommandNode::FunctionDef(def) => {
                self.state.functions.insert(def.name.clone(), def.clone());
                Ok(0)
            }
        }
    }

    pub(crate) fn execute_compound(&mut self, compound: &CompoundCommandNode) -> ExecResult {
        let redirects = compound.redirections();
        let guard = self.apply_redirects_saved(redirects)?;
        let result = self.execute_compound_inner(compound);
        self.restore_redirects(guard);
        result
    }

    fn execute_compound_inner(&mut self, compound: &CompoundCommandNode) -> ExecResult {
        match compound {
            CompoundCommandNode::If(node) => {
                for clause in &node.clauses {
                    if self.eval_condition(&clause.condition)? == 0 {
                        return self.run_statements(&clause.body);
                    }
                }
                match &node.else_body {
                    Some(body) => self.run_statements(body),
                    None => Ok(0),
                }
            }

            CompoundCommandNode::While(node) => {
                self.run_loop(|interp| Ok(interp.eval_condition(&node.condition)? == 0), &node.body)
            }
            CompoundCommandNode::Until(node) => {
                self.run_loop(|interp| Ok(interp.eval_condition(&node.condition)? != 0), &node.body)
            }

            CompoundCommandNode::For(node) => {
                let words = match &node.words {
                    Some(words) => self.expand_words(words)?,
                    None => self.state.positional.clone(),
                };
                self.state.loop_depth += 1;
                let mut status = 0;
                let mut result: ExecResult<()> = Ok(());
                'outer: for word in words {
                    if let Err(e) = self.state.assign(&node.variable, word) {
                        result = Err(e.into());
                        break;
                    }
                    match self.run_statements(&node.body) {
                        Ok(s) => status = s,
                        Err(ControlFlow::Break(n)) => {
                            if n > 1 {
                                result = Err(ControlFlow::Break(n - 1));
                            }
                            break 'outer;
                        }
                        Err(ControlFlow::Continue(n)) => {
                            if n > 1 {
                                result = Err(ControlFlow::Continue(n - 1));
                                break 'outer;
                            }
                        }
                        Err(other) => {
                            result = Err(other);
                            break 'outer;
                        }
                    }
                }
                self.state.loop_depth -= 1;
                result?;
                Ok(status)
            }

            CompoundCommandNode::CStyleFor(node) => {
                if let Some(init) = &node.init {
                    self.eval_arith_text(init)?;
                }
                self.state.loop_depth += 1;
                let mut status = 0;
                let result: ExecResult<()> = (|| {
                    loop {
                        if let Some(cond) = &node.condition {
                            if self.eval_arith_text(cond)? == 0 {
                                break;
                            }
                        }
                        match self.run_statements(&node.body) {
                            Ok(s) => status = s,
                            Err(ControlFlow::Break(n)) => {
                                if n > 1 {
                                    return Err(ControlFlow::Break(n - 1));
                                }
                                break;
                            }
                            Err(ControlFlow::Continue(n)) => {
                                if n > 1 {
                                    return Err(ControlFlow::Continue(n - 1));
                                }
                            }
                            Err(other) => return Err(other),
                        }
                        if let Some(update) = &node.update {
                            self.eval_arith_text(update)?;
                        }
                    }
                    Ok(())
                })();
                self.state.loop_depth -= 1;
                result?;
                Ok(status)
            }

            CompoundCommandNode::Case(node) => self.execute_case(node),
            CompoundCommandNode::Select(node) => self.execute_select(node),

            CompoundCommandNode::Group(node) => self.run_statements(&node.body),
            CompoundCommandNode::Subshell(node) => self.execute_subshell(&node.body),

            CompoundCommandNode::Arithmetic(node) => {
                self.state.current_line = node.line;
                let value = self.eval_arith_text(&node.expression)?;
                Ok(if value != 0 { 0 } else { 1 })
            }

            CompoundCommandNode::Conditional(node) => {
                self.state.current_line = node.line;
                self.eval_conditional_expression(&node.expression)
            }
        }
    }

    /// Shared while/until driver; `test` says whether to run the body.
    fn run_loop<F>(&mut self, mut test: F, body: &[StatementNode]) -> ExecResult
    where
        F: FnMut(&mut Self) -> ExecResult<bool>,
    {
        self.state.loop_depth += 1;
        let mut status = 0;
        let result: ExecResult<()> = (|| {
            loop {
                if !test(self)? {
                    break;
                }
                match self.run_statements(body) {
                    Ok(s) => status = s,
                    Err(ControlFlow::Break(n)) => {
                        if n > 1 {
                            return Err(ControlFlow::Break(n - 1));
                        }
                        break;
                    }
                    Err(ControlFlow::Continue(n)) => {
                        if n > 1 {
                            return Err(ControlFlow::Continue(n - 1));
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        })();
        self.state.loop_depth -= 1;
        result?;
        Ok(status)
    }

    /// Condition lists run with errexit suspended.
    pub(crate) fn eval_condition(&mut self, condition: &[StatementNode]) -> ExecResult {
        let saved = self.state.in_condition;
        self.state.in_condition = true;
        let result = self.run_statements(condition);
        self.state.in_condition = saved;
        result
    }

    fn execute_case(&mut self, node: &CaseNode) -> ExecResult {
        let subject = self.expand_word_single(&node.word)?;
        let extglob_on = self.state.shopt.extglob;
        let nocase = self.state.shopt.nocasematch;

        let mut status = 0;
        let mut fall_through = false;
        for item in &node.items {
            let mut matched = fall_through;
            if !matched {
                for pattern_word in &item.patterns {
                    let pattern = self.expand_word_pattern(pattern_word)?;
                    if crate::interpreter::expansion::pattern::pattern_matches(
                        &pattern, &subject, extglob_on, nocase,
                    ) {
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                continue;
            }
            status = self.run_statements(&item.body)?;
            match item.terminator {
                CaseTerminator::Break => return Ok(status),
                CaseTerminator::FallThrough => {
                    fall_through = true;
                    continue;
                }
                CaseTerminator::Continue => {
                    fall_through = false;
                    continue;
                }
            }
        }
        Ok(status)
    }

    /// `select`: print the menu on stderr, read a reply, loop until EOF
    /// or `break`.
    fn execute_select(&mut self, node: &SelectNode) -> ExecResult {
        let words = match &node.words {
            Some(words) => self.expand_words(words)?,
            None => self.state.positional.clone(),
        };
        if words.is_empty() {
            return Ok(0);
        }

        self.state.loop_depth += 1;
        let mut status = 0;
        let result: ExecResult<()> = (|| {
            loop {
                for (i, word) in words.iter().enumerate() {
                    let line = format!("{}) {}\n", i + 1, word);
                    let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
                }
                let ps3 = self
                    .state
                    .lookup("PS3")
                    .unwrap_or_else(|| "#? ".to_string());
                let _ = process::write_all(libc::STDERR_FILENO, ps3.as_bytes());

                let reply = match read_line_fd(libc::STDIN_FILENO) {
                    Some(line) => line,
                    None => break, // EOF ends the loop
                };
                let reply = reply.trim().to_string();
                self.state.assign("REPLY", reply.clone()).map_err(ControlFlow::from)?;
                let chosen = reply
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| words.get(n.checked_sub(1)?))
                    .cloned()
                    .unwrap_or_default();
                self.state.assign(&node.variable, chosen).map_err(ControlFlow::from)?;

                match self.run_statements(&node.body) {
                    Ok(s) => status = s,
                    Err(ControlFlow::Break(n)) => {
                        if n > 1 {
                            return Err(ControlFlow::Break(n - 1));
                        }
                        break;
                    }
                    Err(ControlFlow::Continue(n)) => {
                        if n > 1 {
                            return Err(ControlFlow::Continue(n - 1));
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        })();
        self.state.loop_depth -= 1;
        result?;
        Ok(status)
    }

    // =========================================================================
    // SIMPLE COMMANDS
    // =========================================================================

    pub(crate) fn execute_simple(&mut self, command: &SimpleCommandNode) -> ExecResult {
        self.state.current_line = command.line;

        if !self.in_trap {
            if let Some(debug_cmd) = self.state.traps.command_for(TrapCondition::Debug) {
                self.run_trap_command(&debug_cmd)?;
            }
        }
        if self.state.options.noexec {
            return Ok(0);
        }

        // Assignment-only command line.
        if command.name.is_none() {
            let guard = self.apply_redirects_saved(&command.redirections)?;
            let result = self.apply_assignments(&command.assignments, false);
            self.restore_redirects(guard);
            result?;
            return Ok(0);
        }

        // Expand command name and arguments.
        let mut words: Vec<&WordNode> = Vec::with_capacity(command.args.len() + 1);
        if let Some(name) = &command.name {
            words.push(name);
        }
        words.extend(command.args.iter());
        let argv = match self.expand_word_list(&words) {
            Ok(argv) => argv,
            Err(e) => {
                self.release_held_fds();
                return Err(e);
            }
        };

        if argv.is_empty() {
            // Everything expanded away: apply assignments and be done.
            self.release_held_fds();
            self.apply_assignments(&command.assignments, false)?;
            return Ok(0);
        }

        if self.state.options.xtrace {
            let ps4 = self.state.lookup("PS4").unwrap_or_else(|| "+ ".to_string());
            let line = format!("{}{}\n", ps4, argv.join(" "));
            let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
        }

        let result = self.dispatch_command(command, argv);
        self.release_held_fds();
        let status = result?;
        self.state.last_status = status;
        Ok(status)
    }

    fn dispatch_command(
        &mut self,
        command: &SimpleCommandNode,
        argv: Vec<String>,
    ) -> ExecResult {
        let name = argv[0].clone();
        self.state.last_arg = argv.last().cloned().unwrap_or_default();

        // Alias expansion (executor-level, recursion-guarded).
        if self.state.shopt.expand_aliases
            && !self.expanding_aliases.contains(&name)
        {
            if let Some(value) = self.state.aliases.get(&name).cloned() {
                return self.run_alias(command, &name, &value, &argv[1..]);
            }
        }

        // Functions shadow builtins; builtins shadow PATH.
        if self.state.functions.contains_key(&name) {
            let def = self.state.functions[&name].clone();
            let guard = self.apply_redirects_saved(&command.redirections)?;
            let result = self.call_function(&def, &argv[1..], &command.assignments);
            self.restore_redirects(guard);
            return result;
        }

        if let Some(builtin) = crate::interpreter::builtins::lookup(&name) {
            // Redirects on `exec` outlive the builtin.
            if name == "exec" {
                self.apply_redirects_in_child(&command.redirections)?;
                self.apply_assignments(&command.assignments, false)?;
                return (builtin.run)(self, &argv);
            }
            let guard = self.apply_redirects_saved(&command.redirections)?;
            let assignment_guard =
                self.apply_prefix_assignments_for_builtin(&command.assignments, builtin.special);
            let result = match assignment_guard {
                Ok(saved) => {
                    let r = (builtin.run)(self, &argv);
                    self.restore_prefix_assignments(saved);
                    r
                }
                Err(e) => Err(e),
            };
            self.restore_redirects(guard);
            return result;
        }

        self.execute_external(command, argv)
    }

    /// Re-parse an alias body and run it with the remaining arguments
    /// appended to its last simple command.
    fn run_alias(
        &mut self,
        original: &SimpleCommandNode,
        name: &str,
        value: &str,
        rest: &[String],
    ) -> ExecResult {
        let mut parser = self.new_parser();
        let script = match parser.parse(value) {
            Ok(script) => script,
            Err(_) => return Err(ShellError::Expansion(format!("bad alias: {}", name)).into()),
        };
        self.expanding_aliases.insert(name.to_string());
        let result = (|| {
            let mut status = 0;
            let count = script.statements.len();
            for (i, statement) in script.statements.iter().enumerate() {
                if i + 1 == count {
                    // Append the original arguments to the final command.
                    let mut amended = statement.clone();
                    if let Some(pipeline) = amended.pipelines.last_mut() {
                        if let Some(CommandNode::Simple(simple)) = pipeline.commands.last_mut() {
                            for arg in rest {
                                simple
                                    .args
                                    .push(crate::ast::Ast::word(vec![crate::ast::Ast::literal(
                                        arg.clone(),
                                    )]));
                            }
                            simple.redirections.extend(original.redirections.iter().cloned());
                        }
                    }
                    status = self.execute_statement(&amended)?;
                } else {
                    status = self.execute_statement(statement)?;
                }
            }
            Ok(status)
        })();
        self.expanding_aliases.remove(name);
        result
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    /// Apply assignment words to the current shell state. `export_them`
    /// marks the variables for the environment (prefix assignments on
    /// external commands).
    pub(crate) fn apply_assignments(
        &mut self,
        assignments: &[crate::ast::AssignmentNode],
        export_them: bool,
    ) -> ExecResult<()> {
        for assignment in assignments {
            self.apply_assignment(assignment, export_them)?;
        }
        Ok(())
    }

    pub(crate) fn apply_assignment(
        &mut self,
        assignment: &crate::ast::AssignmentNode,
        export_it: bool,
    ) -> ExecResult<()> {
        let name = assignment.name.clone();

        // Array initializer: `name=(…)`.
        if let Some(elements) = &assignment.array {
            let is_assoc = matches!(
                self.state.scopes.get(&name).map(|v| &v.value),
                Some(VarValue::Assoc(_))
            );
            if is_assoc {
                let mut map = match (assignment.append, self.state.scopes.get(&name).map(|v| v.value.clone())) {
                    (true, Some(VarValue::Assoc(m))) => m,
                    _ => indexmap::IndexMap::new(),
                };
                for element in elements {
                    let value = self.expand_word_single(&element.value)?;
                    let key = match &element.key {
                        Some(k) => self.expand_text_as_word(k)?,
                        None => {
                            return Err(ShellError::Expansion(format!(
                                "{}: assoc array assignment needs [key]=value",
                                name
                            ))
                            .into())
                        }
                    };
                    map.insert(key, value);
                }
                self.state
                    .scopes
                    .with_var(&name, |v| v.value = VarValue::Assoc(map))
                    .map_err(ControlFlow::from)?;
            } else {
                let mut map = match (assignment.append, self.state.scopes.get(&name).map(|v| v.value.clone())) {
                    (true, Some(VarValue::Indexed(m))) => m,
                    _ => std::collections::BTreeMap::new(),
                };
                let mut next_index = map.keys().next_back().map_or(0, |k| k + 1);
                for element in elements {
                    let values = self.expand_word(&element.value)?;
                    match &element.key {
                        Some(k) => {
                            let index = self.eval_arith_text(k)?;
                            let value = values.join(" ");
                            map.insert(index, value);
                            next_index = index + 1;
                        }
                        None => {
                            for value in values {
                                map.insert(next_index, value);
                                next_index += 1;
                            }
                        }
                    }
                }
                self.state
                    .scopes
                    .with_var(&name, |v| v.value = VarValue::Indexed(map))
                    .map_err(ControlFlow::from)?;
            }
            if export_it {
                let _ = self.state.scopes.with_var(&name, |v| {
                    v.attrs.insert(crate::interpreter::vars::VarAttrs::EXPORT)
                });
            }
            return Ok(());
        }

        let raw_value = match &assignment.value {
            Some(word) => self.expand_word_single(word)?,
            None => String::new(),
        };

        // Element assignment: `name[sub]=value`.
        if let Some(subscript) = &assignment.subscript {
            let is_assoc = matches!(
                self.state.scopes.get(&name).map(|v| &v.value),
                Some(VarValue::Assoc(_))
            );
            if is_assoc {
                let key = self.expand_text_as_word(subscript)?;
                let existing = match self.state.scopes.get(&name).map(|v| &v.value) {
                    Some(VarValue::Assoc(m)) => m.get(&key).cloned(),
                    _ => None,
                };
                let value = if assignment.append {
                    format!("{}{}", existing.unwrap_or_default(), raw_value)
                } else {
                    raw_value
                };
                self.state
                    .scopes
                    .with_var(&name, |v| {
                        if let VarValue::Assoc(map) = &mut v.value {
                            map.insert(key, value);
                        }
                    })
                    .map_err(ControlFlow::from)?;
            } else {
                let index = self.eval_arith_text(subscript)?;
                if self.state.scopes.get(&name).map_or(true, |v| {
                    !matches!(v.value, VarValue::Indexed(_))
                }) {
                    // Auto-promote a scalar to an indexed array.
                    let mut map = std::collections::BTreeMap::new();
                    if let Some(existing) =
                        self.state.scopes.get(&name).and_then(|v| v.as_display_scalar())
                    {
                        if !existing.is_empty() {
                            map.insert(0, existing.to_string());
                        }
                    }
                    self.state
                        .scopes
                        .with_var(&name, |v| v.value = VarValue::Indexed(map))
                        .map_err(ControlFlow::from)?;
                }
                let append = assignment.append;
                let value = raw_value;
                self.state
                    .scopes
                    .with_var(&name, |v| {
                        if let VarValue::Indexed(map) = &mut v.value {
                            if append {
                                let merged =
                                    format!("{}{}", map.get(&index).cloned().unwrap_or_default(), value);
                                map.insert(index, merged);
                            } else {
                                map.insert(index, value);
                            }
                        }
                    })
                    .map_err(ControlFlow::from)?;
            }
            return Ok(());
        }

        // Scalar assignment, with INTEGER and += handling.
        let has_integer = self
            .state
            .scopes
            .get(&name)
            .map_or(false, |v| v.attrs.contains(crate::interpreter::vars::VarAttrs::INTEGER));
        let value = if has_integer {
            self.eval_arith_text(&raw_value)?.to_string()
        } else {
            raw_value
        };
        let value = if assignment.append {
            match self.state.scopes.get(&name).map(|v| v.value.clone()) {
                Some(VarValue::Indexed(_)) => {
                    // `arr+=x` appends to element 0 in bash; treat as
                    // appending a new element instead is wrong.
                    let existing = self
                        .state
                        .scopes
                        .get(&name)
                        .and_then(|v| v.as_display_scalar())
                        .unwrap_or("")
                        .to_string();
                    format!("{}{}", existing, value)
                }
                Some(VarValue::Scalar(s)) => {
                    if has_integer {
                        let base = s.parse::<i64>().unwrap_or(0);
                        let add = value.parse::<i64>().unwrap_or(0);
                        (base + add).to_string()
                    } else {
                        format!("{}{}", s, value)
                    }
                }
                _ => value,
            }
        } else {
            value
        };
        self.state.assign(&name, value).map_err(ControlFlow::from)?;
        if export_it {
            let _ = self
                .state
                .scopes
                .with_var(&name, |v| v.attrs.insert(crate::interpreter::vars::VarAttrs::EXPORT));
        }
        Ok(())
    }

    /// Prefix assignments for a builtin: special builtins keep them,
    /// ordinary builtins see them only for the call.
    fn apply_prefix_assignments_for_builtin(
        &mut self,
        assignments: &[crate::ast::AssignmentNode],
        special: bool,
    ) -> ExecResult<Vec<(String, Option<Variable>)>> {
        if special {
            self.apply_assignments(assignments, false)?;
            return Ok(Vec::new());
        }
        let mut saved = Vec::new();
        for assignment in assignments {
            saved.push((
                assignment.name.clone(),
                self.state.scopes.get(&assignment.name).cloned(),
            ));
        }
        self.apply_assignments(assignments, false)?;
        Ok(saved)
    }

    fn restore_prefix_assignments(&mut self, saved: Vec<(String, Option<Variable>)>) {
        for (name, old) in saved {
            match old {
                Some(var) => {
                    let _ = self.state.scopes.set_var(&name, var);
                }
                None => {
                    let _ = self.state.scopes.unset(&name);
                }
            }
        }
    }

    // =========================================================================
    // ARITHMETIC BRIDGE
    // =========================================================================

    /// Pre-expand `$`-constructs in arithmetic text, then evaluate.
    pub(crate) fn eval_arith_text(&mut self, text: &str) -> ExecResult<i64> {
        let expanded = self.expand_text_as_word(text)?;
        let mut env = ScopeArithEnv { interp: self };
        arithmetic::evaluate(&mut env, &expanded).map_err(ControlFlow::from)
    }

    pub(crate) fn release_held_fds(&mut self) {
        for fd in std::mem::take(&mut self.held_fds) {
            let _ = process::close(fd);
        }
    }
}

/// Arithmetic's view of shell variables.
struct ScopeArithEnv<'a> {
    interp: &'a mut Interpreter,
}

impl<'a> arithmetic::ArithEnv for ScopeArithEnv<'a> {
    fn get_scalar(&mut self, name: &str) -> Option<String> {
        self.interp.state.lookup(name)
    }

    fn set_scalar(&mut self, name: &str, value: &str) -> Result<(), ShellError> {
        self.interp.state.assign(name, value.to_string())
    }

    fn is_assoc(&self, name: &str) -> bool {
        matches!(
            self.interp.state.scopes.get(name).map(|v| &v.value),
            Some(VarValue::Assoc(_))
        )
    }

    fn get_index(&mut self, name: &str, index: i64) -> Option<String> {
        match self.interp.state.scopes.get(name).map(|v| &v.value) {
            Some(VarValue::Indexed(map)) => map.get(&index).cloned(),
            Some(VarValue::Scalar(s)) if index == 0 => Some(s.clone()),
            _ => None,
        }
    }

    fn set_index(&mut self, name: &str, index: i64, value: &str) -> Result<(), ShellError> {
        let value = value.to_string();
        if !matches!(
            self.interp.state.scopes.get(name).map(|v| &v.value),
            Some(VarValue::Indexed(_))
        ) {
            self.interp
                .state
                .scopes
                .with_var(name, |v| v.value = VarValue::Indexed(Default::default()))?;
        }
        self.interp.state.scopes.with_var(name, |v| {
            if let VarValue::Indexed(map) = &mut v.value {
                map.insert(index, value);
            }
        })
    }

    fn get_key(&mut self, name: &str, key: &str) -> Option<String> {
        match self.interp.state.scopes.get(name).map(|v| &v.value) {
            Some(VarValue::Assoc(map)) => map.get(key).cloned(),
            _ => None,
        }
    }

    fn set_key(&mut self, name: &str, key: &str, value: &str) -> Result<(), ShellError> {
        let key = key.to_string();
        let value = value.to_string();
        self.interp.state.scopes.with_var(name, |v| {
            if let VarValue::Assoc(map) = &mut v.value {
                map.insert(key, value);
            }
        })
    }
}

/// Read one line from an fd, byte at a time (used by `select` and
/// `read`). `None` on immediate EOF.
pub(crate) fn read_line_fd(fd: i32) -> Option<String> {
    let mut line = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        match process::read_fd(fd, &mut buf) {
            Ok(0) => {
                if line.is_empty() {
                    return None;
                }
                break;
            }
            Ok(_) => {
                if buf[0] == b'\n' {
                    break;
                }
                line.push(buf[0]);
            }
            Err(_) => {
                if line.is_empty() {
                    return None;
                }
                break;
            }
        }
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::pipeline::exit_status_of;
    use crate::parser::Parser;

    fn shell() -> Interpreter {
        Interpreter::new(false)
    }

    fn run(interp: &mut Interpreter, src: &str) -> i32 {
        let script = Parser::new().parse(src).expect("parse");
        exit_status_of(interp.run_script(&script))
    }

    fn var(interp: &mut Interpreter, name: &str) -> Option<String> {
        interp.state.lookup(name)
    }

    #[test]
    fn if_elif_else() {
        let mut i = shell();
        run(&mut i, "if [ 1 = 2 ]; then r=a; elif [ 2 = 2 ]; then r=b; else r=c; fi");
        assert_eq!(var(&mut i, "r"), Some("b".into()));
    }

    #[test]
    fn while_loop_counts() {
        let mut i = shell();
        run(&mut i, "n=0; while (( n < 5 )); do n=$((n+1)); done");
        assert_eq!(var(&mut i, "n"), Some("5".into()));
    }

    #[test]
    fn until_loop() {
        let mut i = shell();
        run(&mut i, "n=0; until (( n >= 3 )); do n=$((n+1)); done");
        assert_eq!(var(&mut i, "n"), Some("3".into()));
    }

    #[test]
    fn c_style_for() {
        let mut i = shell();
        run(&mut i, "s=0; for ((j=1; j<=4; j++)); do s=$((s+j)); done");
        assert_eq!(var(&mut i, "s"), Some("10".into()));
    }

    #[test]
    fn for_over_words() {
        let mut i = shell();
        run(&mut i, "acc=; for w in x y z; do acc=$acc$w; done");
        assert_eq!(var(&mut i, "acc"), Some("xyz".into()));
    }

    #[test]
    fn case_matching_and_fallthrough() {
        let mut i = shell();
        run(&mut i, "case abc in a*) r=glob ;; *) r=default ;; esac");
        assert_eq!(var(&mut i, "r"), Some("glob".into()));

        run(&mut i, "case x in x) a=1 ;& y) b=2 ;; z) c=3 ;; esac");
        assert_eq!(var(&mut i, "a"), Some("1".into()));
        assert_eq!(var(&mut i, "b"), Some("2".into()));
        assert_eq!(var(&mut i, "c"), None);
    }

    #[test]
    fn extglob_case_pattern() {
        let mut i = shell();
        run(&mut i, "shopt -s extglob; case abc in @(abc|xyz)) r=match ;; esac");
        assert_eq!(var(&mut i, "r"), Some("match".into()));
    }

    #[test]
    fn conditional_command_status() {
        let mut i = shell();
        assert_eq!(run(&mut i, "[[ abc == a* ]]"), 0);
        assert_eq!(run(&mut i, "[[ abc == z* ]]"), 1);
        assert_eq!(run(&mut i, "[[ 3 -lt 5 && -n x ]]"), 0);
    }

    #[test]
    fn arithmetic_command_status() {
        let mut i = shell();
        assert_eq!(run(&mut i, "(( 1 + 1 ))"), 0);
        assert_eq!(run(&mut i, "(( 0 ))"), 1);
        run(&mut i, "(( counter = 41, counter += 1 ))");
        assert_eq!(var(&mut i, "counter"), Some("42".into()));
    }

    #[test]
    fn and_or_chains() {
        let mut i = shell();
        run(&mut i, "true && a=yes || a=no");
        assert_eq!(var(&mut i, "a"), Some("yes".into()));
        run(&mut i, "false && b=yes || b=no");
        assert_eq!(var(&mut i, "b"), Some("no".into()));
    }

    #[test]
    fn negation_inverts_status() {
        let mut i = shell();
        assert_eq!(run(&mut i, "! false"), 0);
        assert_eq!(run(&mut i, "! true"), 1);
    }

    #[test]
    fn last_status_variable() {
        let mut i = shell();
        run(&mut i, "false; s=$?");
        assert_eq!(var(&mut i, "s"), Some("1".into()));
    }

    #[test]
    fn errexit_stops_script() {
        let mut i = shell();
        let status = run(&mut i, "set -e\nfalse\nx=after");
        assert_eq!(status, 1);
        assert_eq!(var(&mut i, "x"), None);
    }

    #[test]
    fn errexit_spares_conditions() {
        let mut i = shell();
        let status = run(&mut i, "set -e\nif false; then :; fi\nx=survived");
        assert_eq!(status, 0);
        assert_eq!(var(&mut i, "x"), Some("survived".into()));
    }

    #[test]
    fn subshell_isolates_state() {
        let mut i = shell();
        run(&mut i, "x=outer; (x=inner; cd /); s=$?");
        assert_eq!(var(&mut i, "x"), Some("outer".into()));
    }

    #[test]
    fn pipeline_through_external() {
        let mut i = shell();
        run(&mut i, "v=$(echo hello | cat)");
        assert_eq!(var(&mut i, "v"), Some("hello".into()));
    }

    #[test]
    fn nested_subshells_in_pipeline() {
        // (echo outer; (echo inner)) | cat -> both lines, status 0.
        let mut i = shell();
        let status = run(&mut i, "v=$( (echo outer; (echo inner)) | cat )");
        assert_eq!(status, 0);
        assert_eq!(var(&mut i, "v"), Some("outer\ninner".into()));
    }

    #[test]
    fn pipefail_reports_rightmost_failure() {
        let mut i = shell();
        assert_eq!(run(&mut i, "false | true"), 0);
        assert_eq!(run(&mut i, "set -o pipefail; false | true"), 1);
    }

    #[test]
    fn heredoc_with_expansion() {
        let mut i = shell();
        run(&mut i, "name=world\nv=$(cat <<EOF\nhello $name\nEOF\n)");
        assert_eq!(var(&mut i, "v"), Some("hello world".into()));
    }

    #[test]
    fn quoted_heredoc_stays_literal() {
        let mut i = shell();
        run(&mut i, "v=$(cat <<'EOF'\n$name\nEOF\n)");
        assert_eq!(var(&mut i, "v"), Some("$name".into()));
    }

    #[test]
    fn here_string() {
        let mut i = shell();
        run(&mut i, "v=$(cat <<<hi)");
        assert_eq!(var(&mut i, "v"), Some("hi".into()));
    }

    #[test]
    fn redirect_to_file_and_back() {
        let mut i = shell();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        run(&mut i, &format!("echo content > {}", path.display()));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "content\n");
        run(&mut i, &format!("v=$(cat < {})", path.display()));
        assert_eq!(var(&mut i, "v"), Some("content".into()));
    }

    #[test]
    fn append_redirect() {
        let mut i = shell();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.txt");
        run(&mut i, &format!("echo one > {p}; echo two >> {p}", p = path.display()));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "one\ntwo\n");
    }

    #[test]
    fn noclobber_refuses_overwrite() {
        let mut i = shell();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keep.txt");
        run(&mut i, &format!("echo first > {}", path.display()));
        let status = run(&mut i, &format!("set -C; echo second > {}", path.display()));
        assert_ne!(status, 0);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "first\n");
        run(&mut i, &format!("echo third >| {}", path.display()));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "third\n");
    }

    #[test]
    fn fd_restore_after_builtin_redirect() {
        // Redirecting a builtin must not leak into later commands.
        let mut i = shell();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        run(&mut i, &format!("echo redirected > {}", path.display()));
        run(&mut i, "v=$(echo visible)");
        assert_eq!(var(&mut i, "v"), Some("visible".into()));
    }

    #[test]
    fn command_not_found_is_127() {
        let mut i = shell();
        assert_eq!(run(&mut i, "definitely-no-such-command-zz"), 127);
    }

    #[test]
    fn background_job_registers_and_waits() {
        let mut i = shell();
        let status = run(&mut i, "true & wait");
        assert_eq!(status, 0);
    }

    #[test]
    fn empty_command_line_is_ok() {
        let mut i = shell();
        assert_eq!(run(&mut i, ""), 0);
        assert_eq!(run(&mut i, "   \n\n"), 0);
    }

    #[test]
    fn function_scope_end_to_end() {
        let mut i = shell();
        run(&mut i, "x=global\nf() { local x=local; inner=$x; }\nf\nouter=$x");
        assert_eq!(var(&mut i, "inner"), Some("local".into()));
        assert_eq!(var(&mut i, "outer"), Some("global".into()));
    }

    #[test]
    fn debug_trap_runs_before_commands() {
        let mut i = shell();
        run(&mut i, "trap 'hits=$((hits+1))' DEBUG\ntrue\ntrue");
        let hits: i64 = var(&mut i, "hits").unwrap_or_default().parse().unwrap_or(0);
        assert!(hits >= 2, "debug trap ran {} times", hits);
    }

    #[test]
    fn select_with_no_words_is_noop() {
        let mut i = shell();
        i.state.positional = Vec::new();
        assert_eq!(run(&mut i, "select x; do break; done"), 0);
    }
}
