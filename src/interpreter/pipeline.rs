//! Forked execution: pipelines, subshells, background jobs, external
//! commands, and both substitution flavours.
//!
//! Pipeline setup follows the synchronization-pipe protocol: the parent
//! creates one extra pipe before forking; every non-leader child blocks
//! reading it until the parent has called `setpgid` for all members and
//! closed the write end. Nobody sleeps in a loop.

use std::os::unix::io::RawFd;

use crate::ast::{CommandNode, ProcessDirection, ProcessSubstitutionPart, ScriptNode, SimpleCommandNode, StatementNode};
use crate::interpreter::errors::{ControlFlow, ExecResult, ShellError};
use crate::interpreter::interpreter::Interpreter;
use crate::system::jobs::{Job, JobState};
use crate::system::process::{self, ChildState, ForkResult, Pid};
use crate::system::signals;

/// Collapse an execution result into a plain exit status, reporting
/// runtime errors on stderr. Used at frames that absorb control flow
/// (forked children, trap bodies, the top level).
pub(crate) fn exit_status_of(result: ExecResult) -> i32 {
    match result {
        Ok(status) => status,
        Err(ControlFlow::Exit(code)) => code,
        Err(ControlFlow::Return(code)) => code,
        Err(ControlFlow::Break(_)) | Err(ControlFlow::Continue(_)) => 0,
        Err(ControlFlow::Error(e)) => {
            let line = format!("psh: {}\n", e);
            let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
            e.status()
        }
    }
}

fn pipe_err(e: nix::errno::Errno) -> ControlFlow {
    ControlFlow::Error(ShellError::Redirect(format!("cannot create pipe: {}", e)))
}

impl Interpreter {
    // =========================================================================
    // PIPELINES
    // =========================================================================

    pub(crate) fn execute_pipeline_node(
        &mut self,
        pipeline: &crate::ast::PipelineNode,
    ) -> ExecResult {
        let mut status = if pipeline.commands.len() == 1 {
            // No pipe, no new process group: compounds, builtins and
            // functions run in-process; externals fork inside dispatch.
            match self.execute_command(&pipeline.commands[0]) {
                Ok(s) => s,
                Err(ControlFlow::Error(e)) => {
                    let line = format!("psh: {}\n", e);
                    let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
                    if !self.state.interactive && e.is_fatal_in_script() {
                        return Err(ControlFlow::Exit(e.status()));
                    }
                    e.status()
                }
                Err(other) => return Err(other),
            }
        } else {
            self.run_pipeline(&pipeline.commands)?
        };
        if pipeline.negated {
            status = if status == 0 { 1 } else { 0 };
        }
        self.state.last_status = status;
        Ok(status)
    }

    fn run_pipeline(&mut self, commands: &[CommandNode]) -> ExecResult {
        let n = commands.len();
        let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(n - 1);
        for _ in 0..n - 1 {
            pipes.push(process::pipe().map_err(pipe_err)?);
        }
        let (sync_read, sync_write) = process::pipe().map_err(pipe_err)?;

        let job_control = self.state.options.monitor && !self.state.is_subshell;
        let mut pgid: Option<Pid> = None;
        let mut pids: Vec<Pid> = Vec::with_capacity(n);

        for (i, command) in commands.iter().enumerate() {
            match process::fork().map_err(|e| {
                ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
            })? {
                ForkResult::Child => {
                    // Child setup must not be stopped by a background
                    // tcsetpgrp race.
                    signals::ignore_sigttou();
                    let _ = process::close(sync_write);

                    let me = process::getpid();
                    let my_pgid = pgid.unwrap_or(me);
                    if job_control {
                        let _ = process::setpgid(me, my_pgid);
                    }
                    if i > 0 {
                        // Block until the parent confirms every pgid.
                        let mut byte = [0u8; 1];
                        let _ = process::read_fd(sync_read, &mut byte);
                    }
                    let _ = process::close(sync_read);

                    if i > 0 {
                        let _ = process::dup2(pipes[i - 1].0, libc::STDIN_FILENO);
                    }
                    if i < n - 1 {
                        let _ = process::dup2(pipes[i].1, libc::STDOUT_FILENO);
                    }
                    for (r, w) in &pipes {
                        let _ = process::close(*r);
                        let _ = process::close(*w);
                    }

                    self.run_command_in_child(command);
                }
                ForkResult::Parent { child } => {
                    pids.push(child);
                    let lead = pgid.unwrap_or(child);
                    pgid = Some(lead);
                    if job_control {
                        // Both parent and child call setpgid; whichever
                        // runs first wins, the other is a no-op.
                        let _ = process::setpgid(child, lead);
                    }
                }
            }
        }

        for (r, w) in &pipes {
            let _ = process::close(*r);
            let _ = process::close(*w);
        }
        let _ = process::close(sync_read);
        // Releasing the write end unblocks every waiting child.
        let _ = process::close(sync_write);

        let pgid = pgid.expect("at least one child was forked");
        self.wait_for_pipeline(pgid, &pids, commands, job_control)
    }

    /// Foreground wait: terminal to the job, collect every member,
    /// terminal back.
    fn wait_for_pipeline(
        &mut self,
        pgid: Pid,
        pids: &[Pid],
        commands: &[CommandNode],
        job_control: bool,
    ) -> ExecResult {
        if job_control {
            self.state.terminal.give_to(pgid);
        }

        let mut statuses: Vec<i32> = vec![0; pids.len()];
        let mut stopped = false;
        let mut stop_signal = libc::SIGTSTP;
        for (i, pid) in pids.iter().enumerate() {
            match process::wait_for(*pid) {
                Ok((_, ChildState::Stopped(signal))) => {
                    stopped = true;
                    stop_signal = signal;
                    statuses[i] = 128 + signal;
                }
                Ok((_, state)) => statuses[i] = state.exit_status(),
                Err(_) => statuses[i] = 0,
            }
        }

        if job_control {
            self.state.terminal.reclaim();
        }

        if stopped {
            let command = commands
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" | ");
            let mut job = Job::new(pgid, command.clone(), pids, true);
            for (entry, status) in job.procs.iter_mut().zip(&statuses) {
                entry.stopped = true;
                entry.running = false;
                entry.exit_status = *status;
            }
            job.state = JobState::Stopped;
            job.foreground = false;
            let id = self.state.jobs.add(job);
            let line = format!("\n[{}]+  Stopped                 {}\n", id, command);
            let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
            return Ok(128 + stop_signal);
        }

        let status = if self.state.options.pipefail {
            statuses.iter().rev().find(|&&s| s != 0).copied().unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        };
        Ok(status)
    }

    /// Runs inside a freshly forked pipeline member; never returns.
    fn run_command_in_child(&mut self, command: &CommandNode) -> ! {
        self.state.enter_subshell();
        self.state.exec_in_place = true;
        let status = exit_status_of(self.execute_command(command));
        process::exit_immediately(status);
    }

    // =========================================================================
    // EXTERNAL COMMANDS
    // =========================================================================

    pub(crate) fn execute_external(
        &mut self,
        command: &SimpleCommandNode,
        argv: Vec<String>,
    ) -> ExecResult {
        let name = argv[0].clone();
        let path = match process::find_in_path(&name, &self.state.path_var()) {
            Some(path) => path,
            None => {
                let line = format!("psh: {}: command not found\n", name);
                let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
                return Ok(127);
            }
        };

        // Inside a pipeline child we are already forked: exec in place.
        if self.state.exec_in_place {
            self.apply_assignments(&command.assignments, true)?;
            self.apply_redirects_in_child(&command.redirections)?;
            signals::reset_for_child();
            let env = self.state.child_environment();
            let errno = process::execve(&path, &argv, &env);
            let status = exec_failure_status(errno, &name);
            process::exit_immediately(status);
        }

        let job_control =
            self.state.options.monitor && !self.state.is_subshell && self.state.terminal.is_tty();

        match process::fork().map_err(|e| {
            ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
        })? {
            ForkResult::Child => {
                signals::ignore_sigttou();
                let me = process::getpid();
                if job_control {
                    let _ = process::setpgid(me, me);
                    self.state.terminal.give_to(me);
                }
                let status = (|| -> ExecResult<i32> {
                    self.apply_assignments(&command.assignments, true)?;
                    self.apply_redirects_in_child(&command.redirections)?;
                    signals::reset_for_child();
                    let env = self.state.child_environment();
                    let errno = process::execve(&path, &argv, &env);
                    Ok(exec_failure_status(errno, &name))
                })();
                process::exit_immediately(exit_status_of(status));
            }
            ForkResult::Parent { child } => {
                if job_control {
                    let _ = process::setpgid(child, child);
                    self.state.terminal.give_to(child);
                }
                let status = match process::wait_for(child) {
                    Ok((_, ChildState::Stopped(signal))) => {
                        let mut job =
                            Job::new(child, command.to_string(), &[child], true);
                        job.state = JobState::Stopped;
                        job.foreground = false;
                        job.procs[0].stopped = true;
                        job.procs[0].running = false;
                        let id = self.state.jobs.add(job);
                        let line = format!(
                            "\n[{}]+  Stopped                 {}\n",
                            id, command
                        );
                        let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
                        128 + signal
                    }
                    Ok((_, state)) => {
                        if let ChildState::Signaled(signo) = state {
                            if signo == libc::SIGINT {
                                let _ = process::write_all(libc::STDERR_FILENO, b"\n");
                            }
                        }
                        state.exit_status()
                    }
                    Err(_) => 0,
                };
                if job_control {
                    self.state.terminal.reclaim();
                }
                Ok(status)
            }
        }
    }

    // =========================================================================
    // SUBSHELLS & BACKGROUND
    // =========================================================================

    pub(crate) fn execute_subshell(&mut self, body: &[StatementNode]) -> ExecResult {
        match process::fork().map_err(|e| {
            ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
        })? {
            ForkResult::Child => {
                self.state.enter_subshell();
                let status = exit_status_of(self.run_statements(body));
                process::exit_immediately(status);
            }
            ForkResult::Parent { child } => {
                let (_, state) = process::wait_for(child).map_err(|e| {
                    ControlFlow::Error(ShellError::Redirect(format!("wait failed: {}", e)))
                })?;
                Ok(state.exit_status())
            }
        }
    }

    pub(crate) fn execute_background_statement(
        &mut self,
        statement: &StatementNode,
    ) -> ExecResult {
        let mut foreground_copy = statement.clone();
        foreground_copy.background = false;

        match process::fork().map_err(|e| {
            ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
        })? {
            ForkResult::Child => {
                let me = process::getpid();
                let _ = process::setpgid(me, me);
                self.state.enter_subshell();
                // A non-job-control async child must not read the tty.
                if !self.state.options.monitor {
                    if let Ok(file) = std::fs::File::open("/dev/null") {
                        use std::os::unix::io::IntoRawFd;
                        let fd = file.into_raw_fd();
                        let _ = process::dup2(fd, libc::STDIN_FILENO);
                        let _ = process::close(fd);
                    }
                }
                let status = exit_status_of(self.execute_statement(&foreground_copy));
                process::exit_immediately(status);
            }
            ForkResult::Parent { child } => {
                let _ = process::setpgid(child, child);
                let job = Job::new(child, statement.to_string(), &[child], false);
                let id = self.state.jobs.add(job);
                if self.state.interactive {
                    let line = format!("[{}] {}\n", id, child.as_raw());
                    let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
                }
                self.state.last_status = 0;
                Ok(0)
            }
        }
    }

    // =========================================================================
    // COMMAND SUBSTITUTION
    // =========================================================================

    /// `$(…)`: fork a child shell, capture stdout, strip every trailing
    /// newline.
    pub(crate) fn command_substitute(&mut self, body: &ScriptNode) -> ExecResult<String> {
        let (read_fd, write_fd) = process::pipe().map_err(pipe_err)?;

        match process::fork().map_err(|e| {
            ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
        })? {
            ForkResult::Child => {
                let _ = process::close(read_fd);
                let _ = process::dup2(write_fd, libc::STDOUT_FILENO);
                let _ = process::close(write_fd);
                self.state.enter_subshell();
                let status = exit_status_of(self.run_script(body));
                process::exit_immediately(status);
            }
            ForkResult::Parent { child } => {
                let _ = process::close(write_fd);
                let output = process::read_to_end(read_fd).unwrap_or_default();
                let _ = process::close(read_fd);
                // Direct waitpid; the SIGCHLD handler only writes to the
                // self-pipe, so it cannot steal this child.
                let status = match process::wait_for(child) {
                    Ok((_, state)) => state.exit_status(),
                    Err(_) => 0,
                };
                self.state.last_status = status;

                let mut text = String::from_utf8_lossy(&output).into_owned();
                while text.ends_with('\n') {
                    text.pop();
                }
                Ok(text)
            }
        }
    }

    // =========================================================================
    // PROCESS SUBSTITUTION
    // =========================================================================

    /// `<(cmd)` / `>(cmd)`: returns the `/dev/fd/N` path; the fd is held
    /// until the consuming command finishes.
    pub(crate) fn setup_process_substitution(
        &mut self,
        part: &ProcessSubstitutionPart,
    ) -> ExecResult<String> {
        let (read_fd, write_fd) = process::pipe().map_err(pipe_err)?;

        match process::fork().map_err(|e| {
            ControlFlow::Error(ShellError::Redirect(format!("fork failed: {}", e)))
        })? {
            ForkResult::Child => {
                match part.direction {
                    ProcessDirection::In => {
                        let _ = process::close(read_fd);
                        let _ = process::dup2(write_fd, libc::STDOUT_FILENO);
                        let _ = process::close(write_fd);
                    }
                    ProcessDirection::Out => {
                        let _ = process::close(write_fd);
                        let _ = process::dup2(read_fd, libc::STDIN_FILENO);
                        let _ = process::close(read_fd);
                    }
                }
                self.state.enter_subshell();
                let status = exit_status_of(self.run_script(&part.body));
                process::exit_immediately(status);
            }
            ForkResult::Parent { .. } => {
                let held = match part.direction {
                    ProcessDirection::In => {
                        let _ = process::close(write_fd);
                        read_fd
                    }
                    ProcessDirection::Out => {
                        let _ = process::close(read_fd);
                        write_fd
                    }
                };
                // The fd must survive exec so the child can open the
                // path; it is closed when the command completes. The
                // substitution child itself is reaped by the SIGCHLD
                // drain.
                self.held_fds.push(held);
                Ok(format!("/dev/fd/{}", held))
            }
        }
    }
}

fn exec_failure_status(errno: nix::errno::Errno, name: &str) -> i32 {
    let (status, message) = match errno {
        nix::errno::Errno::EACCES => (126, "permission denied"),
        nix::errno::Errno::ENOEXEC => (126, "cannot execute binary file"),
        nix::errno::Errno::ENOENT => (127, "no such file or directory"),
        _ => (126, "cannot execute"),
    };
    let line = format!("psh: {}: {}\n", name, message);
    let _ = process::write_all(libc::STDERR_FILENO, line.as_bytes());
    status
}
