//! Job-control builtins: jobs, fg, bg, wait, kill.

use crate::interpreter::builtins::{eout, fail, out};
use crate::interpreter::errors::ExecResult;
use crate::interpreter::interpreter::Interpreter;
use crate::system::jobs::JobState;
use crate::system::process::{self, ChildState, Pid};
use crate::system::signals;

pub fn run_jobs(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    interp.poll_signals();
    let pids_only = args.iter().skip(1).any(|a| a == "-p");
    let entries: Vec<(usize, JobState, String, Pid)> = interp
        .state
        .jobs
        .iter()
        .map(|(id, job)| (id, job.state, job.command.clone(), job.pgid))
        .collect();
    for (id, state, command, pgid) in entries {
        if pids_only {
            out(&format!("{}\n", pgid.as_raw()));
        } else {
            let marker = interp.state.jobs.marker(id);
            out(&format!("[{}]{}  {:<22} {}\n", id, marker, state.to_string(), command));
        }
    }
    interp.state.jobs.reap_done();
    Ok(0)
}

fn resolve_job(interp: &mut Interpreter, args: &[String]) -> Option<usize> {
    match args.get(1) {
        Some(spec) if spec.starts_with('%') => interp.state.jobs.resolve_spec(spec),
        Some(spec) => interp.state.jobs.resolve_spec(&format!("%{}", spec)),
        None => interp.state.jobs.resolve_spec("%+"),
    }
}

pub fn run_fg(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let id = match resolve_job(interp, args) {
        Some(id) => id,
        None => return fail("fg", "current: no such job", 1),
    };
    let (pgid, command, pids) = match interp.state.jobs.get(id) {
        Some(job) => (
            job.pgid,
            job.command.clone(),
            job.procs.iter().map(|p| p.pid).collect::<Vec<_>>(),
        ),
        None => return fail("fg", "no such job", 1),
    };

    out(&format!("{}\n", command));
    interp.state.terminal.give_to(pgid);
    let _ = process::kill_group(pgid, libc::SIGCONT);

    let mut status = 0;
    let mut stopped = false;
    for pid in &pids {
        match process::wait_for(*pid) {
            Ok((p, ChildState::Stopped(signal))) => {
                interp.state.jobs.update_process(p, ChildState::Stopped(signal));
                stopped = true;
                status = 128 + signal;
            }
            Ok((p, state)) => {
                interp.state.jobs.update_process(p, state);
                status = state.exit_status();
            }
            Err(_) => {}
        }
    }
    interp.state.terminal.reclaim();
    if !stopped {
        interp.state.jobs.reap_done();
    }
    Ok(status)
}

pub fn run_bg(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let id = match resolve_job(interp, args) {
        Some(id) => id,
        None => return fail("bg", "current: no such job", 1),
    };
    let (pgid, command) = match interp.state.jobs.get_mut(id) {
        Some(job) => {
            job.state = JobState::Running;
            for entry in &mut job.procs {
                entry.stopped = false;
                entry.running = true;
            }
            job.notified = true;
            (job.pgid, job.command.clone())
        }
        None => return fail("bg", "no such job", 1),
    };
    let _ = process::kill_group(pgid, libc::SIGCONT);
    out(&format!("[{}]+ {} &\n", id, command));
    Ok(0)
}

pub fn run_wait(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    if args.len() == 1 {
        // Wait for every known child.
        let pids: Vec<Pid> = interp
            .state
            .jobs
            .iter()
            .flat_map(|(_, job)| job.procs.iter().map(|p| p.pid))
            .collect();
        let mut status = 0;
        for pid in pids {
            if let Ok((p, state)) = process::wait_for(pid) {
                interp.state.jobs.update_process(p, state);
                status = state.exit_status();
            }
        }
        interp.state.jobs.reap_done();
        return Ok(status);
    }

    let mut status = 0;
    let specs: Vec<String> = args[1..].to_vec();
    for spec in &specs {
        let pids: Vec<Pid> = if spec.starts_with('%') {
            match interp.state.jobs.resolve_spec(spec) {
                Some(id) => interp
                    .state
                    .jobs
                    .get(id)
                    .map(|j| j.procs.iter().map(|p| p.pid).collect())
                    .unwrap_or_default(),
                None => {
                    eout(&format!("psh: wait: {}: no such job\n", spec));
                    status = 127;
                    continue;
                }
            }
        } else {
            match spec.parse::<i32>() {
                Ok(raw) => vec![Pid::from_raw(raw)],
                Err(_) => {
                    eout(&format!("psh: wait: `{}': not a pid or valid job spec\n", spec));
                    status = 2;
                    continue;
                }
            }
        };
        for pid in pids {
            match process::wait_for(pid) {
                Ok((p, state)) => {
                    interp.state.jobs.update_process(p, state);
                    status = state.exit_status();
                }
                Err(_) => status = 127,
            }
        }
    }
    interp.state.jobs.reap_done();
    Ok(status)
}

pub fn run_kill(interp: &mut Interpreter, args: &[String]) -> ExecResult {
    let mut signal = libc::SIGTERM;
    let mut targets: Vec<&String> = Vec::new();
    let mut iter = args[1..].iter().peekable();

    if args.len() > 1 && args[1] == "-l" {
        for (name, number) in signals::SIGNAL_NAMES {
            out(&format!("{:>2}) SIG{}\n", number, name));
        }
        return Ok(0);
    }

    while let Some(arg) = iter.next() {
        if arg == "-s" {
            match iter.next().and_then(|s| signals::parse_signal(s)) {
                Some(s) => signal = s,
                None => return fail("kill", "invalid signal specification", 1),
            }
        } else if let Some(spec) = arg.strip_prefix('-') {
            if !spec.is_empty() && !targets.is_empty() {
                targets.push(arg);
            } else {
                match signals::parse_signal(spec) {
                    Some(s) => signal = s,
                    None => return fail("kill", &format!("{}: invalid signal specification", spec), 1),
                }
            }
        } else {
            targets.push(arg);
        }
    }

    if targets.is_empty() {
        return fail("kill", "usage: kill [-s sigspec | -sigspec] pid | jobspec …", 2);
    }

    let mut status = 0;
    for target in targets {
        if target.starts_with('%') {
            match interp.state.jobs.resolve_spec(target) {
                Some(id) => {
                    if let Some(job) = interp.state.jobs.get(id) {
                        if process::kill_group(job.pgid, signal).is_err() {
                            eout(&format!("psh: kill: {}: cannot signal job\n", target));
                            status = 1;
                        }
                    }
                }
                None => {
                    eout(&format!("psh: kill: {}: no such job\n", target));
                    status = 1;
                }
            }
            continue;
        }
        match target.parse::<i32>() {
            Ok(raw) => {
                if process::kill(Pid::from_raw(raw), signal).is_err() {
                    eout(&format!("psh: kill: ({}) - No such process\n", raw));
                    status = 1;
                }
            }
            Err(_) => {
                eout(&format!("psh: kill: {}: arguments must be process or job IDs\n", target));
                status = 1;
            }
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::jobs::Job;

    #[test]
    fn resolve_job_defaults_to_current() {
        let mut interp = Interpreter::new(false);
        let id = interp.state.jobs.add(Job::new(
            Pid::from_raw(12345),
            "sleep 99".into(),
            &[Pid::from_raw(12345)],
            false,
        ));
        let args = vec!["fg".to_string()];
        assert_eq!(resolve_job(&mut interp, &args), Some(id));
    }

    #[test]
    fn resolve_job_accepts_bare_number() {
        let mut interp = Interpreter::new(false);
        let id = interp.state.jobs.add(Job::new(
            Pid::from_raw(11111),
            "sleep 1".into(),
            &[Pid::from_raw(11111)],
            false,
        ));
        let args = vec!["fg".to_string(), id.to_string()];
        assert_eq!(resolve_job(&mut interp, &args), Some(id));
    }
}
