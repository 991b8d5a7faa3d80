//! Job table.
//!
//! Background and stopped pipelines are tracked here for `jobs`, `fg`,
//! `bg`, `wait` and `kill %n`. Job ids are slab keys so a finished job's
//! number is reused, like every POSIX shell does.

use slab::Slab;

use crate::system::process::{ChildState, Pid};

/// One process of a job's pipeline.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub running: bool,
    pub stopped: bool,
    pub completed: bool,
    pub exit_status: i32,
}

impl ProcessEntry {
    pub fn new(pid: Pid) -> Self {
        Self { pid, running: true, stopped: false, completed: false, exit_status: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Done => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub pgid: Pid,
    pub command: String,
    pub procs: Vec<ProcessEntry>,
    pub state: JobState,
    pub foreground: bool,
    /// The user has been told about the latest state change.
    pub notified: bool,
}

impl Job {
    pub fn new(pgid: Pid, command: String, pids: &[Pid], foreground: bool) -> Self {
        Self {
            pgid,
            command,
            procs: pids.iter().map(|&p| ProcessEntry::new(p)).collect(),
            state: JobState::Running,
            foreground,
            notified: false,
        }
    }

    /// Exit status of the job: the last process's status.
    pub fn exit_status(&self) -> i32 {
        self.procs.last().map_or(0, |p| p.exit_status)
    }

    fn recompute_state(&mut self) -> JobState {
        if self.procs.iter().all(|p| p.completed) {
            self.state = JobState::Done;
        } else if self.procs.iter().any(|p| p.stopped) {
            self.state = JobState::Stopped;
        } else {
            self.state = JobState::Running;
        }
        self.state
    }
}

/// Slab-backed job table with current (`+`) / previous (`-`) tracking.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Slab<Job>,
    current: Option<usize>,
    previous: Option<usize>,
    /// Pid of the most recent background job, for `$!`.
    last_async_pid: Option<Pid>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job; returns its 1-based display id.
    pub fn add(&mut self, job: Job) -> usize {
        let background = !job.foreground;
        if background {
            self.last_async_pid = job.procs.first().map(|p| p.pid);
        }
        let key = self.jobs.insert(job);
        self.previous = self.current;
        self.current = Some(key);
        key + 1
    }

    pub fn last_async_pid(&self) -> Option<Pid> {
        self.last_async_pid
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(id.checked_sub(1)?)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(id.checked_sub(1)?)
    }

    /// `+`, `-` or nothing, per display id.
    pub fn marker(&self, id: usize) -> char {
        let key = id.wrapping_sub(1);
        if self.current == Some(key) {
            '+'
        } else if self.previous == Some(key) {
            '-'
        } else {
            ' '
        }
    }

    /// Record a `waitpid` observation. Returns the display id of the
    /// affected job, if the pid belongs to one.
    pub fn update_process(&mut self, pid: Pid, state: ChildState) -> Option<usize> {
        for (key, job) in self.jobs.iter_mut() {
            if let Some(entry) = job.procs.iter_mut().find(|p| p.pid == pid) {
                match state {
                    ChildState::Exited(code) => {
                        entry.completed = true;
                        entry.running = false;
                        entry.stopped = false;
                        entry.exit_status = code;
                    }
                    ChildState::Signaled(signo) => {
                        entry.completed = true;
                        entry.running = false;
                        entry.stopped = false;
                        entry.exit_status = 128 + signo;
                    }
                    ChildState::Stopped(_) => {
                        entry.stopped = true;
                        entry.running = false;
                    }
                    ChildState::Continued => {
                        entry.stopped = false;
                        entry.running = true;
                    }
                }
                let new_state = job.recompute_state();
                if new_state == JobState::Stopped {
                    job.notified = false;
                    // A freshly stopped job becomes the current job.
                    if self.current != Some(key) {
                        self.previous = self.current;
                        self.current = Some(key);
                    }
                }
                return Some(key + 1);
            }
        }
        None
    }

    /// Remove jobs whose every process has completed and which have been
    /// reported. Returns (display id, job) pairs for the removed ones.
    pub fn reap_done(&mut self) -> Vec<(usize, Job)> {
        let done: Vec<usize> = self
            .jobs
            .iter()
            .filter(|(_, j)| j.state == JobState::Done)
            .map(|(k, _)| k)
            .collect();
        let mut removed = Vec::new();
        for key in done {
            let job = self.jobs.remove(key);
            if self.current == Some(key) {
                self.current = self.previous.take();
            }
            if self.previous == Some(key) {
                self.previous = None;
            }
            removed.push((key + 1, job));
        }
        if self.current.is_none() {
            self.current = self.jobs.iter().map(|(k, _)| k).last();
        }
        removed
    }

    /// Resolve a job spec: `%1`, `%+`/`%%`, `%-`, `%name`, `%?substr`.
    pub fn resolve_spec(&self, spec: &str) -> Option<usize> {
        let body = spec.strip_prefix('%')?;
        match body {
            "" | "+" | "%" => self.current.map(|k| k + 1),
            "-" => self.previous.or(self.current).map(|k| k + 1),
            _ => {
                if let Ok(n) = body.parse::<usize>() {
                    return self.get(n).map(|_| n);
                }
                if let Some(substr) = body.strip_prefix('?') {
                    return self
                        .jobs
                        .iter()
                        .find(|(_, j)| j.command.contains(substr))
                        .map(|(k, _)| k + 1);
                }
                self.jobs
                    .iter()
                    .find(|(_, j)| j.command.starts_with(body))
                    .map(|(k, _)| k + 1)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.jobs.iter().map(|(k, j)| (k + 1, j))
    }

    /// Jobs with unreported state changes, for between-command notices.
    pub fn unnotified(&mut self) -> Vec<(usize, JobState, String, i32)> {
        let mut out = Vec::new();
        for (key, job) in self.jobs.iter_mut() {
            if !job.notified && !job.foreground && job.state != JobState::Running {
                job.notified = true;
                out.push((key + 1, job.state, job.command.clone(), job.exit_status()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    fn sample(table: &mut JobTable, raw: i32) -> usize {
        table.add(Job::new(pid(raw), format!("sleep {}", raw), &[pid(raw)], false))
    }

    #[test]
    fn add_assigns_sequential_ids() {
        let mut t = JobTable::new();
        assert_eq!(sample(&mut t, 100), 1);
        assert_eq!(sample(&mut t, 101), 2);
    }

    #[test]
    fn current_and_previous_markers() {
        let mut t = JobTable::new();
        let a = sample(&mut t, 100);
        let b = sample(&mut t, 101);
        assert_eq!(t.marker(b), '+');
        assert_eq!(t.marker(a), '-');
    }

    #[test]
    fn update_to_done_and_reap() {
        let mut t = JobTable::new();
        let id = sample(&mut t, 100);
        assert_eq!(t.update_process(pid(100), ChildState::Exited(7)), Some(id));
        assert_eq!(t.get(id).map(|j| j.state), Some(JobState::Done));
        let removed = t.reap_done();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1.exit_status(), 7);
        assert!(t.is_empty());
    }

    #[test]
    fn job_ids_are_reused_after_reap() {
        let mut t = JobTable::new();
        let id = sample(&mut t, 100);
        t.update_process(pid(100), ChildState::Exited(0));
        t.reap_done();
        assert_eq!(sample(&mut t, 200), id);
    }

    #[test]
    fn stopped_job_becomes_current() {
        let mut t = JobTable::new();
        let a = sample(&mut t, 100);
        let _b = sample(&mut t, 101);
        t.update_process(pid(100), ChildState::Stopped(libc::SIGTSTP));
        assert_eq!(t.marker(a), '+');
    }

    #[test]
    fn pipeline_job_state_follows_all_members() {
        let mut t = JobTable::new();
        let id = t.add(Job::new(pid(10), "a | b".into(), &[pid(10), pid(11)], false));
        t.update_process(pid(10), ChildState::Exited(0));
        assert_eq!(t.get(id).map(|j| j.state), Some(JobState::Running));
        t.update_process(pid(11), ChildState::Exited(1));
        assert_eq!(t.get(id).map(|j| j.state), Some(JobState::Done));
        assert_eq!(t.get(id).map(|j| j.exit_status()), Some(1));
    }

    #[test]
    fn resolve_specs() {
        let mut t = JobTable::new();
        let a = t.add(Job::new(pid(1), "vim notes.txt".into(), &[pid(1)], false));
        let b = t.add(Job::new(pid(2), "sleep 100".into(), &[pid(2)], false));
        assert_eq!(t.resolve_spec("%+"), Some(b));
        assert_eq!(t.resolve_spec("%%"), Some(b));
        assert_eq!(t.resolve_spec("%-"), Some(a));
        assert_eq!(t.resolve_spec("%1"), Some(a));
        assert_eq!(t.resolve_spec("%vim"), Some(a));
        assert_eq!(t.resolve_spec("%?notes"), Some(a));
        assert_eq!(t.resolve_spec("%9"), None);
        assert_eq!(t.resolve_spec("nope"), None);
    }

    #[test]
    fn background_add_records_last_async_pid() {
        let mut t = JobTable::new();
        sample(&mut t, 42);
        assert_eq!(t.last_async_pid(), Some(pid(42)));
    }
}
