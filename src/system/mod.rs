//! Process substrate: fork/exec, jobs, signals, terminal, traps.

pub mod jobs;
pub mod process;
pub mod signals;
pub mod terminal;
pub mod traps;
