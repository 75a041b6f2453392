//! CLI subcommand implementations.

pub mod run;

pub use run::{run_playbook, RunOptions};
