//! Command executors for bashpilot.
//!
//! Executors give the agent its one way of acting on the world: running
//! the command the operator just approved. All of them implement
//! `bashpilot_core::CommandExecutor`, so a stricter executor can replace
//! the shell without the agent loop noticing.

pub mod shell;

pub use shell::ShellExecutor;
