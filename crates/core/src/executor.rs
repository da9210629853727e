//! Command executor trait: the capability the agent uses to act.
//!
//! The loop hands an operator-approved command string to a
//! `CommandExecutor` and gets an [`ExecutionOutcome`] back. Execution is
//! infallible at the type level: a command that fails, or cannot even be
//! started, is reported through the outcome so the model can read about it
//! on the next turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What happened when a command ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Non-zero exit, signal, timeout, or launch failure
    pub failed: bool,

    /// Exit code, when the process exited normally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionOutcome {
    /// An outcome for a command that never produced a process.
    pub fn launch_failure(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            failed: true,
            exit_code: None,
        }
    }

    /// Collapse to the single text fed back to the model.
    ///
    /// Standard output wins; standard error is the fallback. A silent
    /// failure still reports its exit code.
    pub fn feedback_text(&self) -> String {
        if !self.stdout.is_empty() {
            self.stdout.clone()
        } else if !self.stderr.is_empty() {
            self.stderr.clone()
        } else if self.failed {
            match self.exit_code {
                Some(code) => format!("[exit code: {code}]"),
                None => "[command failed]".into(),
            }
        } else {
            String::new()
        }
    }
}

/// Runs a single command string.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// A short name for logs (e.g., "sh").
    fn name(&self) -> &str;

    /// Run `command` to completion.
    async fn execute(&self, command: &str) -> ExecutionOutcome;
}
