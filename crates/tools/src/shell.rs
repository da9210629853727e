//! Shell executor — run one command string through a shell.
//!
//! The command text is handed to the shell verbatim (`sh -c <command>`),
//! so pipes, redirects and globbing all work. There is no sandbox: the
//! operator's confirmation is the only gate.

use async_trait::async_trait;
use bashpilot_config::ShellConfig;
use bashpilot_core::executor::{CommandExecutor, ExecutionOutcome};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands through a system shell and captures both output streams.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    program: String,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellExecutor {
    /// The platform shell: `sh` on Unix, `cmd` on Windows.
    pub fn new() -> Self {
        let program = if cfg!(target_os = "windows") { "cmd" } else { "sh" };
        Self {
            program: program.into(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Build from the `[shell]` config section.
    pub fn from_config(config: &ShellConfig) -> Self {
        let mut executor = Self::new().with_program(&config.program);
        if let Some(dir) = &config.working_dir {
            executor = executor.with_working_dir(dir);
        }
        if let Some(secs) = config.timeout_secs {
            executor = executor.with_timeout(Duration::from_secs(secs));
        }
        executor
    }

    /// Use a different shell binary (e.g. `bash`, `zsh`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run every command in `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command_flag(&self) -> &'static str {
        let lower = self.program.to_ascii_lowercase();
        if lower.ends_with("cmd") || lower.ends_with("cmd.exe") {
            "/C"
        } else {
            "-c"
        }
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([self.command_flag(), command])
            // The operator's terminal belongs to the agent, not the child
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(&self, command: &str) -> ExecutionOutcome {
        debug!(shell = %self.program, command = %command, "Executing shell command");

        let output = self.build(command).output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command = %command, timeout_ms = limit.as_millis() as u64, "Command timed out");
                    return ExecutionOutcome::launch_failure(format!(
                        "Command timed out after {:.1}s",
                        limit.as_secs_f64()
                    ));
                }
            },
            None => output.await,
        };

        match output {
            Ok(output) => {
                let failed = !output.status.success();
                let exit_code = output.status.code();
                if failed {
                    warn!(command = %command, exit_code = exit_code.unwrap_or(-1), "Command failed");
                }

                ExecutionOutcome {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    failed,
                    exit_code,
                }
            }
            Err(e) => {
                warn!(shell = %self.program, error = %e, "Failed to launch shell");
                ExecutionOutcome::launch_failure(format!("Execution Error: {e}"))
            }
        }
    }
}
