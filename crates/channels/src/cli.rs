//! CLI channel — interactive terminal operator.
//!
//! Reads one line per prompt and renders loop events as plain text.
//! Generic over its reader and writer so it can be driven from memory in
//! tests; [`CliOperator`] is the stdin/stdout instantiation.

use async_trait::async_trait;
use bashpilot_core::error::OperatorError;
use bashpilot_core::event::AgentEvent;
use bashpilot_core::operator::Operator;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::trace;

/// The terminal operator on the process's own stdin/stdout.
pub type CliOperator = TerminalOperator<BufReader<Stdin>, std::io::Stdout>;

/// A line-oriented operator over any async reader and sync writer.
pub struct TerminalOperator<R, W> {
    reader: R,
    out: W,
    /// A streamed response is mid-print
    responding: bool,
}

impl CliOperator {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R, W> TerminalOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(reader: R, out: W) -> Self {
        Self {
            reader,
            out,
            responding: false,
        }
    }

    /// Consume the operator, returning its writer.
    pub fn into_writer(self) -> W {
        self.out
    }

    /// Print `prompt` without a newline and read one line.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; `None` means EOF.
    async fn prompt_line(&mut self, prompt: &str) -> Result<Option<String>, OperatorError> {
        write!(self.out, "{prompt}").map_err(|e| OperatorError::Write(e.to_string()))?;
        self.out
            .flush()
            .map_err(|e| OperatorError::Write(e.to_string()))?;

        let mut raw = Vec::new();
        let n = self.reader.read_until(b'\n', &mut raw).await?;
        trace!(eof = n == 0, bytes = n, "Operator line read");
        if n == 0 {
            return Ok(None);
        }

        if raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") {
                raw.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
    }

    fn render(&mut self, event: &AgentEvent) -> std::io::Result<()> {
        match event {
            AgentEvent::SessionStarted { system_prompt, .. } => {
                writeln!(self.out, "System: {system_prompt}\n")?;
            }
            AgentEvent::Chunk { content } => {
                if !self.responding {
                    write!(self.out, "Assistant: ")?;
                    self.responding = true;
                }
                write!(self.out, "{content}")?;
            }
            AgentEvent::ResponseComplete { content } => {
                if self.responding {
                    writeln!(self.out, "\n")?;
                } else {
                    writeln!(self.out, "Assistant: {content}\n")?;
                }
                self.responding = false;
            }
            AgentEvent::ServiceError { message } => {
                if self.responding {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "[Error] {message}\n")?;
                self.responding = false;
            }
            AgentEvent::CommandProposed { command } => {
                writeln!(self.out, "Suggested command: {command}")?;
            }
            AgentEvent::NoCommand => {}
            AgentEvent::ExecutionFinished { output, success, .. } => {
                let label = if *success { "Execution result" } else { "Execution failed" };
                writeln!(self.out, "{label}:\n{}\n", output.trim_end())?;
            }
            AgentEvent::ExecutionCancelled { notice, .. } => {
                writeln!(self.out, "{notice}\n")?;
            }
            // The session ends silently after the last prompt
            AgentEvent::Exited { .. } => {}
        }
        self.out.flush()
    }
}

#[async_trait]
impl<R, W> Operator for TerminalOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn read_input(&mut self) -> Result<Option<String>, OperatorError> {
        self.prompt_line("You: ").await
    }

    async fn confirm(&mut self, _command: &str) -> Result<Option<String>, OperatorError> {
        self.prompt_line("Execute this command? ([y]/n): ").await
    }

    fn observe(&mut self, event: &AgentEvent) {
        // A broken stdout must not take the session down mid-turn
        if let Err(e) = self.render(event) {
            trace!(error = %e, event = event.event_type(), "Failed to render event");
        }
    }
}
