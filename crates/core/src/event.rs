//! Loop events surfaced to the operator.
//!
//! `AgentEvent` is what the agent loop tells its [`Operator`](crate::Operator)
//! as a turn progresses. While a streaming response is arriving the
//! operator sees `Chunk` events; `ResponseComplete` marks the end of the
//! response, and only then can `CommandProposed` or `NoCommand` follow.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop, in order, within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A session began with the given system prompt.
    SessionStarted {
        conversation_id: String,
        system_prompt: String,
    },

    /// Partial text from a streaming completion.
    Chunk { content: String },

    /// The assistant response is complete and has been appended.
    ResponseComplete { content: String },

    /// The completion service failed; the error text was appended instead.
    ServiceError { message: String },

    /// The model proposed a command; confirmation follows.
    CommandProposed { command: String },

    /// The response carried no runnable command.
    NoCommand,

    /// An approved command ran.
    ExecutionFinished {
        command: String,
        output: String,
        success: bool,
    },

    /// The operator declined a proposed command.
    ExecutionCancelled { command: String, notice: String },

    /// The session ended.
    Exited { turns: usize },
}

impl AgentEvent {
    /// Stable event name, for logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::Chunk { .. } => "chunk",
            Self::ResponseComplete { .. } => "response_complete",
            Self::ServiceError { .. } => "service_error",
            Self::CommandProposed { .. } => "command_proposed",
            Self::NoCommand => "no_command",
            Self::ExecutionFinished { .. } => "execution_finished",
            Self::ExecutionCancelled { .. } => "execution_cancelled",
            Self::Exited { .. } => "exited",
        }
    }
}
