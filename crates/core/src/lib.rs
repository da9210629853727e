//! # bashpilot Core
//!
//! Domain types, traits, and error definitions for the bashpilot shell agent.
//! This crate has **no I/O of its own**: it defines the turn log, the
//! completion-service and executor seams, and the operator interface that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the language-model completion service
//! - [`CommandExecutor`]: the shell the approved command runs in
//! - [`Operator`]: the human in the loop
//!
//! The agent loop only ever sees these traits, so tests drive it with
//! scripted implementations and the binary wires in real ones.

pub mod error;
pub mod event;
pub mod executor;
pub mod history;
pub mod message;
pub mod operator;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, OperatorError, ProviderError, Result};
pub use event::AgentEvent;
pub use executor::{CommandExecutor, ExecutionOutcome};
pub use history::{HistoryPolicy, KeepAll, KeepRecent};
pub use message::{Conversation, ConversationId, Role, Turn};
pub use operator::Operator;
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
