//! Operator trait — the abstraction over the human in the loop.
//!
//! An Operator supplies the free-text instruction for each turn, answers
//! the confirmation prompt for every proposed command, and observes what
//! the loop does. The terminal implementation lives in `bashpilot-channels`;
//! tests use scripted ones.

use crate::error::OperatorError;
use crate::event::AgentEvent;
use async_trait::async_trait;

/// The human driving a session.
///
/// Calls are strictly sequential: the loop never has two of them in flight.
#[async_trait]
pub trait Operator: Send {
    /// Read the next instruction line.
    ///
    /// `Ok(None)` means input is closed (e.g. Ctrl+D) and ends the session.
    async fn read_input(&mut self) -> std::result::Result<Option<String>, OperatorError>;

    /// Show `command` and read the operator's raw reply.
    ///
    /// The loop interprets the reply; `Ok(None)` is treated as a decline.
    async fn confirm(&mut self, command: &str)
    -> std::result::Result<Option<String>, OperatorError>;

    /// Surface something the loop did.
    fn observe(&mut self, event: &AgentEvent);
}
