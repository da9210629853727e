//! Operator channels for bashpilot.
//!
//! A channel connects the agent loop to the human operator. Channels are
//! trait-based (`bashpilot_core::Operator`), so the loop does not care
//! where the operator sits.
//!
//! Available channels:
//! - **CLI**: line-oriented terminal chat (stdin/stdout)

pub mod cli;

pub use cli::{CliOperator, TerminalOperator};
