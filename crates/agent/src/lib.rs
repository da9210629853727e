//! The turn-taking agent loop at the heart of bashpilot.
//!
//! Every turn follows a **Propose → Confirm → Execute → Observe** cycle:
//!
//! 1. **Read** an instruction from the operator
//! 2. **Build the user turn**, carrying the previous command's output
//! 3. **Ask the model**, streaming or atomically, with the system prompt prepended
//! 4. **Extract** at most one tagged command from the reply
//! 5. **Confirm** it with the operator, then **execute** it or record the decline
//!
//! The cycle repeats until the operator types the exit token.

pub mod extract;
pub mod loop_runner;
pub mod protocol;

pub use extract::CommandExtractor;
pub use loop_runner::{AgentLoop, CompletionOutcome, LoopSettings, LoopState, SessionStats};
pub use protocol::{Feedback, Protocol};
