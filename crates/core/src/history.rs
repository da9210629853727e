//! History windowing policies.
//!
//! The [`Conversation`](crate::message::Conversation) log only ever grows.
//! A `HistoryPolicy` decides which suffix of it is replayed to the
//! completion service, without touching the log itself. The loop's control
//! flow is the same whichever policy is plugged in.

use crate::message::{Role, Turn};
use tracing::trace;

/// Strategy for selecting the turns sent with each completion request.
pub trait HistoryPolicy: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Select the turns to replay. Must return a contiguous suffix of `turns`.
    fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn];
}

/// Replay every turn. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl HistoryPolicy for KeepAll {
    fn name(&self) -> &str {
        "keep_all"
    }

    fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        turns
    }
}

/// Replay at most `max_turns` of the most recent turns.
///
/// The window always opens on a user turn so the model never sees an
/// assistant reply without the request it answered.
#[derive(Debug, Clone, Copy)]
pub struct KeepRecent {
    pub max_turns: usize,
}

impl KeepRecent {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }
}

impl HistoryPolicy for KeepRecent {
    fn name(&self) -> &str {
        "keep_recent"
    }

    fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        if self.max_turns == 0 || turns.len() <= self.max_turns {
            return turns;
        }

        let mut start = turns.len() - self.max_turns;
        while start < turns.len() && turns[start].role != Role::User {
            start += 1;
        }

        trace!(
            total = turns.len(),
            dropped = start,
            "History window applied"
        );
        &turns[start..]
    }
}
