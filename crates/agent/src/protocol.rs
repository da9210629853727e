//! The tagged-text turn protocol.
//!
//! Commands travel model → operator inside the command tag. Their output
//! travels back inside the result tag of the *next* user turn, ahead of
//! the operator's own words in the user tag.

use bashpilot_config::ProtocolConfig;
use bashpilot_core::executor::ExecutionOutcome;

/// What the previous iteration leaves for the next user turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Feedback {
    /// Nothing ran: no command, an empty command, or a service error.
    #[default]
    None,
    /// An approved command ran.
    Executed(ExecutionOutcome),
    /// The operator declined the proposed command.
    Declined,
}

impl Feedback {
    /// The text carried in the result tag, if any.
    pub fn text(&self, cancellation_notice: &str) -> Option<String> {
        match self {
            Feedback::None => None,
            Feedback::Executed(outcome) => Some(outcome.feedback_text()),
            Feedback::Declined => Some(cancellation_notice.to_string()),
        }
    }
}

/// Tags and control tokens in effect for one session.
#[derive(Debug, Clone)]
pub struct Protocol {
    pub command_tag: String,
    pub result_tag: String,
    pub user_tag: String,
    pub exit_token: String,
    pub cancellation_notice: String,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

impl Protocol {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            command_tag: config.command_tag.clone(),
            result_tag: config.result_tag.clone(),
            user_tag: config.user_tag.clone(),
            exit_token: config.exit_token.clone(),
            cancellation_notice: config.cancellation_notice.clone(),
        }
    }

    /// Whether operator input ends the session.
    pub fn is_exit(&self, input: &str) -> bool {
        input.trim().eq_ignore_ascii_case(&self.exit_token)
    }

    /// Whether a confirmation reply approves the command.
    ///
    /// Approval is the default: an empty reply runs the command.
    pub fn is_approval(reply: &str) -> bool {
        let reply = reply.trim();
        reply.is_empty() || reply.eq_ignore_ascii_case("y") || reply.eq_ignore_ascii_case("yes")
    }

    /// Build the user turn content from operator input and pending feedback.
    pub fn user_turn(&self, input: &str, feedback: &Feedback) -> String {
        let user = wrap(&self.user_tag, input.trim());
        match feedback.text(&self.cancellation_notice) {
            Some(result) => format!("{}\n\n{user}", wrap(&self.result_tag, &result)),
            None => user,
        }
    }

    /// The default system prompt, phrased around this protocol's tags.
    pub fn system_prompt(&self) -> String {
        let cmd = &self.command_tag;
        format!(
            "You are a command-line assistant with access to the operator's shell. \
             To run something, reply with exactly one shell command wrapped in \
             <{cmd}></{cmd}> tags, for example <{cmd}>ls -la</{cmd}>. Only the first \
             tagged command in a reply is considered.\n\n\
             The operator approves every command before it runs. On the next turn \
             you receive its output inside <{result}></{result}> tags, followed by \
             the operator's message inside <{user}></{user}> tags. A declined command \
             comes back as \"{notice}\".\n\n\
             Commands run non-interactively with no standard input, so prefer ones \
             that finish on their own. When you know how to do something, do it: \
             propose the next command with as little prose as possible.",
            result = self.result_tag,
            user = self.user_tag,
            notice = self.cancellation_notice,
        )
    }
}

fn wrap(tag: &str, body: &str) -> String {
    format!("<{tag}>{body}</{tag}>")
}
