//! The agent loop implementation.

use crate::extract::CommandExtractor;
use crate::protocol::{Feedback, Protocol};
use bashpilot_config::AppConfig;
use bashpilot_core::error::{Error, ProviderError};
use bashpilot_core::event::AgentEvent;
use bashpilot_core::executor::CommandExecutor;
use bashpilot_core::history::{HistoryPolicy, KeepAll, KeepRecent};
use bashpilot_core::message::{Conversation, Turn};
use bashpilot_core::operator::Operator;
use bashpilot_core::provider::{Provider, ProviderRequest, Usage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the loop is within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingOperatorInput,
    RequestingCompletion,
    AwaitingConfirmation,
    Executing,
    Exited,
}

/// Per-session knobs, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub streaming: bool,
    /// Replaces the protocol's default system prompt
    pub system_prompt: Option<String>,
    pub protocol: Protocol,
    /// 0 replays the whole conversation
    pub history_max_turns: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            streaming: config.stream,
            system_prompt: config.system_prompt.clone(),
            protocol: Protocol::from_config(&config.protocol),
            history_max_turns: config.history.max_turns,
        }
    }
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Turns in the conversation log
    pub turns: usize,
    pub commands_executed: usize,
    pub commands_declined: usize,
    pub service_errors: usize,
}

/// How a completion request ended.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Text(String),
    /// The service failed, possibly after streaming some text.
    Failed {
        partial: String,
        error: ProviderError,
    },
}

impl CompletionOutcome {
    /// The content recorded as the assistant turn.
    pub fn turn_text(&self) -> String {
        match self {
            CompletionOutcome::Text(text) => text.clone(),
            CompletionOutcome::Failed { partial, error } if partial.is_empty() => {
                format!("Error: {error}")
            }
            CompletionOutcome::Failed { partial, error } => format!("{partial}\nError: {error}"),
        }
    }
}

/// The turn-taking loop between operator, model and shell.
///
/// Owns the conversation log and the feedback pending for the next user
/// turn. Nothing else mutates either.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn CommandExecutor>,

    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    streaming: bool,

    /// Prepended to every request, never stored in the conversation
    system_prompt: String,
    protocol: Protocol,
    extractor: CommandExtractor,
    history: Box<dyn HistoryPolicy>,

    conversation: Conversation,
    feedback: Feedback,
    state: LoopState,
    stats: SessionStats,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn CommandExecutor>,
        settings: LoopSettings,
    ) -> Result<Self, Error> {
        let extractor =
            CommandExtractor::new(&settings.protocol.command_tag).map_err(|e| Error::Config {
                message: format!("invalid command tag '{}': {e}", settings.protocol.command_tag),
            })?;

        let system_prompt = settings
            .system_prompt
            .unwrap_or_else(|| settings.protocol.system_prompt());

        let history: Box<dyn HistoryPolicy> = match settings.history_max_turns {
            0 => Box::new(KeepAll),
            n => Box::new(KeepRecent::new(n)),
        };

        Ok(Self {
            provider,
            executor,
            model: settings.model,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            streaming: settings.streaming,
            system_prompt,
            protocol: settings.protocol,
            extractor,
            history,
            conversation: Conversation::new(),
            feedback: Feedback::None,
            state: LoopState::AwaitingOperatorInput,
            stats: SessionStats::default(),
        })
    }

    /// Build a loop from application config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn CommandExecutor>,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        Self::new(provider, executor, LoopSettings::from_config(config))
    }

    /// Replace the history policy.
    pub fn with_history_policy(mut self, policy: Box<dyn HistoryPolicy>) -> Self {
        self.history = policy;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            turns: self.conversation.len(),
            ..self.stats.clone()
        }
    }

    /// Run iterations until the operator exits.
    ///
    /// Only operator I/O failures end the session early; service and
    /// shell failures are folded into the conversation.
    pub async fn run(&mut self, operator: &mut dyn Operator) -> Result<SessionStats, Error> {
        info!(
            conversation_id = %self.conversation.id,
            provider = self.provider.name(),
            executor = self.executor.name(),
            history = self.history.name(),
            model = %self.model,
            streaming = self.streaming,
            "Session started"
        );
        operator.observe(&AgentEvent::SessionStarted {
            conversation_id: self.conversation.id.to_string(),
            system_prompt: self.system_prompt.clone(),
        });

        while self.step(operator).await? != LoopState::Exited {}

        let stats = self.stats();
        info!(
            conversation_id = %self.conversation.id,
            turns = stats.turns,
            executed = stats.commands_executed,
            declined = stats.commands_declined,
            service_errors = stats.service_errors,
            "Session ended"
        );
        operator.observe(&AgentEvent::Exited { turns: stats.turns });
        Ok(stats)
    }

    /// Run one full iteration: input, completion, and optionally a command.
    ///
    /// Returns the state the loop is left in, either
    /// [`LoopState::AwaitingOperatorInput`] or [`LoopState::Exited`].
    pub async fn step(&mut self, operator: &mut dyn Operator) -> Result<LoopState, Error> {
        if self.state == LoopState::Exited {
            return Ok(LoopState::Exited);
        }
        self.transition(LoopState::AwaitingOperatorInput);

        let Some(input) = operator.read_input().await? else {
            debug!("Operator input closed");
            return Ok(self.transition(LoopState::Exited));
        };
        if self.protocol.is_exit(&input) {
            return Ok(self.transition(LoopState::Exited));
        }

        let content = self.protocol.user_turn(&input, &self.feedback);
        self.conversation.push(Turn::user(content));
        self.feedback = Feedback::None;

        self.transition(LoopState::RequestingCompletion);
        let outcome = self.request_completion(operator).await;
        self.conversation.push(Turn::assistant(outcome.turn_text()));

        self.transition(LoopState::AwaitingConfirmation);
        let command = match &outcome {
            CompletionOutcome::Text(text) => self.extractor.extract(text),
            CompletionOutcome::Failed { .. } => None,
        };
        let Some(command) = command.filter(|c| !c.is_empty()) else {
            operator.observe(&AgentEvent::NoCommand);
            return Ok(self.transition(LoopState::AwaitingOperatorInput));
        };

        info!(command = %command, "Command proposed");
        operator.observe(&AgentEvent::CommandProposed {
            command: command.clone(),
        });
        // EOF while confirming is a decline
        let approved = operator
            .confirm(&command)
            .await?
            .as_deref()
            .is_some_and(Protocol::is_approval);

        self.transition(LoopState::Executing);
        if approved {
            let outcome = self.executor.execute(&command).await;
            let output = outcome.feedback_text();
            debug!(
                command = %command,
                failed = outcome.failed,
                exit_code = ?outcome.exit_code,
                bytes = output.len(),
                "Command finished"
            );
            operator.observe(&AgentEvent::ExecutionFinished {
                command,
                output,
                success: !outcome.failed,
            });
            self.stats.commands_executed += 1;
            self.feedback = Feedback::Executed(outcome);
        } else {
            info!(command = %command, "Command declined");
            operator.observe(&AgentEvent::ExecutionCancelled {
                command,
                notice: self.protocol.cancellation_notice.clone(),
            });
            self.stats.commands_declined += 1;
            self.feedback = Feedback::Declined;
        }

        Ok(self.transition(LoopState::AwaitingOperatorInput))
    }

    fn transition(&mut self, next: LoopState) -> LoopState {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Loop state");
        }
        self.state = next;
        next
    }

    /// The system turn followed by the history window.
    fn build_request(&self) -> ProviderRequest {
        let window = self.history.select(self.conversation.turns());
        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(Turn::system(self.system_prompt.as_str()));
        messages.extend_from_slice(window);

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: self.streaming,
        }
    }

    async fn request_completion(&mut self, operator: &mut dyn Operator) -> CompletionOutcome {
        let request = self.build_request();
        debug!(
            conversation_id = %self.conversation.id,
            messages = request.messages.len(),
            streaming = request.stream,
            "Requesting completion"
        );

        if self.streaming {
            return self.stream_completion(request, operator).await;
        }

        match self.provider.complete(request).await {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    log_usage(&response.model, usage);
                }
                let text = response.message.content;
                operator.observe(&AgentEvent::ResponseComplete {
                    content: text.clone(),
                });
                CompletionOutcome::Text(text)
            }
            Err(e) => self.service_error(String::new(), e, operator),
        }
    }

    async fn stream_completion(
        &mut self,
        request: ProviderRequest,
        operator: &mut dyn Operator,
    ) -> CompletionOutcome {
        let mut rx = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return self.service_error(String::new(), e, operator),
        };

        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                        operator.observe(&AgentEvent::Chunk {
                            content: content.clone(),
                        });
                        text.push_str(&content);
                    }
                    if let Some(usage) = &chunk.usage {
                        log_usage(&self.model, usage);
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => return self.service_error(text, e, operator),
            }
        }

        operator.observe(&AgentEvent::ResponseComplete {
            content: text.clone(),
        });
        CompletionOutcome::Text(text)
    }

    fn service_error(
        &mut self,
        partial: String,
        error: ProviderError,
        operator: &mut dyn Operator,
    ) -> CompletionOutcome {
        warn!(
            provider = self.provider.name(),
            partial_bytes = partial.len(),
            error = %error,
            "Completion failed"
        );
        self.stats.service_errors += 1;
        operator.observe(&AgentEvent::ServiceError {
            message: error.to_string(),
        });
        CompletionOutcome::Failed { partial, error }
    }
}

fn log_usage(model: &str, usage: &Usage) {
    info!(
        model = %model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "Token usage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bashpilot_core::error::OperatorError;
    use bashpilot_core::executor::ExecutionOutcome;
    use bashpilot_core::message::Role;
    use bashpilot_core::provider::{ChunkReceiver, ProviderResponse, StreamChunk};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    enum Reply {
        Text(&'static str),
        Fail(ProviderError),
        /// Stream the text, then fail
        Interrupt(&'static str, ProviderError),
    }

    /// Replays scripted replies and records every request.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, request: ProviderRequest) -> Reply {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Text("(no more replies)"))
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn usage() -> Usage {
        Usage {
            prompt_tokens: 12,
            completion_tokens: 4,
            total_tokens: 16,
        }
    }

    fn fragments(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(3).map(|c| c.iter().collect()).collect()
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            match self.next(request) {
                Reply::Text(text) => Ok(ProviderResponse {
                    message: Turn::assistant(text),
                    usage: Some(usage()),
                    model: "scripted-model".into(),
                }),
                Reply::Fail(e) | Reply::Interrupt(_, e) => Err(e),
            }
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            let (tx, rx) = mpsc::channel(256);
            match self.next(request) {
                Reply::Text(text) => {
                    for piece in fragments(text) {
                        tx.try_send(Ok(StreamChunk::text(piece))).unwrap();
                    }
                    tx.try_send(Ok(StreamChunk::done(Some(usage())))).unwrap();
                }
                Reply::Fail(e) => return Err(e),
                Reply::Interrupt(text, e) => {
                    for piece in fragments(text) {
                        tx.try_send(Ok(StreamChunk::text(piece))).unwrap();
                    }
                    tx.try_send(Err(e)).unwrap();
                }
            }
            Ok(rx)
        }
    }

    /// Answers prompts from a script; EOF once the script runs out.
    #[derive(Default)]
    struct ScriptedOperator {
        inputs: VecDeque<String>,
        replies: VecDeque<String>,
        confirmed: Vec<String>,
        events: Vec<AgentEvent>,
        fail_reads: bool,
    }

    impl ScriptedOperator {
        fn new(inputs: &[&str], replies: &[&str]) -> Self {
            Self {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                replies: replies.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn event_types(&self) -> Vec<&'static str> {
            self.events.iter().map(AgentEvent::event_type).collect()
        }
    }

    #[async_trait::async_trait]
    impl Operator for ScriptedOperator {
        async fn read_input(&mut self) -> Result<Option<String>, OperatorError> {
            if self.fail_reads {
                return Err(OperatorError::Read("terminal gone".into()));
            }
            Ok(self.inputs.pop_front())
        }

        async fn confirm(&mut self, command: &str) -> Result<Option<String>, OperatorError> {
            self.confirmed.push(command.to_string());
            Ok(self.replies.pop_front())
        }

        fn observe(&mut self, event: &AgentEvent) {
            self.events.push(event.clone());
        }
    }

    /// Records commands instead of running them.
    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for RecordingExecutor {
        fn name(&self) -> &str {
            "recording"
        }

        async fn execute(&self, command: &str) -> ExecutionOutcome {
            self.commands.lock().unwrap().push(command.to_string());
            ExecutionOutcome {
                stdout: format!("output of {command}\n"),
                ..ExecutionOutcome::default()
            }
        }
    }

    fn agent(
        provider: &Arc<ScriptedProvider>,
        executor: &Arc<RecordingExecutor>,
        streaming: bool,
    ) -> AgentLoop {
        let settings = LoopSettings {
            streaming,
            ..LoopSettings::default()
        };
        AgentLoop::new(provider.clone(), executor.clone(), settings).unwrap()
    }

    fn contents(agent: &AgentLoop) -> Vec<String> {
        agent
            .conversation()
            .turns()
            .iter()
            .map(|t| t.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn exit_sends_no_request() {
        for token in ["exit", "EXIT", "  Exit  "] {
            let provider = ScriptedProvider::new(vec![]);
            let executor = Arc::new(RecordingExecutor::default());
            let mut op = ScriptedOperator::new(&[token], &[]);
            let mut agent = agent(&provider, &executor, true);

            let stats = agent.run(&mut op).await.unwrap();

            assert!(provider.requests().is_empty());
            assert!(agent.conversation().is_empty());
            assert_eq!(agent.state(), LoopState::Exited);
            assert_eq!(stats, SessionStats::default());
        }
    }

    #[tokio::test]
    async fn eof_on_input_exits() {
        let provider = ScriptedProvider::new(vec![Reply::Text("hello")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["hi"], &[]);
        let mut agent = agent(&provider, &executor, false);

        let stats = agent.run(&mut op).await.unwrap();
        assert_eq!(stats.turns, 2);
        assert_eq!(op.events.last(), Some(&AgentEvent::Exited { turns: 2 }));
    }

    #[tokio::test]
    async fn conversation_alternates_user_and_assistant() {
        let provider = ScriptedProvider::new(vec![
            Reply::Text("one"),
            Reply::Text("two"),
            Reply::Text("three"),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["a", "b", "c", "exit"], &[]);
        let mut agent = agent(&provider, &executor, false);

        agent.run(&mut op).await.unwrap();

        let turns = agent.conversation().turns();
        assert_eq!(turns.len(), 6);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
        assert!(turns.iter().all(|t| t.role != Role::System));
    }

    #[tokio::test]
    async fn every_request_starts_with_single_system_turn() {
        let provider = ScriptedProvider::new(vec![Reply::Text("one"), Reply::Text("two")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["a", "b", "exit"], &[]);
        let mut agent = agent(&provider, &executor, true);

        agent.run(&mut op).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.messages[0].role, Role::System);
            assert_eq!(request.messages[0].content, agent.system_prompt());
            assert_eq!(
                request.messages.iter().filter(|m| m.role == Role::System).count(),
                1
            );
            assert_eq!(request.max_tokens, Some(150));
            assert_eq!(request.model, "gpt-4o");
            assert!(request.stream);
        }
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn session_start_shows_system_prompt() {
        let provider = ScriptedProvider::new(vec![]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["exit"], &[]);
        let settings = LoopSettings {
            system_prompt: Some("Be terse.".into()),
            ..LoopSettings::default()
        };
        let mut agent = AgentLoop::new(provider.clone(), executor.clone(), settings).unwrap();

        agent.run(&mut op).await.unwrap();

        match &op.events[0] {
            AgentEvent::SessionStarted { system_prompt, .. } => {
                assert_eq!(system_prompt, "Be terse.")
            }
            other => panic!("unexpected first event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_command_skips_confirmation() {
        let provider = ScriptedProvider::new(vec![
            Reply::Text("You can use ls for that."),
            Reply::Text("ok"),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["how do I list files?", "thanks", "exit"], &[]);
        let mut agent = agent(&provider, &executor, false);

        agent.run(&mut op).await.unwrap();

        assert!(op.confirmed.is_empty());
        assert!(executor.commands().is_empty());
        assert_eq!(contents(&agent)[2], "<user_input>thanks</user_input>");
        assert_eq!(agent.feedback(), &Feedback::None);
    }

    #[tokio::test]
    async fn empty_command_skips_confirmation() {
        let provider = ScriptedProvider::new(vec![Reply::Text("<bash>   </bash>")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["do nothing", "exit"], &[]);
        let mut agent = agent(&provider, &executor, true);

        agent.run(&mut op).await.unwrap();

        assert!(op.confirmed.is_empty());
        assert!(executor.commands().is_empty());
        assert!(op.event_types().contains(&"no_command"));
    }

    #[tokio::test]
    async fn approved_output_feeds_next_turn() {
        let provider = ScriptedProvider::new(vec![
            Reply::Text("Let me check.\n<bash>ls</bash>"),
            Reply::Text("Two files."),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["list files", "and?", "exit"], &[""]);
        let mut agent = agent(&provider, &executor, false);

        let stats = agent.run(&mut op).await.unwrap();

        assert_eq!(op.confirmed, vec!["ls"]);
        assert_eq!(executor.commands(), vec!["ls"]);
        assert_eq!(
            contents(&agent)[2],
            "<execution_result>output of ls\n</execution_result>\n\n<user_input>and?</user_input>"
        );
        // The next request replays the output to the model
        let second = &provider.requests()[1];
        assert!(second.messages.last().unwrap().content.contains("output of ls"));
        assert_eq!(stats.commands_executed, 1);
        assert_eq!(stats.commands_declined, 0);
    }

    #[tokio::test]
    async fn decline_never_executes() {
        let provider = ScriptedProvider::new(vec![
            Reply::Text("<bash>rm -rf build</bash>"),
            Reply::Text("Understood."),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["clean up", "leave it", "exit"], &["n"]);
        let mut agent = agent(&provider, &executor, true);

        let stats = agent.run(&mut op).await.unwrap();

        assert!(executor.commands().is_empty());
        assert_eq!(
            contents(&agent)[2],
            "<execution_result>Command execution cancelled.</execution_result>\n\n\
             <user_input>leave it</user_input>"
        );
        assert!(op.events.contains(&AgentEvent::ExecutionCancelled {
            command: "rm -rf build".into(),
            notice: "Command execution cancelled.".into(),
        }));
        assert_eq!(stats.commands_declined, 1);
    }

    #[tokio::test]
    async fn eof_on_confirmation_declines() {
        let provider = ScriptedProvider::new(vec![Reply::Text("<bash>reboot</bash>")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["restart"], &[]);
        let mut agent = agent(&provider, &executor, false);

        agent.run(&mut op).await.unwrap();

        assert_eq!(op.confirmed, vec!["reboot"]);
        assert!(executor.commands().is_empty());
        assert_eq!(agent.feedback(), &Feedback::Declined);
    }

    #[tokio::test]
    async fn only_first_command_runs() {
        let provider = ScriptedProvider::new(vec![Reply::Text(
            "<bash>pwd</bash> and then <bash>ls</bash>",
        )]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["where am I", "exit"], &["y"]);
        let mut agent = agent(&provider, &executor, true);

        agent.run(&mut op).await.unwrap();

        assert_eq!(executor.commands(), vec!["pwd"]);
    }

    #[tokio::test]
    async fn service_error_becomes_assistant_text() {
        let provider = ScriptedProvider::new(vec![
            Reply::Fail(ProviderError::Network("connection reset".into())),
            Reply::Text("back online"),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["hi", "again", "exit"], &[]);
        let mut agent = agent(&provider, &executor, false);

        let stats = agent.run(&mut op).await.unwrap();

        let turns = contents(&agent);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[1], "Error: Network error: connection reset");
        assert_eq!(turns[3], "back online");
        assert!(op.confirmed.is_empty());
        assert!(op.event_types().contains(&"service_error"));
        assert_eq!(stats.service_errors, 1);
    }

    #[tokio::test]
    async fn error_text_containing_tags_is_not_executed() {
        let provider = ScriptedProvider::new(vec![Reply::Fail(ProviderError::ApiError {
            status_code: 400,
            message: "bad input near <bash>ls</bash>".into(),
        })]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["hi", "exit"], &[]);
        let mut agent = agent(&provider, &executor, false);

        agent.run(&mut op).await.unwrap();

        assert!(op.confirmed.is_empty());
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn interrupted_stream_keeps_partial_text() {
        let provider = ScriptedProvider::new(vec![Reply::Interrupt(
            "<bash>ls</bash>",
            ProviderError::StreamInterrupted("reset".into()),
        )]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["list", "exit"], &[]);
        let mut agent = agent(&provider, &executor, true);

        agent.run(&mut op).await.unwrap();

        assert_eq!(
            contents(&agent)[1],
            "<bash>ls</bash>\nError: Stream interrupted: reset"
        );
        assert!(op.confirmed.is_empty());
        assert!(!op.event_types().contains(&"response_complete"));
    }

    #[tokio::test]
    async fn streaming_and_atomic_record_same_conversation() {
        let script = || {
            vec![
                Reply::Text("Sure: <bash>ls -la</bash>"),
                Reply::Text("Done, nothing else to do."),
            ]
        };
        let inputs = ["list everything", "thanks", "exit"];

        let mut logs = Vec::new();
        for streaming in [true, false] {
            let provider = ScriptedProvider::new(script());
            let executor = Arc::new(RecordingExecutor::default());
            let mut op = ScriptedOperator::new(&inputs, &["yes"]);
            let mut agent = agent(&provider, &executor, streaming);
            agent.run(&mut op).await.unwrap();
            logs.push((contents(&agent), executor.commands()));
        }

        assert_eq!(logs[0], logs[1]);
    }

    #[tokio::test]
    async fn streamed_chunks_precede_command_proposal() {
        let provider = ScriptedProvider::new(vec![Reply::Text("<bash>date</bash>")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["time?", "exit"], &["n"]);
        let mut agent = agent(&provider, &executor, true);

        agent.run(&mut op).await.unwrap();

        let types = op.event_types();
        let complete = types.iter().position(|t| *t == "response_complete").unwrap();
        let proposed = types.iter().position(|t| *t == "command_proposed").unwrap();
        assert!(complete < proposed);
        assert!(types[..complete].iter().filter(|t| **t == "chunk").count() > 1);

        let streamed: String = op
            .events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "<bash>date</bash>");
    }

    #[tokio::test]
    async fn history_window_limits_request() {
        let provider = ScriptedProvider::new(vec![
            Reply::Text("one"),
            Reply::Text("two"),
            Reply::Text("three"),
        ]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["a", "b", "c", "exit"], &[]);
        let settings = LoopSettings {
            history_max_turns: 2,
            ..LoopSettings::default()
        };
        let mut agent = AgentLoop::new(provider.clone(), executor.clone(), settings).unwrap();

        agent.run(&mut op).await.unwrap();

        let last = provider.requests().pop().unwrap();
        assert_eq!(last.messages.len(), 2);
        assert_eq!(last.messages[0].role, Role::System);
        assert_eq!(last.messages[1].content, "<user_input>c</user_input>");
        // The log itself is never trimmed
        assert_eq!(agent.conversation().len(), 6);
    }

    #[tokio::test]
    async fn custom_history_policy() {
        struct LastOnly;
        impl HistoryPolicy for LastOnly {
            fn name(&self) -> &str {
                "last_only"
            }
            fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
                &turns[turns.len().saturating_sub(1)..]
            }
        }

        let provider = ScriptedProvider::new(vec![Reply::Text("one"), Reply::Text("two")]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["a", "b", "exit"], &[]);
        let mut agent = agent(&provider, &executor, false).with_history_policy(Box::new(LastOnly));

        agent.run(&mut op).await.unwrap();

        assert!(provider.requests().iter().all(|r| r.messages.len() == 2));
    }

    #[tokio::test]
    async fn operator_failure_ends_session() {
        let provider = ScriptedProvider::new(vec![]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator {
            fail_reads: true,
            ..ScriptedOperator::default()
        };
        let mut agent = agent(&provider, &executor, true);

        let err = agent.run(&mut op).await.unwrap_err();
        assert!(matches!(err, Error::Operator(OperatorError::Read(_))));
    }

    #[tokio::test]
    async fn step_after_exit_is_noop() {
        let provider = ScriptedProvider::new(vec![]);
        let executor = Arc::new(RecordingExecutor::default());
        let mut op = ScriptedOperator::new(&["exit", "hello"], &[]);
        let mut agent = agent(&provider, &executor, true);

        assert_eq!(agent.step(&mut op).await.unwrap(), LoopState::Exited);
        assert_eq!(agent.step(&mut op).await.unwrap(), LoopState::Exited);
        assert_eq!(op.inputs.len(), 1);
    }

    #[test]
    fn failed_outcome_text() {
        let outcome = CompletionOutcome::Failed {
            partial: String::new(),
            error: ProviderError::Timeout("30s".into()),
        };
        assert_eq!(outcome.turn_text(), "Error: Request timed out: 30s");
    }
}
