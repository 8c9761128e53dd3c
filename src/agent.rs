use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{Backend, ChatOptions};
use crate::approval::{ApprovalGate, ApprovalRequest};
use crate::config::Settings;
use crate::tools::{self, Permissions, ToolExecutor};
use crate::types::{ChatMessage, Role};

/// Hard ceiling on backend round-trips per user turn, so a model that never
/// stops requesting tools still terminates.
pub const MAX_AGENT_ROUNDS: usize = 12;

const DENIED_PAYLOAD: &str = r#"{"error":"Denied by user"}"#;

const AGENT_INSTRUCTIONS: &str = "You may use the provided tools to inspect and modify the local project.\n\
- Prefer reading files (read_file) before making changes.\n\
- When editing, use write_file with the full updated file content.\n\
- If you need to run tests or git commands, use run_command.\n\
- Be explicit and safe: only change what the user asked for.";

/// Stream of updates a surface renders while a turn is in flight. Approval
/// requests travel the same channel; the loop blocks on their response, so
/// at most one tool call ever awaits human input at a time.
#[derive(Debug)]
pub enum SessionEvent {
    AssistantText(String),
    ToolSummary(String),
    ApprovalRequest(ApprovalRequest),
}

/// How a user turn ended. Cancellation and round-limit exhaustion are
/// expected outcomes, reported distinctly. They are not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answer(String),
    RoundLimit,
    Canceled,
}

impl TurnOutcome {
    pub fn display_text(&self) -> &str {
        match self {
            TurnOutcome::Answer(text) => text,
            TurnOutcome::RoundLimit => "Stopped after too many tool calls.",
            TurnOutcome::Canceled => "Canceled.",
        }
    }
}

/// One open conversation. Owns its history (sole writer), the approval
/// state and the backend; all of it is torn down together when the session
/// closes; nothing here is process-global.
pub struct ChatSession {
    settings: Settings,
    backend: Backend,
    executor: ToolExecutor,
    gate: ApprovalGate,
    history: Vec<ChatMessage>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

impl ChatSession {
    pub fn new(
        settings: Settings,
        backend: Backend,
        executor: ToolExecutor,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            settings,
            backend,
            executor,
            gate: ApprovalGate::new(),
            history: Vec::new(),
            events,
            cancel: CancellationToken::new(),
        };
        (session, events_rx)
    }

    /// Token for cooperative cancellation. Polled between loop rounds, not
    /// mid-call: an in-progress tool execution always completes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Replace (or create) the leading system turn, the single permitted
    /// in-place mutation of the history.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }
        match self.history.first_mut() {
            Some(first) if first.role == Role::System => {
                if first.content_str() != prompt {
                    *first = ChatMessage::system(prompt);
                }
            }
            _ => self.history.insert(0, ChatMessage::system(prompt)),
        }
    }

    /// Combine the typed message with an optional editor selection.
    pub fn compose_user_prompt(text: &str, selection: Option<&str>) -> String {
        let text = text.trim();
        match selection.map(str::trim).filter(|s| !s.is_empty()) {
            Some(selection) => format!("{text}\n\nContext:\n```\n{selection}\n```"),
            None => text.to_string(),
        }
    }

    /// Submit one user message and drive it to completion.
    pub async fn send(&mut self, text: String) -> Result<TurnOutcome> {
        let system_prompt = self.settings.system_prompt.clone();
        self.set_system_prompt(&system_prompt);

        let permissions = Permissions::from_settings(&self.settings);
        let tools = if self.backend.supports_tools() {
            tools::catalog(&permissions)
        } else {
            Vec::new()
        };
        self.ensure_agent_instructions(!tools.is_empty());

        self.history.push(ChatMessage::user(text));

        if tools.is_empty() {
            self.single_shot().await
        } else {
            self.agent_loop(&tools).await
        }
    }

    /// No-tools path: one backend call, its content is the final answer.
    async fn single_shot(&mut self) -> Result<TurnOutcome> {
        let reply = self
            .backend
            .chat(&self.history, None, &ChatOptions::default())
            .await?;
        let answer = reply.content_str().to_string();
        self.history.push(reply);
        self.emit(SessionEvent::AssistantText(answer.clone()));
        Ok(TurnOutcome::Answer(answer))
    }

    async fn agent_loop(&mut self, tools: &[crate::types::ToolDefinition]) -> Result<TurnOutcome> {
        let mut rounds = 0;

        while rounds < MAX_AGENT_ROUNDS && !self.cancel.is_cancelled() {
            let reply = self
                .backend
                .chat(&self.history, Some(tools), &ChatOptions::default())
                .await?;
            let tool_calls = reply.tool_calls.clone().unwrap_or_default();
            let answer = reply.content_str().to_string();
            self.history.push(reply);

            if tool_calls.is_empty() {
                self.emit(SessionEvent::AssistantText(answer.clone()));
                return Ok(TurnOutcome::Answer(answer));
            }

            // Strictly sequential, in returned order: later calls in the
            // same turn may depend on earlier calls' filesystem effects.
            for call in &tool_calls {
                let approved = self
                    .gate
                    .decide(&call.function.name, &call.function.arguments, &self.events)
                    .await;

                if !approved {
                    self.history
                        .push(ChatMessage::tool_result(&call.id, DENIED_PAYLOAD));
                    self.emit(SessionEvent::ToolSummary(format!(
                        "Denied: {}",
                        ToolExecutor::describe(call)
                    )));
                    continue;
                }

                let execution = self.executor.execute(call).await?;
                self.history.push(ChatMessage::tool_result(
                    &call.id,
                    &execution.tool_response_json,
                ));
                self.emit(SessionEvent::ToolSummary(execution.user_summary));
            }

            rounds += 1;
        }

        if self.cancel.is_cancelled() {
            tracing::debug!("agent turn canceled after {rounds} rounds");
            Ok(TurnOutcome::Canceled)
        } else {
            tracing::warn!("agent turn stopped at the {MAX_AGENT_ROUNDS}-round limit");
            Ok(TurnOutcome::RoundLimit)
        }
    }

    /// Keep the fixed tool-usage instruction turn in sync with whether a
    /// catalog is active this turn. Idempotent.
    fn ensure_agent_instructions(&mut self, enabled: bool) {
        let existing = self
            .history
            .iter()
            .position(|m| m.role == Role::System && m.content_str() == AGENT_INSTRUCTIONS);

        if !enabled {
            if let Some(index) = existing {
                self.history.remove(index);
            }
            return;
        }
        if existing.is_some() {
            return;
        }

        let insert_index = match self.history.first() {
            Some(first) if first.role == Role::System => 1,
            _ => 0,
        };
        self.history
            .insert(insert_index, ChatMessage::system(AGENT_INSTRUCTIONS));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
