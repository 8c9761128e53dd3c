pub mod agent;
pub mod api;
pub mod approval;
pub mod config;
pub mod inline;
pub mod notify;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{ChatSession, SessionEvent, TurnOutcome, MAX_AGENT_ROUNDS};
pub use api::{Backend, BackendError, ChatOptions};
pub use approval::{ApprovalGate, ApprovalRequest, ApprovalResponse};
pub use config::{BackendKind, Settings};
pub use inline::{
    Debouncer, EditorProbe, InlineDocument, InlinePipeline, ScopeKind, ScopeOutline, ScopeUnit,
};
pub use notify::{Notifier, RateLimitedWarner};
pub use tools::{Permissions, ToolExecution, ToolExecutor, WorkspaceMirror};
pub use types::{ChatMessage, Role, ToolCall, ToolDefinition};
