pub mod cli;
pub mod client;
pub mod error;
pub mod jsonl;

pub use cli::{CliClient, CliReply};
pub use client::{ApiClient, ModelInfo};
pub use error::BackendError;
pub use jsonl::{parse_cli_events, CliTranscript};

use crate::config::{BackendKind, Settings};
use crate::types::{ChatMessage, ToolDefinition};

/// Per-call overrides. Call sites (agent chat vs. inline completion) pick
/// their own model, temperature and output cap without reconfiguring the
/// client.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model_override: Option<String>,
    pub temperature_override: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// The two interchangeable chat backends, selected by configuration.
/// Tagged variants over one `chat` contract, not a type hierarchy.
pub enum Backend {
    Api(ApiClient),
    Cli(CliClient),
    #[cfg(test)]
    Scripted(ScriptedBackend),
}

impl Backend {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.backend {
            BackendKind::Api => Backend::Api(ApiClient::new(settings)),
            BackendKind::Cli => Backend::Cli(CliClient::new(settings)),
        }
    }

    /// Uniform chat operation: the returned turn has role Assistant and
    /// either non-empty content or a non-empty tool-call list.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        opts: &ChatOptions,
    ) -> Result<ChatMessage, BackendError> {
        match self {
            Backend::Api(client) => client.chat(messages, tools, opts).await,
            // The CLI cannot execute tool calls; it only ever answers in text.
            Backend::Cli(client) => client
                .chat(messages, opts)
                .await
                .map(|reply| ChatMessage::assistant(reply.text)),
            #[cfg(test)]
            Backend::Scripted(scripted) => scripted.next_reply(messages, tools),
        }
    }

    /// Whether this backend can carry structured tool definitions.
    pub fn supports_tools(&self) -> bool {
        match self {
            Backend::Api(_) => true,
            Backend::Cli(_) => false,
            #[cfg(test)]
            Backend::Scripted(_) => true,
        }
    }
}

/// Test stand-in: replies are produced by a closure keyed on the call
/// index, so tests can script bounded and unbounded tool-call sequences.
#[cfg(test)]
pub struct ScriptedBackend {
    calls: std::sync::atomic::AtomicUsize,
    #[allow(clippy::type_complexity)]
    reply_fn: Box<
        dyn Fn(usize, &[ChatMessage], Option<&[ToolDefinition]>) -> Result<ChatMessage, BackendError>
            + Send
            + Sync,
    >,
}

#[cfg(test)]
impl ScriptedBackend {
    pub fn backend<F>(reply_fn: F) -> Backend
    where
        F: Fn(usize, &[ChatMessage], Option<&[ToolDefinition]>) -> Result<ChatMessage, BackendError>
            + Send
            + Sync
            + 'static,
    {
        Backend::Scripted(Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            reply_fn: Box::new(reply_fn),
        })
    }

    fn next_reply(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatMessage, BackendError> {
        let index = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (self.reply_fn)(index, messages, tools)
    }
}
