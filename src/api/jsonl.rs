use serde_json::Value;

/// Parsed view of a CLI `--json` event stream.
///
/// The stream is line-delimited: every line is an independent JSON object.
/// Only two event types matter here; everything else (turn lifecycle, token
/// usage, malformed lines) is skipped rather than failing the whole parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliTranscript {
    pub thread_id: Option<String>,
    /// Ordered `agent_message` texts. A streaming CLI may emit intermediate
    /// drafts; the last entry is the effective reply.
    pub agent_messages: Vec<String>,
}

impl CliTranscript {
    pub fn last_agent_message(&self) -> Option<&str> {
        self.agent_messages.last().map(String::as_str)
    }
}

pub fn parse_cli_events(raw: &str) -> CliTranscript {
    let mut transcript = CliTranscript::default();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(Value::Object(event)) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        match event.get("type").and_then(Value::as_str) {
            Some("thread.started") => {
                if let Some(id) = event.get("thread_id").and_then(Value::as_str) {
                    transcript.thread_id = Some(id.to_string());
                }
            }
            Some("item.completed") => {
                let Some(item) = event.get("item").and_then(Value::as_object) else {
                    continue;
                };
                if item.get("type").and_then(Value::as_str) != Some("agent_message") {
                    continue;
                }
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        transcript.agent_messages.push(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    transcript
}
