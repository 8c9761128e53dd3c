use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::error::BackendError;
use super::jsonl::parse_cli_events;
use super::ChatOptions;
use crate::config::{split_extra_args, Settings};
use crate::types::{ChatMessage, Role};
use crate::util::truncate_chars;

const RAW_OUTPUT_EXCERPT_CHARS: usize = 2_000;

/// CLI subprocess backend. The CLI has no multi-turn protocol, so every
/// call flattens the whole history into one prompt and runs the executable
/// once, parsing its line-delimited JSON event stream.
#[derive(Clone)]
pub struct CliClient {
    path: String,
    extra_args: String,
    model: String,
    timeout_ms: u64,
    project_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CliReply {
    pub text: String,
    /// Correlation id from the `thread.started` event, when the CLI emitted
    /// one; attached to transport diagnostics.
    pub thread_id: Option<String>,
}

impl CliClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            path: settings.cli_path.clone(),
            extra_args: settings.cli_extra_args.clone(),
            model: settings.cli_model.clone(),
            timeout_ms: settings.cli_timeout_ms,
            project_root: settings.project_root.clone(),
        }
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<CliReply, BackendError> {
        if self.path.trim().is_empty() {
            return Err(BackendError::config("CLI executable path is not configured"));
        }
        let extra = split_extra_args(&self.extra_args)
            .map_err(|error| BackendError::config(error.to_string()))?;

        let model = opts
            .model_override
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model);
        let prompt = flatten_prompt(messages, opts.temperature_override);

        let mut command = Command::new(&self.path);
        command
            .current_dir(&self.project_root)
            .arg("exec")
            .args(model_args(model, &extra))
            .args(&extra)
            .args(["--color", "never", "--json", "--skip-git-repo-check"])
            .arg(&prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|error| {
            BackendError::transport(format!("failed to launch CLI '{}': {error}", self.path))
        })?;

        let output = match tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result.map_err(|error| {
                BackendError::transport(format!("failed to capture CLI output: {error}"))
            })?,
            // The output future owns the child; dropping it on timeout kills
            // the process (kill_on_drop).
            Err(_) => {
                return Err(BackendError::transport(format!(
                    "CLI timed out after {}ms",
                    self.timeout_ms
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let mut message = format!(
                "CLI failed (exit {})",
                output.status.code().unwrap_or(-1)
            );
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(&stderr);
            }
            return Err(BackendError::transport(message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let transcript = parse_cli_events(&stdout);
        let Some(text) = transcript.last_agent_message() else {
            let (excerpt, _) = truncate_chars(&stdout, RAW_OUTPUT_EXCERPT_CHARS);
            return Err(BackendError::protocol(format!(
                "CLI did not return an agent_message. Raw output: {excerpt}"
            )));
        };

        if let Some(thread_id) = &transcript.thread_id {
            tracing::debug!(thread_id = %thread_id, "cli chat turn completed");
        }

        Ok(CliReply {
            text: text.to_string(),
            thread_id: transcript.thread_id.clone(),
        })
    }
}

/// Flatten the conversation into a single role-labeled prompt. Tool turns
/// and content-less turns are dropped; the CLI never sees tool traffic.
/// The CLI takes no temperature parameter, so the hint is rendered as text.
pub fn flatten_prompt(messages: &[ChatMessage], temperature_hint: Option<f64>) -> String {
    let mut prompt = String::from(
        "Continue the following chat conversation. Respond as the assistant.\n\
         Do not include metadata or prefixes like \"User:\" in your reply unless asked.\n\n",
    );

    if let Some(hint) = temperature_hint {
        let clamped = hint.clamp(0.0, 1.0);
        prompt.push_str(&format!(
            "Temperature hint: {clamped:.2} (lower = more deterministic).\n\n"
        ));
    }

    for message in messages {
        let Some(content) = message.content.as_deref() else {
            continue;
        };
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => continue,
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(content.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Assistant:");
    prompt
}

/// `-m <model>` unless the extra args already pin a model.
fn model_args(model: &str, extra_args: &[String]) -> Vec<String> {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let already_has_model = extra_args
        .iter()
        .any(|arg| arg == "-m" || arg == "--model" || arg.starts_with("--model="));
    if already_has_model {
        Vec::new()
    } else {
        vec!["-m".to_string(), trimmed.to_string()]
    }
}
