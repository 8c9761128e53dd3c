use serde::Deserialize;
use serde_json::{json, Value};

use super::error::BackendError;
use super::ChatOptions;
use crate::config::Settings;
use crate::types::{ChatMessage, ToolDefinition};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Chat-completions HTTP backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub created: i64,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.api_base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    /// One chat round-trip. The reply must carry non-empty content or a
    /// non-empty tool-call list; an empty message is a protocol error, not a
    /// valid empty answer.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        opts: &ChatOptions,
    ) -> Result<ChatMessage, BackendError> {
        if self.base_url.trim().is_empty() {
            return Err(BackendError::config("API base URL is not configured"));
        }

        let model = opts
            .model_override
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model);
        let temperature = opts.temperature_override.unwrap_or(self.temperature);

        let mut payload = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": false,
        });
        let payload_object = payload
            .as_object_mut()
            .expect("payload must be a JSON object");
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            payload_object.insert(
                "tools".to_string(),
                serde_json::to_value(tools).unwrap_or(Value::Null),
            );
            payload_object.insert("tool_choice".to_string(), json!("auto"));
        }
        if let Some(max_tokens) = opts.max_tokens {
            payload_object.insert("max_tokens".to_string(), json!(max_tokens));
        }

        let url = chat_completions_url(&self.base_url);
        let mut request = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .json(&payload);
        if !self.api_key.trim().is_empty() {
            request = request.header("authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, &url))?;

        let status = response.status();
        let request_id = header_value(&response, REQUEST_ID_HEADER);
        let body = response
            .text()
            .await
            .map_err(|error| map_request_error(error, &url))?;

        if status.as_u16() >= 400 {
            let message = extract_error_message(&body);
            return Err(BackendError::transport_with_request_id(
                format!("HTTP {} from '{url}': {message}", status.as_u16()),
                request_id.as_deref(),
            ));
        }

        parse_chat_reply(&body)
    }

    /// Fetch the model catalog exposed by the endpoint, newest first.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        if self.base_url.trim().is_empty() {
            return Err(BackendError::config("API base URL is not configured"));
        }
        if self.api_key.trim().is_empty() {
            return Err(BackendError::config(
                "API key is required to fetch the model list",
            ));
        }

        let url = models_url(&self.base_url);
        let response = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|error| map_request_error(error, &url))?;

        let status = response.status();
        let request_id = header_value(&response, REQUEST_ID_HEADER);
        let body = response
            .text()
            .await
            .map_err(|error| map_request_error(error, &url))?;

        if status.as_u16() >= 400 {
            let message = extract_error_message(&body);
            return Err(BackendError::transport_with_request_id(
                format!("HTTP {} from '{url}': {message}", status.as_u16()),
                request_id.as_deref(),
            ));
        }

        let parsed: ModelsResponse = serde_json::from_str(&body)
            .map_err(|error| BackendError::protocol(format!("unreadable models response: {error}")))?;
        let mut models: Vec<ModelInfo> = parsed
            .data
            .into_iter()
            .filter(|model| !model.id.trim().is_empty())
            .map(|model| ModelInfo {
                id: model.id,
                created: model.created,
            })
            .collect();
        models.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
        Ok(models)
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn map_request_error(error: reqwest::Error, url: &str) -> BackendError {
    if error.is_connect() {
        return BackendError::transport(format!("cannot reach API endpoint '{url}': {error}"));
    }
    if error.is_timeout() {
        return BackendError::transport(format!("API request to '{url}' timed out: {error}"));
    }
    BackendError::transport(format!("API request to '{url}' failed: {error}"))
}

/// `<base>/chat/completions`, unless the base already names the endpoint.
pub fn chat_completions_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/chat/completions")
    }
}

/// Derive the models endpoint from the configured base URL, stripping a
/// known chat suffix first so a fully-qualified chat URL still works.
pub fn models_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    let without_endpoint = trimmed
        .strip_suffix("/chat/completions")
        .or_else(|| trimmed.strip_suffix("/responses"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if without_endpoint.ends_with("/models") {
        without_endpoint.to_string()
    } else {
        format!("{without_endpoint}/models")
    }
}

/// Model ids usable for chat: include the common chat families, drop
/// specialized modalities.
pub fn chat_model_ids(models: &[ModelInfo]) -> Vec<String> {
    const EXCLUDED: [&str; 8] = [
        "realtime",
        "instruct",
        "transcribe",
        "tts",
        "whisper",
        "embedding",
        "dall-e",
        "image",
    ];

    models
        .iter()
        .map(|model| model.id.as_str())
        .filter(|id| {
            let lower = id.to_ascii_lowercase();
            let included = lower.starts_with("gpt-")
                || lower.starts_with("chatgpt-")
                || starts_with_o_series(&lower);
            included && !EXCLUDED.iter().any(|needle| lower.contains(needle))
        })
        .map(ToOwned::to_owned)
        .collect()
}

fn starts_with_o_series(id: &str) -> bool {
    let mut chars = id.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Best-effort extraction of a human-readable message from a structured
/// `{"error":{"message":...}}` body, falling back to the raw text.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Empty error response".to_string();
    }
    serde_json::from_str::<ErrorResponse>(trimmed)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| trimmed.to_string())
}

fn parse_chat_reply(body: &str) -> Result<ChatMessage, BackendError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|error| BackendError::protocol(format!("unreadable chat response: {error}")))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or_else(|| BackendError::protocol("chat response did not include a message"))?;

    let has_content = message
        .content
        .as_deref()
        .is_some_and(|content| !content.trim().is_empty());
    if !has_content && !message.has_tool_calls() {
        return Err(BackendError::protocol("chat response message was empty"));
    }
    Ok(message)
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
}
