use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::util::parse_bool_flag;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8700/v1";
pub const DEFAULT_MODEL: &str = "codex-chat";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_INLINE_SUFFIX_CHARS: usize = 1_000;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant integrated inside the editor.";

/// Which chat backend a session talks to. Selected by configuration, not by
/// a type hierarchy: the two variants share one `chat` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Api,
    Cli,
}

impl BackendKind {
    /// Unknown values degrade to the API backend rather than failing.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cli" | "codex_cli" | "codex-cli" => BackendKind::Cli,
            _ => BackendKind::Api,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub api_base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,

    pub agent_mode_enabled: bool,
    pub allow_file_read: bool,
    pub allow_file_write: bool,
    pub allow_command_execution: bool,

    pub cli_path: String,
    pub cli_extra_args: String,
    pub cli_model: String,
    pub cli_timeout_ms: u64,

    pub inline_enabled: bool,
    pub inline_suffix_chars: usize,
    pub inline_api_model: String,
    pub inline_api_temperature: f64,
    pub inline_cli_model: String,
    pub inline_cli_temperature: f64,

    pub project_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Api,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            agent_mode_enabled: false,
            allow_file_read: true,
            allow_file_write: true,
            allow_command_execution: false,
            cli_path: "codex".to_string(),
            cli_extra_args: String::new(),
            cli_model: String::new(),
            cli_timeout_ms: DEFAULT_CLI_TIMEOUT_MS,
            inline_enabled: false,
            inline_suffix_chars: DEFAULT_INLINE_SUFFIX_CHARS,
            inline_api_model: String::new(),
            inline_api_temperature: DEFAULT_TEMPERATURE,
            inline_cli_model: String::new(),
            inline_cli_temperature: DEFAULT_TEMPERATURE,
            project_root: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        let string = |key: &str, fallback: &str| -> String {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        let flag = |key: &str, fallback: bool| -> bool {
            std::env::var(key)
                .ok()
                .and_then(parse_bool_flag)
                .unwrap_or(fallback)
        };
        let number = |key: &str, fallback: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(fallback)
        };

        Ok(Self {
            backend: BackendKind::parse(&string("DRAFTSMAN_BACKEND", "api")),
            api_base_url: string("DRAFTSMAN_API_BASE_URL", DEFAULT_API_BASE_URL),
            api_key: string("DRAFTSMAN_API_KEY", ""),
            model: string("DRAFTSMAN_MODEL", DEFAULT_MODEL),
            temperature: number("DRAFTSMAN_TEMPERATURE", DEFAULT_TEMPERATURE),
            system_prompt: string("DRAFTSMAN_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            agent_mode_enabled: flag("DRAFTSMAN_AGENT_MODE", false),
            allow_file_read: flag("DRAFTSMAN_ALLOW_READ", true),
            allow_file_write: flag("DRAFTSMAN_ALLOW_WRITE", true),
            allow_command_execution: flag("DRAFTSMAN_ALLOW_EXEC", false),
            cli_path: string("DRAFTSMAN_CLI_PATH", "codex"),
            cli_extra_args: string("DRAFTSMAN_CLI_ARGS", ""),
            cli_model: string("DRAFTSMAN_CLI_MODEL", ""),
            cli_timeout_ms: std::env::var("DRAFTSMAN_CLI_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_CLI_TIMEOUT_MS),
            inline_enabled: flag("DRAFTSMAN_INLINE", false),
            inline_suffix_chars: std::env::var("DRAFTSMAN_INLINE_SUFFIX_CHARS")
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_INLINE_SUFFIX_CHARS),
            inline_api_model: string("DRAFTSMAN_INLINE_API_MODEL", ""),
            inline_api_temperature: number("DRAFTSMAN_INLINE_API_TEMPERATURE", defaults.temperature),
            inline_cli_model: string("DRAFTSMAN_INLINE_CLI_MODEL", ""),
            inline_cli_temperature: number("DRAFTSMAN_INLINE_CLI_TEMPERATURE", defaults.temperature),
            project_root: std::env::current_dir()?,
        })
    }

    /// Configuration-level failures surface before any I/O is attempted.
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::Api => {
                if self.api_base_url.trim().is_empty() {
                    bail!("API base URL is not configured");
                }
            }
            BackendKind::Cli => {
                if self.cli_path.trim().is_empty() {
                    bail!("CLI executable path is not configured");
                }
                // Reject malformed extra args up front instead of at spawn time.
                split_extra_args(&self.cli_extra_args)?;
            }
        }
        if self.cli_timeout_ms == 0 {
            bail!("CLI timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn cli_args(&self) -> Result<Vec<String>> {
        split_extra_args(&self.cli_extra_args)
    }
}

/// Split a raw extra-args string the way a shell would tokenize it:
/// single quotes are literal, double quotes honor backslash escapes,
/// unquoted whitespace separates arguments. An unterminated quote is a
/// configuration error.
pub fn split_extra_args(input: &str) -> Result<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for c in trimmed.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        if c == '\\' && in_double {
            escaped = true;
            continue;
        }
        if c == '\'' && !in_double {
            in_single = !in_single;
            continue;
        }
        if c == '"' && !in_single {
            in_double = !in_double;
            continue;
        }
        if !in_single && !in_double && c.is_whitespace() {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(c);
    }

    if in_single || in_double {
        bail!("Unclosed quote in CLI extra args");
    }
    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        result.push(current);
    }
    Ok(result)
}
