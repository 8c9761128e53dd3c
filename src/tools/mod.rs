mod executor;

pub use executor::{ToolExecution, ToolExecutor};

use std::path::Path;

use serde_json::json;

use crate::config::Settings;
use crate::types::ToolDefinition;

/// Capability tuple the tool catalog and executor are gated on. All false
/// when agent mode is off, where the agent loop degrades to a plain
/// single-turn answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permissions {
    pub fn from_settings(settings: &Settings) -> Self {
        if !settings.agent_mode_enabled {
            return Self::default();
        }
        Self {
            read: settings.allow_file_read,
            write: settings.allow_file_write,
            execute: settings.allow_command_execution,
        }
    }

    pub fn any(&self) -> bool {
        self.read || self.write || self.execute
    }
}

/// Seam to the editor's document model. Reads prefer an open, possibly
/// unsaved buffer over the file on disk; mutations may be claimed by the
/// editor so they run through its undo/save machinery instead of bypassing
/// it. The default implementation knows no buffers.
pub trait WorkspaceMirror: Send + Sync {
    /// Live buffer contents for a project-relative path, if one is open.
    fn live_text(&self, _relative: &Path) -> Option<String> {
        None
    }

    /// Returns true when an open buffer consumed the write; false routes
    /// the write to the filesystem.
    fn apply_write(&self, _relative: &Path, _content: &str) -> bool {
        false
    }

    /// Returns true when an open buffer consumed the delete.
    fn apply_delete(&self, _relative: &Path) -> bool {
        false
    }
}

/// Pure function of the permission set. Definitions are rebuilt per request
/// and never persisted; defaults declared here are enforced again by the
/// executor in case the backend omits them.
pub fn catalog(permissions: &Permissions) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();

    if permissions.read {
        tools.push(ToolDefinition::function(
            "list_files",
            "List project files under a path.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Project-relative directory path (default: \".\")."
                    },
                    "maxDepth": {
                        "type": "integer",
                        "description": "Max directory depth to traverse (default: 8).",
                        "default": 8
                    },
                    "maxResults": {
                        "type": "integer",
                        "description": "Max files returned (default: 500).",
                        "default": 500
                    }
                },
                "required": []
            }),
        ));
        tools.push(ToolDefinition::function(
            "read_file",
            "Read a UTF-8 text file from the project.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Project-relative path to a file."
                    },
                    "maxChars": {
                        "type": "integer",
                        "description": "Max characters returned (default: 20000).",
                        "default": 20000
                    }
                },
                "required": ["path"]
            }),
        ));
    }

    if permissions.write {
        tools.push(ToolDefinition::function(
            "write_file",
            "Create or overwrite a UTF-8 text file in the project.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Project-relative file path to write."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full UTF-8 file content."
                    },
                    "overwrite": {
                        "type": "boolean",
                        "description": "Whether to overwrite if the file exists (default: true).",
                        "default": true
                    }
                },
                "required": ["path", "content"]
            }),
        ));
        tools.push(ToolDefinition::function(
            "delete_file",
            "Delete a file in the project.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Project-relative file path to delete."
                    }
                },
                "required": ["path"]
            }),
        ));
    }

    if permissions.execute {
        tools.push(ToolDefinition::function(
            "run_command",
            "Run a local shell command in the project root and return stdout/stderr/exit code.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command line. Runs via bash -lc (macOS/Linux) or cmd /c (Windows)."
                    },
                    "timeoutMs": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (default: 600000).",
                        "default": 600000
                    }
                },
                "required": ["command"]
            }),
        ));
    }

    tools
}
