use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use super::{Permissions, WorkspaceMirror};
use crate::types::ToolCall;
use crate::util::truncate_chars;

const DEFAULT_LIST_MAX_DEPTH: u64 = 8;
const DEFAULT_LIST_MAX_RESULTS: u64 = 500;
const DEFAULT_READ_MAX_CHARS: u64 = 20_000;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 600_000;
const OUTPUT_CAPTURE_MAX_CHARS: usize = 20_000;
const TRUNCATION_MARKER: &str = "\n...[truncated]...";

/// Directory prefixes excluded from listings. Noise reduction only; the
/// enforced boundary is root-prefix confinement plus human approval.
const SKIPPED_DIR_PREFIXES: [&str; 8] = [
    ".git/",
    ".idea/",
    "build/",
    "out/",
    ".gradle/",
    "node_modules/",
    "vendor/",
    "target/",
];

/// Result of one tool call. The JSON half goes back into the conversation
/// as the tool turn's content; the summary is for human display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecution {
    pub tool_response_json: String,
    pub user_summary: String,
}

impl ToolExecution {
    fn ok(response: Value, user_summary: impl Into<String>) -> Self {
        Self {
            tool_response_json: response.to_string(),
            user_summary: user_summary.into(),
        }
    }

    fn failure(tool_name: &str, message: impl std::fmt::Display) -> Self {
        Self {
            tool_response_json: json!({ "error": message.to_string() }).to_string(),
            user_summary: format!("{tool_name} failed: {message}"),
        }
    }
}

/// Executes tool calls inside a fixed project root. All path arguments are
/// project-relative; anything that escapes the root is rejected, never
/// clamped.
pub struct ToolExecutor {
    root: PathBuf,
    canonical_root: PathBuf,
    permissions: Permissions,
    mirror: Option<Arc<dyn WorkspaceMirror>>,
}

impl ToolExecutor {
    pub fn new(root: PathBuf, permissions: Permissions) -> Self {
        let canonical_root = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root,
            canonical_root,
            permissions,
            mirror: None,
        }
    }

    /// Route reads and mutations through the editor's document model where
    /// a live buffer exists.
    pub fn with_mirror(mut self, mirror: Arc<dyn WorkspaceMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Render a call for the approval prompt: name plus the raw argument
    /// blob, verbatim, so the human approves exactly what will run.
    pub fn describe(call: &ToolCall) -> String {
        format!("{}({})", call.function.name, call.function.arguments)
    }

    /// Execute one approved tool call. Permission violations abort before
    /// any execution attempt; every other failure is folded into an
    /// `{"error": ...}` payload so the model can react to it.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolExecution> {
        let name = call.function.name.as_str();
        self.check_permission(name)?;

        let args = parse_args(&call.function.arguments);
        let outcome = match name {
            "list_files" => self.list_files(&args),
            "read_file" => self.read_file(&args),
            "write_file" => self.write_file(&args),
            "delete_file" => self.delete_file(&args),
            "run_command" => self.run_command(&args).await,
            other => Ok(ToolExecution::failure(other, format!("Unknown tool: {other}"))),
        };

        Ok(outcome.unwrap_or_else(|error| ToolExecution::failure(name, error)))
    }

    fn check_permission(&self, name: &str) -> Result<()> {
        match name {
            "list_files" | "read_file" => ensure_allowed(
                self.permissions.read,
                "File reading is disabled by settings",
            ),
            "write_file" | "delete_file" => ensure_allowed(
                self.permissions.write,
                "File writing is disabled by settings",
            ),
            "run_command" => ensure_allowed(
                self.permissions.execute,
                "Command execution is disabled by settings",
            ),
            _ => Ok(()),
        }
    }

    fn list_files(&self, args: &Map<String, Value>) -> Result<ToolExecution> {
        let path = optional_str(args, "path").unwrap_or(".");
        let max_depth = get_u64(args, "maxDepth", DEFAULT_LIST_MAX_DEPTH).max(1);
        let max_results = get_u64(args, "maxResults", DEFAULT_LIST_MAX_RESULTS).max(1) as usize;

        let start = if path == "." {
            self.root.clone()
        } else {
            self.resolve_path(path)?
        };
        if !start.is_dir() {
            bail!("Not a directory: {path}");
        }

        let mut files = Vec::new();
        let mut queue = std::collections::VecDeque::from([(start, 0u64)]);
        'walk: while let Some((dir, depth)) = queue.pop_front() {
            let mut children: Vec<_> = fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory {}", dir.display()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to list entries in {}", dir.display()))?;
            children.sort_by_key(|entry| entry.path());

            for child in children {
                let child_path = child.path();
                let relative = self.relative_display(&child_path);
                if should_skip(&relative) {
                    continue;
                }

                let file_type = child
                    .file_type()
                    .with_context(|| format!("Failed to inspect {}", child_path.display()))?;
                if file_type.is_dir() {
                    if depth + 1 < max_depth {
                        queue.push_back((child_path, depth + 1));
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                files.push(relative);
                if files.len() >= max_results {
                    break 'walk;
                }
            }
        }
        files.sort();

        let count = files.len();
        let response = json!({
            "path": path,
            "count": count,
            "files": files.join("\n"),
        });
        Ok(ToolExecution::ok(
            response,
            format!("Listed {count} files under {path}"),
        ))
    }

    fn read_file(&self, args: &Map<String, Value>) -> Result<ToolExecution> {
        let path = required_str(args, "read_file", "path")?;
        let max_chars = get_u64(args, "maxChars", DEFAULT_READ_MAX_CHARS).max(1) as usize;
        let resolved = self.resolve_path(path)?;

        if resolved.is_dir() {
            bail!("Path is a directory: {path}");
        }

        let raw = match self.live_text(&resolved) {
            Some(text) => text,
            None => fs::read_to_string(&resolved)
                .with_context(|| format!("File not found or unreadable: {path}"))?,
        };

        let (mut content, truncated) = truncate_chars(&raw, max_chars);
        if truncated {
            content.push_str(TRUNCATION_MARKER);
        }

        let response = json!({
            "path": path,
            "truncated": truncated,
            "content": content,
        });
        let suffix = if truncated { " (truncated)" } else { "" };
        Ok(ToolExecution::ok(response, format!("Read {path}{suffix}")))
    }

    fn write_file(&self, args: &Map<String, Value>) -> Result<ToolExecution> {
        let path = required_str(args, "write_file", "path")?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .with_context(|| "write_file requires a 'content' string argument")?;
        let overwrite = get_bool(args, "overwrite", true);

        let resolved = self.resolve_path(path)?;
        let existed = resolved.exists();
        if existed && resolved.is_dir() {
            bail!("Path is a directory: {path}");
        }
        if existed && !overwrite {
            bail!("Refusing to overwrite existing file: {path}");
        }

        let relative = self.relative_path(&resolved);
        let claimed = self
            .mirror
            .as_ref()
            .is_some_and(|mirror| mirror.apply_write(&relative, content));
        if !claimed {
            let parent = resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone());
            fs::create_dir_all(&parent)
                .with_context(|| format!("Failed to create parent directories for {path}"))?;
            atomic_write(&parent, &resolved, content)
                .with_context(|| format!("Failed to write {path}"))?;
        }

        let chars_written = content.chars().count();
        let response = json!({
            "path": path,
            "existed": existed,
            "charsWritten": chars_written,
        });
        Ok(ToolExecution::ok(
            response,
            format!("Wrote {path} ({chars_written} chars)"),
        ))
    }

    fn delete_file(&self, args: &Map<String, Value>) -> Result<ToolExecution> {
        let path = required_str(args, "delete_file", "path")?;
        let resolved = self.resolve_path(path)?;

        if !resolved.exists() {
            bail!("File not found: {path}");
        }
        if resolved.is_dir() {
            bail!("Refusing to delete directory: {path}");
        }

        let relative = self.relative_path(&resolved);
        let claimed = self
            .mirror
            .as_ref()
            .is_some_and(|mirror| mirror.apply_delete(&relative));
        if !claimed {
            fs::remove_file(&resolved).with_context(|| format!("Failed to delete {path}"))?;
        }

        Ok(ToolExecution::ok(
            json!({ "path": path }),
            format!("Deleted {path}"),
        ))
    }

    async fn run_command(&self, args: &Map<String, Value>) -> Result<ToolExecution> {
        let command = required_str(args, "run_command", "command")?;
        let timeout_ms = get_u64(args, "timeoutMs", DEFAULT_COMMAND_TIMEOUT_MS).max(1);

        let mut shell = if cfg!(target_os = "windows") {
            let mut shell = tokio::process::Command::new("cmd.exe");
            shell.args(["/c", command]);
            shell
        } else {
            let mut shell = tokio::process::Command::new("bash");
            shell.args(["-lc", command]);
            shell
        };
        shell
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = shell
            .spawn()
            .with_context(|| format!("Failed to launch shell for: {command}"))?;

        // A timeout is a distinct result field, never conflated with a
        // non-zero exit code. Dropping the output future kills the child.
        match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
            .await
        {
            Ok(output) => {
                let output = output.context("Failed to capture command output")?;
                let (stdout, _) = truncate_chars(
                    &String::from_utf8_lossy(&output.stdout),
                    OUTPUT_CAPTURE_MAX_CHARS,
                );
                let (stderr, _) = truncate_chars(
                    &String::from_utf8_lossy(&output.stderr),
                    OUTPUT_CAPTURE_MAX_CHARS,
                );
                let exit_code = output.status.code().unwrap_or(-1);

                let response = json!({
                    "command": command,
                    "exitCode": exit_code,
                    "timeout": false,
                    "stdout": stdout,
                    "stderr": stderr,
                });
                Ok(ToolExecution::ok(
                    response,
                    format!("Ran command: {command} (exit {exit_code})"),
                ))
            }
            Err(_) => {
                let response = json!({
                    "command": command,
                    "exitCode": Value::Null,
                    "timeout": true,
                    "stdout": "",
                    "stderr": "",
                });
                Ok(ToolExecution::ok(
                    response,
                    format!("Ran command: {command} (timeout after {timeout_ms}ms)"),
                ))
            }
        }
    }

    /// Lexical normalization plus a root-prefix check, with a symlink guard
    /// through the nearest existing ancestor.
    fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("Path cannot be empty");
        }
        if trimmed.starts_with('/') || trimmed.contains('\\') {
            bail!("Path escapes project root: {raw}");
        }

        let candidate = Path::new(trimmed);
        for component in candidate.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    bail!("Path escapes project root: {raw}");
                }
                _ => {}
            }
        }

        let normalized = normalize_path(&self.root.join(candidate));
        self.ensure_within_root(&normalized)?;
        Ok(normalized)
    }

    fn ensure_within_root(&self, path: &Path) -> Result<()> {
        let guard = nearest_existing_ancestor(path)
            .context("Path has no existing ancestor inside the project")?;
        let canonical_guard = fs::canonicalize(guard)
            .with_context(|| format!("Failed to canonicalize {}", guard.display()))?;
        if !canonical_guard.starts_with(&self.canonical_root) {
            bail!(
                "Path escapes project root via symlink or traversal: {}",
                path.display()
            );
        }
        Ok(())
    }

    fn live_text(&self, resolved: &Path) -> Option<String> {
        let relative = self.relative_path(resolved);
        self.mirror.as_ref()?.live_text(&relative)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn relative_display(&self, path: &Path) -> String {
        self.relative_path(path).to_string_lossy().to_string()
    }
}

fn ensure_allowed(allowed: bool, message: &str) -> Result<()> {
    if !allowed {
        bail!("{message}");
    }
    Ok(())
}

/// Opaque argument blobs are untrusted: malformed JSON degrades to an empty
/// object instead of failing the call.
fn parse_args(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required_str<'a>(args: &'a Map<String, Value>, tool: &str, key: &str) -> Result<&'a str> {
    optional_str(args, key)
        .with_context(|| format!("{tool} requires a non-empty '{key}' string argument"))
}

fn get_u64(args: &Map<String, Value>, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn get_bool(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
        }
    }
    out
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn should_skip(relative_path: &str) -> bool {
    let normalized = relative_path.replace('\\', "/");
    SKIPPED_DIR_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix) || normalized == prefix.trim_end_matches('/'))
}

/// Write the full content to a sibling temp file and rename it over the
/// target, so a concurrent reader sees either the old or the new content.
fn atomic_write(parent: &Path, target: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(target)
        .map_err(|error| anyhow::anyhow!("{}", error.error))?;
    Ok(())
}
