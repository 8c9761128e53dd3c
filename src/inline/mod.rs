mod context;
mod debounce;
mod filters;

pub use context::{
    build_context, extract_context, ContextWindows, ScopeKind, ScopeOutline, ScopeUnit,
    MAX_PREFIX_CHARS, MAX_SUFFIX_CHARS, MIN_SUFFIX_CHARS,
};
pub use debounce::Debouncer;
pub use filters::{
    collect_function_names, extract_function_name, is_class_member_declaration,
    is_duplicate_of_suffix, is_echoing_prefix, sanitize_suggestion, should_auto_trigger,
    strip_leading_empty_parens, suffix_contains_function_name, IDE_COMPLETION_PLACEHOLDER,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{Backend, ChatOptions};
use crate::config::{BackendKind, Settings};
use crate::notify::{Notifier, RateLimitedWarner};
use crate::types::ChatMessage;
use crate::util::truncate_chars;

/// Ghost-text output is clipped to this many characters.
pub const MAX_SUGGESTION_CHARS: usize = 2_000;
/// Idle delay before a qualifying edit fires a completion request.
pub const AUTO_TRIGGER_IDLE: Duration = Duration::from_millis(450);
const INLINE_MAX_TOKENS: u32 = 128;
const ERROR_WARNING_INTERVAL: Duration = Duration::from_secs(30);

const COMPLETION_SYSTEM_PROMPT: &str = "You are a code completion engine.\n\
Return ONLY the code that should be inserted at the cursor.\n\
Do not include markdown, backticks, or explanations.\n\
Do not repeat or re-declare code that already exists after the cursor (see SUFFIX).\n\
Keep the completion concise (prefer <= 20 lines).";

/// Editor state sampled when the debounce timer fires. Preconditions may
/// have changed during the idle wait, so the pipeline re-checks them
/// before issuing a request.
#[derive(Debug, Clone, Copy)]
pub struct EditorProbe {
    pub disposed: bool,
    pub caret_count: usize,
    pub has_selection: bool,
    pub focused: bool,
}

impl Default for EditorProbe {
    fn default() -> Self {
        Self {
            disposed: false,
            caret_count: 1,
            has_selection: false,
            focused: true,
        }
    }
}

impl EditorProbe {
    pub fn allows_completion(&self) -> bool {
        !self.disposed && self.caret_count == 1 && !self.has_selection && self.focused
    }
}

/// Snapshot of the document a completion is requested for. Derived per
/// trigger and discarded right after; never retained across triggers.
#[derive(Debug, Clone)]
pub struct InlineDocument {
    pub file_name: String,
    pub language: String,
    pub text: String,
    pub caret_offset: usize,
}

/// Runs one completion attempt end to end: re-validate editor state, build
/// context windows, call the backend, sanitize and suppress. Every failure
/// mode degrades to "no suggestion"; the editor never has to handle an
/// error from this pipeline.
pub struct InlinePipeline {
    settings: Settings,
    backend: Backend,
    warner: RateLimitedWarner,
    notifier: Arc<dyn Notifier>,
    warned_missing_config: AtomicBool,
}

impl InlinePipeline {
    pub fn new(settings: Settings, backend: Backend, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            backend,
            warner: RateLimitedWarner::new(notifier.clone(), ERROR_WARNING_INTERVAL),
            notifier,
            warned_missing_config: AtomicBool::new(false),
        }
    }

    /// Whether a document change qualifies as an auto-trigger. Direct
    /// invocations bypass this check entirely.
    pub fn should_auto_trigger(inserted: &str) -> bool {
        filters::should_auto_trigger(inserted)
    }

    /// Produce at most one inert ghost-text suggestion, or nothing.
    pub async fn suggest(
        &self,
        document: &InlineDocument,
        probe: EditorProbe,
        scope: Option<&dyn ScopeOutline>,
    ) -> Option<String> {
        if !self.settings.inline_enabled {
            return None;
        }
        if !probe.allows_completion() {
            return None;
        }
        if self.settings.backend == BackendKind::Api && self.api_config_missing() {
            return None;
        }

        let windows = build_context(
            &document.text,
            document.caret_offset,
            self.settings.inline_suffix_chars,
            scope,
        );
        if windows.prefix.trim().is_empty() {
            return None;
        }

        let messages = build_messages(
            &self.settings.system_prompt,
            &document.file_name,
            &document.language,
            &windows.prefix,
            &windows.suffix,
        );
        let opts = self.completion_options();

        let reply = match self.backend.chat(&messages, None, &opts).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::info!("inline completion failed: {error}");
                self.warner
                    .warn(&format!("Inline completion failed: {error}"));
                return None;
            }
        };

        let suggestion = sanitize_suggestion(reply.content_str());
        let suggestion = strip_leading_empty_parens(&windows.prefix, &suggestion);
        if suggestion.trim().is_empty() {
            return None;
        }

        if let Some(name) = extract_function_name(&suggestion) {
            if self.declares_duplicate(document, scope, &name)
                || suffix_contains_function_name(&windows.suffix, &name)
            {
                return None;
            }
        }

        if windows.at_class_level {
            let first_line = suggestion
                .lines()
                .next()
                .map(str::trim_start)
                .unwrap_or("");
            if !first_line.is_empty() && !is_class_member_declaration(first_line) {
                return None;
            }
        }

        if is_duplicate_of_suffix(&suggestion, &windows.suffix)
            || is_echoing_prefix(&suggestion, &windows.prefix)
        {
            return None;
        }

        let (clipped, _) = truncate_chars(&suggestion, MAX_SUGGESTION_CHARS);
        Some(clipped)
    }

    fn api_config_missing(&self) -> bool {
        let missing = self.settings.api_base_url.trim().is_empty()
            || self.settings.api_key.trim().is_empty();
        if missing && !self.warned_missing_config.swap(true, Ordering::SeqCst) {
            self.notifier.warn(
                "Inline completions require an API base URL and API key in the settings.",
            );
        }
        missing
    }

    fn completion_options(&self) -> ChatOptions {
        let (model, temperature) = match self.settings.backend {
            BackendKind::Api => (
                &self.settings.inline_api_model,
                self.settings.inline_api_temperature,
            ),
            BackendKind::Cli => (
                &self.settings.inline_cli_model,
                self.settings.inline_cli_temperature,
            ),
        };
        ChatOptions {
            model_override: Some(model.trim().to_string()).filter(|m| !m.is_empty()),
            temperature_override: Some(temperature.clamp(0.0, 1.0)),
            max_tokens: Some(INLINE_MAX_TOKENS),
        }
    }

    fn declares_duplicate(
        &self,
        document: &InlineDocument,
        scope: Option<&dyn ScopeOutline>,
        name: &str,
    ) -> bool {
        match scope {
            Some(outline) => outline
                .declared_names()
                .iter()
                .any(|declared| declared.eq_ignore_ascii_case(name)),
            None => collect_function_names(&document.text)
                .iter()
                .any(|declared| declared.eq_ignore_ascii_case(name)),
        }
    }
}

fn build_messages(
    base_system_prompt: &str,
    file_name: &str,
    language: &str,
    prefix: &str,
    suffix: &str,
) -> Vec<ChatMessage> {
    let mut system = String::new();
    let base = base_system_prompt.trim();
    if !base.is_empty() {
        system.push_str(base);
        system.push_str("\n\n");
    }
    system.push_str(COMPLETION_SYSTEM_PROMPT);

    let user = format!(
        "File: {file_name}\nLanguage: {language}\n\nPREFIX (before cursor):\n{prefix}\n\nSUFFIX (after cursor):\n{suffix}"
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BackendError, ScriptedBackend};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        warnings: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn info(&self, _message: &str) {}
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
        fn error(&self, _message: &str) {}
    }

    fn inline_settings() -> Settings {
        Settings {
            inline_enabled: true,
            api_key: "test-key".to_string(),
            ..Settings::default()
        }
    }

    fn document(text: &str, caret_offset: usize) -> InlineDocument {
        InlineDocument {
            file_name: "plugin.php".to_string(),
            language: "PHP".to_string(),
            text: text.to_string(),
            caret_offset,
        }
    }

    fn reply_backend(reply: &str) -> Backend {
        let reply = reply.to_string();
        ScriptedBackend::backend(move |_, _, _| Ok(ChatMessage::assistant(reply.clone())))
    }

    #[tokio::test]
    async fn test_suggest_returns_sanitized_suggestion() {
        let pipeline = InlinePipeline::new(
            inline_settings(),
            reply_backend("```php\nreturn $total;\n```"),
            Arc::new(RecordingNotifier::default()),
        );

        let text = "function sum($a, $b) {\n    ";
        let suggestion = pipeline
            .suggest(&document(text, text.len()), EditorProbe::default(), None)
            .await;
        assert_eq!(suggestion.as_deref(), Some("return $total;"));
    }

    #[tokio::test]
    async fn test_suggest_requires_valid_editor_state() {
        let pipeline = InlinePipeline::new(
            inline_settings(),
            reply_backend("anything"),
            Arc::new(RecordingNotifier::default()),
        );
        let text = "function sum() {\n    ";
        let doc = document(text, text.len());

        let selection = EditorProbe {
            has_selection: true,
            ..EditorProbe::default()
        };
        assert!(pipeline.suggest(&doc, selection, None).await.is_none());

        let multi_caret = EditorProbe {
            caret_count: 2,
            ..EditorProbe::default()
        };
        assert!(pipeline.suggest(&doc, multi_caret, None).await.is_none());

        let disposed = EditorProbe {
            disposed: true,
            ..EditorProbe::default()
        };
        assert!(pipeline.suggest(&doc, disposed, None).await.is_none());
    }

    #[tokio::test]
    async fn test_suggest_skips_empty_prefix() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = calls.clone();
        let backend = ScriptedBackend::backend(move |_, _, _| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(ChatMessage::assistant("code"))
        });
        let pipeline = InlinePipeline::new(
            inline_settings(),
            backend,
            Arc::new(RecordingNotifier::default()),
        );

        let suggestion = pipeline
            .suggest(&document("   \n  tail", 0), EditorProbe::default(), None)
            .await;
        assert!(suggestion.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_suggest_suppresses_duplicate_of_suffix() {
        let pipeline = InlinePipeline::new(
            inline_settings(),
            reply_backend("public function __construct() {}"),
            Arc::new(RecordingNotifier::default()),
        );

        let text = "class Foo {\n    $x = 1;\n\npublic function __construct() {}\n}";
        let caret = text.find("\n\n").expect("caret") + 2;
        let suggestion = pipeline
            .suggest(&document(text, caret), EditorProbe::default(), None)
            .await;
        assert!(suggestion.is_none());
    }

    #[tokio::test]
    async fn test_suggest_suppresses_duplicate_declaration_name() {
        let pipeline = InlinePipeline::new(
            inline_settings(),
            reply_backend("function save() {\n    // persist\n}"),
            Arc::new(RecordingNotifier::default()),
        );

        let text = "function save() {}\n\nfunction load() {\n    ";
        let suggestion = pipeline
            .suggest(&document(text, text.len()), EditorProbe::default(), None)
            .await;
        assert!(suggestion.is_none());
    }

    #[tokio::test]
    async fn test_suggest_rejects_non_member_code_at_class_level() {
        struct ClassScope(usize);
        impl ScopeOutline for ClassScope {
            fn enclosing_unit(&self, _offset: usize) -> Option<ScopeUnit> {
                Some(ScopeUnit {
                    kind: ScopeKind::Class,
                    start: 0,
                    end: self.0,
                })
            }
        }

        let text = "class Foo {\n    \n}";
        let scope = ClassScope(text.len());

        let rejected = InlinePipeline::new(
            inline_settings(),
            reply_backend("echo 'hi';"),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(rejected
            .suggest(&document(text, 16), EditorProbe::default(), Some(&scope))
            .await
            .is_none());

        let accepted = InlinePipeline::new(
            inline_settings(),
            reply_backend("public function bar() {}"),
            Arc::new(RecordingNotifier::default()),
        );
        assert_eq!(
            accepted
                .suggest(&document(text, 16), EditorProbe::default(), Some(&scope))
                .await
                .as_deref(),
            Some("public function bar() {}")
        );
    }

    #[tokio::test]
    async fn test_backend_error_degrades_to_none_with_rate_limited_warning() {
        let recorder = Arc::new(RecordingNotifier::default());
        let backend =
            ScriptedBackend::backend(|_, _, _| Err(BackendError::transport("boom")));
        let pipeline = InlinePipeline::new(inline_settings(), backend, recorder.clone());

        let text = "function sum() {\n    ";
        let doc = document(text, text.len());
        assert!(pipeline
            .suggest(&doc, EditorProbe::default(), None)
            .await
            .is_none());
        assert!(pipeline
            .suggest(&doc, EditorProbe::default(), None)
            .await
            .is_none());

        // two failures inside the interval produce exactly one warning
        assert_eq!(recorder.warnings.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_api_config_warns_once_and_never_calls_backend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = calls.clone();
        let backend = ScriptedBackend::backend(move |_, _, _| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(ChatMessage::assistant("code"))
        });
        let recorder = Arc::new(RecordingNotifier::default());
        let settings = Settings {
            inline_enabled: true,
            api_key: String::new(),
            ..Settings::default()
        };
        let pipeline = InlinePipeline::new(settings, backend, recorder.clone());

        let text = "function sum() {\n    ";
        let doc = document(text, text.len());
        assert!(pipeline
            .suggest(&doc, EditorProbe::default(), None)
            .await
            .is_none());
        assert!(pipeline
            .suggest(&doc, EditorProbe::default(), None)
            .await
            .is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.warnings.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_suggestion_is_clipped_to_max_chars() {
        let long_reply = format!("$x = '{}';", "y".repeat(3_000));
        let pipeline = InlinePipeline::new(
            inline_settings(),
            reply_backend(&long_reply),
            Arc::new(RecordingNotifier::default()),
        );

        let text = "function sum() {\n    ";
        let suggestion = pipeline
            .suggest(&document(text, text.len()), EditorProbe::default(), None)
            .await
            .expect("suggestion");
        assert_eq!(suggestion.chars().count(), MAX_SUGGESTION_CHARS);
    }

    #[test]
    fn test_build_messages_carries_windows_and_instruction() {
        let messages = build_messages("Base prompt.", "a.php", "PHP", "PRE", "SUF");
        assert_eq!(messages.len(), 2);

        let system = messages[0].content_str();
        assert!(system.starts_with("Base prompt.\n\n"));
        assert!(system.contains("code completion engine"));

        let user = messages[1].content_str();
        assert!(user.contains("File: a.php"));
        assert!(user.contains("Language: PHP"));
        assert!(user.contains("PREFIX (before cursor):\nPRE"));
        assert!(user.contains("SUFFIX (after cursor):\nSUF"));
    }
}
