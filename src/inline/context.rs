pub const MAX_PREFIX_CHARS: usize = 4_000;
pub const MIN_SUFFIX_CHARS: usize = 200;
pub const MAX_SUFFIX_CHARS: usize = 8_000;
/// A semantic unit larger than this is ignored and the raw character
/// windows are used instead.
const MAX_SEMANTIC_UNIT_CHARS: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Method,
    Class,
}

/// Byte span of a semantic unit in the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeUnit {
    pub kind: ScopeKind,
    pub start: usize,
    pub end: usize,
}

/// Language-awareness seam. The embedding surface backs this with its
/// syntax tree; the core never parses source itself.
pub trait ScopeOutline {
    /// Smallest enclosing unit at `offset`: a function or method when the
    /// caret is inside one, else the enclosing class, else None.
    fn enclosing_unit(&self, offset: usize) -> Option<ScopeUnit>;

    /// Names of functions/methods declared anywhere in the file, for
    /// duplicate-declaration suppression.
    fn declared_names(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindows {
    pub prefix: String,
    pub suffix: String,
    /// Caret sits directly in a class body, not inside any function.
    pub at_class_level: bool,
}

/// Raw character windows around the caret.
pub fn extract_context(
    text: &str,
    offset: usize,
    max_prefix_chars: usize,
    max_suffix_chars: usize,
) -> (String, String) {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    let prefix_start = back_chars(text, offset, max_prefix_chars);
    let suffix_end = forward_chars(text, offset, max_suffix_chars);
    (
        text[prefix_start..offset].to_string(),
        text[offset..suffix_end].to_string(),
    )
}

/// Windowed context for a completion request. When the caret sits inside a
/// reasonably-sized semantic unit, both windows are narrowed to that unit's
/// boundaries so sibling code does not leak into the prompt.
pub fn build_context(
    text: &str,
    offset: usize,
    requested_max_suffix_chars: usize,
    scope: Option<&dyn ScopeOutline>,
) -> ContextWindows {
    let max_suffix_chars = requested_max_suffix_chars.clamp(MIN_SUFFIX_CHARS, MAX_SUFFIX_CHARS);
    let offset = floor_char_boundary(text, offset.min(text.len()));

    let unit = scope.and_then(|outline| outline.enclosing_unit(offset));
    let at_class_level = matches!(
        unit,
        Some(ScopeUnit {
            kind: ScopeKind::Class,
            ..
        })
    );

    if let Some((prefix, suffix)) = unit.and_then(|u| narrow_to_unit(text, offset, max_suffix_chars, u))
    {
        return ContextWindows {
            prefix,
            suffix,
            at_class_level,
        };
    }

    let (prefix, suffix) = extract_context(text, offset, MAX_PREFIX_CHARS, max_suffix_chars);
    ContextWindows {
        prefix,
        suffix,
        at_class_level,
    }
}

fn narrow_to_unit(
    text: &str,
    offset: usize,
    max_suffix_chars: usize,
    unit: ScopeUnit,
) -> Option<(String, String)> {
    let start = floor_char_boundary(text, unit.start.min(text.len()));
    let end = floor_char_boundary(text, unit.end.min(text.len()));
    if start >= end || offset < start || offset > end {
        return None;
    }
    if text[start..end].chars().count() > MAX_SEMANTIC_UNIT_CHARS {
        return None;
    }

    let prefix_start = back_chars(text, offset, MAX_PREFIX_CHARS).max(start);
    let suffix_end = forward_chars(text, offset, max_suffix_chars).min(end);
    // A degenerate side means the caret sits on the unit's edge; the raw
    // windows handle that better.
    if prefix_start >= offset || suffix_end <= offset {
        return None;
    }

    let prefix = &text[prefix_start..offset];
    if prefix.trim().is_empty() {
        return None;
    }
    Some((prefix.to_string(), text[offset..suffix_end].to_string()))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Byte index `count` chars before `from` (clamped to the text start).
fn back_chars(text: &str, from: usize, count: usize) -> usize {
    if count == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(index, _)| index)
        .unwrap_or(0)
}

/// Byte index `count` chars after `from` (clamped to the text end).
fn forward_chars(text: &str, from: usize, count: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(index, _)| from + index)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScope(Option<ScopeUnit>);

    impl ScopeOutline for FixedScope {
        fn enclosing_unit(&self, _offset: usize) -> Option<ScopeUnit> {
            self.0
        }
    }

    #[test]
    fn test_extract_context_splits_prefix_and_suffix_around_caret() {
        let (prefix, suffix) = extract_context("hello world", 5, MAX_PREFIX_CHARS, 1_000);
        assert_eq!(prefix, "hello");
        assert_eq!(suffix, " world");
    }

    #[test]
    fn test_extract_context_respects_window_limits() {
        let text = "abcdefghij";
        let (prefix, suffix) = extract_context(text, 5, 2, 3);
        assert_eq!(prefix, "de");
        assert_eq!(suffix, "fgh");
    }

    #[test]
    fn test_extract_context_clamps_offset_and_char_boundaries() {
        let text = "héllo";
        let (prefix, suffix) = extract_context(text, 999, MAX_PREFIX_CHARS, 1_000);
        assert_eq!(prefix, "héllo");
        assert_eq!(suffix, "");

        // offset inside the two-byte 'é' floors to its start
        let (prefix, _) = extract_context(text, 2, MAX_PREFIX_CHARS, 1_000);
        assert_eq!(prefix, "h");
    }

    #[test]
    fn test_build_context_narrows_to_enclosing_unit() {
        let text = "before\nfn inner() {\n    body\n}\nafter";
        let unit = ScopeUnit {
            kind: ScopeKind::Function,
            start: 7,
            end: 30,
        };
        let caret = text.find("body").expect("caret");

        let windows = build_context(text, caret, 1_000, Some(&FixedScope(Some(unit))));
        assert_eq!(windows.prefix, "fn inner() {\n    ");
        assert_eq!(windows.suffix, "body\n}");
        assert!(!windows.at_class_level);
    }

    #[test]
    fn test_build_context_falls_back_when_unit_is_oversized() {
        let body = "x".repeat(9_000);
        let text = format!("fn big() {{{body}}}");
        let unit = ScopeUnit {
            kind: ScopeKind::Function,
            start: 0,
            end: text.len(),
        };
        let caret = 100;

        let windows = build_context(&text, caret, 1_000, Some(&FixedScope(Some(unit))));
        // raw window: full prefix from document start
        assert_eq!(windows.prefix, text[..caret].to_string());
    }

    #[test]
    fn test_build_context_reports_class_level_caret() {
        let text = "class Foo {\n    \n}";
        let unit = ScopeUnit {
            kind: ScopeKind::Class,
            start: 0,
            end: text.len(),
        };
        let caret = 16;

        let windows = build_context(text, caret, 1_000, Some(&FixedScope(Some(unit))));
        assert!(windows.at_class_level);
    }

    #[test]
    fn test_build_context_clamps_requested_suffix_window() {
        let text = format!("prefix{}", "s".repeat(10_000));
        let windows = build_context(&text, 6, 99_999, None);
        assert_eq!(windows.suffix.chars().count(), MAX_SUFFIX_CHARS);

        let windows = build_context(&text, 6, 1, None);
        assert_eq!(windows.suffix.chars().count(), MIN_SUFFIX_CHARS);
    }
}
