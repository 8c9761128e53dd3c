use std::collections::HashSet;

/// Placeholder identifier the IDE injects into in-flight completion copies
/// of a document; it must never auto-trigger a request.
pub const IDE_COMPLETION_PLACEHOLDER: &str = "IntellijIdeaRulezzz";

/// Whether an inserted document fragment qualifies as an auto-trigger:
/// anything containing a newline or a non-whitespace character, except the
/// IDE placeholder token.
pub fn should_auto_trigger(inserted: &str) -> bool {
    if inserted.is_empty() || inserted == IDE_COMPLETION_PLACEHOLDER {
        return false;
    }
    inserted.contains('\n') || inserted.chars().any(|c| !c.is_whitespace())
}

/// Normalize a raw model reply into insertable code: unwrap one fenced code
/// block, drop conversational lead-ins.
pub fn sanitize_suggestion(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }
    let text = strip_code_fences(text).trim();
    strip_common_prefixes(text).trim_start().to_string()
}

/// Drop a leading bare `()` when the prefix already ends with a closing
/// paren: the model is finishing a call that is already finished.
pub fn strip_leading_empty_parens(prefix: &str, suggestion: &str) -> String {
    let trimmed = suggestion.trim_start();
    if prefix.trim_end().ends_with(')') {
        if let Some(rest) = trimmed.strip_prefix("()") {
            return rest.trim_start().to_string();
        }
    }
    suggestion.to_string()
}

/// The suggestion restates what already follows the caret. Either the
/// trimmed suffix literally starts with the whole suggestion, or the
/// suggestion's first line (whitespace/case-insensitive) matches one of the
/// suffix's leading lines. Only the first line is compared; duplication
/// deeper into a multi-line suggestion is not detected.
pub fn is_duplicate_of_suffix(suggestion: &str, suffix: &str) -> bool {
    let suggestion = suggestion.trim_start();
    if suggestion.is_empty() {
        return false;
    }
    let suffix = suffix.trim_start();
    if suffix.is_empty() {
        return false;
    }
    if suffix.starts_with(suggestion) {
        return true;
    }

    let first_line = first_nonempty_line(suggestion);
    if first_line.is_empty() {
        return false;
    }
    let canon = canonical_line(first_line);

    suffix
        .lines()
        .take(50)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| canonical_line(line) == canon)
}

/// The suggestion repeats code the user just wrote: its first line matches
/// one of the last five non-blank prefix lines, or it opens a new
/// function-like declaration right after a line that already ends
/// mid-declaration, or it is a bare parameter list after a closed one.
pub fn is_echoing_prefix(suggestion: &str, prefix: &str) -> bool {
    let suggestion = suggestion.trim_start();
    if suggestion.is_empty() {
        return false;
    }
    let first_line = first_nonempty_line(suggestion);
    if first_line.is_empty() {
        return false;
    }
    let canon = canonical_line(first_line);
    let starts_with_function = canon.starts_with("function");

    let nonempty: Vec<&str> = prefix
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let recent_canonical: Vec<String> = nonempty[nonempty.len().saturating_sub(5)..]
        .iter()
        .map(|line| canonical_line(line))
        .collect();

    if starts_with_function
        && recent_canonical.iter().any(|line| {
            line.ends_with("function")
                || line.ends_with("publicfunction")
                || line.ends_with("protectedfunction")
                || line.ends_with("privatefunction")
        })
    {
        return true;
    }

    if let Some(last) = recent_canonical.last() {
        if last.ends_with(')') && (canon == "()" || canon.starts_with("()")) {
            return true;
        }
    }

    recent_canonical.iter().any(|line| *line == canon)
}

/// Name of the function/method the suggestion's first construct declares,
/// if it declares one.
pub fn extract_function_name(suggestion: &str) -> Option<String> {
    function_name_in_line(first_nonempty_line(suggestion.trim_start()))
}

/// Whether the suffix declares a function/method with this name.
pub fn suffix_contains_function_name(suffix: &str, name: &str) -> bool {
    suffix
        .lines()
        .filter_map(function_name_in_line)
        .any(|declared| declared.eq_ignore_ascii_case(name))
}

/// Function/method names declared anywhere in the text. Heuristic fallback
/// for when no syntax-backed outline is available.
pub fn collect_function_names(text: &str) -> HashSet<String> {
    text.lines().filter_map(function_name_in_line).collect()
}

/// Whether a line can open a class-member declaration. Used when the caret
/// sits directly in a class body: anything else would be a syntax error
/// there.
pub fn is_class_member_declaration(first_line: &str) -> bool {
    let line = first_line.trim_start();
    if line.is_empty() {
        return false;
    }
    if line.starts_with("//")
        || line.starts_with('#')
        || line.starts_with("/*")
        || line.starts_with('*')
        || line.starts_with('}')
    {
        return true;
    }

    const MEMBER_KEYWORDS: [&str; 10] = [
        "public",
        "protected",
        "private",
        "static",
        "abstract",
        "final",
        "readonly",
        "function",
        "const",
        "var",
    ];
    let first_word = line
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    let lowered = first_word.to_ascii_lowercase();
    MEMBER_KEYWORDS.contains(&lowered.as_str()) || lowered == "use"
}

fn first_nonempty_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Whitespace-free, lowercased form for order-insensitive line comparison.
fn canonical_line(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn strip_common_prefixes(text: &str) -> &str {
    const PREFIXES: [&str; 4] = ["Assistant:", "assistant:", "Sure,", "Sure:"];
    let trimmed = text.trim_start();
    for prefix in PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }
    trimmed
}

/// Unwrap a fenced code block (with optional language tag) when the reply
/// carries one; anything malformed is returned untouched.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(fence_start) = trimmed.find("```") else {
        return trimmed;
    };
    let Some(after_tag) = trimmed[fence_start + 3..]
        .find('\n')
        .map(|i| fence_start + 3 + i)
    else {
        return trimmed;
    };
    let Some(fence_end) = trimmed[after_tag + 1..]
        .find("```")
        .map(|i| after_tag + 1 + i)
    else {
        return trimmed;
    };
    &trimmed[after_tag + 1..fence_end]
}

/// Find `function <name>(` in a line, tolerating a `&` return-by-reference
/// marker. The keyword must stand alone as a word.
fn function_name_in_line(line: &str) -> Option<String> {
    // ASCII-only lowering keeps byte offsets aligned with `line`.
    let lowered = line.to_ascii_lowercase();
    for (index, _) in lowered.match_indices("function") {
        let before_ok = index == 0
            || !lowered[..index]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after = &line[index + "function".len()..];
        if !before_ok || !after.starts_with(|c: char| c.is_whitespace()) {
            continue;
        }

        let after = after.trim_start().trim_start_matches('&').trim_start();
        let name: String = after
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            continue;
        }
        let rest = &after[name.len()..];
        if rest.trim_start().starts_with('(') {
            return Some(name);
        }
    }
    None
}
