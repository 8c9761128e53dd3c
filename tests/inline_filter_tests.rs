use draftsman::inline::{
    extract_context, is_duplicate_of_suffix, is_echoing_prefix, sanitize_suggestion,
    should_auto_trigger, IDE_COMPLETION_PLACEHOLDER, MAX_PREFIX_CHARS,
};

#[test]
fn test_extract_context_splits_prefix_and_suffix_around_caret() {
    let (prefix, suffix) = extract_context("hello world", 5, MAX_PREFIX_CHARS, 1_000);
    assert_eq!(prefix, "hello");
    assert_eq!(suffix, " world");
}

#[test]
fn test_sanitize_round_trips() {
    // fenced block containing exactly X yields X
    assert_eq!(sanitize_suggestion("```\nX\n```"), "X");
    // conversational prefix is dropped
    assert_eq!(sanitize_suggestion("Assistant: X"), "X");
    // plain text is a fixed point
    assert_eq!(sanitize_suggestion("X"), "X");
    assert_eq!(sanitize_suggestion(&sanitize_suggestion("X")), "X");
}

#[test]
fn test_should_auto_trigger_matrix() {
    assert!(!should_auto_trigger(""));
    assert!(!should_auto_trigger(" \t "));
    assert!(!should_auto_trigger(IDE_COMPLETION_PLACEHOLDER));

    assert!(should_auto_trigger("\n"));
    assert!(should_auto_trigger("a"));
    assert!(should_auto_trigger("if ("));
}

#[test]
fn test_duplicate_of_suffix_verdicts() {
    let suffix = "\npublic function __construct() {}\nclass Foo {}\n";
    assert!(is_duplicate_of_suffix(
        "public function __construct() {}",
        suffix
    ));
    assert!(!is_duplicate_of_suffix("public function other() {}", suffix));

    // whitespace and case differences do not change the verdict
    assert!(is_duplicate_of_suffix(
        "PUBLIC   FUNCTION   __construct() {}",
        suffix
    ));
}

#[test]
fn test_echoing_prefix_verdicts() {
    let prefix = "line1\nline2\nline3\nif (!defined('ABSPATH')) {\n";
    assert!(is_echoing_prefix("if (!defined('ABSPATH')) {\n// body", prefix));
    assert!(!is_echoing_prefix("public function other() {}", prefix));
}
