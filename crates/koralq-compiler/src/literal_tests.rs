//! Unit tests for literal normalization.

use crate::literal::{apply_flag, escape_regex, substring_regex, unquote};
use koralq_core::{Flag, Term, TermType};

#[test]
fn strips_single_quotes_and_escapes() {
    assert_eq!(unquote(r"'a\'b'").as_deref(), Some("a'b"));
}

#[test]
fn strips_double_quotes_and_escapes() {
    assert_eq!(unquote(r#""a\"b""#).as_deref(), Some(r#"a"b"#));
}

#[test]
fn backslash_escape_resolves_once() {
    assert_eq!(unquote(r"'a\\b'").as_deref(), Some(r"a\b"));
}

#[test]
fn unquoted_input_is_a_fixed_point() {
    let once = unquote(r"'a\'b'").unwrap();
    assert_eq!(unquote(&once), Some(once.clone()));
}

#[test]
fn unbalanced_quote_is_rejected() {
    assert_eq!(unquote("'abc"), None);
    assert_eq!(unquote(r"'abc\'"), None);
    assert_eq!(unquote("'"), None);
}

#[test]
fn mismatched_quotes_are_rejected() {
    assert_eq!(unquote("'abc\""), None);
}

#[test]
fn regex_metacharacters_are_escaped() {
    assert_eq!(escape_regex("a.b*c"), r"a\.b\*c");
    assert_eq!(escape_regex("x(y)[z]{1}"), r"x\(y\)\[z\]\{1\}");
}

#[test]
fn substring_flag_wraps_escaped_literal() {
    assert_eq!(substring_regex("a.b"), r".*?a\.b.*?");
}

#[test]
fn flag_i_sets_case_insensitive() {
    let mut term = Term::new("orth", "baum");
    assert!(apply_flag(&mut term, 'i'));
    assert_eq!(term.flags, vec![Flag::CaseInsensitive]);
}

#[test]
fn flag_upper_i_is_a_no_op() {
    let mut term = Term::new("orth", "baum");
    assert!(apply_flag(&mut term, 'I'));
    assert!(term.flags.is_empty());
}

#[test]
fn flag_x_rewrites_key_to_substring_regex() {
    let mut term = Term::new("orth", "baum");
    assert!(apply_flag(&mut term, 'x'));
    assert_eq!(term.key.as_deref(), Some(".*?baum.*?"));
    assert_eq!(term.term_type, Some(TermType::Regex));
}

#[test]
fn unknown_flag_is_reported() {
    let mut term = Term::new("orth", "baum");
    assert!(!apply_flag(&mut term, 'z'));
}
