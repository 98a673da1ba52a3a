//! Term literal normalization: quotes, escapes, flags, wildcards.

use koralq_core::{Term, TermType};

/// Strip one matching pair of quotes (`'...'` or `"..."`) and resolve
/// the escapes valid inside them. Unquoted input passes through
/// unchanged, so normalization is a fixed point. Returns `None` on
/// unbalanced quoting.
pub fn unquote(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(c @ ('\'' | '"')) => c,
        _ => return Some(raw.to_string()),
    };
    if raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }
    let body = &raw[1..raw.len() - quote.len_utf8()];
    // A trailing escaped quote means the closing quote is missing.
    if ends_with_escape(body) {
        return None;
    }
    Some(unescape(body))
}

fn ends_with_escape(body: &str) -> bool {
    let trailing_backslashes = body.chars().rev().take_while(|&c| c == '\\').count();
    trailing_backslashes % 2 == 1
}

/// Resolve `\'`, `\"`, `\\`, and the COSMAS wordform escape `\:`.
/// Unknown escapes keep their backslash.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(e @ ('\'' | '"' | '\\' | ':')) => out.push(e),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Escape regex metacharacters so a literal can be embedded in a
/// pattern verbatim.
pub fn escape_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '\\' | '.' | '^' | '$' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Substring-match pattern for the `/x` flag.
pub fn substring_regex(literal: &str) -> String {
    format!(".*?{}.*?", escape_regex(literal))
}

pub fn has_wildcards(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '?' | '*' | '+'))
}

/// Apply a run of term flags (`i`, `I`, `x`) to a term. `I` is the
/// explicit case-sensitive marker and changes nothing. Returns `false`
/// for a flag letter that is not recognized.
pub fn apply_flag(term: &mut Term, flag: char) -> bool {
    match flag {
        'i' => {
            *term = std::mem::take(term).case_insensitive();
            true
        }
        'I' => true,
        'x' => {
            if let Some(key) = &term.key {
                term.key = Some(substring_regex(key));
            }
            term.term_type = Some(TermType::Regex);
            true
        }
        _ => false,
    }
}
