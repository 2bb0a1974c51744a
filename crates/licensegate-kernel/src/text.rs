use std::collections::BTreeSet;

/// Domain words too common in tool names to carry matching signal.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "tool", "tools", "software", "license", "request", "app", "apps",
    "new",
];

const MIN_TOKEN_LEN: usize = 3;

/// Lowercase, collapse every run of non `[a-z0-9]` characters into a single space, trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_gap = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_gap && !out.is_empty() {
                out.push(' ');
            }
            pending_gap = false;
            out.push(ch);
        } else {
            pending_gap = true;
        }
    }
    out
}

pub fn tokenize(text: &str) -> BTreeSet<String> {
    normalize(text)
        .split(' ')
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}
