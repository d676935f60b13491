//! Text → comparable word stems.
//!
//! Everything the Memory engine compares (questions, tags, note bodies)
//! goes through here, so local recall and tag generation agree on what a
//! "word" is.

use std::collections::HashSet;

use crate::limits::{MAX_TAGS, MIN_TOKEN_LEN};

/// Lowercased words of at least `MIN_TOKEN_LEN` chars, in reading order,
/// repeats kept. Splits on any run of non-alphanumeric chars.
pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Set of normalized stems for `text`.
pub fn tokenize(text: &str) -> HashSet<String> {
    words(text).iter().map(|w| normalize(w)).collect()
}

/// Crude plural folding: "berries" → "berry", "eggs" → "egg".
pub fn normalize(token: &str) -> String {
    let len = token.chars().count();
    if len > 4 {
        if let Some(stem) = token.strip_suffix("ies") {
            return format!("{stem}y");
        }
    }
    if len > 3 {
        if let Some(stem) = token.strip_suffix('s') {
            return stem.to_string();
        }
    }
    token.to_string()
}

/// Reduce a raw tag candidate to `[a-z0-9]+`, or `None` if what's left is
/// too short to be useful.
pub fn sanitize_tag(raw: &str) -> Option<String> {
    let tag: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    (tag.len() >= MIN_TOKEN_LEN).then_some(tag)
}

/// Tags derived from a title alone: sanitized words, first occurrence wins,
/// at most `MAX_TAGS`.
pub fn title_tokens(title: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in title.trim().split(|c: char| !c.is_alphanumeric()) {
        let Some(tok) = sanitize_tag(raw) else { continue };
        if !out.contains(&tok) {
            out.push(tok);
        }
    }
    out.truncate(MAX_TAGS);
    out
}
