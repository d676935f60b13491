//! Tag generation: remote model first, local word-frequency fallback,
//! title words always in front.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ai::RemoteModel;
use crate::db::NoteSummary;
use crate::error::VaultError;
use crate::limits::MAX_TAGS;
use crate::prompts;
use crate::tokenize::{sanitize_tag, title_tokens, words};

/// Returned when nothing in a note qualifies as a tag.
pub const DEFAULT_TAG: &str = "note";

/// Ordered, de-duplicated, lowercase alphanumeric tags of at least
/// `MIN_TOKEN_LEN` chars, at most `MAX_TAGS` long. The only way to build
/// one is through [`TagSet::from_candidates`], which enforces all of that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn from_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = Vec::with_capacity(MAX_TAGS);
        for raw in candidates {
            let Some(tag) = sanitize_tag(raw.as_ref()) else {
                continue;
            };
            if tags.contains(&tag) {
                continue;
            }
            tags.push(tag);
            if tags.len() == MAX_TAGS {
                break;
            }
        }
        Self(tags)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl std::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Full tag pipeline for one note. Never fails: remote problems are logged
/// and the local heuristic takes over.
pub async fn generate_tags(remote: &dyn RemoteModel, note: &NoteSummary) -> TagSet {
    let body_tags = if remote.available() {
        match remote_tags(remote, note).await {
            Ok(tags) if !tags.is_empty() => tags,
            Ok(_) => {
                debug!(note_id = note.id, "remote tagger returned nothing usable");
                fallback_tags(note)
            }
            Err(e) => {
                warn!(note_id = note.id, error = %e, "remote tag generation failed");
                fallback_tags(note)
            }
        }
    } else {
        fallback_tags(note)
    };
    with_title_first(&note.title, body_tags)
}

/// Ask the remote model for tags and sanitize its reply.
pub async fn remote_tags(
    remote: &dyn RemoteModel,
    note: &NoteSummary,
) -> Result<Vec<String>, VaultError> {
    let prompt = prompts::tag_prompt(&note.title, &note.content);
    let raw = remote.generate_content(&prompt).await?;
    let text = remote.extract_text(&raw)?;
    Ok(extract_tags(&text))
}

/// Split a comma/newline separated reply into sanitized tags.
pub fn extract_tags(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .filter_map(sanitize_tag)
        .take(MAX_TAGS)
        .collect()
}

/// Most frequent words of title + content, ties broken by first
/// appearance. `["note"]` when nothing qualifies.
pub fn fallback_tags(note: &NoteSummary) -> Vec<String> {
    let all = words(&format!("{} {}", note.title, note.content));
    if all.is_empty() {
        return vec![DEFAULT_TAG.to_string()];
    }

    // word -> (count, first index)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, w) in all.iter().enumerate() {
        counts.entry(w.as_str()).or_insert((0, i)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_TAGS)
        .map(|(w, _, _)| w.to_string())
        .collect()
}

/// Title words lead, then the generated tags, duplicates dropped.
pub fn with_title_first(title: &str, tags: Vec<String>) -> TagSet {
    let lead = title_tokens(title);
    TagSet::from_candidates(lead.into_iter().chain(tags))
}
