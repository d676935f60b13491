//! Local recall: tag/word overlap between a question and each note.
//!
//! Deterministic and offline. Used on its own when no remote model is
//! configured, and as the safety net when the remote path fails.

use std::collections::HashSet;

use crate::db::NoteSummary;
use crate::limits::MIN_TOKEN_LEN;
use crate::tokenize::{normalize, tokenize};

/// A note that shares at least one stem with the question.
#[derive(Debug, Clone, Copy)]
pub struct RecallHit<'a> {
    pub score: usize,
    pub note: &'a NoteSummary,
}

/// Stems a note is compared on: its tags if it has any, otherwise the
/// words of its title and body.
pub fn note_stems(note: &NoteSummary) -> HashSet<String> {
    if note.tags.is_empty() {
        return tokenize(&format!("{} {}", note.title, note.content));
    }
    note.tags
        .iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(|t| normalize(t))
        .collect()
}

/// Score every note by `|question ∩ note|`, drop zero scores, best first.
/// Equal scores keep the order the notes came in. An empty result is a
/// normal miss, not an error.
pub fn search<'a>(question: &str, notes: &'a [NoteSummary], limit: usize) -> Vec<RecallHit<'a>> {
    let wanted = tokenize(question);
    if wanted.is_empty() {
        return vec![];
    }
    let mut hits: Vec<RecallHit<'a>> = notes
        .iter()
        .filter_map(|note| {
            let score = note_stems(note).intersection(&wanted).count();
            (score > 0).then_some(RecallHit { score, note })
        })
        .collect();
    // sort_by is stable, ties stay in input order
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit);
    hits
}

/// Convenience: just the notes, in rank order.
pub fn search_notes<'a>(question: &str, notes: &'a [NoteSummary], limit: usize) -> Vec<&'a NoteSummary> {
    search(question, notes, limit).into_iter().map(|h| h.note).collect()
}
