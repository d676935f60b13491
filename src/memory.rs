//! Memory: answer questions about the vault.
//!
//! `ask` prefers the remote model and always has local recall to fall back
//! on. Nothing from the remote path escapes as an error; failures turn into
//! a best-effort local answer plus a friendly explanation.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::{RemoteModel, FALLBACK_MODEL};
use crate::db::NoteSummary;
use crate::error::VaultError;
use crate::limits::{ANSWER_NOTES, ANSWER_PREVIEW_CHARS, RECALL_LIMIT};
use crate::parse::{self, RemoteSelection};
use crate::search::search_notes;
use crate::tags::{self, TagSet};
use crate::util::preview;
use crate::{prompts, store_call, SharedStore};

pub const EMPTY_VAULT_ANSWER: &str =
    "Your vault is empty so far. Capture a note and Memory will start indexing it.";
pub const NOTHING_SURFACED: &str = "Memory couldn't link that question to a note yet. \
Try a different keyword or capture the details in a note first.";
pub const NO_REMOTE_MATCHES_REASON: &str =
    "Gemini returned no matches, so Memory surfaced the closest tags locally.";
pub const STORE_UNAVAILABLE: &str = "Memory couldn't read your notes right now. Try again in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Who wrote the answer text: the remote model, or Memory itself from
/// note content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Gemini,
}

/// Result of one `ask`. Built fresh per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryAnswer {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MemoryAnswer {
    fn caller_error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            answer: None,
            mode: None,
            message: Some(message.into()),
        }
    }

    fn local(answer: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            answer: Some(answer.into()),
            mode: Some(Mode::Local),
            message: None,
        }
    }

    fn gemini(answer: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            answer: Some(answer.into()),
            mode: Some(Mode::Gemini),
            message: None,
        }
    }

    fn with_message(mut self, message: Option<String>) -> Self {
        if message.is_some() {
            self.message = message;
        }
        self
    }

    /// Keep the local answer but flag the call as failed.
    fn failed(mut self, message: String) -> Self {
        self.status = Status::Error;
        self.message = Some(message);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

pub struct MemoryEngine {
    store: SharedStore,
    remote: Arc<dyn RemoteModel>,
}

impl MemoryEngine {
    pub fn new(store: SharedStore, remote: Arc<dyn RemoteModel>) -> Self {
        Self { store, remote }
    }

    pub fn remote(&self) -> &dyn RemoteModel {
        self.remote.as_ref()
    }

    /// Answer a free-text question about the vault.
    pub async fn ask(&self, question: &str) -> MemoryAnswer {
        let question = question.trim();
        if question.is_empty() {
            return MemoryAnswer::caller_error(VaultError::EmptyQuestion.to_string());
        }

        let notes = match store_call(&self.store, |s| s.list_all()).await {
            Ok(Ok(notes)) => notes,
            Ok(Err(e)) | Err(e) => {
                warn!(error = %e, "memory could not list notes");
                return MemoryAnswer::caller_error(STORE_UNAVAILABLE);
            }
        };
        if notes.is_empty() {
            return MemoryAnswer::local(EMPTY_VAULT_ANSWER);
        }

        if !self.remote.available() {
            let matches = search_notes(question, &notes, RECALL_LIMIT);
            debug!(matches = matches.len(), "local recall");
            return local_response(&matches).with_message(self.remote.unavailable_hint());
        }

        match self.remote_answer(question, &notes).await {
            Ok(sel) => {
                if let Some(answer) = answer_from_selection(question, &notes, sel) {
                    return answer;
                }
                // empty answer and nothing matched anywhere
                local_response(&[])
            }
            Err(e) => {
                warn!(error = %e, model = self.remote.model_name(), "remote memory request failed");
                let matches = search_notes(question, &notes, RECALL_LIMIT);
                local_response(&matches)
                    .failed(friendly_error_message(&e.to_string(), self.remote.model_name()))
            }
        }
    }

    /// Generate tags for `note` and persist them. `NotFound` if the note was
    /// deleted in the meantime; remote failures never surface here.
    pub async fn ensure_tags(&self, note: &NoteSummary) -> Result<TagSet, VaultError> {
        let tags = tags::generate_tags(self.remote.as_ref(), note).await;
        let id = note.id;
        let list = tags.as_slice().to_vec();
        store_call(&self.store, move |s| s.set_tags(id, &list)).await??;
        info!(note_id = id, tags = %tags, "tags updated");
        Ok(tags)
    }

    /// Re-tag every note in the vault. Returns how many were tagged.
    pub async fn reindex_all(&self) -> Result<usize, VaultError> {
        let notes = store_call(&self.store, |s| s.list_all()).await??;
        let mut tagged = 0;
        for note in &notes {
            match self.ensure_tags(note).await {
                Ok(_) => tagged += 1,
                // deleted while we were working, nothing to do
                Err(VaultError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(tagged)
    }

    async fn remote_answer(
        &self,
        question: &str,
        notes: &[NoteSummary],
    ) -> Result<RemoteSelection, VaultError> {
        let listing = prompts::tag_lines(notes, true);
        if listing.is_empty() {
            return Err(VaultError::Parse("Memory index is empty".into()));
        }
        let prompt = prompts::memory_prompt(&listing, question);
        let raw = self.remote.generate_content(&prompt).await?;
        let text = self.remote.extract_text(&raw)?;
        parse::parse(&text)
    }
}

/// Turn a parsed remote reply into an answer, or `None` when it carried
/// neither text nor any usable note.
fn answer_from_selection(
    question: &str,
    notes: &[NoteSummary],
    sel: RemoteSelection,
) -> Option<MemoryAnswer> {
    let answer_text = sel.answer.as_deref().map(str::trim).unwrap_or_default();
    let mut reason = sel.reason.filter(|r| !r.trim().is_empty());

    let mut matched = notes_by_ids(notes, &sel.ids);
    if matched.is_empty() {
        matched = search_notes(question, notes, RECALL_LIMIT);
        if !matched.is_empty() && reason.is_none() {
            reason = Some(NO_REMOTE_MATCHES_REASON.into());
        }
    }

    if !answer_text.is_empty() {
        return Some(MemoryAnswer::gemini(answer_text).with_message(reason));
    }
    if !matched.is_empty() {
        // text is ours even though the ids came from the model
        return Some(MemoryAnswer::local(format_answer_from_notes(&matched)).with_message(reason));
    }
    None
}

/// Existing notes for `ids`, in the given order, each at most once.
pub fn notes_by_ids<'a>(notes: &'a [NoteSummary], ids: &[i64]) -> Vec<&'a NoteSummary> {
    let mut seen: HashSet<i64> = HashSet::new();
    ids.iter()
        .filter_map(|id| notes.iter().find(|n| n.id == *id))
        .filter(|n| seen.insert(n.id))
        .collect()
}

fn local_response(notes: &[&NoteSummary]) -> MemoryAnswer {
    MemoryAnswer::local(format_answer_from_notes(notes))
}

/// Bulleted summary of up to `ANSWER_NOTES` notes:
/// `- [id] Title #tag1 #tag2 — preview`.
pub fn format_answer_from_notes(notes: &[&NoteSummary]) -> String {
    if notes.is_empty() {
        return NOTHING_SURFACED.to_string();
    }
    let mut lines: Vec<String> = Vec::with_capacity(notes.len().min(ANSWER_NOTES));
    for note in notes.iter().take(ANSWER_NOTES) {
        let title = match note.title.trim() {
            "" => "Untitled",
            t => t,
        };
        let source = match note.content.trim() {
            "" => title,
            c => c,
        };
        let tags = if note.tags.is_empty() {
            String::new()
        } else {
            format!(" #{}", note.tags.join(" #"))
        };
        lines.push(format!(
            "- [{}] {title}{tags} — {}",
            note.id,
            preview(source, ANSWER_PREVIEW_CHARS)
        ));
    }
    format!("Here's what surfaced:\n{}", lines.join("\n"))
}

/// Map raw remote error text to something a user can act on. Total: any
/// input yields a message.
pub fn friendly_error_message(error_text: &str, model: &str) -> String {
    if error_text.contains("not found") && error_text.contains("models/") {
        return format!(
            "Gemini couldn't find the configured model ({model}). Update GEMINI_MODEL_NAME \
             or switch to `{FALLBACK_MODEL}`. Showing local recall instead."
        );
    }
    if error_text.contains("API key") || error_text.to_lowercase().contains("permission") {
        return "Gemini rejected the request. Double-check GEMINI_API_KEY permissions. \
                Showing local recall instead."
            .to_string();
    }
    "Gemini was unavailable, so Memory shared local recall instead.".to_string()
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
