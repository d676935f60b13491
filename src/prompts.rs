//! Prompt texts for the remote model.
//!
//! Both remote calls (answering and tagging) build their prompts here so
//! the wording can be tuned in one place.

use crate::db::NoteSummary;
use crate::limits::{LISTING_PREVIEW_CHARS, LISTING_TITLE_CHARS, TAG_PROMPT_BODY_CHARS};
use crate::util::{preview, take_chars};

// ---------------------------------------------------------------------------
// memory.rs — ask
// ---------------------------------------------------------------------------

pub const MEMORY_INSTRUCTIONS: &str = "You are Memory, the built-in second brain for the Vault notes app. \
Each entry below includes a note id, title, tags, and a preview excerpt pulled from the note body. \
Identify the entries that directly answer the user's question and craft a concrete reply. \
If the preview lists items, echo the relevant ones back as bullets or short phrases. \
Always cite note ids in brackets (e.g., [3]) when referencing details. \
Keep the tone concise, warm, and proactive. \
If information looks incomplete, point that out and suggest capturing more detail. \
Respond with JSON: {\"ids\":[numbers],\"answer\":\"final reply\",\"reason\":\"optional note\"}. \
When nothing matches, return an empty ids array and clearly explain why in the answer.";

fn display_title(note: &NoteSummary) -> &str {
    let t = note.title.trim();
    if t.is_empty() {
        "Untitled"
    } else {
        t
    }
}

/// One line per tagged note. Untagged notes are not part of the index and
/// are left out. With `include_preview`, each line ends with a short
/// excerpt of the body.
pub fn tag_lines(notes: &[NoteSummary], include_preview: bool) -> String {
    let mut lines: Vec<String> = Vec::new();
    for note in notes.iter().filter(|n| !n.tags.is_empty()) {
        let title = take_chars(display_title(note), LISTING_TITLE_CHARS);
        let tags = note.tags.join(", ");
        if include_preview {
            let mut excerpt = preview(&note.content, LISTING_PREVIEW_CHARS);
            if excerpt.is_empty() {
                excerpt = "(empty)".into();
            }
            lines.push(format!("[{}] {title} | tags: {tags} | preview: {excerpt}", note.id));
        } else {
            lines.push(format!("[{}] {title} | tags: {tags}", note.id));
        }
    }
    lines.join("\n")
}

pub fn memory_prompt(listing: &str, question: &str) -> String {
    format!("{MEMORY_INSTRUCTIONS}\n\nEntries:\n{listing}\n\nQuestion: {question}\nJSON:")
}

// ---------------------------------------------------------------------------
// tags.rs — remote_tags
// ---------------------------------------------------------------------------

pub const TAG_INSTRUCTIONS: &str = "Generate 1-5 lowercase, single-word tags summarizing this note. \
Prefer nouns. Respond with comma-separated words only.";

pub fn tag_prompt(title: &str, content: &str) -> String {
    let title = match title.trim() {
        "" => "Untitled",
        t => t,
    };
    let body = take_chars(content.trim(), TAG_PROMPT_BODY_CHARS);
    format!("{TAG_INSTRUCTIONS}\nTitle: {title}\nBody: {body}\nTags:")
}
