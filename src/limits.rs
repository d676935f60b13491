//! Caps and sizes shared across the Memory engine.
//!
//! The tag index, the recall listing and the answer formatter all read
//! from here.

/// A note never carries more than this many tags.
pub const MAX_TAGS: usize = 5;

/// Tokens and tags shorter than this (in chars) are ignored.
pub const MIN_TOKEN_LEN: usize = 3;

/// Local recall returns at most this many notes.
pub const RECALL_LIMIT: usize = 5;

/// Bulleted answers render at most this many notes.
pub const ANSWER_NOTES: usize = 5;

/// Preview length in formatted answers.
pub const ANSWER_PREVIEW_CHARS: usize = 160;

/// Preview length in the listing sent to the remote model.
pub const LISTING_PREVIEW_CHARS: usize = 140;

/// Title length in the listing sent to the remote model.
pub const LISTING_TITLE_CHARS: usize = 60;

/// Body excerpt sent with a tag request.
pub const TAG_PROMPT_BODY_CHARS: usize = 600;

/// Default bound on a single remote call.
pub const REMOTE_TIMEOUT_SECS: u64 = 30;
