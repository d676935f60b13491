use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use vault::ai::{DisabledModel, RemoteModel, HINT_MISSING_KEY};
use vault::db::{NoteInput, NoteStore, NoteSummary, NotesDB};
use vault::error::VaultError;
use vault::memory::{EMPTY_VAULT_ANSWER, NOTHING_SURFACED, NO_REMOTE_MATCHES_REASON};
use vault::{MemoryEngine, Mode, SharedStore, Status};

/// Remote double: replays canned replies in order (last one repeats) and
/// counts calls.
struct ScriptedModel {
    replies: Vec<Result<String, String>>,
    calls: AtomicUsize,
    prompts: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect(),
            calls: AtomicUsize::new(0),
            prompts: parking_lot::Mutex::new(vec![]),
        })
    }

    fn text(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply)])
    }

    fn failing(err: &str) -> Arc<Self> {
        Self::new(vec![Err(err)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RemoteModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "gemini-test"
    }

    fn available(&self) -> bool {
        true
    }

    async fn generate_content(&self, prompt: &str) -> Result<Value, VaultError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Err("no scripted reply".into()));
        match reply {
            Ok(text) => Ok(json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})),
            Err(e) => Err(VaultError::AiBackend(e)),
        }
    }
}

fn test_db() -> Arc<NotesDB> {
    Arc::new(NotesDB::open(":memory:").expect("in-memory db"))
}

fn engine(db: &Arc<NotesDB>, remote: Arc<dyn RemoteModel>) -> MemoryEngine {
    let store: SharedStore = db.clone();
    MemoryEngine::new(store, remote)
}

fn add(db: &NotesDB, title: &str, content: &str, tags: &[&str]) -> NoteSummary {
    let n = db.insert(NoteInput::new(title, content)).unwrap();
    let tags: Vec<String> = tags.iter().map(|s| s.to_string()).collect();
    db.set_tags(n.id, &tags).unwrap();
    db.get(n.id).unwrap().unwrap()
}

// --- caller errors and empty vault ---

#[tokio::test]
async fn blank_question_is_caller_error() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let remote = ScriptedModel::text("{}");
    let mem = engine(&db, remote.clone());

    for q in ["", "   \n\t"] {
        let ans = mem.ask(q).await;
        assert_eq!(ans.status, Status::Error);
        assert_eq!(ans.message.as_deref(), Some("Ask a question before invoking Memory."));
        assert_eq!(ans.answer, None);
    }
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn empty_vault_skips_remote() {
    let db = test_db();
    let remote = ScriptedModel::text(r#"{"ids":[1],"answer":"x"}"#);
    let mem = engine(&db, remote.clone());

    let ans = mem.ask("what did I save?").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Local));
    assert_eq!(ans.answer.as_deref(), Some(EMPTY_VAULT_ANSWER));
    assert_eq!(remote.calls(), 0);
}

// --- local only ---

#[tokio::test]
async fn local_recall_without_remote() {
    let db = test_db();
    add(&db, "Groceries", "milk, eggs", &["milk", "eggs"]);
    add(&db, "Side project", "learn python", &["python"]);
    let mem = engine(&db, Arc::new(DisabledModel::with_hint(HINT_MISSING_KEY)));

    let ans = mem.ask("milk and eggs").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Local));
    let text = ans.answer.unwrap();
    assert!(text.starts_with("Here's what surfaced:"));
    assert!(text.contains("[1] Groceries #milk #eggs — milk, eggs"));
    assert!(!text.contains("Side project"));
    assert_eq!(ans.message.as_deref(), Some(HINT_MISSING_KEY));
}

#[tokio::test]
async fn local_miss_suggests_new_keyword() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let mem = engine(&db, Arc::new(DisabledModel::new()));

    let ans = mem.ask("kubernetes").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.answer.as_deref(), Some(NOTHING_SURFACED));
    assert_eq!(ans.message, None);
}

// --- remote happy paths ---

#[tokio::test]
async fn remote_answer_is_returned_verbatim() {
    let db = test_db();
    add(&db, "Groceries", "milk\neggs", &["groceries", "milk"]);
    let remote = ScriptedModel::text(
        "```json\n{\"ids\":[1],\"answer\":\"Grab milk and eggs [1].\",\"reason\":\"From your list\"}\n```",
    );
    let mem = engine(&db, remote.clone());

    let ans = mem.ask("what should I buy?").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Gemini));
    assert_eq!(ans.answer.as_deref(), Some("Grab milk and eggs [1]."));
    assert_eq!(ans.message.as_deref(), Some("From your list"));
    assert_eq!(remote.calls(), 1);

    let prompt = remote.last_prompt();
    assert!(prompt.contains("[1] Groceries | tags: groceries, milk | preview: milk eggs"));
    assert!(prompt.ends_with("Question: what should I buy?\nJSON:"));
}

#[tokio::test]
async fn remote_ids_without_answer_are_formatted_locally() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let trip = add(&db, "Lisbon trip", "book flights", &["lisbon", "trip"]);
    let remote = ScriptedModel::text(&format!(r#"{{"ids":[{}, {}],"answer":""}}"#, trip.id, trip.id));
    let mem = engine(&db, remote);

    let ans = mem.ask("travel plans").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Local));
    let text = ans.answer.unwrap();
    assert_eq!(text.matches("Lisbon trip").count(), 1);
    assert!(!text.contains("Groceries"));
}

#[tokio::test]
async fn remote_ids_that_miss_use_local_matches() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let remote = ScriptedModel::text(r#"{"ids":[99],"answer":""}"#);
    let mem = engine(&db, remote);

    let ans = mem.ask("milk").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Local));
    assert!(ans.answer.unwrap().contains("Groceries"));
    assert_eq!(ans.message.as_deref(), Some(NO_REMOTE_MATCHES_REASON));
}

#[tokio::test]
async fn remote_prose_with_citations() {
    let db = test_db();
    let n = add(&db, "Groceries", "milk", &["milk"]);
    let reply = format!("You noted milk in [{}].", n.id);
    let mem = engine(&db, ScriptedModel::text(&reply));

    let ans = mem.ask("milk?").await;
    assert_eq!(ans.mode, Some(Mode::Gemini));
    assert_eq!(ans.answer.as_deref(), Some(reply.as_str()));
}

#[tokio::test]
async fn remote_nothing_anywhere() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let mem = engine(&db, ScriptedModel::text(r#"{"ids":[],"answer":""}"#));

    let ans = mem.ask("kubernetes").await;
    assert_eq!(ans.status, Status::Ok);
    assert_eq!(ans.mode, Some(Mode::Local));
    assert_eq!(ans.answer.as_deref(), Some(NOTHING_SURFACED));
}

// --- remote failures ---

#[tokio::test]
async fn missing_model_is_explained() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let remote = ScriptedModel::failing("Gemini returned 404 Not Found: models/x not found");
    let mem = engine(&db, remote);

    let ans = mem.ask("milk").await;
    assert_eq!(ans.status, Status::Error);
    assert_eq!(ans.mode, Some(Mode::Local));
    let msg = ans.message.unwrap();
    assert!(msg.contains("gemini-test"), "{msg}");
    assert!(msg.contains("Showing local recall instead."));
    // best local guess still attached
    assert!(ans.answer.unwrap().contains("Groceries"));
}

#[tokio::test]
async fn rejected_key_is_explained() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let mem = engine(&db, ScriptedModel::failing("API key not valid"));

    let ans = mem.ask("milk").await;
    assert_eq!(ans.status, Status::Error);
    assert!(ans.message.unwrap().contains("GEMINI_API_KEY"));
}

#[tokio::test]
async fn unparseable_reply_falls_back() {
    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let mem = engine(&db, ScriptedModel::text("I'm not sure what you mean."));

    let ans = mem.ask("milk").await;
    assert_eq!(ans.status, Status::Error);
    assert_eq!(
        ans.message.as_deref(),
        Some("Gemini was unavailable, so Memory shared local recall instead.")
    );
    assert!(ans.answer.unwrap().contains("Groceries"));
}

#[tokio::test]
async fn untagged_vault_never_calls_remote() {
    let db = test_db();
    db.insert(NoteInput::new("Groceries", "milk")).unwrap();
    let remote = ScriptedModel::text(r#"{"ids":[1],"answer":"x"}"#);
    let mem = engine(&db, remote.clone());

    let ans = mem.ask("milk").await;
    assert_eq!(remote.calls(), 0);
    assert_eq!(ans.status, Status::Error);
    // untagged notes are still searched on their words
    assert!(ans.answer.unwrap().contains("Groceries"));
}

#[tokio::test]
async fn empty_remote_payload_falls_back() {
    struct Silent;
    #[async_trait]
    impl RemoteModel for Silent {
        fn model_name(&self) -> &str {
            "silent"
        }
        fn available(&self) -> bool {
            true
        }
        async fn generate_content(&self, _prompt: &str) -> Result<Value, VaultError> {
            Ok(json!({"candidates": []}))
        }
    }

    let db = test_db();
    add(&db, "Groceries", "milk", &["milk"]);
    let mem = engine(&db, Arc::new(Silent));
    let ans = mem.ask("milk").await;
    assert_eq!(ans.status, Status::Error);
    assert_eq!(ans.mode, Some(Mode::Local));
}

// --- tagging ---

#[tokio::test]
async fn ensure_tags_local_fallback() {
    let db = test_db();
    let n = db
        .insert(NoteInput::new("Groceries", "milk eggs milk bread eggs milk"))
        .unwrap();
    let mem = engine(&db, Arc::new(DisabledModel::new()));

    let tags = mem.ensure_tags(&n).await.unwrap();
    assert_eq!(tags.as_slice(), ["groceries", "milk", "eggs", "bread"]);
    assert_eq!(db.get(n.id).unwrap().unwrap().tags, tags.as_slice());
}

#[tokio::test]
async fn ensure_tags_is_idempotent_locally() {
    let db = test_db();
    let n = db.insert(NoteInput::new("Weekly sync", "prep talking points")).unwrap();
    let mem = engine(&db, Arc::new(DisabledModel::new()));

    let first = mem.ensure_tags(&n).await.unwrap();
    let again = db.get(n.id).unwrap().unwrap();
    let second = mem.ensure_tags(&again).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn ensure_tags_default_note_tag() {
    let db = test_db();
    let n = db.insert(NoteInput::new("", "a b c")).unwrap();
    let mem = engine(&db, Arc::new(DisabledModel::new()));
    assert_eq!(mem.ensure_tags(&n).await.unwrap().as_slice(), ["note"]);
}

#[tokio::test]
async fn ensure_tags_uses_remote_after_title() {
    let db = test_db();
    let n = db.insert(NoteInput::new("Lisbon", "flights and hotel")).unwrap();
    let remote = ScriptedModel::text("Travel, lisbon, Hotels\nflights, budget, extra");
    let mem = engine(&db, remote.clone());

    let tags = mem.ensure_tags(&n).await.unwrap();
    assert_eq!(tags.as_slice(), ["lisbon", "travel", "hotels", "flights", "budget"]);
    assert!(remote.last_prompt().contains("Title: Lisbon\nBody: flights and hotel\nTags:"));
}

#[tokio::test]
async fn ensure_tags_remote_failure_is_silent() {
    let db = test_db();
    let n = db.insert(NoteInput::new("", "python python rust")).unwrap();
    let mem = engine(&db, ScriptedModel::failing("quota exceeded"));
    let tags = mem.ensure_tags(&n).await.unwrap();
    assert_eq!(tags.as_slice(), ["python", "rust"]);
}

#[tokio::test]
async fn ensure_tags_remote_junk_falls_back() {
    let db = test_db();
    let n = db.insert(NoteInput::new("", "python python rust")).unwrap();
    let mem = engine(&db, ScriptedModel::text("ok, a, #"));
    let tags = mem.ensure_tags(&n).await.unwrap();
    assert_eq!(tags.as_slice(), ["python", "rust"]);
}

#[tokio::test]
async fn ensure_tags_on_deleted_note() {
    let db = test_db();
    let n = db.insert(NoteInput::new("gone", "soon")).unwrap();
    assert!(db.delete(n.id).unwrap());
    let mem = engine(&db, Arc::new(DisabledModel::new()));
    let err = mem.ensure_tags(&n).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound));
}

#[tokio::test]
async fn reindex_then_ask() {
    let db = test_db();
    db.insert(NoteInput::new("Groceries", "milk eggs")).unwrap();
    db.insert(NoteInput::new("Reading list", "dune neuromancer")).unwrap();
    let mem = engine(&db, Arc::new(DisabledModel::new()));

    assert_eq!(mem.reindex_all().await.unwrap(), 2);
    let ans = mem.ask("any books on my reading list?").await;
    let text = ans.answer.unwrap();
    assert!(text.contains("Reading list"));
    assert!(!text.contains("Groceries"));
}

#[tokio::test]
async fn edited_note_is_retagged() {
    let db = test_db();
    let n = db.insert(NoteInput::new("Groceries", "milk eggs milk")).unwrap();
    let mem = engine(&db, Arc::new(DisabledModel::new()));
    assert_eq!(mem.ensure_tags(&n).await.unwrap().as_slice(), ["groceries", "milk", "eggs"]);

    let input = NoteInput::new("Lisbon trip", "flights hotel flights");
    let edited = vault::store_call(&db, move |db| db.update(n.id, input))
        .await
        .unwrap()
        .unwrap();
    let tags = mem.ensure_tags(&edited).await.unwrap();
    assert_eq!(tags.as_slice(), ["lisbon", "trip", "flights", "hotel"]);

    let stored = db.get(n.id).unwrap().unwrap();
    assert_eq!(stored.tags, tags.as_slice());
    assert_eq!(stored.title, "Lisbon trip");

    // recall follows the new tags, not the old ones
    let ans = mem.ask("flights to lisbon").await;
    assert!(ans.answer.unwrap().contains("[1] Lisbon trip"));
    assert_eq!(mem.ask("milk").await.answer.as_deref(), Some(NOTHING_SURFACED));
}
