//! SQLite-backed notes store.
//!
//! The Memory engine only sees the narrow [`NoteStore`] capability: list
//! everything, and overwrite one note's tags. The rest of `NotesDB` is the
//! plumbing the binary and tests need to get notes in and out.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::tags::TagSet;
use crate::util::now_ms;

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Set busy_timeout on every connection handed out by the pool.
#[derive(Debug)]
struct BusyTimeoutCustomizer;
impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for BusyTimeoutCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }
}

/// Read-only view of a note as the Memory engine consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct NoteInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NoteInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// What the Memory engine needs from wherever notes live.
pub trait NoteStore: Send + Sync {
    /// Every note, most recently updated first.
    fn list_all(&self) -> Result<Vec<NoteSummary>, VaultError>;

    /// Replace a note's tags. `NotFound` if the note is gone.
    fn set_tags(&self, id: i64, tags: &[String]) -> Result<(), VaultError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated_at);
";

const COLS: &str = "id, title, content, tags, created_at, updated_at";

fn validate_input(input: &NoteInput) -> Result<(String, String), VaultError> {
    let title = input.title.trim().to_string();
    let content = input.content.trim().to_string();
    if title.is_empty() && content.is_empty() {
        return Err(VaultError::Validation("Notes need a title or content".into()));
    }
    Ok((title, content))
}

fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<NoteSummary> {
    let tags_str: String = row.get("tags")?;
    Ok(NoteSummary {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct NotesDB {
    pool: Pool<SqliteConnectionManager>,
}

impl NotesDB {
    fn conn(&self) -> Result<PooledConn, VaultError> {
        self.pool.get().map_err(|e| VaultError::Internal(format!("pool: {e}")))
    }

    /// Open (or create) a store at the given path. `":memory:"` gives a
    /// private in-memory database shared by all pool connections.
    pub fn open(path: &str) -> Result<Self, VaultError> {
        let pool_size = if path == ":memory:" { 2 } else { 4 };
        let manager = if path == ":memory:" {
            // unique name per store so tests don't see each other's notes
            let name = uuid::Uuid::new_v4().to_string();
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
        } else {
            SqliteConnectionManager::file(path)
        };
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(BusyTimeoutCustomizer))
            .build(manager)
            .map_err(|e| VaultError::Internal(format!("pool: {e}")))?;

        let conn = pool.get().map_err(|e| VaultError::Internal(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        // stores created before tagging existed lack the column
        if conn.prepare("SELECT tags FROM notes LIMIT 0").is_err() {
            tracing::info!("adding tags column to notes table");
            conn.execute("ALTER TABLE notes ADD COLUMN tags TEXT NOT NULL DEFAULT '[]'", [])?;
        }
        drop(conn);
        Ok(Self { pool })
    }

    pub fn insert(&self, input: NoteInput) -> Result<NoteSummary, VaultError> {
        let (title, content) = validate_input(&input)?;
        let now = now_ms();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notes (title, content, tags, created_at, updated_at) \
             VALUES (?1, ?2, '[]', ?3, ?3)",
            params![title, content, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(NoteSummary {
            id,
            title,
            content,
            tags: vec![],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<NoteSummary>, VaultError> {
        let conn = self.conn()?;
        let note = conn
            .query_row(
                &format!("SELECT {COLS} FROM notes WHERE id = ?1"),
                [id],
                row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Overwrite title and content, bumping `updated_at`. Tags are left
    /// alone; callers re-run tagging afterwards.
    pub fn update(&self, id: i64, input: NoteInput) -> Result<NoteSummary, VaultError> {
        let (title, content) = validate_input(&input)?;
        let changed = self.conn()?.execute(
            "UPDATE notes SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![title, content, now_ms(), id],
        )?;
        if changed == 0 {
            return Err(VaultError::NotFound);
        }
        self.get(id)?.ok_or(VaultError::NotFound)
    }

    pub fn delete(&self, id: i64) -> Result<bool, VaultError> {
        let n = self.conn()?.execute("DELETE FROM notes WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<usize, VaultError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl NoteStore for NotesDB {
    fn list_all(&self) -> Result<Vec<NoteSummary>, VaultError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM notes ORDER BY updated_at DESC, id DESC"
        ))?;
        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    fn set_tags(&self, id: i64, tags: &[String]) -> Result<(), VaultError> {
        let cleaned = TagSet::from_candidates(tags);
        let json = serde_json::to_string(cleaned.as_slice())
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        // tagging is not an edit, so updated_at stays put
        let changed = self
            .conn()?
            .execute("UPDATE notes SET tags = ?1 WHERE id = ?2", params![json, id])?;
        if changed == 0 {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }
}
