//! vault — notes vault with a Memory engine.
//! Tags every note, answers questions with a remote model when one is
//! configured, and falls back to local tag recall when it isn't.

pub mod ai;
pub mod db;
pub mod error;
pub mod limits;
pub mod memory;
pub mod parse;
pub mod prompts;
pub mod search;
pub mod tags;
pub mod tokenize;
pub mod util;

use std::sync::Arc;

pub use memory::{MemoryAnswer, MemoryEngine, Mode, Status};
pub use tags::TagSet;

pub type SharedStore = Arc<dyn db::NoteStore>;

/// Run a blocking store operation on tokio's blocking thread pool.
///
/// Store implementations are synchronous (SQLite); calling them directly
/// from async code would stall a runtime worker.
pub async fn store_call<S, F, T>(store: &Arc<S>, f: F) -> Result<T, error::VaultError>
where
    S: ?Sized + Send + Sync + 'static,
    F: FnOnce(&S) -> T + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| error::VaultError::Internal(e.to_string()))
}
