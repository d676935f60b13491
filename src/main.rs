//! vault — capture notes, let Memory tag them, ask questions about them.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vault::ai::{GeminiConfig, GeminiModel, RemoteModel};
use vault::db::{NoteInput, NoteStore, NotesDB};
use vault::error::VaultError;
use vault::util::preview;
use vault::{store_call, MemoryEngine, Mode, SharedStore};

#[derive(Parser)]
#[command(name = "vault", version, about = "Notes vault with a Memory engine")]
struct Args {
    /// SQLite database path
    #[arg(short, long, default_value = "vault.db", env = "VAULT_DB_PATH")]
    db: String,

    /// Gemini model to answer with
    #[arg(short, long, env = "GEMINI_MODEL_NAME")]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a note and tag it
    Add {
        #[arg(short, long, default_value = "")]
        title: String,
        #[arg(short, long, default_value = "")]
        content: String,
    },
    /// Change a note's title or content and re-tag it
    Edit {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
    },
    /// Ask Memory a question
    Ask {
        question: String,
        /// Print the raw answer object
        #[arg(long)]
        json: bool,
    },
    /// List notes, most recently edited first
    List,
    /// Regenerate tags for one note, or every note with --all
    Retag {
        id: Option<i64>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Delete a note
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, VaultError> {
    let db = Arc::new(NotesDB::open(&args.db)?);

    let mut cfg = GeminiConfig::from_env();
    if let Some(model) = args.model {
        cfg = cfg.with_model(model);
    }
    let remote = GeminiModel::new(cfg);
    info!(
        model = remote.model_name(),
        remote = if remote.available() { "enabled" } else { "disabled" },
        "memory ready"
    );

    let store: SharedStore = db.clone();
    let engine = MemoryEngine::new(store, Arc::new(remote));

    match args.command {
        Command::Add { title, content } => {
            let input = NoteInput::new(title, content);
            let note = store_call(&db, move |db| db.insert(input)).await??;
            let tags = engine.ensure_tags(&note).await?;
            println!("[{}] saved, tags: {tags}", note.id);
        }
        Command::Edit { id, title, content } => {
            let current = store_call(&db, move |db| db.get(id))
                .await??
                .ok_or(VaultError::NotFound)?;
            let input = NoteInput::new(
                title.unwrap_or(current.title),
                content.unwrap_or(current.content),
            );
            let note = store_call(&db, move |db| db.update(id, input)).await??;
            let tags = engine.ensure_tags(&note).await?;
            println!("[{id}] updated, tags: {tags}");
        }
        Command::Ask { question, json } => {
            let answer = engine.ask(&question).await;
            if json {
                let out = serde_json::to_string_pretty(&answer)
                    .map_err(|e| VaultError::Internal(e.to_string()))?;
                println!("{out}");
            } else {
                if let Some(text) = &answer.answer {
                    println!("{text}");
                }
                if let Some(msg) = &answer.message {
                    eprintln!("{msg}");
                }
                if let Some(mode) = answer.mode {
                    let mode = if mode == Mode::Gemini { "gemini" } else { "local" };
                    eprintln!("(mode: {mode})");
                }
            }
            if answer.is_error() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List => {
            let notes = store_call(&db, |db| db.list_all()).await??;
            for note in notes {
                let title = match note.title.as_str() {
                    "" => "Untitled",
                    t => t,
                };
                let tags = if note.tags.is_empty() {
                    "-".to_string()
                } else {
                    note.tags.join(", ")
                };
                println!("[{}] {title} ({tags}) {}", note.id, preview(&note.content, 80));
            }
        }
        Command::Retag { id: Some(id), .. } => {
            let note = store_call(&db, move |db| db.get(id))
                .await??
                .ok_or(VaultError::NotFound)?;
            let tags = engine.ensure_tags(&note).await?;
            println!("[{id}] tags: {tags}");
        }
        Command::Retag { id: None, all } => {
            if !all {
                return Err(VaultError::Validation("pass a note id or --all".into()));
            }
            let n = engine.reindex_all().await?;
            println!("retagged {n} notes");
        }
        Command::Delete { id } => {
            if !store_call(&db, move |db| db.delete(id)).await?? {
                return Err(VaultError::NotFound);
            }
            println!("[{id}] deleted");
        }
    }
    Ok(ExitCode::SUCCESS)
}
