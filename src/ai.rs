//! Remote model boundary.
//!
//! The Memory engine talks to a [`RemoteModel`] and never to HTTP directly.
//! [`GeminiModel`] is the network-backed implementation; [`DisabledModel`]
//! stands in when remote answers are switched off. Everything here is
//! optional: with no credential the engine runs on local recall alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::VaultError;
use crate::limits::REMOTE_TIMEOUT_SECS;

fn ai_err(msg: impl Into<String>) -> VaultError {
    VaultError::AiBackend(msg.into())
}

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const FALLBACK_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const HINT_MISSING_KEY: &str = "Gemini answers unlock once GEMINI_API_KEY is configured.";
pub const HINT_CLIENT_FAILED: &str =
    "Gemini support could not start on this machine, so Memory is using local recall.";

#[async_trait]
pub trait RemoteModel: Send + Sync {
    /// Configured model name, quoted back to the user in error messages.
    fn model_name(&self) -> &str;

    /// True only when a call has a chance of succeeding: credential
    /// present, client constructible, not in test mode.
    fn available(&self) -> bool;

    /// User-facing explanation of why `available()` is false, if there is
    /// one worth showing.
    fn unavailable_hint(&self) -> Option<String> {
        None
    }

    /// One attempt, no retries. Network, auth, quota and timeout failures
    /// all come back as `AiBackend`.
    async fn generate_content(&self, prompt: &str) -> Result<Value, VaultError>;

    fn extract_text(&self, raw: &Value) -> Result<String, VaultError> {
        response_text(raw)
    }
}

/// Text of a generateContent response: a top-level `text` field if the
/// payload has one, otherwise the first non-empty part of any candidate.
pub fn response_text(raw: &Value) -> Result<String, VaultError> {
    if let Some(t) = raw.get("text").and_then(Value::as_str) {
        if !t.trim().is_empty() {
            return Ok(t.trim().to_string());
        }
    }
    let candidates = raw
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for cand in candidates {
        let Some(parts) = cand.pointer("/content/parts").and_then(Value::as_array) else {
            continue;
        };
        for part in parts {
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                if !t.trim().is_empty() {
                    return Ok(t.trim().to_string());
                }
            }
        }
    }
    Err(VaultError::EmptyResponse)
}

// ---------------------------------------------------------------------------
// configuration
// ---------------------------------------------------------------------------

/// Where the API key comes from. `Env` is re-read on every call so a
/// rotated key takes effect without a restart.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Env(String),
    Static(Option<String>),
}

impl CredentialSource {
    pub fn current(&self) -> Option<String> {
        let key = match self {
            Self::Env(var) => std::env::var(var).ok(),
            Self::Static(k) => k.clone(),
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub model: String,
    pub credential: CredentialSource,
    pub timeout: Duration,
    /// Test mode: never touch the network.
    pub disabled: bool,
}

/// Seconds from `GEMINI_TIMEOUT_SECS`. Zero or garbage means the default.
fn timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|s| *s > 0)
        .unwrap_or(REMOTE_TIMEOUT_SECS)
}

fn env_flag(var: &str) -> bool {
    std::env::var(var)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let timeout_secs = timeout_secs(std::env::var("GEMINI_TIMEOUT_SECS").ok().as_deref());
        Self {
            api_url: std::env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: std::env::var("GEMINI_MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            credential: CredentialSource::Env("GEMINI_API_KEY".into()),
            timeout: Duration::from_secs(timeout_secs),
            disabled: env_flag("VAULT_TESTING"),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }
}

// ---------------------------------------------------------------------------
// client cache
// ---------------------------------------------------------------------------

/// One cached handle, keyed by the credential it was built for. The check
/// and the build both happen under the lock, so concurrent first calls
/// construct exactly one handle.
pub struct ClientCache<C> {
    slot: Mutex<Option<(String, Arc<C>)>>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self { slot: Mutex::new(None) }
    }
}

impl<C> ClientCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `credential`, building a fresh one if the slot is
    /// empty or was built for a different credential.
    pub fn get_or_init<F, E>(&self, credential: &str, build: F) -> Result<Arc<C>, E>
    where
        F: FnOnce() -> Result<C, E>,
    {
        let mut slot = self.slot.lock();
        if let Some((key, client)) = slot.as_ref() {
            if key == credential {
                return Ok(Arc::clone(client));
            }
        }
        let client = Arc::new(build()?);
        *slot = Some((credential.to_string(), Arc::clone(&client)));
        Ok(client)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

pub struct GeminiModel {
    cfg: GeminiConfig,
    clients: ClientCache<reqwest::Client>,
}

impl GeminiModel {
    pub fn new(cfg: GeminiConfig) -> Self {
        Self {
            cfg,
            clients: ClientCache::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(GeminiConfig::from_env())
    }

    fn client(&self, key: &str) -> Result<Arc<reqwest::Client>, VaultError> {
        let timeout = self.cfg.timeout;
        self.clients.get_or_init(key, || {
            info!(model = %self.cfg.model, "initialising Gemini client");
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ai_err(format!("failed to build HTTP client: {e}")))
        })
    }
}

#[async_trait]
impl RemoteModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    fn available(&self) -> bool {
        if self.cfg.disabled {
            return false;
        }
        match self.cfg.credential.current() {
            Some(key) => self.client(&key).is_ok(),
            None => false,
        }
    }

    fn unavailable_hint(&self) -> Option<String> {
        if self.cfg.disabled {
            return None;
        }
        match self.cfg.credential.current() {
            None => Some(HINT_MISSING_KEY.into()),
            Some(key) if self.client(&key).is_err() => Some(HINT_CLIENT_FAILED.into()),
            Some(_) => None,
        }
    }

    async fn generate_content(&self, prompt: &str) -> Result<Value, VaultError> {
        if self.cfg.disabled {
            return Err(VaultError::AiNotConfigured);
        }
        let key = self.cfg.credential.current().ok_or(VaultError::AiNotConfigured)?;
        let client = self.client(&key)?;

        let req = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        debug!(model = %self.cfg.model, prompt_chars = prompt.chars().count(), "Gemini request");

        let start = std::time::Instant::now();
        let resp = client
            .post(self.cfg.endpoint())
            .header("x-goog-api-key", key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ai_err(format!("Gemini request timed out after {:?}", self.cfg.timeout))
                } else {
                    ai_err(format!("Gemini request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(ai_err(format!("Gemini returned {status}: {msg}")));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ai_err(format!("Gemini response parse failed: {e}")))?;
        debug!(duration_ms = start.elapsed().as_millis() as u64, "Gemini response");
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// disabled
// ---------------------------------------------------------------------------

/// Remote answers switched off. Every call fails with `AiNotConfigured`.
#[derive(Debug, Clone, Default)]
pub struct DisabledModel {
    hint: Option<String>,
}

impl DisabledModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hint(hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
        }
    }
}

#[async_trait]
impl RemoteModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn available(&self) -> bool {
        false
    }

    fn unavailable_hint(&self) -> Option<String> {
        self.hint.clone()
    }

    async fn generate_content(&self, _prompt: &str) -> Result<Value, VaultError> {
        Err(VaultError::AiNotConfigured)
    }
}
