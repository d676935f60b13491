use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Ask a question before invoking Memory.")]
    EmptyQuestion,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("remote model not configured (set GEMINI_API_KEY)")]
    AiNotConfigured,

    #[error("remote model error: {0}")]
    AiBackend(String),

    #[error("remote model returned no text")]
    EmptyResponse,

    #[error("could not parse remote response: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Status an outer HTTP layer should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AiNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::AiBackend(_) | Self::EmptyResponse | Self::Parse(_) => StatusCode::BAD_GATEWAY,
            Self::EmptyQuestion | Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// True for failures that originate on the remote side of the Memory
    /// engine and must be recovered locally.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::AiNotConfigured | Self::AiBackend(_) | Self::EmptyResponse | Self::Parse(_)
        )
    }
}
