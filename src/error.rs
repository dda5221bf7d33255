use thiserror::Error;

/// Failures reported by an [`crate::llm::AiProvider`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider rate limit: {0}")]
    RateLimited(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("provider returned an empty response")]
    EmptyResponse,
    #[error("provider returned malformed output: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence unreachable: {0}")]
    Unreachable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Conditions that stop an entire pipeline run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("AI provider authentication failed: {0}")]
    ProviderAuth(String),
    #[error("pipeline not initialized (state: {0})")]
    NotInitialized(String),
}
