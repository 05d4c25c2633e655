use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("session with token {0} already registered")]
    AlreadyRegistered(String),

    #[error("session with token {0} doesn't exist")]
    NotFound(String),

    #[error("stored document at {key} is not a valid session: {source}")]
    CorruptData {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("session store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("record token {record_token} does not match registration token {token}")]
    TokenMismatch { token: String, record_token: String },

    #[error("session {0} changed concurrently; giving up")]
    Contended(String),

    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid registry configuration: {0}")]
    InvalidConfig(String),
}

impl RegistryError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::StoreUnavailable { .. })
    }
}
