//! Error types for Tolk.

use thiserror::Error;

/// Library-level error type for Tolk operations.
#[derive(Error, Debug)]
pub enum TolkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown LLM service: {0}")]
    UnknownService(String),

    /// A single provider call failed. Retried when [`TolkError::is_retryable`] says so.
    #[error("Provider '{provider}' request failed{}: {message}", status_suffix(.status))]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// The provider answered but refused the request; repeating it will not help.
    #[error("Provider '{provider}' rejected the request: {message}")]
    Rejected { provider: String, message: String },

    #[error("Provider '{provider}' unavailable after {attempts} attempt(s): {message}")]
    ProviderUnavailable {
        provider: String,
        attempts: u32,
        message: String,
    },

    #[error(
        "{window} quota exceeded: requested {requested_tokens} tokens / ${requested_cost:.4}, \
         used {used_tokens}/{max_tokens} tokens and ${used_cost:.4}/${max_cost:.2}"
    )]
    QuotaExceeded {
        window: String,
        requested_tokens: u64,
        requested_cost: f64,
        used_tokens: u64,
        used_cost: f64,
        max_tokens: u64,
        max_cost: f64,
    },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Cache serialization failed: {0}")]
    CacheSerialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TolkError {
    /// Whether another attempt at the same provider call could succeed.
    ///
    /// Network failures, timeouts, rate limiting (429) and server errors (5xx)
    /// are transient. Any other HTTP status is a caller or credential problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            TolkError::Provider { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            TolkError::Http(_) => true,
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Result type alias for Tolk operations.
pub type Result<T> = std::result::Result<T, TolkError>;
