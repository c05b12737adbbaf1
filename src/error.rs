//! Error types for the travel assistant.

use std::time::Duration;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Places error: {0}")]
    Places(#[from] PlacesError),
}

/// Configuration-related errors. Fatal: raised before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing or blank API credential for backend {backend}")]
    MissingCredential { backend: String },
}

/// Malformed caller input. Reported immediately, no state mutated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too long: {length} > {max}")]
    MessageTooLong { length: usize, max: usize },

    #[error("Session id is empty")]
    EmptySessionId,
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed (status {status:?}): {reason}")]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout {
        provider: String,
        timeout: Duration,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Place-search / distance collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum PlacesError {
    #[error("Place search request failed (status {status:?}): {reason}")]
    RequestFailed {
        status: Option<u16>,
        reason: String,
    },

    #[error("Invalid place search response: {0}")]
    InvalidResponse(String),

    #[error("Place search is not configured")]
    NotConfigured,
}

/// Coarse classification of a failed turn, used only at the orchestrator
/// boundary to pick a user-facing apology. Never carries internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Auth,
    RateLimit,
    UpstreamUnavailable,
    Unknown,
}

impl FailureCause {
    /// Classify an engine error into a coarse cause.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Llm(LlmError::AuthFailed { .. }) => Self::Auth,
            Error::Config(ConfigError::MissingCredential { .. }) => Self::Auth,
            Error::Llm(LlmError::RateLimited { .. }) => Self::RateLimit,
            Error::Llm(LlmError::Timeout { .. })
            | Error::Llm(LlmError::RequestFailed { .. })
            | Error::Llm(LlmError::InvalidResponse { .. })
            | Error::Places(_) => Self::UpstreamUnavailable,
            _ => Self::Unknown,
        }
    }

    /// The user-visible apology for this cause. Never leaks internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth => "抱歉，服務驗證暫時有問題，請稍後再試一次。",
            Self::RateLimit => "抱歉，現在詢問的人比較多，請過一會兒再試試看。",
            Self::UpstreamUnavailable => "抱歉，我這邊暫時連不上服務，請稍後再試一次。",
            Self::Unknown => "抱歉，系統出了點小狀況，請稍後再試一次。",
        }
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_llm_timeout_as_upstream() {
        let err = Error::Llm(LlmError::Timeout {
            provider: "traveler".into(),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(
            FailureCause::classify(&err),
            FailureCause::UpstreamUnavailable
        );
    }

    #[test]
    fn classify_auth_failures() {
        let err = Error::Llm(LlmError::AuthFailed {
            provider: "knowledge".into(),
        });
        assert_eq!(FailureCause::classify(&err), FailureCause::Auth);

        let err = Error::Config(ConfigError::MissingCredential {
            backend: "knowledge".into(),
        });
        assert_eq!(FailureCause::classify(&err), FailureCause::Auth);
    }

    #[test]
    fn classify_database_as_unknown() {
        let err = Error::Database(DatabaseError::Query("boom".into()));
        assert_eq!(FailureCause::classify(&err), FailureCause::Unknown);
    }

    #[test]
    fn user_messages_are_distinct() {
        let causes = [
            FailureCause::Auth,
            FailureCause::RateLimit,
            FailureCause::UpstreamUnavailable,
            FailureCause::Unknown,
        ];
        for (i, a) in causes.iter().enumerate() {
            for b in &causes[i + 1..] {
                assert_ne!(a.user_message(), b.user_message());
            }
        }
    }
}
