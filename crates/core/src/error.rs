//! Error types for the SageChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::message::MessageId;

/// The top-level error type for all SageChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Conversation log errors ---
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    // --- Turn errors ---
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search endpoint returned status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("Failed to parse search results: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted snapshot for session {session}: {reason}")]
    Corrupted { session: String, reason: String },
}

/// Violations of the conversation log's append discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("No message {0} at the handle's position")]
    StaleHandle(MessageId),

    #[error("Message {0} is frozen")]
    Frozen(MessageId),

    #[error("Message {0} is not the newest entry and cannot be discarded")]
    NotNewest(MessageId),
}

/// Reasons a submission is refused before a turn starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("A turn is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn retrieval_error_displays_status() {
        let err = Error::Retrieval(RetrievalError::Status {
            status_code: 500,
            message: "search failed".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("search failed"));
    }

    #[test]
    fn log_error_names_message() {
        let err = LogError::Frozen(MessageId(7));
        assert!(err.to_string().contains('7'));
    }
}
