//! Error types for the bashpilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Note what is *not* here: shell failures. A command that exits non-zero
//! or cannot be launched is data (see [`crate::executor::ExecutionOutcome`]),
//! never an error.

use thiserror::Error;

/// The top-level error type for all bashpilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Operator errors ---
    #[error("Operator error: {0}")]
    Operator(#[from] OperatorError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the completion service.
///
/// The agent loop never propagates these: they are rendered into the
/// assistant turn as text so the session survives transient outages.
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

/// Failures reading from or writing to the human operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("Failed to read operator input: {0}")]
    Read(String),

    #[error("Failed to write to operator: {0}")]
    Write(String),
}

impl From<std::io::Error> for OperatorError {
    fn from(e: std::io::Error) -> Self {
        Self::Read(e.to_string())
    }
}
