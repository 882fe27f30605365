//! Error types and result aliases.
//!
//! Defines the core `EngineError` enumeration and common `Result` type.

use thiserror::Error;

/// Engine-specific errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request could not be evaluated at all. Detection failures are not
    /// errors; they degrade to "no threat".
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Webhook notification error.
    #[error("webhook error: {0}")]
    Webhook(String),
}

/// Result type alias for `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;
