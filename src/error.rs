//! Error types for the analytics engine and the assistant

use std::time::Duration;
use thiserror::Error;

/// Result type alias for every fallible operation in the crate
pub type Result<T> = std::result::Result<T, FinanceError>;

#[derive(Error, Debug)]
pub enum FinanceError {

    // =============================
    // Validation (never retried)
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("unsupported groupBy: {0}")]
    UnsupportedGroupBy(String),

    #[error("unsupported tool: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // Language model
    // =============================

    #[error("malformed function call")]
    MalformedFunctionCall,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(Duration),

    // =============================
    // Storage & runtime
    // =============================

    #[error("Transaction store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task error: {0}")]
    TaskError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl FinanceError {
    /// Bad input from the caller or the model. Surfaced as-is, never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FinanceError::Validation(_)
                | FinanceError::UnsupportedGroupBy(_)
                | FinanceError::ToolNotFound(_)
                | FinanceError::InvalidToolInput(_)
        )
    }

    /// The only error the assistant recovers from (with a single stricter retry).
    pub fn is_malformed_function_call(&self) -> bool {
        matches!(self, FinanceError::MalformedFunctionCall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_class() {
        assert!(FinanceError::Validation("x".into()).is_validation());
        assert!(FinanceError::UnsupportedGroupBy("weekday".into()).is_validation());
        assert!(FinanceError::ToolNotFound("nope".into()).is_validation());
        assert!(FinanceError::InvalidToolInput("groupBy is required".into()).is_validation());
        assert!(!FinanceError::MalformedFunctionCall.is_validation());
        assert!(!FinanceError::StoreError("down".into()).is_validation());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            FinanceError::UnsupportedGroupBy("weekday".into()).to_string(),
            "unsupported groupBy: weekday"
        );
        assert_eq!(
            FinanceError::ToolNotFound("get_weather".into()).to_string(),
            "unsupported tool: get_weather"
        );
        assert!(FinanceError::MalformedFunctionCall.is_malformed_function_call());
    }
}
