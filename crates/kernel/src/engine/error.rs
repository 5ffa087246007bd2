//! Engine error types with clear, actionable messages.
//!
//! None of these ever reach the host as a failure: the filter entry point
//! converts every error into an unfiltered result. They exist so the
//! surrounding code can log precisely what went wrong.

use thiserror::Error;

/// Errors raised while loading rules, graphs or talking to storage.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The rules file could not be read.
    #[error("rules file '{path}': {details}")]
    RulesUnreadable { path: String, details: String },

    /// The rules TOML did not parse.
    #[error("rules file '{path}': failed to parse: {details}")]
    InvalidRules { path: String, details: String },

    /// A URL rule declared a regex that does not compile.
    #[error("url rule '{pattern}': invalid regex: {details}")]
    InvalidPattern { pattern: String, details: String },

    /// A persisted dependency map could not be decoded.
    #[error("persisted dependency map is not valid JSON: {0}")]
    InvalidGraph(#[source] serde_json::Error),

    /// The option store failed.
    #[error("option store '{operation}' failed: {details}")]
    Store { operation: &'static str, details: String },

    /// A cache value could not be (de)serialized.
    #[error("cache entry '{key}': {source}")]
    CacheCodec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A pipeline stage panicked and was contained.
    #[error("filter pass aborted during {stage}")]
    Aborted { stage: &'static str },
}

impl EngineError {
    /// Create a store error.
    pub fn store(operation: &'static str, details: impl ToString) -> Self {
        Self::Store {
            operation,
            details: details.to_string(),
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
