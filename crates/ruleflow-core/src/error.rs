//! Unified error types for Ruleflow

use thiserror::Error;

/// Unified error type for all Ruleflow operations
#[derive(Error, Debug)]
pub enum RuleflowError {
    // Oracle errors
    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Oracle rate limit: {0}")]
    OracleLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Unparseable oracle response: {0}")]
    Response(String),

    // Executor errors
    #[error("Executor error: {0}")]
    Executor(String),

    #[error("No executor registered for agent: {0}")]
    ExecutorNotFound(String),

    // Rule errors
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    // State errors
    #[error("State error: {0}")]
    State(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    // Repository errors
    #[error("Repository error: {0}")]
    Repository(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using RuleflowError
pub type Result<T> = std::result::Result<T, RuleflowError>;
