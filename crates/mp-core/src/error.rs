//! Error types for memperf

use thiserror::Error;

/// memperf error type
///
/// Expected per-event outcomes (an event failing a cut, an ambiguous truth
/// record) are not errors; they are reported as rejections by the pipeline.
/// Everything here either aborts the run or comes from a collaborator.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Invalid configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed input event record
    #[error("Input error: {0}")]
    Input(String),

    /// A condition that earlier checks should have made impossible
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Failure reported by a probability engine
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
