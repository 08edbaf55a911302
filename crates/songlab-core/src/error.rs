//! Error types for Songlab.

use thiserror::Error;

/// Errors surfaced by stage execution. Every variant is terminal for the
/// job it occurred on; transient store errors live in the database layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("service call failed: {0}")]
    Service(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
