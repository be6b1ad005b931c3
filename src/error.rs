//! Error types for the reminder engine
//!
//! All errors use thiserror for structured error handling.
//! Capability ports return `anyhow::Error` instead, so backend-specific
//! failures stay opaque until a port classifies them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CueError {
    /// Rejected before any state change; a declined result, not a fault.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Remote access refused; triggers the sticky local-only fallback.
    #[error("remote permission denied")]
    PermissionDenied,

    /// Any other remote failure. The local mutation stands.
    #[error("sync error: {0}")]
    Sync(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timer/trigger registration failure; scheduling degrades.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("reminder not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, CueError>;
