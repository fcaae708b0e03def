use thiserror::Error;

/// Unified error type for the Foreman workspace.
#[derive(Error, Debug)]
pub enum ForemanError {
    // ── Engine errors ──────────────────────────────────────────
    #[error("engine error: {0}")]
    Engine(String),

    #[error("engine call cancelled")]
    Cancelled,

    // ── Task store errors ──────────────────────────────────────
    #[error("task store error: {0}")]
    Store(String),

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ForemanError>;
