//! Engine error type.
//!
//! Almost nothing here reaches the host: the core absorbs failures and logs
//! them. These errors are returned from the few calls a consumer makes
//! directly (config loading, fire submission, engine start).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("form pool exhausted while acquiring '{model}'")]
    PoolExhausted { model: String },

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("host rejected request: {0}")]
    Host(String),

    #[error("config error in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
