use std::path::PathBuf;

/// Errors surfaced by the warden core and its adapters.
///
/// Remote failures (`Platform`, `Store`) are ordinary values: fan-out operations
/// record them per server and keep going. Only command handlers turn them into
/// a chat reply, via the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
