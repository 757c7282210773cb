use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildGateError {
    #[error("no usable compiler found among candidates: {0}")]
    ToolchainNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scratch root is not writable: {0}")]
    ScratchUnwritable(PathBuf),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildGateError>;
