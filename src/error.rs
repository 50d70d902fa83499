use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {message}")]
    FileParse { path: PathBuf, message: String },

    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Similarity threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("At least one confirmation token is required")]
    NoConfirmTokens,

    #[error("Confirmation timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Command registry is empty")]
    EmptyRegistry,

    #[error("Command names and aliases must not be empty")]
    EmptyName,

    #[error("Name \"{0}\" is already registered")]
    DuplicateName(String),

    #[error("Command \"{command}\" failed: {message}")]
    Action { command: String, message: String },
}

pub type Result<T> = std::result::Result<T, SuggestError>;
