use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] trueheart_core::Error),
    #[error(transparent)]
    Sync(#[from] trueheart_core::SyncError),
    #[error(transparent)]
    Remote(#[from] trueheart_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note text provided")]
    EmptyContent,
    #[error("Item ID cannot be empty")]
    EmptyItemId,
    #[error("Book index cannot be empty")]
    EmptyBook,
    #[error("{0} not found for id/prefix: {1}")]
    ItemNotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousItemId(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Sync is not configured. Run `trueheart config init --api-base-url <URL>` and `trueheart auth login --token <TOKEN>`."
    )]
    SyncNotConfigured,
}
