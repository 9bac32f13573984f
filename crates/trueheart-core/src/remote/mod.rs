//! Remote snapshot client.
//!
//! The remote store keeps one encoded snapshot blob per application and
//! account plus an append-only log of deletion events. It performs no merge
//! and holds no locks; every write is last-writer-wins on the server.

mod codec;
mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use codec::{decode_snapshot, encode_snapshot};
pub use http::HttpRemoteStore;
pub use memory::{InMemoryRemoteStore, RemoteOperation};

use crate::models::{DeletionEvent, Snapshot};

/// Why the server refused an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// An all-empty snapshot would have replaced a non-empty one.
    EmptySnapshot,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySnapshot => f.write_str("empty snapshot would overwrite existing data"),
        }
    }
}

/// Errors returned by remote store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// No valid session credential is held.
    #[error("Not signed in")]
    Unauthenticated,
    /// Network failure or timeout.
    #[error("Remote request failed: {0}")]
    Transport(String),
    /// The server refused the upload.
    #[error("Upload rejected: {0}")]
    Rejected(RejectReason),
    /// The remote payload could not be decoded.
    #[error("Remote data could not be decoded: {0}")]
    Decode(String),
    /// Any other unsuccessful HTTP response.
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Server acknowledgement of a snapshot upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    /// Version the server stored, when it reports one
    #[serde(default)]
    pub sync_version: Option<u64>,
}

/// One page of the remote deletion event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<DeletionEvent>,
    /// Cursor to pass as `since` for the following page
    pub next_cursor: u64,
}

/// Transport for the remote snapshot blob and deletion event log.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload the snapshot, replacing the stored one.
    async fn save(&self, snapshot: &Snapshot) -> RemoteResult<SaveAck>;

    /// Download the stored snapshot; `None` when nothing was ever saved.
    async fn load(&self) -> RemoteResult<Option<Snapshot>>;

    /// Append events to the remote log. Delivery is at-least-once.
    async fn append_events(&self, events: &[DeletionEvent]) -> RemoteResult<()>;

    /// Events whose insertion index is `>= since`, at most `limit` of them.
    async fn fetch_events(&self, since: u64, limit: usize) -> RemoteResult<EventPage>;
}
