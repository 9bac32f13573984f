//! Sync engine: deletion log, reconciliation, scheduling and the context that
//! wires them together.

mod bus;
mod context;
mod controller;
mod engine;
mod events;
mod guard;
mod reconcile;

use thiserror::Error;

pub use bus::{SyncEvent, SyncEventBus, SyncObserver};
pub use context::{SyncContext, SyncContextBuilder, SyncStatus};
pub use controller::SyncController;
pub use engine::{SyncEngine, SyncReport};
pub use events::{prune_expired, union_events, DeletionEventLog};
pub use guard::{classify, is_empty, should_reject_upload, Emptiness};
pub use reconcile::{reconcile, reconcile_at, MergeAction, Reconciliation};

use crate::remote::RemoteError;

/// Why a sync attempt failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Local storage error: {0}")]
    Local(#[from] crate::Error),
}

/// Coarse failure category, mirroring how each is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Sync deferred until the user signs in.
    Unauthenticated,
    /// Network or server trouble; retried on the next trigger.
    Transport,
    /// The server refused the upload.
    Rejected,
    /// The remote snapshot could not be decoded.
    Decode,
    Storage,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Unauthenticated | Self::Remote(RemoteError::Unauthenticated) => {
                SyncErrorKind::Unauthenticated
            }
            Self::Remote(RemoteError::Rejected(_)) => SyncErrorKind::Rejected,
            Self::Remote(RemoteError::Decode(_)) => SyncErrorKind::Decode,
            Self::Remote(
                RemoteError::Transport(_)
                | RemoteError::Api { .. }
                | RemoteError::InvalidConfiguration(_),
            ) => SyncErrorKind::Transport,
            Self::Local(_) => SyncErrorKind::Storage,
        }
    }

    /// Short text for a transient notification.
    pub fn user_message(&self) -> String {
        match self.kind() {
            SyncErrorKind::Unauthenticated => {
                "Sign in to sync. Changes are saved on this device.".to_string()
            }
            SyncErrorKind::Transport => {
                format!("Sync failed, will retry on the next change: {self}")
            }
            SyncErrorKind::Rejected => "Sync skipped: the server kept its copy.".to_string(),
            SyncErrorKind::Decode => {
                "Sync failed: the synced data could not be read. Local data was not changed."
                    .to_string()
            }
            SyncErrorKind::Storage => format!("Sync failed: {self}"),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
