//! Shared state types reported by the sync controller.

use serde::Serialize;

/// Scheduling phase of the sync controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Nothing scheduled and no sync in flight.
    #[default]
    Idle,
    /// A debounce timer is armed and will start a sync when it fires.
    Debouncing,
    /// A sync pipeline is running.
    Syncing,
}

impl SyncPhase {
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }
}

/// Why a sync was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// A local collection changed.
    LocalChange,
    /// The user asked for a sync ("Sync Now").
    Manual,
    /// The credential provider transitioned to authenticated.
    Login,
    /// A change arrived while a previous sync was running.
    Resync,
}

impl std::fmt::Display for SyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::LocalChange => "local_change",
            Self::Manual => "manual",
            Self::Login => "login",
            Self::Resync => "resync",
        };
        f.write_str(label)
    }
}
