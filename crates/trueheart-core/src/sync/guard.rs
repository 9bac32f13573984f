//! Snapshot emptiness guard.
//!
//! A freshly installed or cleared client has nothing to contribute; letting it
//! upload would wipe the account. Both the merge and the remote store consult
//! these checks.

use crate::models::{Collection, Snapshot};

/// True when every tracked collection is absent or an empty container.
pub fn is_empty(snapshot: &Snapshot) -> bool {
    Collection::ALL
        .iter()
        .all(|collection| snapshot.collection_is_empty(*collection))
}

/// Emptiness of a local/remote pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emptiness {
    Both,
    LocalOnly,
    RemoteOnly,
    Neither,
}

pub fn classify(local: &Snapshot, remote: &Snapshot) -> Emptiness {
    match (is_empty(local), is_empty(remote)) {
        (true, true) => Emptiness::Both,
        (true, false) => Emptiness::LocalOnly,
        (false, true) => Emptiness::RemoteOnly,
        (false, false) => Emptiness::Neither,
    }
}

/// Server-side rule: refuse an empty upload over a non-empty stored snapshot.
pub fn should_reject_upload(incoming: &Snapshot, existing: Option<&Snapshot>) -> bool {
    is_empty(incoming) && existing.is_some_and(|stored| !is_empty(stored))
}
