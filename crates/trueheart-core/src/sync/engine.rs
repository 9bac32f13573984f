//! One sync pass: download, reconcile, upload, persist.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::events::{prune_expired, union_events, DeletionEventLog};
use super::reconcile::{reconcile_at, MergeAction, Reconciliation};
use super::{SyncError, SyncResult};
use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::models::{DeletedItems, DeletionEvent, Snapshot, Timestamp};
use crate::remote::{RejectReason, RemoteError, RemoteStore};
use crate::storage::LocalSnapshotStore;

/// Outcome of a successful sync pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub action: MergeAction,
    pub sync_version: u64,
    pub uploaded: bool,
    pub events_uploaded: usize,
    pub events_fetched: usize,
    pub deleted_items: DeletedItems,
    /// The snapshot now stored on this device
    #[serde(skip)]
    pub snapshot: Snapshot,
}

/// Runs the sync pipeline against one local store and one remote.
///
/// The engine holds no scheduling state; callers must not run two passes at
/// once (the controller guarantees this).
#[derive(Clone)]
pub struct SyncEngine {
    local: LocalSnapshotStore,
    log: DeletionEventLog,
    remote: Arc<dyn RemoteStore>,
    credentials: Arc<dyn CredentialProvider>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        local: LocalSnapshotStore,
        log: DeletionEventLog,
        remote: Arc<dyn RemoteStore>,
        credentials: Arc<dyn CredentialProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            log,
            remote,
            credentials,
            config,
        }
    }

    pub const fn local(&self) -> &LocalSnapshotStore {
        &self.local
    }

    pub const fn log(&self) -> &DeletionEventLog {
        &self.log
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Run one full pass.
    ///
    /// On failure the local snapshot is left as it was and drained tombstones
    /// go back on the pending list.
    pub async fn run(&self) -> SyncResult<SyncReport> {
        if !self.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }

        let remote = self.remote.load().await?;
        let pending = self.log.drain_pending().await?;

        match self.run_with_pending(remote, &pending).await {
            Ok(report) => Ok(report),
            Err(error) => {
                if let Err(requeue_error) = self.log.requeue(&pending).await {
                    tracing::error!(
                        "Failed to requeue {} pending deletions: {}",
                        pending.len(),
                        requeue_error
                    );
                }
                Err(error)
            }
        }
    }

    async fn run_with_pending(
        &self,
        remote: Option<Snapshot>,
        pending: &[DeletionEvent],
    ) -> SyncResult<SyncReport> {
        let (fetched, cursor) = self.fetch_new_events().await?;
        let known = self.log.known_remote().await?;
        let now = Utc::now();
        let all_events = union_events([known.as_slice(), fetched.as_slice(), pending]);
        let deletions = prune_expired(&all_events, self.config.retention, now);
        let now = Timestamp::at(now);

        let local = self.local.read().await?;
        let Reconciliation {
            mut merged,
            deleted_items,
            mut action,
            needs_upload,
        } = reconcile_at(&local, remote.as_ref(), &deletions, &now);
        tracing::info!(
            action = %action,
            sync_version = merged.sync_version,
            tombstones = deletions.len(),
            "Reconciled local snapshot"
        );

        let mut uploaded = false;
        if needs_upload {
            match self.remote.save(&merged).await {
                Ok(ack) => {
                    uploaded = true;
                    if let Some(version) = ack.sync_version.filter(|v| *v != merged.sync_version) {
                        tracing::debug!(
                            "Server stored version {} for upload of {}",
                            version,
                            merged.sync_version
                        );
                    }
                }
                Err(RemoteError::Rejected(RejectReason::EmptySnapshot)) => {
                    tracing::warn!("Server refused an empty upload; adopting the remote snapshot");
                    merged = self.adopt_remote(&deletions, &now).await?;
                    action = MergeAction::AdoptRemote;
                }
                Err(error) => return Err(error.into()),
            }
        }

        if !pending.is_empty() {
            self.remote.append_events(pending).await?;
        }

        self.log.store_known_remote(&deletions).await?;
        self.log.set_remote_cursor(cursor).await?;
        let stored = self.commit(&local, merged, &deletions, &now).await?;
        self.local.set_last_sync_at(&now).await?;

        tracing::info!(
            sync_version = stored.sync_version,
            uploaded,
            "Sync complete"
        );
        Ok(SyncReport {
            action,
            sync_version: stored.sync_version,
            uploaded,
            events_uploaded: pending.len(),
            events_fetched: fetched.len(),
            deleted_items,
            snapshot: stored,
        })
    }

    /// Write `merged` locally, keeping edits made since `base` was read.
    ///
    /// Edits that landed while the pass was awaiting the remote are merged
    /// over the result, so they survive until the next pass uploads them.
    async fn commit(
        &self,
        base: &Snapshot,
        merged: Snapshot,
        deletions: &[DeletionEvent],
        now: &Timestamp,
    ) -> SyncResult<Snapshot> {
        let edit = self.local.lock().await;
        let current = edit.read().await?;
        let stored = if current == *base {
            merged
        } else {
            let fresh = self.log.pending().await?;
            let tombstones = union_events([deletions, fresh.as_slice()]);
            let mut rebased = reconcile_at(&current, Some(&merged), &tombstones, now).merged;
            rebased.sync_version = merged.sync_version;
            tracing::debug!("Local data changed during sync; keeping the newer edits");
            rebased
        };
        edit.write(&stored).await?;
        Ok(stored)
    }

    /// Page through remote events newer than the stored cursor.
    async fn fetch_new_events(&self) -> SyncResult<(Vec<DeletionEvent>, u64)> {
        let limit = self.config.event_page_limit.max(1);
        let mut cursor = self.log.remote_cursor().await?;
        let mut fetched = Vec::new();
        loop {
            let page = self.remote.fetch_events(cursor, limit).await?;
            let count = page.events.len();
            let advanced = page.next_cursor > cursor;
            fetched.extend(page.events);
            cursor = page.next_cursor.max(cursor);
            if count < limit || !advanced {
                break;
            }
        }
        if !fetched.is_empty() {
            tracing::debug!("Fetched {} remote deletion events", fetched.len());
        }
        Ok((fetched, cursor))
    }

    async fn adopt_remote(
        &self,
        deletions: &[DeletionEvent],
        now: &Timestamp,
    ) -> SyncResult<Snapshot> {
        let Some(remote) = self.remote.load().await? else {
            return Err(RemoteError::Rejected(RejectReason::EmptySnapshot).into());
        };
        let adopted = reconcile_at(&Snapshot::default(), Some(&remote), deletions, now);
        Ok(adopted.merged)
    }
}
