//! The sync context: one explicit object owning stores, log, controller and
//! event bus for an application session.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::bus::{SyncEvent, SyncEventBus, SyncObserver};
use super::controller::SyncController;
use super::engine::{SyncEngine, SyncReport};
use super::events::DeletionEventLog;
use super::SyncResult;
use crate::auth::{AuthChanges, CredentialProvider};
use crate::config::SyncConfig;
use crate::device::DeviceIdentity;
use crate::models::{
    BookIndex, Bookmark, DeletionEvent, ItemId, ItemKind, Note, ReadingPosition, Snapshot,
    Timestamp,
};
use crate::remote::RemoteStore;
use crate::state::{SyncPhase, SyncReason};
use crate::storage::{KeyValueStore, LocalSnapshotStore};
use crate::{Error, Result};

/// Point-in-time view of sync health for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub device_id: String,
    pub authenticated: bool,
    pub phase: SyncPhase,
    pub sync_version: u64,
    pub last_sync_at: Option<String>,
    pub pending_deletions: usize,
    pub pending_changes: bool,
    pub bookmarks: usize,
    pub notes: usize,
    pub reading_positions: usize,
    pub settings: usize,
}

/// Collects collaborators before [`SyncContextBuilder::init`].
pub struct SyncContextBuilder {
    kv: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore>,
    credentials: Arc<dyn CredentialProvider>,
    config: SyncConfig,
    observer: Option<Arc<dyn SyncObserver>>,
    auth_changes: Option<AuthChanges>,
}

impl SyncContextBuilder {
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sync automatically whenever these changes report a sign-in.
    #[must_use]
    pub fn auth_changes(mut self, changes: AuthChanges) -> Self {
        self.auth_changes = Some(changes);
        self
    }

    /// Validate configuration, assign the device id and start watching auth.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn init(self) -> Result<SyncContext> {
        self.config.validate().map_err(Error::InvalidInput)?;

        let local = LocalSnapshotStore::new(Arc::clone(&self.kv));
        let log = DeletionEventLog::new(Arc::clone(&self.kv));
        let device = DeviceIdentity::new(Arc::clone(&self.kv));
        let device_id = device.device_id().await?;

        let bus = SyncEventBus::new(self.observer);
        let engine = SyncEngine::new(
            local.clone(),
            log.clone(),
            self.remote,
            Arc::clone(&self.credentials),
            self.config.clone(),
        );
        let controller = SyncController::new(engine, bus.clone(), self.config.debounce);
        if let Some(changes) = self.auth_changes {
            controller.watch_auth(changes);
        }

        tracing::debug!(
            device_id = %device_id,
            authenticated = self.credentials.is_authenticated(),
            "Sync context ready"
        );
        bus.publish(SyncEvent::Ready);

        Ok(SyncContext {
            local,
            log,
            device,
            controller,
            bus,
            credentials: self.credentials,
        })
    }
}

/// Session-wide sync state with an explicit `init`/`shutdown` lifecycle.
///
/// Every mutation is written locally first and then schedules a debounced
/// sync; deletions also record a tombstone.
#[derive(Clone)]
pub struct SyncContext {
    local: LocalSnapshotStore,
    log: DeletionEventLog,
    device: DeviceIdentity,
    controller: SyncController,
    bus: SyncEventBus,
    credentials: Arc<dyn CredentialProvider>,
}

impl SyncContext {
    pub fn builder(
        kv: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> SyncContextBuilder {
        SyncContextBuilder {
            kv,
            remote,
            credentials,
            config: SyncConfig::default(),
            observer: None,
            auth_changes: None,
        }
    }

    pub const fn controller(&self) -> &SyncController {
        &self.controller
    }

    pub const fn local(&self) -> &LocalSnapshotStore {
        &self.local
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }

    pub async fn device_id(&self) -> Result<String> {
        self.device.device_id().await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.local.read().await
    }

    pub async fn add_bookmark(&self, book: &str, bookmark: Bookmark) -> Result<ItemId> {
        let id = bookmark.id.clone();
        self.local.upsert_bookmark(book, bookmark).await?;
        self.changed();
        Ok(id)
    }

    pub async fn add_note(&self, book: &str, note: Note) -> Result<ItemId> {
        let id = note.id.clone();
        self.local.upsert_note(book, note).await?;
        self.changed();
        Ok(id)
    }

    /// Delete an item locally and record its tombstone.
    ///
    /// The tombstone is recorded even when the item is not present here, since
    /// another device may still hold it. Returns the books it was removed from.
    pub async fn delete_item(&self, kind: ItemKind, id: &ItemId) -> Result<Vec<BookIndex>> {
        // A sync pass must never see the removal without its tombstone.
        let edit = self.local.lock().await;
        let removed_from = edit.remove_item(kind, id).await?;
        let event: DeletionEvent = self.log.record_local_deletion(id.clone(), kind).await?;
        drop(edit);
        tracing::info!(
            "Deleted {} {} from {} book(s) at {}",
            kind,
            id,
            removed_from.len(),
            event.deleted_at
        );
        self.changed();
        Ok(removed_from)
    }

    pub async fn set_reading_position(&self, book: &str, position: ReadingPosition) -> Result<()> {
        self.local.set_reading_position(book, &position).await?;
        self.changed();
        Ok(())
    }

    pub async fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::InvalidInput("setting key must not be empty".to_string()));
        }
        self.local.set_setting(key.trim(), value).await?;
        self.changed();
        Ok(())
    }

    /// Manual "sync now".
    pub async fn sync_now(&self) -> SyncResult<Option<SyncReport>> {
        self.controller.immediate_sync(SyncReason::Manual).await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let snapshot = self.local.read().await?;
        Ok(SyncStatus {
            device_id: self.device.device_id().await?,
            authenticated: self.credentials.is_authenticated(),
            phase: self.controller.phase(),
            sync_version: snapshot.sync_version,
            last_sync_at: self
                .local
                .last_sync_at()
                .await?
                .as_ref()
                .map(Timestamp::to_string),
            pending_deletions: self.log.pending_count().await?,
            pending_changes: self.controller.has_pending_changes(),
            bookmarks: snapshot.bookmark_count(),
            notes: snapshot.note_count(),
            reading_positions: snapshot.reading_positions.len(),
            settings: snapshot.settings.len(),
        })
    }

    /// Run any pending debounced sync, then stop background tasks.
    pub async fn shutdown(&self) -> SyncResult<Option<SyncReport>> {
        let flushed = self.controller.flush().await;
        self.controller.shutdown();
        flushed
    }

    fn changed(&self) {
        self.controller.schedule_sync(SyncReason::LocalChange);
    }
}
