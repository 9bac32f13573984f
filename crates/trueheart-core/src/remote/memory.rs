//! In-process remote store for tests and offline sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::codec::{decode_snapshot, encode_snapshot};
use super::{EventPage, RejectReason, RemoteError, RemoteResult, RemoteStore, SaveAck};
use crate::auth::CredentialProvider;
use crate::models::{DeletionEvent, Snapshot};
use crate::sync::should_reject_upload;

/// Remote operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    Save,
    Load,
    AppendEvents,
    FetchEvents,
}

#[derive(Default)]
struct Inner {
    blob: Option<String>,
    events: Vec<DeletionEvent>,
    failures: HashMap<RemoteOperation, VecDeque<RemoteError>>,
    save_count: usize,
    load_count: usize,
}

/// Remote store held in memory, shared between clones.
///
/// Keeps the snapshot encoded the same way the HTTP backend does, appends
/// events in insertion order and refuses an empty upload over a non-empty
/// snapshot.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl std::fmt::Debug for InMemoryRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        formatter
            .debug_struct("InMemoryRemoteStore")
            .field("has_snapshot", &inner.blob.is_some())
            .field("events", &inner.events.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto the same storage that requires a signed-in session.
    #[must_use]
    pub fn with_credentials(&self, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            credentials: Some(credentials),
        }
    }

    /// Make the next call of `operation` fail with `error`.
    ///
    /// Failures queue up per operation and are consumed in order.
    pub fn fail_next(&self, operation: RemoteOperation, error: RemoteError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Decoded copy of the stored snapshot.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let blob = self.lock().blob.clone()?;
        decode_snapshot(&blob).ok()
    }

    /// Replace the stored snapshot without any guard, as another client would.
    pub fn put_snapshot(&self, snapshot: &Snapshot) -> RemoteResult<()> {
        let blob = encode_snapshot(snapshot)?;
        self.lock().blob = Some(blob);
        Ok(())
    }

    /// Store raw blob text, used to simulate corrupt payloads.
    pub fn put_raw(&self, blob: impl Into<String>) {
        self.lock().blob = Some(blob.into());
    }

    pub fn events(&self) -> Vec<DeletionEvent> {
        self.lock().events.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, operation: RemoteOperation) -> RemoteResult<()> {
        if let Some(credentials) = &self.credentials {
            if credentials.session_token().is_none() {
                return Err(RemoteError::Unauthenticated);
            }
        }
        let mut inner = self.lock();
        match inner
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn save(&self, snapshot: &Snapshot) -> RemoteResult<SaveAck> {
        self.check(RemoteOperation::Save)?;
        let blob = encode_snapshot(snapshot)?;

        let mut inner = self.lock();
        let existing = inner
            .blob
            .as_deref()
            .and_then(|stored| decode_snapshot(stored).ok());
        if should_reject_upload(snapshot, existing.as_ref()) {
            return Err(RemoteError::Rejected(RejectReason::EmptySnapshot));
        }
        inner.blob = Some(blob);
        inner.save_count += 1;
        Ok(SaveAck {
            sync_version: Some(snapshot.sync_version),
        })
    }

    async fn load(&self) -> RemoteResult<Option<Snapshot>> {
        self.check(RemoteOperation::Load)?;
        let blob = {
            let mut inner = self.lock();
            inner.load_count += 1;
            inner.blob.clone()
        };
        blob.as_deref().map(decode_snapshot).transpose()
    }

    async fn append_events(&self, events: &[DeletionEvent]) -> RemoteResult<()> {
        self.check(RemoteOperation::AppendEvents)?;
        self.lock().events.extend_from_slice(events);
        Ok(())
    }

    async fn fetch_events(&self, since: u64, limit: usize) -> RemoteResult<EventPage> {
        self.check(RemoteOperation::FetchEvents)?;
        let inner = self.lock();
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(inner.events.len());
        let events: Vec<DeletionEvent> =
            inner.events[start..].iter().take(limit).cloned().collect();
        let next_cursor = since.saturating_add(u64::try_from(events.len()).unwrap_or(u64::MAX));
        Ok(EventPage {
            events,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::models::{Bookmark, ItemId, ItemKind, Timestamp};

    fn populated() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .bookmarks
            .insert("1".to_string(), vec![Bookmark::new(Some(1), None)]);
        snapshot.sync_version = 3;
        snapshot
    }

    fn deletion(id: &str) -> DeletionEvent {
        DeletionEvent::new(
            ItemId::new(id),
            ItemKind::Note,
            Timestamp::now(),
            "device-a",
        )
    }

    #[tokio::test]
    async fn load_is_absent_until_first_save() {
        let remote = InMemoryRemoteStore::new();
        assert_eq!(remote.load().await, Ok(None));

        remote.save(&populated()).await.unwrap();
        let loaded = remote.load().await.unwrap().unwrap();
        assert_eq!(loaded.sync_version, 3);
        assert_eq!(remote.save_count(), 1);
        assert_eq!(remote.load_count(), 2);
    }

    #[tokio::test]
    async fn empty_upload_over_data_is_rejected() {
        let remote = InMemoryRemoteStore::new();
        remote.save(&Snapshot::default()).await.unwrap();
        remote.save(&populated()).await.unwrap();

        assert_eq!(
            remote.save(&Snapshot::default()).await,
            Err(RemoteError::Rejected(RejectReason::EmptySnapshot))
        );
        assert_eq!(remote.snapshot().unwrap().sync_version, 3);
    }

    #[tokio::test]
    async fn fetch_events_pages_by_insertion_index() {
        let remote = InMemoryRemoteStore::new();
        remote
            .append_events(&[deletion("a"), deletion("b"), deletion("c")])
            .await
            .unwrap();

        let first = remote.fetch_events(0, 2).await.unwrap();
        assert_eq!(first.events.len(), 2);
        assert_eq!(first.next_cursor, 2);

        let second = remote.fetch_events(first.next_cursor, 2).await.unwrap();
        assert_eq!(second.events[0].id, ItemId::new("c"));
        assert_eq!(second.next_cursor, 3);

        let past_end = remote.fetch_events(10, 2).await.unwrap();
        assert!(past_end.events.is_empty());
        assert_eq!(past_end.next_cursor, 10);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_once() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(
            RemoteOperation::Load,
            RemoteError::Transport("offline".to_string()),
        );

        assert!(matches!(
            remote.load().await,
            Err(RemoteError::Transport(_))
        ));
        assert_eq!(remote.load().await, Ok(None));
    }

    #[tokio::test]
    async fn credentials_gate_every_operation() {
        let auth = Arc::new(AuthState::signed_out());
        let remote = InMemoryRemoteStore::new().with_credentials(auth);

        assert_eq!(remote.load().await, Err(RemoteError::Unauthenticated));
        assert_eq!(
            remote.append_events(&[deletion("a")]).await,
            Err(RemoteError::Unauthenticated)
        );
        assert!(remote.events().is_empty());
    }

    #[tokio::test]
    async fn corrupt_blob_fails_to_decode() {
        let remote = InMemoryRemoteStore::new();
        remote.put_raw("not base64!");
        assert!(matches!(remote.load().await, Err(RemoteError::Decode(_))));
    }
}
