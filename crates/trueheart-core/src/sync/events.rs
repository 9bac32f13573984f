//! Deletion event log: locally pending tombstones plus the cached remote log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::device::DeviceIdentity;
use crate::models::{DeletionEvent, ItemId, ItemKind, Timestamp};
use crate::storage::{keys, KeyValueStore};
use crate::{Error, Result};

/// Persistent tombstone bookkeeping for one device.
///
/// The pending list holds deletions made here that have not been appended to
/// the remote log yet. The known list caches tombstones already fetched from
/// the remote log, together with the cursor to fetch from next.
#[derive(Clone)]
pub struct DeletionEventLog {
    kv: Arc<dyn KeyValueStore>,
    device: DeviceIdentity,
    pending_lock: Arc<Mutex<()>>,
}

impl DeletionEventLog {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            device: DeviceIdentity::new(Arc::clone(&kv)),
            kv,
            pending_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Queue a tombstone for `(id, kind)` stamped now.
    ///
    /// A second deletion of the same item keeps the first tombstone.
    pub async fn record_local_deletion(&self, id: ItemId, kind: ItemKind) -> Result<DeletionEvent> {
        let _guard = self.pending_lock.lock().await;
        let mut pending = self.read_events(keys::PENDING_DELETIONS).await?;
        if let Some(existing) = pending.iter().find(|event| event.key() == (kind, &id)) {
            return Ok(existing.clone());
        }

        let device_id = self.device.device_id().await?;
        let event = DeletionEvent::new(id, kind, Timestamp::now(), device_id);
        pending.push(event.clone());
        self.write_events(keys::PENDING_DELETIONS, &pending).await?;
        tracing::debug!(
            "Recorded deletion of {} {} ({} pending)",
            kind,
            event.id,
            pending.len()
        );
        Ok(event)
    }

    /// Return the pending list and clear it.
    pub async fn drain_pending(&self) -> Result<Vec<DeletionEvent>> {
        let _guard = self.pending_lock.lock().await;
        let pending = self.read_events(keys::PENDING_DELETIONS).await?;
        if !pending.is_empty() {
            self.kv.remove(keys::PENDING_DELETIONS).await?;
        }
        Ok(pending)
    }

    /// Put drained events back after a failed sync.
    pub async fn requeue(&self, events: &[DeletionEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let _guard = self.pending_lock.lock().await;
        let current = self.read_events(keys::PENDING_DELETIONS).await?;
        let merged = union_events([events, current.as_slice()]);
        self.write_events(keys::PENDING_DELETIONS, &merged).await
    }

    pub async fn pending(&self) -> Result<Vec<DeletionEvent>> {
        self.read_events(keys::PENDING_DELETIONS).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.pending().await?.len())
    }

    /// Remote tombstones seen by earlier syncs.
    pub async fn known_remote(&self) -> Result<Vec<DeletionEvent>> {
        self.read_events(keys::KNOWN_DELETIONS).await
    }

    pub async fn store_known_remote(&self, events: &[DeletionEvent]) -> Result<()> {
        self.write_events(keys::KNOWN_DELETIONS, events).await
    }

    /// Insertion index of the next remote event to fetch.
    pub async fn remote_cursor(&self) -> Result<u64> {
        match self.kv.get(keys::REMOTE_EVENT_CURSOR).await? {
            Some(raw) => raw.trim().parse::<u64>().map_err(|error| {
                Error::InvalidInput(format!("stored event cursor '{raw}' is invalid: {error}"))
            }),
            None => Ok(0),
        }
    }

    pub async fn set_remote_cursor(&self, cursor: u64) -> Result<()> {
        self.kv
            .set(keys::REMOTE_EVENT_CURSOR, &cursor.to_string())
            .await
    }

    async fn read_events(&self, key: &str) -> Result<Vec<DeletionEvent>> {
        match self.kv.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn write_events(&self, key: &str, events: &[DeletionEvent]) -> Result<()> {
        let raw = serde_json::to_string(events)?;
        self.kv.set(key, &raw).await
    }
}

/// Drop events whose deletion time is older than `retention` before `now`.
///
/// Events with an unparseable `deletedAt` are kept.
pub fn prune_expired(
    events: &[DeletionEvent],
    retention: Duration,
    now: DateTime<Utc>,
) -> Vec<DeletionEvent> {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return events.to_vec();
    };
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return events.to_vec();
    };
    events
        .iter()
        .filter(|event| {
            event
                .deleted_at
                .instant()
                .is_none_or(|deleted_at| deleted_at >= cutoff)
        })
        .cloned()
        .collect()
}

/// Union several event lists, one event per `(id, type)`.
///
/// The earliest `deletedAt` is kept; order follows first appearance.
pub fn union_events<'a, I>(lists: I) -> Vec<DeletionEvent>
where
    I: IntoIterator<Item = &'a [DeletionEvent]>,
{
    let mut merged: Vec<DeletionEvent> = Vec::new();
    let mut positions: HashMap<(ItemKind, ItemId), usize> = HashMap::new();
    for event in lists.into_iter().flatten() {
        let key = (event.kind, event.id.clone());
        match positions.get(&key) {
            Some(&index) => {
                if event.deleted_at < merged[index].deleted_at {
                    merged[index] = event.clone();
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(event.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::MemoryKeyValueStore;

    fn log() -> DeletionEventLog {
        DeletionEventLog::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn event(id: &str, kind: ItemKind, deleted_at: &str) -> DeletionEvent {
        DeletionEvent::new(ItemId::new(id), kind, Timestamp::new(deleted_at), "device-a")
    }

    #[tokio::test]
    async fn record_dedupes_by_id_and_kind() {
        let log = log();
        let first = log
            .record_local_deletion(ItemId::new("x"), ItemKind::Note)
            .await
            .unwrap();
        let again = log
            .record_local_deletion(ItemId::new("x"), ItemKind::Note)
            .await
            .unwrap();
        log.record_local_deletion(ItemId::new("x"), ItemKind::Bookmark)
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(log.pending_count().await.unwrap(), 2);
        assert!(!first.device_id.is_empty());
    }

    #[tokio::test]
    async fn drain_returns_and_clears() {
        let log = log();
        log.record_local_deletion(ItemId::new("a"), ItemKind::Bookmark)
            .await
            .unwrap();

        let drained = log.drain_pending().await.unwrap();
        assert_eq!(drained.len(), 1);
        assert!(log.drain_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requeue_restores_drained_events() {
        let log = log();
        log.record_local_deletion(ItemId::new("a"), ItemKind::Bookmark)
            .await
            .unwrap();
        let drained = log.drain_pending().await.unwrap();
        log.record_local_deletion(ItemId::new("b"), ItemKind::Note)
            .await
            .unwrap();

        log.requeue(&drained).await.unwrap();
        let ids: Vec<String> = log
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|event| event.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn cursor_defaults_to_zero_and_persists() {
        let log = log();
        assert_eq!(log.remote_cursor().await.unwrap(), 0);
        log.set_remote_cursor(42).await.unwrap();
        assert_eq!(log.remote_cursor().await.unwrap(), 42);
    }

    #[test]
    fn prune_drops_only_expired_events() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let events = vec![
            event("old", ItemKind::Note, "2024-01-01T00:00:00Z"),
            event("fresh", ItemKind::Note, "2024-03-20T00:00:00Z"),
            event("odd", ItemKind::Note, "yesterday"),
        ];

        let kept = prune_expired(&events, Duration::from_secs(30 * 24 * 60 * 60), now);
        let ids: Vec<&str> = kept.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "odd"]);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn union_keeps_earliest_deletion_per_key() {
        let remote = vec![
            event("a", ItemKind::Note, "2024-01-05T00:00:00Z"),
            event("b", ItemKind::Bookmark, "2024-01-01T00:00:00Z"),
        ];
        let local = vec![
            event("a", ItemKind::Note, "2024-01-03T00:00:00Z"),
            event("a", ItemKind::Bookmark, "2024-01-04T00:00:00Z"),
        ];

        let merged = union_events([remote.as_slice(), local.as_slice()]);
        assert_eq!(
            merged,
            vec![
                event("a", ItemKind::Note, "2024-01-03T00:00:00Z"),
                event("b", ItemKind::Bookmark, "2024-01-01T00:00:00Z"),
                event("a", ItemKind::Bookmark, "2024-01-04T00:00:00Z"),
            ]
        );
    }
}
