//! Local snapshot store: the device's copy of every synchronizable collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use super::KeyValueStore;
use crate::models::{
    BookIndex, Bookmark, ItemId, ItemKind, Note, ReadingPosition, Snapshot, Timestamp,
};
use crate::{Error, Result};

/// Storage keys used on the device.
pub mod keys {
    pub const BOOKMARKS: &str = "bookmarks";
    pub const NOTES: &str = "notes";
    pub const READING_POSITION_PREFIX: &str = "readingPosition:";
    pub const SETTINGS: &str = "settings";
    pub const SETTINGS_UPDATED_AT: &str = "settingsUpdatedAt";
    pub const SYNC_VERSION: &str = "syncVersion";
    pub const LAST_MODIFIED: &str = "lastModified";
    pub const LAST_SYNC_TIMESTAMP: &str = "lastSyncTimestamp";
    pub const PENDING_DELETIONS: &str = "pendingDeletions";
    pub const KNOWN_DELETIONS: &str = "knownDeletions";
    pub const REMOTE_EVENT_CURSOR: &str = "remoteEventCursor";
    pub const DEVICE_ID: &str = "deviceId";
}

/// Reads and writes the local snapshot, one key per collection.
///
/// Reading positions are stored one key per book. `write` is not atomic
/// across keys. Every read and mutation goes through one shared edit lock,
/// so clones of the store never interleave their changes.
#[derive(Clone)]
pub struct LocalSnapshotStore {
    kv: Arc<dyn KeyValueStore>,
    edits: Arc<Mutex<()>>,
}

/// Exclusive access to the local snapshot until dropped.
pub struct SnapshotEdit<'a> {
    store: &'a LocalSnapshotStore,
    _guard: MutexGuard<'a, ()>,
}

impl LocalSnapshotStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            edits: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for the edit lock. Hold the returned guard across a read and
    /// the write that depends on it.
    pub async fn lock(&self) -> SnapshotEdit<'_> {
        SnapshotEdit {
            store: self,
            _guard: self.edits.lock().await,
        }
    }

    /// Assemble the current local snapshot; missing collections are empty.
    pub async fn read(&self) -> Result<Snapshot> {
        let edit = self.lock().await;
        edit.read().await
    }

    /// Persist every collection of `snapshot`, replacing prior local values.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let edit = self.lock().await;
        edit.write(snapshot).await
    }

    /// Insert a bookmark into a book, replacing any copy with the same id.
    pub async fn upsert_bookmark(&self, book: &str, bookmark: Bookmark) -> Result<()> {
        let edit = self.lock().await;
        edit.upsert_bookmark(book, bookmark).await
    }

    /// Insert a note into a book, replacing any copy with the same id.
    pub async fn upsert_note(&self, book: &str, note: Note) -> Result<()> {
        let edit = self.lock().await;
        edit.upsert_note(book, note).await
    }

    /// Remove an item from whichever book holds it.
    ///
    /// Returns the books it was removed from; empty when it did not exist.
    pub async fn remove_item(&self, kind: ItemKind, id: &ItemId) -> Result<Vec<BookIndex>> {
        let edit = self.lock().await;
        edit.remove_item(kind, id).await
    }

    pub async fn set_reading_position(&self, book: &str, position: &ReadingPosition) -> Result<()> {
        let edit = self.lock().await;
        edit.set_reading_position(book, position).await
    }

    /// Set one setting and stamp the settings collection as modified now.
    pub async fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        let edit = self.lock().await;
        edit.set_setting(key, value).await
    }

    pub async fn last_sync_at(&self) -> Result<Option<Timestamp>> {
        Ok(self.kv.get(keys::LAST_SYNC_TIMESTAMP).await?.map(Timestamp::new))
    }

    pub async fn set_last_sync_at(&self, timestamp: &Timestamp) -> Result<()> {
        self.kv
            .set(keys::LAST_SYNC_TIMESTAMP, timestamp.as_str())
            .await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
            _ => Ok(None),
        }
    }

    async fn write_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await
    }

    async fn write_optional(&self, key: &str, value: Option<&Timestamp>) -> Result<()> {
        match value {
            Some(timestamp) => self.kv.set(key, timestamp.as_str()).await,
            None => self.kv.remove(key).await,
        }
    }
}

impl SnapshotEdit<'_> {
    pub async fn read(&self) -> Result<Snapshot> {
        let store = self.store;
        let bookmarks = store.read_json(keys::BOOKMARKS).await?.unwrap_or_default();
        let notes = store.read_json(keys::NOTES).await?.unwrap_or_default();
        let settings = store.read_json(keys::SETTINGS).await?.unwrap_or_default();
        let settings_updated_at = store
            .kv
            .get(keys::SETTINGS_UPDATED_AT)
            .await?
            .map(Timestamp::new);
        let sync_version = match store.kv.get(keys::SYNC_VERSION).await? {
            Some(raw) => raw.trim().parse::<u64>().map_err(|error| {
                Error::InvalidInput(format!("stored syncVersion '{raw}' is invalid: {error}"))
            })?,
            None => 0,
        };
        let last_modified = store.kv.get(keys::LAST_MODIFIED).await?.map(Timestamp::new);

        let mut reading_positions = BTreeMap::new();
        for key in store.kv.keys_with_prefix(keys::READING_POSITION_PREFIX).await? {
            let Some(book) = key.strip_prefix(keys::READING_POSITION_PREFIX) else {
                continue;
            };
            if let Some(position) = store.read_json::<ReadingPosition>(&key).await? {
                reading_positions.insert(book.to_string(), position);
            }
        }

        Ok(Snapshot {
            bookmarks,
            notes,
            reading_positions,
            settings,
            settings_updated_at,
            sync_version,
            last_modified,
        })
    }

    pub async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let store = self.store;
        store.write_json(keys::BOOKMARKS, &snapshot.bookmarks).await?;
        store.write_json(keys::NOTES, &snapshot.notes).await?;
        store.write_json(keys::SETTINGS, &snapshot.settings).await?;
        store
            .write_optional(
                keys::SETTINGS_UPDATED_AT,
                snapshot.settings_updated_at.as_ref(),
            )
            .await?;

        let existing = store.kv.keys_with_prefix(keys::READING_POSITION_PREFIX).await?;
        for key in existing {
            let Some(book) = key.strip_prefix(keys::READING_POSITION_PREFIX) else {
                continue;
            };
            if !snapshot.reading_positions.contains_key(book) {
                store.kv.remove(&key).await?;
            }
        }
        for (book, position) in &snapshot.reading_positions {
            store.write_json(&reading_position_key(book), position).await?;
        }

        store
            .kv
            .set(keys::SYNC_VERSION, &snapshot.sync_version.to_string())
            .await?;
        store
            .write_optional(keys::LAST_MODIFIED, snapshot.last_modified.as_ref())
            .await?;
        Ok(())
    }

    pub async fn upsert_bookmark(&self, book: &str, bookmark: Bookmark) -> Result<()> {
        let mut bookmarks: BTreeMap<BookIndex, Vec<Bookmark>> =
            self.store.read_json(keys::BOOKMARKS).await?.unwrap_or_default();
        for items in bookmarks.values_mut() {
            items.retain(|existing| existing.id != bookmark.id);
        }
        bookmarks.entry(book.to_string()).or_default().push(bookmark);
        self.store.write_json(keys::BOOKMARKS, &bookmarks).await
    }

    pub async fn upsert_note(&self, book: &str, note: Note) -> Result<()> {
        let mut notes: BTreeMap<BookIndex, Vec<Note>> =
            self.store.read_json(keys::NOTES).await?.unwrap_or_default();
        for items in notes.values_mut() {
            items.retain(|existing| existing.id != note.id);
        }
        notes.entry(book.to_string()).or_default().push(note);
        self.store.write_json(keys::NOTES, &notes).await
    }

    pub async fn remove_item(&self, kind: ItemKind, id: &ItemId) -> Result<Vec<BookIndex>> {
        let store = self.store;
        let mut snapshot = Snapshot {
            bookmarks: store.read_json(keys::BOOKMARKS).await?.unwrap_or_default(),
            notes: store.read_json(keys::NOTES).await?.unwrap_or_default(),
            ..Snapshot::default()
        };
        let removed_from = snapshot.remove_item(kind, id);
        if !removed_from.is_empty() {
            match kind {
                ItemKind::Bookmark => store.write_json(keys::BOOKMARKS, &snapshot.bookmarks).await?,
                ItemKind::Note => store.write_json(keys::NOTES, &snapshot.notes).await?,
            }
        }
        Ok(removed_from)
    }

    pub async fn set_reading_position(&self, book: &str, position: &ReadingPosition) -> Result<()> {
        self.store
            .write_json(&reading_position_key(book), position)
            .await
    }

    pub async fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut settings: BTreeMap<String, Value> =
            self.store.read_json(keys::SETTINGS).await?.unwrap_or_default();
        settings.insert(key.to_string(), value);
        self.store.write_json(keys::SETTINGS, &settings).await?;
        self.store
            .kv
            .set(keys::SETTINGS_UPDATED_AT, Timestamp::now().as_str())
            .await
    }
}

fn reading_position_key(book: &str) -> String {
    format!("{}{book}", keys::READING_POSITION_PREFIX)
}
