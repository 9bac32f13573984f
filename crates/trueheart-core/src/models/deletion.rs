//! Deletion events (tombstones)

use serde::{Deserialize, Serialize};

use super::{BookIndex, ItemId, ItemKind, Timestamp};

/// Durable marker that item `id` of collection `kind` must not exist in any
/// merged snapshot from `deleted_at` onward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionEvent {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub deleted_at: Timestamp,
    #[serde(default)]
    pub device_id: String,
}

impl DeletionEvent {
    pub fn new(
        id: ItemId,
        kind: ItemKind,
        deleted_at: Timestamp,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            deleted_at,
            device_id: device_id.into(),
        }
    }

    /// Deduplication key: one tombstone per `(id, kind)` pair.
    pub fn key(&self) -> (ItemKind, &ItemId) {
        (self.kind, &self.id)
    }
}

/// An item removed by tombstone application, with the book it lived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedItem {
    pub id: ItemId,
    pub book_index: BookIndex,
}

/// Items removed during a merge, grouped by collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItems {
    #[serde(default)]
    pub bookmarks: Vec<DeletedItem>,
    #[serde(default)]
    pub notes: Vec<DeletedItem>,
}

impl DeletedItems {
    pub fn record(&mut self, kind: ItemKind, id: ItemId, book_index: BookIndex) {
        let entry = DeletedItem { id, book_index };
        match kind {
            ItemKind::Bookmark => self.bookmarks.push(entry),
            ItemKind::Note => self.notes.push(entry),
        }
    }

    pub fn for_kind(&self, kind: ItemKind) -> &[DeletedItem] {
        match kind {
            ItemKind::Bookmark => &self.bookmarks,
            ItemKind::Note => &self.notes,
        }
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len() + self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty() && self.notes.is_empty()
    }
}
