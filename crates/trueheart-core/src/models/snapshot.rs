//! Snapshot model: the full synchronizable state of one account

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Bookmark, CollectionItem, ItemId, ItemKind, Note, ReadingPosition, Timestamp};

/// Container key ("book index") for per-book collections.
pub type BookIndex = String;

/// The closed set of synchronizable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Bookmarks,
    Notes,
    ReadingPositions,
    Settings,
}

impl Collection {
    pub const ALL: [Self; 4] = [
        Self::Bookmarks,
        Self::Notes,
        Self::ReadingPositions,
        Self::Settings,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bookmarks => "bookmarks",
            Self::Notes => "notes",
            Self::ReadingPositions => "readingPositions",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time aggregate of all collections for one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub bookmarks: BTreeMap<BookIndex, Vec<Bookmark>>,
    #[serde(default)]
    pub notes: BTreeMap<BookIndex, Vec<Note>>,
    #[serde(default)]
    pub reading_positions: BTreeMap<BookIndex, ReadingPosition>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    /// When any setting was last changed on the device that wrote this snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_updated_at: Option<Timestamp>,
    #[serde(default)]
    pub sync_version: u64,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl Snapshot {
    /// True when the given collection holds no data.
    ///
    /// Per-book containers that exist but hold an empty list count as empty.
    pub fn collection_is_empty(&self, collection: Collection) -> bool {
        match collection {
            Collection::Bookmarks => self.bookmarks.values().all(Vec::is_empty),
            Collection::Notes => self.notes.values().all(Vec::is_empty),
            Collection::ReadingPositions => self.reading_positions.is_empty(),
            Collection::Settings => self.settings.is_empty(),
        }
    }

    /// Compare collection contents, ignoring `sync_version` and `last_modified`.
    pub fn same_contents(&self, other: &Self) -> bool {
        self.bookmarks == other.bookmarks
            && self.notes == other.notes
            && self.reading_positions == other.reading_positions
            && self.settings == other.settings
    }

    pub fn bookmark_count(&self) -> usize {
        self.bookmarks.values().map(Vec::len).sum()
    }

    pub fn note_count(&self) -> usize {
        self.notes.values().map(Vec::len).sum()
    }

    /// Find the book that holds the item, if any.
    pub fn locate(&self, kind: ItemKind, id: &ItemId) -> Option<BookIndex> {
        match kind {
            ItemKind::Bookmark => locate_in(&self.bookmarks, id),
            ItemKind::Note => locate_in(&self.notes, id),
        }
    }

    /// Remove every copy of the item from every book, returning the books it
    /// was removed from. Removing an absent item is a no-op.
    pub fn remove_item(&mut self, kind: ItemKind, id: &ItemId) -> Vec<BookIndex> {
        match kind {
            ItemKind::Bookmark => remove_from(&mut self.bookmarks, id),
            ItemKind::Note => remove_from(&mut self.notes, id),
        }
    }
}

fn locate_in<T: CollectionItem>(books: &BTreeMap<BookIndex, Vec<T>>, id: &ItemId) -> Option<BookIndex> {
    books
        .iter()
        .find(|(_, items)| items.iter().any(|item| item.id() == id))
        .map(|(book, _)| book.clone())
}

fn remove_from<T: CollectionItem>(
    books: &mut BTreeMap<BookIndex, Vec<T>>,
    id: &ItemId,
) -> Vec<BookIndex> {
    let mut removed_from = Vec::new();
    for (book, items) in books.iter_mut() {
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() != before {
            removed_from.push(book.clone());
        }
    }
    removed_from
}
