//! Bookmark model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CollectionItem, ItemId, ItemKind, Timestamp};

/// A bookmarked passage inside a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Unique identifier
    pub id: ItemId,
    /// Creation/modification time
    pub timestamp: Timestamp,
    /// Chapter number within the book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    /// Verse reference within the chapter (e.g. `"12"` or `"12-14"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<String>,
    /// User label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Fields written by other clients that this build does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bookmark {
    /// Create a bookmark stamped with the current time
    #[must_use]
    pub fn new(chapter: Option<u32>, verse: Option<String>) -> Self {
        Self {
            id: ItemId::generate(),
            timestamp: Timestamp::now(),
            chapter,
            verse,
            label: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Human-readable `chapter.verse` location
    pub fn location(&self) -> String {
        match (self.chapter, self.verse.as_deref()) {
            (Some(chapter), Some(verse)) => format!("{chapter}.{verse}"),
            (Some(chapter), None) => chapter.to_string(),
            (None, Some(verse)) => verse.to_string(),
            (None, None) => String::new(),
        }
    }
}

impl CollectionItem for Bookmark {
    const KIND: ItemKind = ItemKind::Bookmark;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }
}
