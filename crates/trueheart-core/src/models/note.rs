//! Note model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CollectionItem, ItemId, ItemKind, Timestamp};

/// A free-text note attached to a passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: ItemId,
    /// Creation/modification time
    pub timestamp: Timestamp,
    /// Note body
    #[serde(default)]
    pub text: String,
    /// Chapter number within the book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    /// Verse reference within the chapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<String>,
    /// Fields written by other clients that this build does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    /// Create a note with the given text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: ItemId::generate(),
            timestamp: Timestamp::now(),
            text: text.into(),
            chapter: None,
            verse: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, chapter: Option<u32>, verse: Option<String>) -> Self {
        self.chapter = chapter;
        self.verse = verse;
        self
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Check if note text is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl CollectionItem for Note {
    const KIND: ItemKind = ItemKind::Note;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }
}
