//! Reading position model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Timestamp;

/// Where the reader last stopped inside one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<String>,
    /// Scroll offset as a fraction of the chapter (0.0..=1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<f64>,
    /// When the position was recorded; positions from old clients lack it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReadingPosition {
    #[must_use]
    pub fn new(chapter: Option<u32>, verse: Option<String>) -> Self {
        Self {
            chapter,
            verse,
            scroll: None,
            timestamp: Some(Timestamp::now()),
            extra: Map::new(),
        }
    }
}
