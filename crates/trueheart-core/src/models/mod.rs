//! Data models for TrueHeart

mod bookmark;
mod deletion;
mod item;
mod note;
mod reading_position;
mod snapshot;
mod timestamp;

pub use bookmark::Bookmark;
pub use deletion::{DeletedItem, DeletedItems, DeletionEvent};
pub use item::{CollectionItem, ItemId, ItemKind};
pub use note::Note;
pub use reading_position::ReadingPosition;
pub use snapshot::{BookIndex, Collection, Snapshot};
pub use timestamp::Timestamp;
