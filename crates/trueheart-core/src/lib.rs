//! trueheart-core - Core library for TrueHeart
//!
//! This crate contains the synchronizable collections (bookmarks, notes,
//! reading positions, settings), the local key-value storage layer, and the
//! multi-device sync engine used by every TrueHeart front end.

pub mod auth;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Bookmark, DeletionEvent, ItemId, ItemKind, Note, Snapshot};
pub use sync::{SyncContext, SyncController, SyncError, SyncEvent};
