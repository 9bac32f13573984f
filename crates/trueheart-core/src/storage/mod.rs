//! Persistent key-value storage and the local snapshot store built on it.

mod libsql_kv;
mod local_snapshot;
mod memory;

use async_trait::async_trait;

pub use libsql_kv::LibSqlKeyValueStore;
pub use local_snapshot::{keys, LocalSnapshotStore, SnapshotEdit};
pub use memory::MemoryKeyValueStore;

use crate::Result;

/// String key-value storage owned by one device.
///
/// Writes are independent: there is no transaction spanning several keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, in ascending order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
