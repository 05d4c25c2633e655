//! Backing document stores.
//!
//! The registry needs only a handful of primitives over whole documents
//! addressed by string keys. Errors are transport-level; "not found" is
//! expressed through the return values, never as an error.
pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemorySessionStore;
pub use sqlite_store::SqliteSessionStore;

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Atomically write `document` only if `key` is absent.
    /// Returns true when the write happened.
    async fn set_if_absent(&self, key: &str, document: &str) -> anyhow::Result<bool>;

    /// Atomically replace the document at `key` only if it still equals `expected`.
    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        document: &str,
    ) -> anyhow::Result<bool>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Returns the number of keys removed.
    async fn delete(&self, key: &str) -> anyhow::Result<u64>;

    /// Atomically delete `key` only if its document still equals `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> anyhow::Result<bool>;

    /// All keys starting with `prefix`, sorted. An empty prefix scans the whole keyspace.
    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    async fn close(&self) -> anyhow::Result<()>;
}
