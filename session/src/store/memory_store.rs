use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::SessionStore;

/// Process-local document store.
///
/// Every primitive runs under one lock, so the conditional operations are
/// atomic with respect to each other.
#[derive(Default)]
pub struct MemorySessionStore {
    docs: Mutex<BTreeMap<String, String>>,
    closed: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    fn ensure_open(&self) -> anyhow::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            anyhow::bail!("memory store is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.ensure_open()?;
        Ok(self.docs.lock().await.contains_key(key))
    }

    async fn set_if_absent(&self, key: &str, document: &str) -> anyhow::Result<bool> {
        self.ensure_open()?;
        let mut docs = self.docs.lock().await;
        if docs.contains_key(key) {
            return Ok(false);
        }
        docs.insert(key.to_owned(), document.to_owned());
        Ok(true)
    }

    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        document: &str,
    ) -> anyhow::Result<bool> {
        self.ensure_open()?;
        let mut docs = self.docs.lock().await;
        match docs.get_mut(key) {
            Some(current) if current == expected => {
                *current = document.to_owned();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.ensure_open()?;
        Ok(self.docs.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<u64> {
        self.ensure_open()?;
        Ok(self.docs.lock().await.remove(key).map_or(0, |_| 1))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        self.ensure_open()?;
        let mut docs = self.docs.lock().await;
        if docs.get(key).is_some_and(|current| current == expected) {
            docs.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.ensure_open()?;
        let docs = self.docs.lock().await;
        Ok(docs
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_writes_once() -> anyhow::Result<()> {
        let store = MemorySessionStore::new();

        assert!(store.set_if_absent("k", "first").await?);
        assert!(!store.set_if_absent("k", "second").await?);
        assert_eq!(store.get("k").await?.as_deref(), Some("first"));

        Ok(())
    }

    #[tokio::test]
    async fn conditional_ops_compare_documents() -> anyhow::Result<()> {
        let store = MemorySessionStore::new();
        store.set_if_absent("k", "v1").await?;

        assert!(!store.replace_if_equals("k", "stale", "v2").await?);
        assert!(store.replace_if_equals("k", "v1", "v2").await?);
        assert!(!store.delete_if_equals("k", "v1").await?);
        assert!(store.delete_if_equals("k", "v2").await?);
        assert!(!store.exists("k").await?);

        Ok(())
    }

    #[tokio::test]
    async fn keys_are_prefix_scoped_and_sorted() -> anyhow::Result<()> {
        let store = MemorySessionStore::new();
        for key in ["TEST_b", "OTHER_a", "TEST_a", "TEST"] {
            store.set_if_absent(key, "{}").await?;
        }

        assert_eq!(store.keys("TEST_").await?, vec!["TEST_a", "TEST_b"]);
        assert_eq!(store.keys("").await?.len(), 4);
        assert!(store.keys("NONE_").await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_removed_count() -> anyhow::Result<()> {
        let store = MemorySessionStore::new();
        store.set_if_absent("k", "v").await?;

        assert_eq!(store.delete("k").await?, 1);
        assert_eq!(store.delete("k").await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() -> anyhow::Result<()> {
        let store = MemorySessionStore::new();
        store.close().await?;

        assert!(store.get("k").await.is_err());
        assert!(store.keys("").await.is_err());

        Ok(())
    }
}
