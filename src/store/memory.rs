use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Collection living only as long as the process.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let collection = self.inner.lock().await;
        let value = collection.get(key).cloned();
        if value.is_some() {
            debug!("Memory HIT for key: {}", String::from_utf8_lossy(key));
        } else {
            debug!("Memory MISS for key: {}", String::from_utf8_lossy(key));
        }
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut collection = self.inner.lock().await;
        debug!("Memory PUT for key: {}", String::from_utf8_lossy(key));
        collection.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let mut collection = self.inner.lock().await;
        collection.remove(key);
        debug!("Memory REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_put() {
        let collection = MemoryCollection::new();

        assert!(collection.get(b"key1").await.unwrap().is_none());
        assert_eq!(collection.count().await.unwrap(), 0);

        collection.put(b"key1", b"123").await.unwrap();
        assert_eq!(collection.get(b"key1").await.unwrap(), Some(b"123".to_vec()));
        assert!(collection.get(b"key2").await.unwrap().is_none());

        // overwriting keeps a single entry
        collection.put(b"key1", b"456").await.unwrap();
        assert_eq!(collection.count().await.unwrap(), 1);
        assert_eq!(collection.get(b"key1").await.unwrap(), Some(b"456".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_remove() {
        let collection = MemoryCollection::new();

        collection.put(b"key1", b"123").await.unwrap();
        collection.remove(b"key1").await.unwrap();
        assert!(collection.get(b"key1").await.unwrap().is_none());
        assert_eq!(collection.count().await.unwrap(), 0);
    }
}
