pub mod disk;
pub mod memory;
pub mod reference;

use crate::core::cache::{KeyValueCollection, Store};
use anyhow::{Context, Result};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::debug;

/// A thread-safe key-value store that can hold multiple collections.
///
/// Without a keyspace every collection lives in memory.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens or creates a persistent store under `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path.join("store"))
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        debug!("Opened store at {}", path.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(keyspace),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        if let Some(collection) = self.collections.read().ok()?.get(name) {
            return Some(collection.clone());
        }
        if !create_if_missing {
            return None;
        }

        let mut collections = self.collections.write().ok()?;
        if let Some(collection) = collections.get(name) {
            return Some(collection.clone());
        }

        let collection: Arc<dyn KeyValueCollection> = match (&self.keyspace, persist) {
            (Some(keyspace), true) => {
                let partition = keyspace
                    .open_partition(name, PartitionCreateOptions::default())
                    .ok()?;
                Arc::new(DiskCollection::new(keyspace.clone(), partition))
            }
            _ => Arc::new(MemoryCollection::new()),
        };
        collections.insert(name.to_string(), collection.clone());
        Some(collection)
    }
}
