//! In-memory storage backend for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::provider::{encode_key_path, DeleteOutcome, ObjectMetadata, PutOptions, StorageBackend};
use casefile_common::{Error, ObjectKey, Result};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    metadata: ObjectMetadata,
    options: PutOptions,
}

/// In-memory storage backend.
///
/// Useful for testing and development. All data is stored in memory and lost
/// on drop. A backend built with [`MemoryBackend::remote`] reports itself as
/// remote and hands out expiring URLs, standing in for an object store.
pub struct MemoryBackend {
    storage: Arc<RwLock<BTreeMap<String, Entry>>>,
    bucket: Option<String>,
}

impl MemoryBackend {
    /// Create a new empty backend that behaves like local storage.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(BTreeMap::new())),
            bucket: None,
        }
    }

    /// Create a new empty backend that behaves like a remote bucket.
    pub fn remote(bucket: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(BTreeMap::new())),
            bucket: Some(bucket.into()),
        }
    }

    /// Write options recorded with an object, if stored.
    pub fn options_for(&self, key: &ObjectKey) -> Option<PutOptions> {
        self.read()
            .ok()?
            .get(&key.as_key_string())
            .map(|entry| entry.options.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.storage
            .read()
            .map_err(|_| Error::Storage("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.storage
            .write()
            .map_err(|_| Error::Storage("memory backend lock poisoned".to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_remote(&self) -> bool {
        self.bucket.is_some()
    }

    async fn put(&self, key: &ObjectKey, data: Vec<u8>, options: &PutOptions) -> Result<ObjectMetadata> {
        let metadata = ObjectMetadata {
            key: key.clone(),
            size: data.len() as u64,
            modified: Utc::now(),
            etag: Some(Uuid::new_v4().to_string()),
        };

        let entry = Entry {
            data,
            metadata: metadata.clone(),
            options: options.clone(),
        };
        self.write()?.insert(key.as_key_string(), entry);

        Ok(metadata)
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
        match self.read()?.get(&key.as_key_string()) {
            Some(entry) => Ok(entry.data.clone()),
            None => Err(Error::NotFound(format!("File not found: {}", key))),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.read()?.contains_key(&key.as_key_string()))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        match self.write()?.remove(&key.as_key_string()) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyAbsent),
        }
    }

    async fn list(&self, prefix: Option<&ObjectKey>, max_keys: usize) -> Result<Vec<ObjectMetadata>> {
        let storage = self.read()?;
        Ok(storage
            .values()
            .filter(|entry| prefix.map_or(true, |p| entry.metadata.key.starts_with(p)))
            .take(max_keys)
            .map(|entry| entry.metadata.clone())
            .collect())
    }

    async fn url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
        if !self.exists(key).await? {
            return Err(Error::NotFound(format!("File not found: {}", key)));
        }
        Ok(match &self.bucket {
            Some(bucket) => format!(
                "memory://{}/{}?expires={}",
                bucket,
                encode_key_path(key),
                expires_in.as_secs()
            ),
            None => format!("memory:///{}", encode_key_path(key)),
        })
    }
}
