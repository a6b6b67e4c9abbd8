//! Local filesystem storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::provider::{encode_key_path, DeleteOutcome, ObjectMetadata, PutOptions, StorageBackend};
use casefile_common::{Error, ObjectKey, Result};

/// Local filesystem storage backend.
///
/// Stores objects below a media root directory, one file per key, and serves
/// them under a static media URL prefix.
pub struct LocalBackend {
    root: PathBuf,
    media_url: String,
}

impl LocalBackend {
    /// Create a new local backend with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - `media_url` always ends with `/`
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>, media_url: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        let mut media_url = media_url.into();
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        Ok(Self { root, media_url })
    }

    /// Root directory holding the files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL prefix under which files are served.
    pub fn media_url(&self) -> &str {
        &self.media_url
    }

    /// Filesystem path of an object.
    pub fn resolve(&self, key: &ObjectKey) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in key.components() {
            fs_path.push(component);
        }
        fs_path
    }

    fn create_metadata(&self, key: &ObjectKey, fs_meta: &std::fs::Metadata) -> ObjectMetadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        ObjectMetadata {
            key: key.clone(),
            size: fs_meta.len(),
            modified,
            etag: Some(format!("{}-{}", modified.timestamp(), fs_meta.len())),
        }
    }

    /// Rebuild an object key from a path below the root.
    fn key_for(&self, path: &Path) -> Option<ObjectKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let components = relative
            .components()
            .map(|c| c.as_os_str().to_str().map(String::from))
            .collect::<Option<Vec<_>>>()?;
        ObjectKey::from_components(components).ok()
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn put(&self, key: &ObjectKey, data: Vec<u8>, _options: &PutOptions) -> Result<ObjectMetadata> {
        let fs_path = self.resolve(key);

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Key names a directory: {}", key)));
        }

        fs::write(&fs_path, &data).await?;

        let fs_meta = fs::metadata(&fs_path).await?;
        Ok(self.create_metadata(key, &fs_meta))
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
        let fs_path = self.resolve(key);

        if fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Key names a directory: {}", key)));
        }

        match fs::read(&fs_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("File not found: {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.resolve(key).is_file())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        let fs_path = self.resolve(key);

        if fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Key names a directory: {}", key)));
        }

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Local file already absent: {}", key);
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: Option<&ObjectKey>, max_keys: usize) -> Result<Vec<ObjectMetadata>> {
        let start = match prefix {
            Some(prefix) => self.resolve(prefix),
            None => self.root.clone(),
        };

        if start.is_file() {
            let fs_meta = fs::metadata(&start).await?;
            return Ok(self
                .key_for(&start)
                .map(|key| vec![self.create_metadata(&key, &fs_meta)])
                .unwrap_or_default());
        }
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let fs_meta = entry.metadata().await?;
                if fs_meta.is_dir() {
                    pending.push(entry_path);
                } else if let Some(key) = self.key_for(&entry_path) {
                    results.push(self.create_metadata(&key, &fs_meta));
                }
            }
        }

        results.sort_by(|a, b| a.key.as_key_string().cmp(&b.key.as_key_string()));
        results.truncate(max_keys);
        Ok(results)
    }

    async fn url(&self, key: &ObjectKey, _expires_in: Duration) -> Result<String> {
        Ok(format!("{}{}", self.media_url, encode_key_path(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(temp: &TempDir) -> LocalBackend {
        LocalBackend::new(temp.path(), "/media").unwrap()
    }

    #[tokio::test]
    async fn test_local_put_get() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let key = ObjectKey::parse("documents/d/1/test.txt").unwrap();
        let data = b"Hello, Local!".to_vec();

        let meta = backend.put(&key, data.clone(), &PutOptions::default()).await.unwrap();
        assert_eq!(meta.size, data.len() as u64);

        let downloaded = backend.get(&key).await.unwrap();
        assert_eq!(downloaded, data);
        assert_eq!(std::fs::read(backend.resolve(&key)).unwrap(), data);
    }

    #[tokio::test]
    async fn test_local_get_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let key = ObjectKey::parse("documents/missing.pdf").unwrap();
        assert!(backend.get(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_local_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let key = ObjectKey::parse("documents/d/1/a.pdf").unwrap();
        backend.put(&key, vec![1, 2, 3], &PutOptions::default()).await.unwrap();

        assert_eq!(backend.delete(&key).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(backend.delete(&key).await.unwrap(), DeleteOutcome::AlreadyAbsent);
        assert!(!backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_list_recurses_under_prefix() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        for key in ["documents/a/1/x.pdf", "documents/a/2/x.pdf", "documents/b/1/y.pdf"] {
            backend
                .put(&ObjectKey::parse(key).unwrap(), vec![0], &PutOptions::default())
                .await
                .unwrap();
        }

        let under_a = backend
            .list(Some(&ObjectKey::parse("documents/a").unwrap()), 1000)
            .await
            .unwrap();
        let keys: Vec<String> = under_a.iter().map(|m| m.key.as_key_string()).collect();
        assert_eq!(keys, vec!["documents/a/1/x.pdf", "documents/a/2/x.pdf"]);

        let capped = backend.list(None, 2).await.unwrap();
        assert_eq!(capped.len(), 2);

        let none = backend
            .list(Some(&ObjectKey::parse("documents/zzz").unwrap()), 1000)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_local_url_uses_media_prefix() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        assert_eq!(backend.media_url(), "/media/");

        let key = ObjectKey::parse("documents/d/1/my brief.pdf").unwrap();
        let url = backend.url(&key, Duration::from_secs(60)).await.unwrap();
        assert_eq!(url, "/media/documents/d/1/my%20brief.pdf");
    }
}
