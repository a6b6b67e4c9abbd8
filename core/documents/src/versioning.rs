//! Document versioning over the storage façade.
//!
//! Every upload becomes a new version with the next sequence number of its
//! document. Allocation is one atomic counter increment in the database;
//! uploads to the same document are additionally serialized in-process so a
//! failed upload can hand its number back before the next one is taken.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::{base_file_name, guess_content_type, Document, DocumentVersion, NewDocument};
use crate::store::{DocumentStore, VersionDraft};
use casefile_common::{DocumentId, Error, Result};
use casefile_storage::{DeleteOutcome, DocumentStorage};

/// Documents, their versions and the bytes behind them.
pub struct DocumentService {
    store: DocumentStore,
    storage: DocumentStorage,
    locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentService {
    /// Service over a record store and a storage façade.
    pub fn new(store: DocumentStore, storage: DocumentStorage) -> Self {
        Self {
            store,
            storage,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying record store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Storage façade holding the version files.
    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    fn lock_for(&self, document: &DocumentId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Database("document lock table poisoned".to_string()))?;
        Ok(locks.entry(*document).or_default().clone())
    }

    /// Drop the lock entry once no other task holds or waits on it.
    fn forget_lock(&self, document: &DocumentId, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Clones are only taken under the table lock, so the count is stable here.
        let unused = locks
            .get(document)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            locks.remove(document);
        }
    }

    fn require_document(&self, document: &DocumentId) -> Result<Document> {
        self.store
            .get_document(document)?
            .ok_or_else(|| Error::NotFound(format!("Document {} not found", document)))
    }

    fn require_version(&self, document: &DocumentId, sequence: Option<u32>) -> Result<DocumentVersion> {
        let version = match sequence {
            Some(sequence) => self.store.get_version(document, sequence)?,
            None => self.store.current_version(document)?,
        };
        version.ok_or_else(|| match sequence {
            Some(sequence) => {
                Error::NotFound(format!("Version {} of document {} not found", sequence, document))
            }
            None => Error::NotFound(format!("Document {} has no versions", document)),
        })
    }

    /// Create a document with no versions.
    pub fn create_document(&self, new: &NewDocument) -> Result<Document> {
        let document = self.store.create_document(new)?;
        info!("Created document {} '{}'", document.uuid, document.title);
        Ok(document)
    }

    /// Look up a document by id.
    pub fn get_document(&self, document: &DocumentId) -> Result<Option<Document>> {
        self.store.get_document(document)
    }

    /// All documents, most recently updated first.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents()
    }

    /// Versions of a document, newest first.
    pub fn list_versions(&self, document: &DocumentId) -> Result<Vec<DocumentVersion>> {
        self.require_document(document)?;
        self.store.list_versions(document)
    }

    /// Store `data` as the next version of `document`.
    ///
    /// Sequence numbers advance by exactly one per successful upload: when
    /// the storage write or the location record fails, the stored object is
    /// removed, the row is deleted and the number released.
    ///
    /// # Errors
    /// - `Error::NotFound` if the document does not exist
    /// - `Error::InvalidInput` for an unusable file name
    /// - Storage or database failures, after the allocation has been undone
    pub async fn upload_version(
        &self,
        document: &DocumentId,
        file_name: &str,
        data: Vec<u8>,
        notes: &str,
    ) -> Result<DocumentVersion> {
        let file_name = base_file_name(file_name)?;
        let draft = VersionDraft {
            content_type: guess_content_type(&file_name),
            file_size: data.len() as u64,
            notes: notes.to_string(),
            file_name,
        };

        let lock = self.lock_for(document)?;
        let result = {
            let _guard = lock.lock().await;
            self.store_version(document, &draft, data).await
        };
        self.forget_lock(document, lock);
        result
    }

    async fn store_version(
        &self,
        document: &DocumentId,
        draft: &VersionDraft,
        data: Vec<u8>,
    ) -> Result<DocumentVersion> {
        let mut version = self.store.allocate_version(document, draft)?;

        let location = match self.storage.upload(data, &version).await {
            Ok(location) => location,
            Err(e) => {
                error!(
                    "Failed to store version {} of {}: {}",
                    version.sequence, document, e
                );
                self.undo_allocation(&version);
                return Err(e);
            }
        };

        if let Err(e) = self.store.attach_location(version.id, &location) {
            error!(
                "Failed to record location of version {} of {}: {}",
                version.sequence, document, e
            );
            version.set_location(location);
            if let Err(cleanup) = self.storage.delete(&version).await {
                warn!(
                    "Stored file of version {} of {} could not be removed: {}",
                    version.sequence, document, cleanup
                );
            }
            self.undo_allocation(&version);
            return Err(e);
        }

        info!(
            "Stored version {} of {} in {} storage: {}",
            version.sequence,
            document,
            self.storage.backend_name(),
            location.key()
        );
        version.set_location(location);
        Ok(version)
    }

    /// Release an allocated version; a failure is only logged.
    fn undo_allocation(&self, version: &DocumentVersion) {
        if let Err(e) = self.store.release_version(version) {
            error!(
                "Failed to release version {} of {}: {}",
                version.sequence, version.document, e
            );
        }
    }

    /// URL for a version; the current one when `sequence` is `None`.
    pub async fn get_url(
        &self,
        document: &DocumentId,
        sequence: Option<u32>,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let version = self.require_version(document, sequence)?;
        self.storage.get_url(&version, expires_in).await
    }

    /// Bytes of a version; the current one when `sequence` is `None`.
    pub async fn download(&self, document: &DocumentId, sequence: Option<u32>) -> Result<(DocumentVersion, Vec<u8>)> {
        let version = self.require_version(document, sequence)?;
        let data = self.storage.download(&version).await?;
        Ok((version, data))
    }

    /// Delete one version: its stored file first, then its row.
    ///
    /// A file that is already gone does not stop the row from being removed.
    pub async fn delete_version(&self, document: &DocumentId, sequence: u32) -> Result<DeleteOutcome> {
        let lock = self.lock_for(document)?;
        let result = {
            let _guard = lock.lock().await;
            self.remove_version(document, sequence).await
        };
        self.forget_lock(document, lock);
        result
    }

    async fn remove_version(&self, document: &DocumentId, sequence: u32) -> Result<DeleteOutcome> {
        let version = self.require_version(document, Some(sequence))?;
        let outcome = self.storage.delete(&version).await?;
        self.store.delete_version(version.id)?;

        debug!("{}", outcome.message(self.storage.backend_name()));
        info!("Deleted version {} of {}", sequence, document);
        Ok(outcome)
    }

    /// Delete a document with every version and stored file.
    ///
    /// Returns the number of versions removed.
    pub async fn delete_document(&self, document: &DocumentId) -> Result<usize> {
        let lock = self.lock_for(document)?;
        let result = {
            let _guard = lock.lock().await;
            self.remove_document(document).await
        };
        self.forget_lock(document, lock);
        result
    }

    async fn remove_document(&self, document: &DocumentId) -> Result<usize> {
        self.require_document(document)?;
        let versions = self.store.list_versions(document)?;
        for version in &versions {
            self.storage.delete(version).await?;
        }
        self.store.delete_document(document)?;

        info!("Deleted document {} and {} version(s)", document, versions.len());
        Ok(versions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casefile_common::ObjectKey;
    use casefile_storage::{
        MemoryBackend, ObjectMetadata, PutOptions, StorageBackend, StorageSettings,
    };
    use proptest::prelude::*;
    use tempfile::TempDir;

    /// Remote stand-in that refuses files whose name starts with `fail`.
    struct FlakyBackend {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn is_remote(&self) -> bool {
            true
        }

        async fn put(&self, key: &ObjectKey, data: Vec<u8>, options: &PutOptions) -> Result<ObjectMetadata> {
            if key.name().starts_with("fail") {
                return Err(Error::Storage("connection reset".to_string()));
            }
            self.inner.put(key, data, options).await
        }

        async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &ObjectKey) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
            self.inner.delete(key).await
        }

        async fn list(&self, prefix: Option<&ObjectKey>, max_keys: usize) -> Result<Vec<ObjectMetadata>> {
            self.inner.list(prefix, max_keys).await
        }

        async fn url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
            self.inner.url(key, expires_in).await
        }
    }

    /// Remote stand-in that removes the version rows of a document while its
    /// bytes are being written, so recording the location fails.
    struct RowDroppingBackend {
        inner: MemoryBackend,
        rows: DocumentStore,
    }

    #[async_trait]
    impl StorageBackend for RowDroppingBackend {
        fn name(&self) -> &str {
            "row-dropping"
        }

        fn is_remote(&self) -> bool {
            true
        }

        async fn put(&self, key: &ObjectKey, data: Vec<u8>, options: &PutOptions) -> Result<ObjectMetadata> {
            let metadata = self.inner.put(key, data, options).await?;
            let document: DocumentId = key
                .as_key_string()
                .split('/')
                .nth(1)
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| Error::InvalidInput(key.to_string()))?;
            for version in self.rows.list_versions(&document)? {
                self.rows.delete_version(version.id)?;
            }
            Ok(metadata)
        }

        async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &ObjectKey) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
            self.inner.delete(key).await
        }

        async fn list(&self, prefix: Option<&ObjectKey>, max_keys: usize) -> Result<Vec<ObjectMetadata>> {
            self.inner.list(prefix, max_keys).await
        }

        async fn url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
            self.inner.url(key, expires_in).await
        }
    }

    fn local_service(temp: &TempDir) -> DocumentService {
        let storage = DocumentStorage::local(StorageSettings::with_media_root(temp.path())).unwrap();
        DocumentService::new(DocumentStore::in_memory().unwrap(), storage)
    }

    fn flaky_service(temp: &TempDir) -> DocumentService {
        let storage = DocumentStorage::local(StorageSettings::with_media_root(temp.path()))
            .unwrap()
            .with_remote(Box::new(FlakyBackend {
                inner: MemoryBackend::remote("legal-docs-01"),
            }));
        DocumentService::new(DocumentStore::in_memory().unwrap(), storage)
    }

    #[tokio::test]
    async fn test_local_upload_round_trip() {
        let temp = TempDir::new().unwrap();
        let service = local_service(&temp);
        let doc = service.create_document(&NewDocument::new("Engagement letter")).unwrap();

        let version = service
            .upload_version(&doc.uuid, "/home/clerk/letter.pdf", b"%PDF".to_vec(), "signed")
            .await
            .unwrap();
        assert_eq!(version.sequence, 1);
        assert_eq!(version.file_name, "letter.pdf");
        assert_eq!(version.content_type, "application/pdf");
        assert_eq!(version.file_size, 4);
        let path = version.local_path.clone().unwrap();
        assert_eq!(path.as_key_string(), format!("documents/{}/1/letter.pdf", doc.uuid));
        assert!(version.remote_key.is_none());

        let stored = service.store().get_version(&doc.uuid, 1).unwrap().unwrap();
        assert_eq!(stored.local_path, Some(path));

        let url = service.get_url(&doc.uuid, None, None).await.unwrap();
        assert!(url.starts_with("/media/documents/"));
        let (_, bytes) = service.download(&doc.uuid, Some(1)).await.unwrap();
        assert_eq!(bytes, b"%PDF");
    }

    #[tokio::test]
    async fn test_remote_upload_records_key() {
        let temp = TempDir::new().unwrap();
        let service = flaky_service(&temp);
        let doc = service.create_document(&NewDocument::new("Contract")).unwrap();

        let version = service
            .upload_version(&doc.uuid, "contract.pdf", vec![1, 2], "")
            .await
            .unwrap();
        let key = version.remote_key.clone().unwrap();
        assert_eq!(key.as_key_string(), format!("documents/{}/1/contract.pdf", doc.uuid));
        assert!(version.local_path.is_none());

        let url = service.get_url(&doc.uuid, Some(1), None).await.unwrap();
        assert!(!url.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_releases_sequence() {
        let temp = TempDir::new().unwrap();
        let service = flaky_service(&temp);
        let doc = service.create_document(&NewDocument::new("Motion")).unwrap();

        service.upload_version(&doc.uuid, "draft.docx", vec![0], "").await.unwrap();
        let err = service
            .upload_version(&doc.uuid, "fail.docx", vec![0], "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let next = service
            .upload_version(&doc.uuid, "final.docx", vec![0], "")
            .await
            .unwrap();
        assert_eq!(next.sequence, 2);
        assert_eq!(service.list_versions(&doc.uuid).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unrecorded_upload_removes_stored_object() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("casefile.db");
        let storage = DocumentStorage::local(StorageSettings::with_media_root(temp.path().join("media")))
            .unwrap()
            .with_remote(Box::new(RowDroppingBackend {
                inner: MemoryBackend::remote("legal-docs-01"),
                rows: DocumentStore::open(&db_path).unwrap(),
            }));
        let service = DocumentService::new(DocumentStore::open(&db_path).unwrap(), storage);
        let doc = service.create_document(&NewDocument::new("Affidavit")).unwrap();

        let err = service
            .upload_version(&doc.uuid, "affidavit.pdf", vec![1, 2, 3], "")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(service.storage().list(None, None).await.unwrap().is_empty());
        let reloaded = service.get_document(&doc.uuid).unwrap().unwrap();
        assert_eq!(reloaded.version_counter, 0);
        assert!(service.list_versions(&doc.uuid).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_entries_dropped_after_use() {
        let temp = TempDir::new().unwrap();
        let service = local_service(&temp);
        let doc = service.create_document(&NewDocument::new("Pleading")).unwrap();

        service.upload_version(&doc.uuid, "a.pdf", vec![1], "").await.unwrap();
        assert!(service.locks.lock().unwrap().is_empty());

        service.delete_version(&doc.uuid, 1).await.unwrap();
        assert!(service.locks.lock().unwrap().is_empty());

        service
            .upload_version(&doc.uuid, "b.pdf", vec![2], "")
            .await
            .unwrap();
        service.delete_document(&doc.uuid).await.unwrap();
        assert!(service.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_version_is_idempotent_for_missing_file() {
        let temp = TempDir::new().unwrap();
        let service = local_service(&temp);
        let doc = service.create_document(&NewDocument::new("Exhibit A")).unwrap();
        let version = service
            .upload_version(&doc.uuid, "exhibit.png", vec![7; 16], "")
            .await
            .unwrap();

        std::fs::remove_file(temp.path().join(version.local_path.unwrap().as_key_string())).unwrap();

        let outcome = service.delete_version(&doc.uuid, 1).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
        assert!(service.list_versions(&doc.uuid).unwrap().is_empty());
        assert!(service.delete_version(&doc.uuid, 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_document_removes_files_and_rows() {
        let temp = TempDir::new().unwrap();
        let service = local_service(&temp);
        let doc = service.create_document(&NewDocument::new("Settlement")).unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            service.upload_version(&doc.uuid, name, vec![1], "").await.unwrap();
        }

        assert_eq!(service.delete_document(&doc.uuid).await.unwrap(), 3);
        assert!(service.get_document(&doc.uuid).unwrap().is_none());
        let prefix = ObjectKey::document_prefix(&doc.uuid);
        assert!(service.storage().list(Some(&prefix), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_to_missing_document() {
        let temp = TempDir::new().unwrap();
        let service = local_service(&temp);
        let err = service
            .upload_version(&DocumentId::new(), "a.pdf", vec![], "")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_get_distinct_sequences() {
        let temp = TempDir::new().unwrap();
        let service = Arc::new(local_service(&temp));
        let doc = service.create_document(&NewDocument::new("Discovery")).unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let service = Arc::clone(&service);
            let id = doc.uuid;
            handles.push(tokio::spawn(async move {
                service
                    .upload_version(&id, &format!("page-{}.pdf", i), vec![i as u8], "")
                    .await
                    .map(|v| v.sequence)
            }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap());
        }
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=16).collect::<Vec<u32>>());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sequences_advance_by_one_per_success(outcomes in proptest::collection::vec(any::<bool>(), 1..20)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let temp = TempDir::new().unwrap();
            let service = flaky_service(&temp);
            let doc = service.create_document(&NewDocument::new("Brief")).unwrap();

            let mut expected = 0u32;
            for (i, succeeds) in outcomes.iter().enumerate() {
                let name = if *succeeds { format!("ok-{}.pdf", i) } else { format!("fail-{}.pdf", i) };
                let result = runtime.block_on(service.upload_version(&doc.uuid, &name, vec![0], ""));
                if *succeeds {
                    expected += 1;
                    prop_assert_eq!(result.unwrap().sequence, expected);
                } else {
                    prop_assert!(result.is_err());
                }
            }

            let sequences: Vec<u32> = service
                .list_versions(&doc.uuid)
                .unwrap()
                .iter()
                .rev()
                .map(|v| v.sequence)
                .collect();
            prop_assert_eq!(sequences, (1..=expected).collect::<Vec<u32>>());
        }
    }
}
