//! SQLite-backed document and version records.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{Document, DocumentStatus, DocumentVersion, NewDocument};
use casefile_common::{DocumentId, Error, ObjectKey, Result};
use casefile_storage::StorageLocation;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    tags TEXT NOT NULL,
    status TEXT NOT NULL,
    is_private INTEGER NOT NULL,
    version_counter INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    notes TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    remote_key TEXT,
    local_path TEXT,
    UNIQUE(document_id, sequence)
);
"#;

const DOCUMENT_COLUMNS: &str = "id, uuid, title, description, tags, status, is_private, \
     version_counter, created_at, updated_at";

const VERSION_COLUMNS: &str = "v.id, d.uuid, v.sequence, v.file_name, v.file_size, \
     v.content_type, v.notes, v.uploaded_at, v.remote_key, v.local_path, d.is_private";

fn db_err(err: rusqlite::Error) -> Error {
    Error::Database(err.to_string())
}

/// Fields of a version about to be allocated.
#[derive(Debug, Clone)]
pub struct VersionDraft {
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub notes: String,
}

/// Persistent store for documents and their versions.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    /// Create or open a document database.
    ///
    /// # Errors
    /// - Database creation or schema migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        info!("Document store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("document store lock poisoned".to_string()))
    }

    /// Insert a new document.
    pub fn create_document(&self, new: &NewDocument) -> Result<Document> {
        if new.title.trim().is_empty() {
            return Err(Error::Validation("Document title is required".to_string()));
        }

        let now = Utc::now();
        let uuid = DocumentId::new();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (uuid, title, description, tags, status, is_private, \
             version_counter, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
            params![
                uuid.to_string(),
                new.title,
                new.description,
                new.tags,
                new.status.as_str(),
                new.is_private,
                now,
            ],
        )
        .map_err(db_err)?;

        debug!("Created document {} ({})", uuid, new.title);
        Ok(Document {
            id: conn.last_insert_rowid(),
            uuid,
            title: new.title.clone(),
            description: new.description.clone(),
            tags: new.tags.clone(),
            status: new.status,
            is_private: new.is_private,
            version_counter: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a document by its external identifier.
    pub fn get_document(&self, uuid: &DocumentId) -> Result<Option<Document>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM documents WHERE uuid = ?1", DOCUMENT_COLUMNS),
            params![uuid.to_string()],
            document_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// List documents, most recently updated first.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents ORDER BY updated_at DESC, id DESC",
                DOCUMENT_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], document_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Change a document's review status.
    pub fn set_status(&self, uuid: &DocumentId, status: DocumentStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE documents SET status = ?1, updated_at = ?2 WHERE uuid = ?3",
                params![status.as_str(), Utc::now(), uuid.to_string()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Document {} not found", uuid)));
        }
        Ok(())
    }

    /// Delete a document row; its versions cascade. Returns whether a row was
    /// removed.
    pub fn delete_document(&self, uuid: &DocumentId) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM documents WHERE uuid = ?1", params![uuid.to_string()])
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// Allocate the next sequence number and insert the version row.
    ///
    /// The counter increment and the insert share one immediate transaction;
    /// the UNIQUE(document, sequence) constraint rejects any duplicate.
    ///
    /// # Errors
    /// - `Error::NotFound` if the document does not exist
    /// - `Error::Conflict` if the sequence is already taken
    pub fn allocate_version(&self, uuid: &DocumentId, draft: &VersionDraft) -> Result<DocumentVersion> {
        let file_size = i64::try_from(draft.file_size).map_err(|_| {
            Error::InvalidInput(format!("File size {} is too large", draft.file_size))
        })?;
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let allocated: Option<(i64, u32, bool)> = tx
            .query_row(
                "UPDATE documents SET version_counter = version_counter + 1, updated_at = ?1 \
                 WHERE uuid = ?2 RETURNING id, version_counter, is_private",
                params![now, uuid.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((document_id, sequence, is_private)) = allocated else {
            return Err(Error::NotFound(format!("Document {} not found", uuid)));
        };

        tx.execute(
            "INSERT INTO document_versions (document_id, sequence, file_name, file_size, \
             content_type, notes, uploaded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                document_id,
                sequence,
                draft.file_name,
                file_size,
                draft.content_type,
                draft.notes,
                now,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Conflict(format!("Version {} of {} already exists", sequence, uuid))
            }
            other => db_err(other),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err)?;

        debug!("Allocated version {} of {}", sequence, uuid);
        Ok(DocumentVersion {
            id,
            document: *uuid,
            sequence,
            file_name: draft.file_name.clone(),
            file_size: draft.file_size,
            content_type: draft.content_type.clone(),
            notes: draft.notes.clone(),
            uploaded_at: now,
            remote_key: None,
            local_path: None,
            is_private,
        })
    }

    /// Undo an allocation whose upload failed.
    ///
    /// Removes the row and hands the sequence number back when it is still
    /// the latest one, so the next upload reuses it.
    pub fn release_version(&self, version: &DocumentVersion) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        tx.execute(
            "DELETE FROM document_versions WHERE id = ?1",
            params![version.id],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE documents SET version_counter = version_counter - 1 \
             WHERE uuid = ?1 AND version_counter = ?2",
            params![version.document.to_string(), version.sequence],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        debug!("Released version {} of {}", version.sequence, version.document);
        Ok(())
    }

    /// Attach the storage location of an uploaded version.
    pub fn attach_location(&self, version_id: i64, location: &StorageLocation) -> Result<()> {
        let (column, key) = match location {
            StorageLocation::Remote(key) => ("remote_key", key),
            StorageLocation::Local(key) => ("local_path", key),
        };
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!("UPDATE document_versions SET {} = ?1 WHERE id = ?2", column),
                params![key.as_key_string(), version_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Version row {} not found", version_id)));
        }
        Ok(())
    }

    /// Get one version of a document.
    pub fn get_version(&self, uuid: &DocumentId, sequence: u32) -> Result<Option<DocumentVersion>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM document_versions v JOIN documents d ON d.id = v.document_id \
                 WHERE d.uuid = ?1 AND v.sequence = ?2",
                VERSION_COLUMNS
            ),
            params![uuid.to_string(), sequence],
            version_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// The version with the highest sequence number.
    pub fn current_version(&self, uuid: &DocumentId) -> Result<Option<DocumentVersion>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM document_versions v JOIN documents d ON d.id = v.document_id \
                 WHERE d.uuid = ?1 ORDER BY v.sequence DESC LIMIT 1",
                VERSION_COLUMNS
            ),
            params![uuid.to_string()],
            version_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// Versions of a document, newest first.
    pub fn list_versions(&self, uuid: &DocumentId) -> Result<Vec<DocumentVersion>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM document_versions v JOIN documents d ON d.id = v.document_id \
                 WHERE d.uuid = ?1 ORDER BY v.sequence DESC",
                VERSION_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![uuid.to_string()], version_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete a version row. Returns whether a row was removed.
    pub fn delete_version(&self, version_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM document_versions WHERE id = ?1",
                params![version_id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}

fn parse_column<T, E>(idx: usize, value: std::result::Result<T, E>) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    value.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn key_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<ObjectKey>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_column(idx, ObjectKey::parse(&raw)))
        .transpose()
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        uuid: parse_column(1, row.get::<_, String>(1)?.parse())?,
        title: row.get(2)?,
        description: row.get(3)?,
        tags: row.get(4)?,
        status: parse_column(5, row.get::<_, String>(5)?.parse())?,
        is_private: row.get(6)?,
        version_counter: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        id: row.get(0)?,
        document: parse_column(1, row.get::<_, String>(1)?.parse())?,
        sequence: row.get(2)?,
        file_name: row.get(3)?,
        file_size: u64::try_from(row.get::<_, i64>(4)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e))
        })?,
        content_type: row.get(5)?,
        notes: row.get(6)?,
        uploaded_at: row.get(7)?,
        remote_key: key_column(row, 8)?,
        local_path: key_column(row, 9)?,
        is_private: row.get(10)?,
    })
}
