//! SQLite-backed credential store.
//!
//! Holds S3 and Bedrock configurations and answers "which record is active
//! for this purpose" lookups for the storage façade and inference client.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::credentials::{BedrockConfiguration, CredentialFields, S3Configuration};
use casefile_common::{Error, Result, SecretString};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS s3_configurations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    access_key_id TEXT NOT NULL,
    secret_access_key TEXT NOT NULL,
    region TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    bucket_name TEXT NOT NULL,
    use_for_static_files INTEGER NOT NULL,
    use_for_media_files INTEGER NOT NULL,
    create_bucket_if_not_exists INTEGER NOT NULL,
    custom_domain TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bedrock_configurations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    access_key_id TEXT NOT NULL,
    secret_access_key TEXT NOT NULL,
    region TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    default_model_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const S3_COLUMNS: &str = "id, name, access_key_id, secret_access_key, region, is_active, \
     bucket_name, use_for_static_files, use_for_media_files, create_bucket_if_not_exists, \
     custom_domain, created_at, updated_at";

const BEDROCK_COLUMNS: &str = "id, name, access_key_id, secret_access_key, region, is_active, \
     default_model_id, created_at, updated_at";

/// Convert a SQLite error into the common error type.
pub(crate) fn db_err(err: rusqlite::Error) -> Error {
    Error::Database(err.to_string())
}

/// Purpose an S3 configuration can be designated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Purpose {
    Static,
    Media,
}

impl S3Purpose {
    fn column(self) -> &'static str {
        match self {
            S3Purpose::Static => "use_for_static_files",
            S3Purpose::Media => "use_for_media_files",
        }
    }

    fn label(self) -> &'static str {
        match self {
            S3Purpose::Static => "static files",
            S3Purpose::Media => "media files",
        }
    }
}

/// Persistent store for credential configurations.
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Create or open a credential database.
    ///
    /// # Errors
    /// - Database creation or schema migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        info!("Credential store opened");
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
            .map_err(|_| Error::Database("credential store lock poisoned".to_string()))
    }

    /// Insert or update an S3 configuration.
    ///
    /// Runs the record's own validation, then rejects the save if another
    /// active record already serves the same purpose. The check and the
    /// write share one immediate transaction.
    ///
    /// # Postconditions
    /// - `config.id` is set and `updated_at` refreshed
    pub fn save_s3(&self, config: &mut S3Configuration) -> Result<i64> {
        config.validate()?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        for (serves, purpose) in [
            (config.serves_static(), S3Purpose::Static),
            (config.serves_media(), S3Purpose::Media),
        ] {
            if !serves {
                continue;
            }
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM s3_configurations \
                 WHERE is_active = 1 AND {} = 1 AND id IS NOT ?1)",
                purpose.column()
            );
            let taken: bool = tx
                .query_row(&sql, params![config.id], |row| row.get(0))
                .map_err(db_err)?;
            if taken {
                return Err(Error::Validation(format!(
                    "Another active S3 configuration is already set for {}.",
                    purpose.label()
                )));
            }
        }

        config.updated_at = Utc::now();
        let c = &config.credentials;
        let id = match config.id {
            Some(id) => {
                let changed = tx
                    .execute(
                        "UPDATE s3_configurations SET name = ?1, access_key_id = ?2, \
                         secret_access_key = ?3, region = ?4, is_active = ?5, bucket_name = ?6, \
                         use_for_static_files = ?7, use_for_media_files = ?8, \
                         create_bucket_if_not_exists = ?9, custom_domain = ?10, updated_at = ?11 \
                         WHERE id = ?12",
                        params![
                            c.name,
                            c.access_key_id,
                            c.secret_access_key.expose(),
                            c.region,
                            c.is_active,
                            config.bucket_name,
                            config.use_for_static_files,
                            config.use_for_media_files,
                            config.create_bucket_if_not_exists,
                            config.custom_domain,
                            config.updated_at,
                            id,
                        ],
                    )
                    .map_err(db_err)?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("S3 configuration {} not found", id)));
                }
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO s3_configurations (name, access_key_id, secret_access_key, region, \
                     is_active, bucket_name, use_for_static_files, use_for_media_files, \
                     create_bucket_if_not_exists, custom_domain, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        c.name,
                        c.access_key_id,
                        c.secret_access_key.expose(),
                        c.region,
                        c.is_active,
                        config.bucket_name,
                        config.use_for_static_files,
                        config.use_for_media_files,
                        config.create_bucket_if_not_exists,
                        config.custom_domain,
                        config.created_at,
                        config.updated_at,
                    ],
                )
                .map_err(db_err)?;
                tx.last_insert_rowid()
            }
        };
        tx.commit().map_err(db_err)?;

        config.id = Some(id);
        debug!("Saved S3 configuration {} ({})", id, config.bucket_name);
        Ok(id)
    }

    /// Get an S3 configuration by id.
    pub fn get_s3(&self, id: i64) -> Result<Option<S3Configuration>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM s3_configurations WHERE id = ?1", S3_COLUMNS),
            params![id],
            s3_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// List S3 configurations, most recently updated first.
    pub fn list_s3(&self) -> Result<Vec<S3Configuration>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM s3_configurations ORDER BY updated_at DESC, id DESC",
                S3_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], s3_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete an S3 configuration. Returns whether a row was removed.
    pub fn delete_s3(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM s3_configurations WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// The active configuration serving `purpose`, if any.
    pub fn active_s3(&self, purpose: S3Purpose) -> Result<Option<S3Configuration>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM s3_configurations WHERE is_active = 1 AND {} = 1 \
                 ORDER BY updated_at DESC, id DESC LIMIT 1",
                S3_COLUMNS,
                purpose.column()
            ),
            [],
            s3_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// The active configuration used for document (media) storage.
    pub fn active_media_s3(&self) -> Result<Option<S3Configuration>> {
        self.active_s3(S3Purpose::Media)
    }

    /// The active configuration used for static files.
    pub fn active_static_s3(&self) -> Result<Option<S3Configuration>> {
        self.active_s3(S3Purpose::Static)
    }

    /// Insert or update a Bedrock configuration.
    pub fn save_bedrock(&self, config: &mut BedrockConfiguration) -> Result<i64> {
        config.validate()?;
        config.updated_at = Utc::now();

        let conn = self.conn()?;
        let c = &config.credentials;
        let id = match config.id {
            Some(id) => {
                let changed = conn
                    .execute(
                        "UPDATE bedrock_configurations SET name = ?1, access_key_id = ?2, \
                         secret_access_key = ?3, region = ?4, is_active = ?5, \
                         default_model_id = ?6, updated_at = ?7 WHERE id = ?8",
                        params![
                            c.name,
                            c.access_key_id,
                            c.secret_access_key.expose(),
                            c.region,
                            c.is_active,
                            config.default_model_id,
                            config.updated_at,
                            id,
                        ],
                    )
                    .map_err(db_err)?;
                if changed == 0 {
                    return Err(Error::NotFound(format!(
                        "Bedrock configuration {} not found",
                        id
                    )));
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO bedrock_configurations (name, access_key_id, secret_access_key, \
                     region, is_active, default_model_id, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        c.name,
                        c.access_key_id,
                        c.secret_access_key.expose(),
                        c.region,
                        c.is_active,
                        config.default_model_id,
                        config.created_at,
                        config.updated_at,
                    ],
                )
                .map_err(db_err)?;
                conn.last_insert_rowid()
            }
        };

        config.id = Some(id);
        debug!("Saved Bedrock configuration {}", id);
        Ok(id)
    }

    /// Get a Bedrock configuration by id.
    pub fn get_bedrock(&self, id: i64) -> Result<Option<BedrockConfiguration>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM bedrock_configurations WHERE id = ?1",
                BEDROCK_COLUMNS
            ),
            params![id],
            bedrock_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// List Bedrock configurations, most recently updated first.
    pub fn list_bedrock(&self) -> Result<Vec<BedrockConfiguration>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM bedrock_configurations ORDER BY updated_at DESC, id DESC",
                BEDROCK_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], bedrock_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete a Bedrock configuration. Returns whether a row was removed.
    pub fn delete_bedrock(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM bedrock_configurations WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// The active Bedrock configuration, if any.
    pub fn active_bedrock(&self) -> Result<Option<BedrockConfiguration>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM bedrock_configurations WHERE is_active = 1 \
                 ORDER BY updated_at DESC, id DESC LIMIT 1",
                BEDROCK_COLUMNS
            ),
            [],
            bedrock_from_row,
        )
        .optional()
        .map_err(db_err)
    }
}

fn fields_from_row(row: &Row<'_>) -> rusqlite::Result<CredentialFields> {
    Ok(CredentialFields {
        name: row.get(1)?,
        access_key_id: row.get(2)?,
        secret_access_key: SecretString::new(row.get::<_, String>(3)?),
        region: row.get(4)?,
        is_active: row.get(5)?,
    })
}

fn s3_from_row(row: &Row<'_>) -> rusqlite::Result<S3Configuration> {
    Ok(S3Configuration {
        id: Some(row.get(0)?),
        credentials: fields_from_row(row)?,
        bucket_name: row.get(6)?,
        use_for_static_files: row.get(7)?,
        use_for_media_files: row.get(8)?,
        create_bucket_if_not_exists: row.get(9)?,
        custom_domain: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn bedrock_from_row(row: &Row<'_>) -> rusqlite::Result<BedrockConfiguration> {
    Ok(BedrockConfiguration {
        id: Some(row.get(0)?),
        credentials: fields_from_row(row)?,
        default_model_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
