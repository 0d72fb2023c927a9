//! `SQLite`-backed record store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{join_error, migrations, RecordStore};
use crate::error::{Error, Result};
use crate::identity::SubmissionIdentity;
use crate::submission::AnonymizedRecord;

/// Stores anonymized records as rows in a `SQLite` database.
///
/// The connection is shared behind a mutex and every call runs on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open or create a record database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its schema
    /// cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening record database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // FULL keeps each committed record durable across power loss in WAL mode.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Record database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
        conn.lock()
            .map_err(|_| Error::internal("record database lock poisoned"))
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = Self::lock(&conn)?;
            f(&guard)
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn put(&self, identity: &SubmissionIdentity, record: &AnonymizedRecord) -> Result<()> {
        let document = serde_json::to_string(record)
            .map_err(|e| Error::record_write(identity.as_str(), e.to_string()))?;
        let id = identity.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO records (identity, document) VALUES (?1, ?2)",
                params![id, document],
            )
            .map(|_| ())
            .map_err(|e| Error::record_write(id.as_str(), e.to_string()))
        })
        .await?;

        debug!(identity = %identity, "Inserted anonymized record row");
        Ok(())
    }

    async fn get(&self, identity: &SubmissionIdentity) -> Result<Option<AnonymizedRecord>> {
        let id = identity.to_string();
        let document: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT document FROM records WHERE identity = ?1",
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        document
            .map(|doc| {
                serde_json::from_str(&doc)
                    .map_err(|e| Error::record_read(identity.as_str(), e.to_string()))
            })
            .transpose()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = self
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?)
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
