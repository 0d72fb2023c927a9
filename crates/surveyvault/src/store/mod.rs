//! Anonymized record storage.
//!
//! Each accepted submission is persisted as one durable unit keyed by its
//! [`SubmissionIdentity`]. Two backends are provided:
//!
//! - [`FileRecordStore`]: one JSON document per submission in a directory.
//! - [`SqliteRecordStore`]: one row per submission in a `SQLite` database.
//!
//! Stores never overwrite an existing record; uniqueness of identities is
//! the identity generator's job, so a collision surfaces as a write error.

pub mod file;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::identity::SubmissionIdentity;
use crate::submission::AnonymizedRecord;

pub use file::FileRecordStore;
pub use sqlite::SqliteRecordStore;

/// Persistent store for anonymized records.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Short name of the backend (for logging and status output).
    fn backend_name(&self) -> &'static str;

    /// Durably persist `record` under `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordWrite`](crate::Error::RecordWrite) if the record
    /// could not be made durable, including when a record already exists
    /// under `identity`.
    async fn put(&self, identity: &SubmissionIdentity, record: &AnonymizedRecord) -> Result<()>;

    /// Fetch the record stored under `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the stored document
    /// is corrupt.
    async fn get(&self, identity: &SubmissionIdentity) -> Result<Option<AnonymizedRecord>>;

    /// Count stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn count(&self) -> Result<u64>;
}

/// Which record store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// One JSON file per submission.
    #[default]
    File,
    /// One row per submission in `SQLite`.
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Open the record store selected by the configuration.
///
/// # Errors
///
/// Returns an error if the backing directory or database cannot be prepared.
pub fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.storage.backend {
        StoreBackend::File => Arc::new(FileRecordStore::open(config.records_dir())?),
        StoreBackend::Sqlite => Arc::new(SqliteRecordStore::open(config.database_path())?),
    };
    Ok(store)
}

/// Map a `spawn_blocking` join failure into a crate error.
pub(crate) fn join_error(err: &tokio::task::JoinError) -> crate::error::Error {
    crate::error::Error::internal(format!("storage task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display() {
        assert_eq!(StoreBackend::File.to_string(), "file");
        assert_eq!(StoreBackend::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_backend_default_is_file() {
        assert_eq!(StoreBackend::default(), StoreBackend::File);
    }

    #[test]
    fn test_backend_deserialize() {
        let backend: StoreBackend = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(backend, StoreBackend::Sqlite);
    }

    #[tokio::test]
    async fn test_open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());

        let store = open_store(&config).unwrap();
        assert_eq!(store.backend_name(), "file");

        config.storage.backend = StoreBackend::Sqlite;
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
