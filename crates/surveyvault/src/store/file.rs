//! Directory-backed record store.
//!
//! Layout: `<dir>/<identity>.json`, one pretty-printed JSON document per
//! submission. Writes go to `<identity>.json.tmp` first, are fsynced, then
//! renamed into place so a reader never observes a partial document.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{join_error, RecordStore};
use crate::error::{Error, Result};
use crate::identity::SubmissionIdentity;
use crate::submission::AnonymizedRecord;

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

/// Stores each anonymized record as its own JSON file.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    /// Open (creating if needed) a record directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
                path: dir.clone(),
                source,
            })?;
        }
        info!("Record directory ready at {}", dir.display());
        Ok(Self { dir })
    }

    /// The directory records are stored in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `identity`.
    #[must_use]
    pub fn record_path(&self, identity: &SubmissionIdentity) -> PathBuf {
        self.dir.join(format!("{identity}.{RECORD_EXTENSION}"))
    }

    fn temp_path(&self, identity: &SubmissionIdentity) -> PathBuf {
        self.dir.join(format!("{identity}.{TEMP_EXTENSION}"))
    }

    fn write_durably(&self, identity: &SubmissionIdentity, document: &[u8]) -> io::Result<()> {
        let final_path = self.record_path(identity);
        if final_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a record already exists under this identity",
            ));
        }

        let temp_path = self.temp_path(identity);
        let result = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(document)?;
            file.sync_all()?;
            fs::rename(&temp_path, &final_path)?;
            sync_dir(&self.dir)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn put(&self, identity: &SubmissionIdentity, record: &AnonymizedRecord) -> Result<()> {
        let document = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::record_write(identity.as_str(), e.to_string()))?;

        let store = self.clone();
        let id = identity.clone();
        tokio::task::spawn_blocking(move || store.write_durably(&id, &document))
            .await
            .map_err(|e| join_error(&e))?
            .map_err(|e| Error::record_write(identity.as_str(), e.to_string()))?;

        debug!(identity = %identity, "Wrote anonymized record file");
        Ok(())
    }

    async fn get(&self, identity: &SubmissionIdentity) -> Result<Option<AnonymizedRecord>> {
        let path = self.record_path(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::record_read(identity.as_str(), e.to_string())),
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| Error::record_read(identity.as_str(), e.to_string()))?;
        Ok(Some(record))
    }

    async fn count(&self) -> Result<u64> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut count = 0;
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                let is_record = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(&format!(".{RECORD_EXTENSION}")))
                    .is_some_and(|stem| SubmissionIdentity::parse(stem).is_ok());
                if is_record {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}
