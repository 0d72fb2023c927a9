//! The identity ledger.
//!
//! The ledger is a single append-only text file mapping each submission
//! identity to the declared name, one `<identity>: <name>` line per accepted
//! submission. Appends from concurrent requests are serialized by a mutex so
//! lines cannot interleave, and a failed append is cut back so it cannot
//! truncate or merge with the next one. Complete entries are never rewritten.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::SubmissionIdentity;
use crate::submission::DeclaredName;

/// One ledger line: a submission identity and the name declared with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Identity of the submission.
    pub identity: SubmissionIdentity,
    /// Declared name.
    pub name: DeclaredName,
}

impl LedgerEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(identity: SubmissionIdentity, name: DeclaredName) -> Self {
        Self { identity, name }
    }

    /// Render the entry as a single newline-terminated ledger line.
    ///
    /// Control characters in the name are replaced with spaces so that one
    /// entry always occupies exactly one line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let name: String = self
            .name
            .as_str()
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        format!("{}: {}\n", self.identity, name)
    }
}

/// Append-only sink for ledger entries.
#[async_trait]
pub trait IdentityLedger: Send + Sync + std::fmt::Debug {
    /// Append exactly one entry, after all previously appended entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerAppend`] if the entry could not be written and
    /// flushed to durable storage.
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;
}

/// Ledger backed by a local append-mode file.
///
/// The ledger assumes it is the only writer of its file. It tracks the length
/// of the file up to the last complete entry; any bytes past that point are
/// the remains of a failed append and are cut off before anything else is
/// written, so a new entry always starts on a fresh line.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    tail: Mutex<LedgerTail>,
}

#[derive(Debug)]
struct LedgerTail {
    file: File,
    /// Length of the file through the last complete entry.
    committed: u64,
}

impl FileLedger {
    /// Open the ledger file for appending, creating it and its parent
    /// directories if needed.
    ///
    /// A file left ending mid-line by a crash is closed off with a newline
    /// so the partial line stays separate from new entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| Error::DirectoryCreate {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let append_error = |source| Error::LedgerAppend {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(append_error)?;

        let mut committed = file.metadata().await.map_err(append_error)?.len();
        if committed > 0 && last_byte(&mut file).await.map_err(append_error)? != b'\n' {
            warn!("Ledger ends mid-line; closing the partial line");
            write_line(&mut file, "\n").await.map_err(append_error)?;
            committed += 1;
        }

        info!("Identity ledger opened at {}", path.display());
        Ok(Self {
            path,
            tail: Mutex::new(LedgerTail { file, committed }),
        })
    }

    /// Path to the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IdentityLedger for FileLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let line = entry.to_line();
        let mut tail = self.tail.lock().await;
        let LedgerTail { file, committed } = &mut *tail;

        let result = write_after(file, *committed, &line).await;

        if let Err(source) = result {
            // Cut back to the last complete entry. If this fails too, the
            // next append retries it before writing.
            if let Err(e) = file.set_len(*committed).await {
                warn!(error = %e, "Could not discard partial ledger line");
            }
            return Err(Error::LedgerAppend {
                path: self.path.clone(),
                source,
            });
        }

        *committed += line.len() as u64;
        debug!(identity = %entry.identity, "Appended ledger entry");
        Ok(())
    }
}

/// Cut the file back to `committed` if a failed append left bytes past it,
/// then write `line`.
async fn write_after(file: &mut File, committed: u64, line: &str) -> std::io::Result<()> {
    let len = file.metadata().await?.len();
    if len != committed {
        warn!(
            stray_bytes = len.saturating_sub(committed),
            "Discarding partial ledger line"
        );
        file.set_len(committed).await?;
    }
    write_line(file, line).await
}

async fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

async fn last_byte(file: &mut File) -> std::io::Result<u8> {
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::End(-1)).await?;
    file.read_exact(&mut byte).await?;
    Ok(byte[0])
}

/// Read every entry from a ledger file, in file order.
///
/// This is for offline tooling; the pipeline never reads the ledger. Lines
/// that do not parse as `<identity>: <name>` are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn read_entries(path: impl AsRef<Path>) -> Result<Vec<(SubmissionIdentity, String)>> {
    let text = match tokio::fs::read_to_string(path.as_ref()).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(text
        .lines()
        .filter_map(|line| {
            let (id, name) = line.split_once(": ")?;
            Some((SubmissionIdentity::parse(id).ok()?, name.to_string()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn entry(name: &str) -> LedgerEntry {
        LedgerEntry::new(
            SubmissionIdentity::generate().unwrap(),
            DeclaredName::new(name.to_string()),
        )
    }

    #[test]
    fn test_line_format() {
        let e = entry("Amina");
        assert_eq!(e.to_line(), format!("{}: Amina\n", e.identity));
    }

    #[test]
    fn test_line_strips_control_characters() {
        let e = entry("Amina\nffffffffffffffffffffffffffffffff: Mallory\r");
        let line = e.to_line();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
        assert!(!line.contains('\r'));
    }

    #[tokio::test]
    async fn test_append_preserves_prior_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        std::fs::write(&path, "existing line\n").unwrap();

        let ledger = FileLedger::open(&path).await.unwrap();
        let first = entry("Amina");
        let second = entry("Bashir");
        ledger.append(&first).await.unwrap();
        ledger.append(&second).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "existing line".to_string(),
                format!("{}: Amina", first.identity),
                format!("{}: Bashir", second.identity),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let ledger = Arc::new(FileLedger::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..64 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                let e = entry(&format!("participant-{i}-{}", "x".repeat(200)));
                ledger.append(&e).await.unwrap();
                e.identity
            }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }

        let entries = read_entries(&path).await.unwrap();
        assert_eq!(entries.len(), 64);
        for (id, name) in &entries {
            assert!(ids.contains(id));
            assert!(name.starts_with("participant-"));
            assert!(name.ends_with(&"x".repeat(200)));
        }
    }

    #[tokio::test]
    async fn test_partial_line_is_discarded_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let ledger = FileLedger::open(&path).await.unwrap();
        let first = entry("Amina");
        ledger.append(&first).await.unwrap();

        // Bytes left behind by an append that failed partway.
        {
            use std::io::Write;
            let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(b"b50996f2f88ed70a230").unwrap();
        }

        let second = entry("Bashir");
        ledger.append(&second).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            format!("{}: Amina\n{}: Bashir\n", first.identity, second.identity)
        );
    }

    #[tokio::test]
    async fn test_open_closes_line_left_by_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let earlier = SubmissionIdentity::generate().unwrap();
        std::fs::write(&path, format!("{earlier}: Amina\nb50996f2")).unwrap();

        let ledger = FileLedger::open(&path).await.unwrap();
        let next = entry("Bashir");
        ledger.append(&next).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(&format!("{earlier}: Amina\nb50996f2\n")));
        assert!(text.ends_with('\n'));
        let entries = read_entries(&path).await.unwrap();
        assert_eq!(
            entries,
            vec![(earlier, "Amina".to_string()), (next.identity, "Bashir".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_append_keeps_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let earlier = SubmissionIdentity::generate().unwrap();
        let before = format!("{earlier}: Amina\n");
        std::fs::write(&path, &before).unwrap();

        // A read-only handle makes every write fail.
        let file = OpenOptions::new().read(true).open(&path).await.unwrap();
        let ledger = FileLedger {
            path: path.clone(),
            tail: Mutex::new(LedgerTail {
                file,
                committed: before.len() as u64,
            }),
        };

        let err = ledger.append(&entry("Bashir")).await.unwrap_err();
        assert!(matches!(err, Error::LedgerAppend { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("ledger.txt");
        let ledger = FileLedger::open(&path).await.unwrap();
        assert_eq!(ledger.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_read_entries_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_entries(dir.path().join("absent.txt")).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_read_entries_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let id = SubmissionIdentity::generate().unwrap();
        std::fs::write(&path, format!("garbage\n{id}: Amina\nnot-an-id: Bob\n")).unwrap();

        let entries = read_entries(&path).await.unwrap();
        assert_eq!(entries, vec![(id, "Amina".to_string())]);
    }
}
