//! End-to-end submission scenarios over the HTTP router with on-disk stores.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use surveyvault::server::{self, AppState, FatalSignal, ACCEPTED_MESSAGE, FAILURE_MESSAGE};
use surveyvault::store::{FileRecordStore, SqliteRecordStore};
use surveyvault::{
    ledger, AnonymizedRecord, Config, Error, FileLedger, IdentityLedger, LedgerEntry,
    RecordStore, Result, StoreBackend, SubmissionIdentity, SubmissionPipeline, Validator,
};

const AMINA: &str = "name=Amina&age=29&gender=female&maritalStatus=single\
    &opinion=...&religious_view=...&cultural_factors=...&challenges=...\
    &benefits=...&guidance=...&societal_changes=...";

fn post_form(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, body: &str) -> (StatusCode, String) {
    let response = app.clone().oneshot(post_form(body)).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn record_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

async fn app_for(config: &Config) -> Router {
    let pipeline = SubmissionPipeline::open(config).await.unwrap();
    server::router(AppState::new(pipeline, FatalSignal::new()), None)
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.to_path_buf());
    config
}

#[tokio::test]
async fn accepted_submission_is_split_between_record_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let app = app_for(&config).await;

    let (status, body) = send(&app, AMINA).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACCEPTED_MESSAGE);

    let files = record_files(&config.records_dir());
    assert_eq!(files.len(), 1);
    let file_name = &files[0];
    let identity = file_name.strip_suffix(".json").unwrap();
    assert_eq!(identity.len(), 32);
    assert!(identity
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

    let document = std::fs::read_to_string(config.records_dir().join(file_name)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&document).unwrap();
    assert!(value.get("name").is_none());
    assert!(!document.contains("Amina"));
    assert_eq!(value["age"], 29);
    assert_eq!(value["gender"], "female");
    assert_eq!(value["maritalStatus"], "single");

    let ledger_text = std::fs::read_to_string(config.ledger_path()).unwrap();
    assert_eq!(ledger_text, format!("{identity}: Amina\n"));
}

#[tokio::test]
async fn invalid_submission_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let app = app_for(&config).await;

    let body = AMINA
        .replace("age=29", "age=150")
        .replace("gender=female", "gender=x");
    let (status, body) = send(&app, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    let errors = value["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["field"], "age");
    assert_eq!(errors[1]["field"], "gender");
    assert!(errors.iter().all(|e| e["message"].is_string()));

    assert!(record_files(&config.records_dir()).is_empty());
    assert!(ledger::read_entries(config.ledger_path())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn markup_in_answers_is_escaped_before_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let app = app_for(&config).await;

    let body = AMINA.replace(
        "opinion=...",
        "opinion=%3Cscript%3Ealert(1)%3C%2Fscript%3E",
    );
    let (status, _) = send(&app, &body).await;
    assert_eq!(status, StatusCode::OK);

    let files = record_files(&config.records_dir());
    let document = std::fs::read_to_string(config.records_dir().join(&files[0])).unwrap();
    let record: AnonymizedRecord = serde_json::from_str(&document).unwrap();
    assert_eq!(
        record.opinion,
        "&lt;script&gt;alert(1)&lt;&#x2F;script&gt;"
    );
}

#[tokio::test]
async fn repeated_submissions_get_fresh_identities() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.storage.backend = StoreBackend::Sqlite;
    let app = app_for(&config).await;

    for _ in 0..3 {
        let (status, _) = send(&app, AMINA).await;
        assert_eq!(status, StatusCode::OK);
    }

    let entries = ledger::read_entries(config.ledger_path()).await.unwrap();
    assert_eq!(entries.len(), 3);
    let store = SqliteRecordStore::open(config.database_path()).unwrap();
    assert_eq!(store.count().await.unwrap(), 3);
    for (identity, name) in &entries {
        assert_eq!(name, "Amina");
        assert!(store.get(identity).await.unwrap().is_some());
    }
    assert_ne!(entries[0].0, entries[1].0);
    assert_ne!(entries[1].0, entries[2].0);
}

#[derive(Debug)]
struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    fn backend_name(&self) -> &'static str {
        "broken"
    }

    async fn put(&self, identity: &SubmissionIdentity, _: &AnonymizedRecord) -> Result<()> {
        Err(Error::record_write(identity.as_str(), "device unavailable"))
    }

    async fn get(&self, _: &SubmissionIdentity) -> Result<Option<AnonymizedRecord>> {
        Ok(None)
    }

    async fn count(&self) -> Result<u64> {
        Ok(0)
    }
}

#[derive(Debug)]
struct BrokenLedger;

#[async_trait]
impl IdentityLedger for BrokenLedger {
    async fn append(&self, _: &LedgerEntry) -> Result<()> {
        Err(Error::LedgerAppend {
            path: "ledger.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn record_write_failure_writes_no_ledger_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("identity_ledger.txt");
    let ledger = FileLedger::open(&ledger_path).await.unwrap();
    let pipeline = SubmissionPipeline::new(
        Validator::default(),
        Arc::new(BrokenStore),
        Arc::new(ledger),
    );
    let app = server::router(AppState::new(pipeline, FatalSignal::new()), None);

    let (status, body) = send(&app, AMINA).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, FAILURE_MESSAGE);
    assert_eq!(std::fs::read_to_string(&ledger_path).unwrap(), "");
}

#[tokio::test]
async fn ledger_failure_leaves_unattributable_record() {
    let dir = tempfile::tempdir().unwrap();
    let records_dir = dir.path().join("records");
    let store = FileRecordStore::open(&records_dir).unwrap();
    let pipeline = SubmissionPipeline::new(
        Validator::default(),
        Arc::new(store),
        Arc::new(BrokenLedger),
    );
    let app = server::router(AppState::new(pipeline, FatalSignal::new()), None);

    let (status, body) = send(&app, AMINA).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, FAILURE_MESSAGE);
    assert_eq!(record_files(&records_dir).len(), 1);
}

#[tokio::test]
async fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let app = app_for(&config).await;
    let (status, _) = send(&app, AMINA).await;
    assert_eq!(status, StatusCode::OK);
    drop(app);

    let app = app_for(&config).await;
    let (status, _) = send(&app, &AMINA.replace("Amina", "Bashir")).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<_> = ledger::read_entries(config.ledger_path())
        .await
        .unwrap()
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(names, vec!["Amina", "Bashir"]);
    assert_eq!(record_files(&config.records_dir()).len(), 2);
}

#[derive(Debug)]
struct SlowLedger(FileLedger);

#[async_trait]
impl IdentityLedger for SlowLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        self.0.append(entry).await
    }
}

#[tokio::test]
async fn abandoned_request_still_completes_both_writes() {
    let dir = tempfile::tempdir().unwrap();
    let records_dir = dir.path().join("records");
    let ledger_path = dir.path().join("identity_ledger.txt");
    let pipeline = SubmissionPipeline::new(
        Validator::default(),
        Arc::new(FileRecordStore::open(&records_dir).unwrap()),
        Arc::new(SlowLedger(FileLedger::open(&ledger_path).await.unwrap())),
    );
    let app = server::router(AppState::new(pipeline, FatalSignal::new()), None);

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        app.oneshot(post_form(AMINA)),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let files = record_files(&records_dir);
    assert_eq!(files.len(), 1);
    let identity = files[0].strip_suffix(".json").unwrap();
    assert_eq!(
        std::fs::read_to_string(&ledger_path).unwrap(),
        format!("{identity}: Amina\n")
    );
}
