//! HTTP surface of the service.
//!
//! Routes:
//!
//! - `GET /` serves the questionnaire form.
//! - `POST /submit` runs a form-encoded submission through the pipeline.
//! - `GET /healthz` answers `ok` while the service accepts submissions.
//!
//! An identity generation failure answers the request with a 500, trips the
//! process-wide [`FatalSignal`] and begins a graceful shutdown.

pub mod admission;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, Environment};
use crate::error::Result;
use crate::pipeline::{SubmitError, SubmissionPipeline};
use crate::submission::RawSubmission;
use crate::validate::Violation;

pub use admission::AdmissionControl;

/// Body of a successful submission response.
pub const ACCEPTED_MESSAGE: &str = "Thank you! Your response has been recorded.";

/// Body of a failed submission response. Carries no failure detail.
pub const FAILURE_MESSAGE: &str = "An error occurred while saving your response. Please try again.";

const FORM_HTML: &str = include_str!("../../assets/form.html");

/// Process-wide "stop accepting work" flag.
///
/// Once tripped it stays tripped; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct FatalSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl FatalSignal {
    /// Create an untripped signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the signal.
    pub fn trip(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been tripped.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been tripped.
    pub async fn tripped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|tripped| *tripped).await;
    }
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pipeline: SubmissionPipeline,
    fatal: FatalSignal,
}

impl AppState {
    /// Bundle a pipeline with the signal it trips on fatal errors.
    #[must_use]
    pub fn new(pipeline: SubmissionPipeline, fatal: FatalSignal) -> Self {
        Self { pipeline, fatal }
    }
}

/// How the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// An interrupt was received.
    Interrupted,
    /// A fatal error stopped the service.
    Fatal,
}

/// JSON body of a 400 response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<Violation>,
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            SubmitError::Rejected(errors) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { errors })).into_response()
            }
            SubmitError::Identity(_)
            | SubmitError::AnonymizedWrite(_)
            | SubmitError::LedgerWrite { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response()
            }
        }
    }
}

/// Build the application router.
///
/// When `admission` is given it guards `POST /submit` only.
pub fn router(state: AppState, admission: Option<AdmissionControl>) -> Router {
    let mut submit = Router::new().route("/submit", post(submit_handler));
    if let Some(control) = admission {
        submit = submit.route_layer(middleware::from_fn_with_state(control, admission::admit));
    }

    Router::new()
        .route("/", get(form_handler))
        .route("/healthz", get(health_handler))
        .merge(submit)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until interrupted or a fatal
/// error trips.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run(config: &Config, pipeline: SubmissionPipeline) -> Result<Shutdown> {
    let fatal = FatalSignal::new();
    let admission = config
        .admission
        .enabled
        .then(|| AdmissionControl::from_config(&config.admission));
    let app = router(AppState::new(pipeline, fatal.clone()), admission);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        environment = %config.server.environment,
        admission = config.admission.enabled,
        "Listening for submissions"
    );
    if config.server.environment == Environment::Production {
        info!("Production mode: TLS must be terminated by the fronting proxy");
    }

    let on_fatal = fatal.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
            () = on_fatal.tripped() => error!("Fatal error, shutting down"),
        }
    })
    .await?;

    Ok(if fatal.is_tripped() {
        Shutdown::Fatal
    } else {
        Shutdown::Interrupted
    })
}

async fn form_handler() -> Html<&'static str> {
    Html(FORM_HTML)
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.fatal.is_tripped() {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else {
        (StatusCode::OK, "ok")
    }
}

async fn submit_handler(
    State(state): State<AppState>,
    form: std::result::Result<Form<RawSubmission>, FormRejection>,
) -> Response {
    let raw = match form {
        Ok(Form(raw)) => raw,
        Err(rejection) => {
            warn!(error = %rejection, "Undecodable submission body");
            let errors = vec![Violation::new("body", rejection.body_text())];
            return (StatusCode::BAD_REQUEST, Json(ErrorBody { errors })).into_response();
        }
    };

    if state.fatal.is_tripped() {
        return (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response();
    }

    // The pipeline runs in its own task so a dropped connection cannot stop
    // it between the record write and the ledger append.
    let pipeline = state.pipeline.clone();
    let fatal = state.fatal.clone();
    let outcome = tokio::spawn(async move {
        let outcome = pipeline.submit(&raw).await;
        if outcome.as_ref().is_err_and(SubmitError::is_fatal) {
            fatal.trip();
        }
        outcome
    })
    .await;

    match outcome {
        Ok(Ok(receipt)) => {
            info!(identity = %receipt.identity, "Submission recorded");
            (StatusCode::OK, ACCEPTED_MESSAGE).into_response()
        }
        Ok(Err(err)) => err.into_response(),
        Err(join_err) => {
            error!(error = %join_err, "Submission task did not complete");
            (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response()
        }
    }
}
