//! Per-client admission control for the submission endpoint.
//!
//! A fixed-window counter keyed by client IP. Each client may make
//! `max_requests` submissions per window; further requests in the same window
//! are answered with `429 Too Many Requests` and never reach the pipeline.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::AdmissionConfig;

/// Body returned to throttled clients.
pub const THROTTLED_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Key used when the peer address is not known.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed; `remaining` requests are left in the window.
    Allowed {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// The client is over its limit until the window resets.
    Throttled {
        /// Time until the current window ends.
        retry_after: Duration,
    },
}

/// Shared fixed-window limiter.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    max_requests: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl AdmissionControl {
    /// Create a limiter allowing `max_requests` per `window` per client.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a limiter from configuration.
    #[must_use]
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Record one request from `client` and decide whether to admit it.
    pub async fn check(&self, client: &str) -> Admission {
        self.check_at(client, Instant::now()).await
    }

    async fn check_at(&self, client: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock().await;

        // Drop expired windows so the map only holds active clients.
        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let entry = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if entry.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started));
            return Admission::Throttled { retry_after };
        }

        entry.count += 1;
        Admission::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }
}

/// Throttled response.
#[derive(Debug)]
pub struct Throttled {
    retry_after: Duration,
}

impl IntoResponse for Throttled {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::TOO_MANY_REQUESTS, THROTTLED_MESSAGE).into_response();
        // Round up so clients never retry inside the same window.
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        response
    }
}

/// Middleware enforcing [`AdmissionControl`] on the wrapped routes.
///
/// # Errors
///
/// Returns [`Throttled`] when the client is over its limit.
pub async fn admit(
    State(control): State<AdmissionControl>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, Throttled> {
    let client = connect_info.map_or_else(
        || UNKNOWN_CLIENT.to_string(),
        |ConnectInfo(addr)| addr.ip().to_string(),
    );

    match control.check(&client).await {
        Admission::Allowed { remaining } => {
            debug!(remaining, "Request admitted");
            Ok(next.run(request).await)
        }
        Admission::Throttled { retry_after } => {
            warn!(
                retry_after_secs = retry_after.as_secs(),
                "Client over submission limit"
            );
            Err(Throttled { retry_after })
        }
    }
}
