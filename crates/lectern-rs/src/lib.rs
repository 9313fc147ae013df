//! Practice-session tracking and answer scoring for notebook classrooms.
//!
//! `lectern-rs` lets a remote classroom service follow a learner working
//! through a notebook-style exercise. It authenticates the learner against a
//! time-boxed practice session, observes the learner's executed answers,
//! scores them for approximate correctness, and reports passing attempts to
//! the backend.
//!
//! The crate owns two things and deliberately nothing else:
//!
//! 1. The **session lifecycle state machine**
//!    ([`SessionManager`](session::SessionManager)) — configure from host
//!    metadata, validate the session expiry, check whether the practice is
//!    live, rejoin with a stored bearer token or prompt the learner to join.
//! 2. The **attempt pipeline**
//!    ([`AttemptPipeline`](pipeline::AttemptPipeline)) — capture per-cell
//!    output, normalize and fuzzily score it against the cell's bound
//!    question, and fire-and-forget passing attempts to the evaluation
//!    endpoint.
//!
//! Everything around those two cores is an injected collaborator: the
//! notebook host is a [`NotebookHost`](host::NotebookHost) trait, UI effects
//! go through a [`SessionPresenter`](ui::SessionPresenter) capability, and the
//! backend is a [`Backend`] trait implemented by the reqwest-based
//! [`BackendClient`].
//!
//! # Getting started
//!
//! ```ignore
//! use lectern_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lectern_rs::session::SessionError> {
//!     let extension = PracticeExtension::new(
//!         ExtensionConfig::default(),
//!         Arc::new(LoggingPresenter),
//!         Arc::new(LoggingObserver),
//!     );
//!
//!     // `host` is whatever implements NotebookHost in your embedding.
//!     match extension.on_practice_loaded(&host).await? {
//!         LoadOutcome::Authenticated => { /* pipeline is live */ }
//!         LoadOutcome::AwaitingJoin => {
//!             extension.on_join_submitted(&host, "ada", "s3cret").await?;
//!         }
//!         other => println!("nothing to do: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`SessionContext`](session::SessionContext), expiry validation, [`TokenStore`](session::TokenStore), and the join/rejoin state machine |
//! | [`scoring`] | Output normalization and case-insensitive edit-distance similarity |
//! | [`pipeline`] | Cell-finished handling, [`Attempt`](pipeline::Attempt) scoring, fire-and-forget submission, structured [`AttemptObserver`](pipeline::AttemptObserver) events |
//! | [`host`] | Types and traits at the notebook-host boundary, including the replayable notebook file model |
//! | [`ui`] | [`SessionPresenter`](ui::SessionPresenter) capability trait and stock implementations |
//! | [`extension`] | [`PracticeExtension`](extension::PracticeExtension) entry points wiring everything together |
//!
//! # Design principles
//!
//! 1. **No ambient state.** One [`SessionContext`](session::SessionContext)
//!    is constructed at load time and shared by reference; the manager
//!    mutates it, the pipeline only reads it.
//! 2. **Capabilities at the seams.** UI effects, the notebook host, and the
//!    backend are traits, so the state machine runs headlessly under test.
//! 3. **Degrade, never crash.** Every failure path collapses to "session not
//!    authenticated" or "attempt not reported"; nothing in this crate is
//!    fatal to the hosting notebook.
//! 4. **Observability over magic.** Scoring and submission outcomes flow
//!    through [`AttemptEvent`](pipeline::AttemptEvent)s in addition to
//!    `tracing` logs, so embedders and tests can react to every decision.

pub mod extension;
pub mod host;
pub mod pipeline;
pub mod prelude;
pub mod scoring;
pub mod session;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

// ── Constants ──────────────────────────────────────────────────────

/// Path of the join endpoint, relative to the configured server URL.
pub const JOIN_PATH: &str = "/api/join";
/// Path of the rejoin endpoint.
pub const REJOIN_PATH: &str = "/api/rejoin";
/// Path of the practice-status endpoint.
pub const STATUS_PATH: &str = "/api/status";
/// Path of the attempt-evaluation endpoint.
pub const EVALUATE_PATH: &str = "/api/evaluate";

/// Default timeout applied to every backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Request types ──────────────────────────────────────────────────

/// Body of a join request. The same triple is posted on rejoin, where the
/// stored bearer token rides along in the `Authorization` header.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub student_id: String,
    pub practice_id: String,
    pub session_pwd: String,
}

/// Body of an attempt-evaluation submission.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub practice_id: String,
    pub question_id: String,
    /// The learner's normalized cell output.
    pub output: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Response to a join request. `status == "success"` carries the issued
/// bearer token; any other status is a correctable rejection (e.g. a
/// duplicate student name).
#[derive(Deserialize, Debug, Clone)]
pub struct JoinResponse {
    pub status: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl JoinResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Response to a rejoin request. No token is re-issued; the presented one
/// either still authorizes the session or it does not.
#[derive(Deserialize, Debug, Clone)]
pub struct RejoinResponse {
    pub status: String,
}

impl RejoinResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Raw status-endpoint response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawStatusResponse {
    status: String,
}

/// Classified practice status.
///
/// `Error` covers every backend-side refusal, including "unauthorized" for a
/// stale or missing token; callers respond by prompting a fresh join.
/// Statuses that are neither `live` nor `error` (a practice that has not
/// started yet, or has ended) leave the session inert for this load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeStatus {
    Live,
    Error,
    Other(String),
}

impl PracticeStatus {
    fn from_wire(status: String) -> Self {
        match status.as_str() {
            "live" => PracticeStatus::Live,
            "error" => PracticeStatus::Error,
            _ => PracticeStatus::Other(status),
        }
    }
}

impl std::fmt::Display for PracticeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PracticeStatus::Live => write!(f, "live"),
            PracticeStatus::Error => write!(f, "error"),
            PracticeStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Failure talking to the backend service.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response (connect, timeout, DNS, ...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with a non-success HTTP status.
    #[error("backend HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    /// The response body was not the expected JSON shape.
    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

// ── Backend trait ──────────────────────────────────────────────────

/// Boxed future returned by [`Backend`] methods.
pub type BackendFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// The four remote operations the core depends on.
///
/// The trait exists so the session state machine and the attempt pipeline
/// can be driven by a scripted in-memory backend under test; production code
/// uses [`BackendClient`]. Methods return boxed futures to stay
/// dyn-compatible.
pub trait Backend: Send + Sync {
    /// `POST /api/join` — authenticate a learner into a live practice.
    fn join(&self, request: &JoinRequest) -> BackendFuture<'_, JoinResponse>;

    /// `POST /api/rejoin` — re-authenticate with a previously issued token.
    fn rejoin(&self, request: &JoinRequest, token: &str) -> BackendFuture<'_, RejoinResponse>;

    /// `GET /api/status?id=<practice>` — whether the practice is live.
    fn practice_status(
        &self,
        practice_id: &str,
        token: Option<&str>,
    ) -> BackendFuture<'_, PracticeStatus>;

    /// `POST /api/evaluate` — report one passing attempt. The ack body is
    /// arbitrary and unused beyond logging.
    fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
        token: &str,
    ) -> BackendFuture<'_, serde_json::Value>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the practice backend.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the given server URL with the default timeout.
    pub fn new(server_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(server_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(
        server_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lectern-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(BackendError::Client)?;
        let mut base_url = server_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    /// The configured server URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        label: &str,
        resp: reqwest::Response,
        started: Instant,
    ) -> Result<T, BackendError> {
        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "{label} response: HTTP {status} in {:.2}s ({} bytes)",
            started.elapsed().as_secs_f64(),
            text.len()
        );
        if !status.is_success() {
            return Err(BackendError::Http { status, body: text });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        label: &str,
        path: &str,
        body: &impl Serialize,
        token: Option<&str>,
    ) -> Result<T, BackendError> {
        debug!("{label} request: POST {}", self.endpoint(path));
        let started = Instant::now();
        let mut builder = self.client.post(self.endpoint(path)).json(body);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let resp = builder.send().await?;
        Self::read_json(label, resp, started).await
    }
}

impl Backend for BackendClient {
    fn join(&self, request: &JoinRequest) -> BackendFuture<'_, JoinResponse> {
        let request = request.clone();
        Box::pin(async move { self.post_json("join", JOIN_PATH, &request, None).await })
    }

    fn rejoin(&self, request: &JoinRequest, token: &str) -> BackendFuture<'_, RejoinResponse> {
        let request = request.clone();
        let token = token.to_string();
        Box::pin(async move {
            self.post_json("rejoin", REJOIN_PATH, &request, Some(&token))
                .await
        })
    }

    fn practice_status(
        &self,
        practice_id: &str,
        token: Option<&str>,
    ) -> BackendFuture<'_, PracticeStatus> {
        let practice_id = practice_id.to_string();
        let token = token.map(str::to_string);
        Box::pin(async move {
            debug!("status request: GET {}?id={practice_id}", self.endpoint(STATUS_PATH));
            let started = Instant::now();
            let mut builder = self
                .client
                .get(self.endpoint(STATUS_PATH))
                .query(&[("id", practice_id.as_str())]);
            if let Some(token) = &token {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            let resp = builder.send().await?;
            let raw: RawStatusResponse = Self::read_json("status", resp, started).await?;
            Ok(PracticeStatus::from_wire(raw.status))
        })
    }

    fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
        token: &str,
    ) -> BackendFuture<'_, serde_json::Value> {
        let request = request.clone();
        let token = token.to_string();
        Box::pin(async move {
            self.post_json("evaluate", EVALUATE_PATH, &request, Some(&token))
                .await
        })
    }
}
