//! Entry points wiring the session machine to a notebook host.
//!
//! [`PracticeExtension`] is what an embedding constructs once and keeps for
//! the notebook's lifetime. The host invokes
//! [`on_practice_loaded`](PracticeExtension::on_practice_loaded) exactly once
//! when a notebook loads, and
//! [`on_join_submitted`](PracticeExtension::on_join_submitted) whenever the
//! learner submits the join form. Once the session authenticates, by rejoin
//! or by join, the extension activates an [`AttemptPipeline`] and registers
//! it as the host's cell listener.

use crate::host::NotebookHost;
use crate::pipeline::{AttemptObserver, AttemptPipeline};
use crate::session::{
    JoinOutcome, SessionContext, SessionError, SessionManager, StartOutcome, TokenStore,
};
use crate::ui::SessionPresenter;
use crate::{Backend, BackendClient, DEFAULT_REQUEST_TIMEOUT};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Config ─────────────────────────────────────────────────────────

/// Configuration for a [`PracticeExtension`].
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Attempts scoring strictly above this are reported.
    pub correctness_threshold: f64,
    /// Directory holding persisted session state (the stored bearer token).
    pub state_dir: PathBuf,
    /// Per-request timeout for backend calls.
    pub request_timeout: Duration,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            correctness_threshold: crate::scoring::DEFAULT_CORRECTNESS_THRESHOLD,
            state_dir: PathBuf::from(".lectern/session"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ExtensionConfig {
    /// Override the correctness threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.correctness_threshold = threshold;
        self
    }

    /// Override the session-state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Override the backend request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ── Outcomes ───────────────────────────────────────────────────────

/// What loading a notebook led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No practice configuration; the core stays inert. Not a failure.
    NotTracked,
    /// The configured expiry was invalid or already past; the stored token
    /// was purged and no session was established.
    Expired,
    /// The practice is neither live nor erroring; nothing further happens
    /// this load.
    NotLive { status: String },
    /// The join form was presented; drive
    /// [`PracticeExtension::on_join_submitted`] next.
    AwaitingJoin,
    /// The session authenticated (via stored-token rejoin) and the attempt
    /// pipeline is registered with the host.
    Authenticated,
}

// ── Extension ──────────────────────────────────────────────────────

/// The host-facing entry point: owns the session manager for this load and
/// activates the attempt pipeline on authentication.
pub struct PracticeExtension {
    config: ExtensionConfig,
    presenter: Arc<dyn SessionPresenter>,
    observer: Arc<dyn AttemptObserver>,
    backend_override: Option<Arc<dyn Backend>>,
    manager: Mutex<Option<Arc<SessionManager>>>,
    pipeline: Mutex<Option<Arc<AttemptPipeline>>>,
}

impl PracticeExtension {
    pub fn new(
        config: ExtensionConfig,
        presenter: Arc<dyn SessionPresenter>,
        observer: Arc<dyn AttemptObserver>,
    ) -> Self {
        Self {
            config,
            presenter,
            observer,
            backend_override: None,
            manager: Mutex::new(None),
            pipeline: Mutex::new(None),
        }
    }

    /// Use a custom [`Backend`] instead of the reqwest client built from the
    /// host metadata's server URL.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend_override = Some(backend);
        self
    }

    /// The active pipeline, once the session has authenticated.
    pub fn pipeline(&self) -> Option<Arc<AttemptPipeline>> {
        self.pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The session context, once a tracked practice has been configured.
    pub fn session(&self) -> Option<Arc<SessionContext>> {
        self.manager
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|m| m.context())
    }

    /// Entry point, invoked once when a practice notebook loads.
    ///
    /// Configuration absence degrades to [`LoadOutcome::NotTracked`] and an
    /// invalid expiry to [`LoadOutcome::Expired`]; only backend and storage
    /// failures surface as errors, leaving the machine retryable by a
    /// reload.
    pub async fn on_practice_loaded(
        &self,
        host: &dyn NotebookHost,
    ) -> Result<LoadOutcome, SessionError> {
        let Some(metadata) = host.practice_metadata() else {
            debug!("no practice metadata; notebook is not tracked");
            return Ok(LoadOutcome::NotTracked);
        };

        let backend: Arc<dyn Backend> = match &self.backend_override {
            Some(backend) => Arc::clone(backend),
            None => {
                let Some(server) = metadata.server.as_deref().filter(|s| !s.is_empty()) else {
                    debug!("no server configured; notebook is not tracked");
                    return Ok(LoadOutcome::NotTracked);
                };
                Arc::new(BackendClient::with_timeout(
                    server,
                    self.config.request_timeout,
                )?)
            }
        };

        let store = TokenStore::open(&self.config.state_dir)?;
        let Some(manager) = SessionManager::configure(
            metadata,
            &host.notebook_name(),
            backend,
            store,
            Arc::clone(&self.presenter),
        ) else {
            debug!("no practice id resolvable; notebook is not tracked");
            return Ok(LoadOutcome::NotTracked);
        };
        let manager = Arc::new(manager);
        *self.manager.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&manager));

        match manager.start().await {
            Ok(StartOutcome::Authenticated) => {
                self.activate(host, &manager);
                Ok(LoadOutcome::Authenticated)
            }
            Ok(StartOutcome::AwaitingJoin) => Ok(LoadOutcome::AwaitingJoin),
            Ok(StartOutcome::NotLive(status)) => Ok(LoadOutcome::NotLive { status }),
            Err(SessionError::InvalidExpiry { reason }) => {
                warn!(%reason, "session expiry invalid; staying inert");
                Ok(LoadOutcome::Expired)
            }
            Err(e) => Err(e),
        }
    }

    /// Join-form submission entry, re-enterable after correctable
    /// rejections.
    pub async fn on_join_submitted(
        &self,
        host: &dyn NotebookHost,
        student_id: &str,
        session_pwd: &str,
    ) -> Result<JoinOutcome, SessionError> {
        let manager = self
            .manager
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SessionError::NotConfigured)?;

        let outcome = manager.submit_join(student_id, session_pwd).await?;
        if outcome == JoinOutcome::Authenticated {
            self.activate(host, &manager);
        }
        Ok(outcome)
    }

    fn activate(&self, host: &dyn NotebookHost, manager: &Arc<SessionManager>) {
        let mut slot = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let pipeline = Arc::new(
            AttemptPipeline::new(
                manager.context(),
                manager.backend(),
                Arc::clone(&self.observer),
            )
            .with_threshold(self.config.correctness_threshold),
        );
        let listener: Arc<dyn crate::host::CellListener> = pipeline.clone();
        host.register_cell_listener(listener);
        *slot = Some(pipeline);
        info!("attempt pipeline activated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Notebook, ReplayHost};
    use crate::session::{SessionState, TokenStore};
    use crate::testing::{CaptureObserver, CapturePresenter, RecordedEvent, ScriptedBackend};
    use crate::PracticeStatus;
    use chrono::{Duration as ChronoDuration, Utc};

    fn notebook(expiry: Option<i64>) -> Notebook {
        let expiry_field = match expiry {
            Some(ms) => format!(r#", "expiry": {ms}"#),
            None => String::new(),
        };
        Notebook::from_json(&format!(
            r#"{{
                "name": "lists-01",
                "metadata": {{
                    "practice": {{
                        "studentId": "ada",
                        "server": "http://scripted.invalid",
                        "sessionPwd": "pw"{expiry_field}
                    }}
                }},
                "cells": [
                    {{"metadata": {{"Question": {{"id": "q1", "expected": "42"}}}},
                      "outputs": [{{"output_type": "stream", "text": "42\n"}}]}},
                    {{"metadata": {{"Question": {{"id": "q2", "expected": "42"}}}},
                      "outputs": [{{"output_type": "stream", "text": "41"}}]}},
                    {{"outputs": [{{"output_type": "stream", "text": "noise"}}]}}
                ]
            }}"#
        ))
        .unwrap()
    }

    struct Fixture {
        extension: PracticeExtension,
        host: ReplayHost,
        backend: Arc<ScriptedBackend>,
        presenter: Arc<CapturePresenter>,
        observer: Arc<CaptureObserver>,
        _state: tempfile::TempDir,
    }

    fn fixture(backend: ScriptedBackend, notebook: Notebook) -> Fixture {
        let state = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let presenter = Arc::new(CapturePresenter::default());
        let observer = Arc::new(CaptureObserver::default());
        let extension = PracticeExtension::new(
            ExtensionConfig::default().with_state_dir(state.path()),
            presenter.clone(),
            observer.clone(),
        )
        .with_backend(backend.clone());
        Fixture {
            extension,
            host: ReplayHost::new(notebook),
            backend,
            presenter,
            observer,
            _state: state,
        }
    }

    #[tokio::test]
    async fn untracked_notebook_stays_inert() {
        let fx = fixture(
            ScriptedBackend::live(),
            Notebook::from_json(r#"{"name": "scratch", "cells": []}"#).unwrap(),
        );

        let outcome = fx.extension.on_practice_loaded(&fx.host).await.unwrap();
        assert_eq!(outcome, LoadOutcome::NotTracked);
        assert!(fx.extension.session().is_none());
        assert!(fx.backend.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_without_stored_token_requests_join_form() {
        let fx = fixture(ScriptedBackend::live(), notebook(None));

        let outcome = fx.extension.on_practice_loaded(&fx.host).await.unwrap();
        assert_eq!(outcome, LoadOutcome::AwaitingJoin);
        // Never an automatic rejoin.
        assert!(fx.backend.rejoin_calls.lock().unwrap().is_empty());
        assert_eq!(fx.presenter.join_forms.lock().unwrap().len(), 1);
        assert!(fx.extension.pipeline().is_none());
    }

    #[tokio::test]
    async fn stored_token_rejoin_activates_pipeline_silently() {
        let state = tempfile::tempdir().unwrap();
        TokenStore::open(state.path()).unwrap().save("tok-9").unwrap();

        let backend = Arc::new(ScriptedBackend::live());
        let presenter = Arc::new(CapturePresenter::default());
        let observer = Arc::new(CaptureObserver::default());
        let extension = PracticeExtension::new(
            ExtensionConfig::default().with_state_dir(state.path()),
            presenter.clone(),
            observer.clone(),
        )
        .with_backend(backend.clone());
        let host = ReplayHost::new(notebook(None));

        let outcome = extension.on_practice_loaded(&host).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Authenticated);
        assert!(presenter.join_forms.lock().unwrap().is_empty());

        let pipeline = extension.pipeline().expect("pipeline active");
        host.replay();
        pipeline.drain().await;

        // q1 ("42" vs "42") submits; q2 scores exactly 0.5 and does not;
        // the question-less cell is untouched.
        let submissions = backend.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0.question_id, "q1");
        assert_eq!(submissions[0].1, "tok-9");
        assert!(observer
            .events
            .lock()
            .unwrap()
            .contains(&RecordedEvent::Acknowledged("q1".into())));
    }

    #[tokio::test]
    async fn join_flow_activates_pipeline() {
        let fx = fixture(ScriptedBackend::live(), notebook(None));
        fx.backend.push_join_response("success", Some("tok-join"));

        assert_eq!(
            fx.extension.on_practice_loaded(&fx.host).await.unwrap(),
            LoadOutcome::AwaitingJoin
        );
        let outcome = fx
            .extension
            .on_join_submitted(&fx.host, "ada lovelace", "pw")
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Authenticated);
        assert_eq!(*fx.presenter.successes.lock().unwrap(), vec!["ada lovelace"]);

        let pipeline = fx.extension.pipeline().expect("pipeline active");
        fx.host.replay();
        pipeline.drain().await;
        assert_eq!(fx.backend.submissions.lock().unwrap().len(), 1);
        assert_eq!(fx.backend.submissions.lock().unwrap()[0].1, "tok-join");
    }

    #[tokio::test]
    async fn rejected_join_leaves_form_open_for_resubmission() {
        let fx = fixture(ScriptedBackend::live(), notebook(None));
        fx.backend.push_join_response("duplicate-name", None);
        fx.backend.push_join_response("success", Some("tok-2"));

        fx.extension.on_practice_loaded(&fx.host).await.unwrap();

        let first = fx
            .extension
            .on_join_submitted(&fx.host, "ada", "pw")
            .await
            .unwrap();
        assert_eq!(
            first,
            JoinOutcome::Rejected {
                status: "duplicate-name".into()
            }
        );
        assert!(fx.extension.pipeline().is_none());
        assert_eq!(fx.presenter.duplicate_errors.lock().unwrap().len(), 1);

        let second = fx
            .extension
            .on_join_submitted(&fx.host, "ada l.", "pw")
            .await
            .unwrap();
        assert_eq!(second, JoinOutcome::Authenticated);
        assert!(fx.extension.pipeline().is_some());
    }

    #[tokio::test]
    async fn invalid_expiry_degrades_to_expired_outcome() {
        let past = (Utc::now() - ChronoDuration::hours(1)).timestamp_millis();
        let fx = fixture(ScriptedBackend::live(), notebook(Some(past)));

        let outcome = fx.extension.on_practice_loaded(&fx.host).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Expired);
        assert_eq!(
            fx.extension.session().unwrap().state(),
            SessionState::Expired
        );
        assert!(fx.extension.pipeline().is_none());
        assert!(fx.backend.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_live_practice_stays_inactive() {
        let fx = fixture(
            ScriptedBackend::with_status(PracticeStatus::Other("ended".into())),
            notebook(None),
        );

        let outcome = fx.extension.on_practice_loaded(&fx.host).await.unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::NotLive {
                status: "ended".into()
            }
        );
        assert!(fx.extension.pipeline().is_none());
    }

    #[tokio::test]
    async fn join_before_load_is_not_configured() {
        let fx = fixture(ScriptedBackend::live(), notebook(None));
        assert!(matches!(
            fx.extension.on_join_submitted(&fx.host, "ada", "pw").await,
            Err(SessionError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn expiry_passing_mid_session_suppresses_later_submissions() {
        let fx = fixture(ScriptedBackend::live(), notebook(None));
        fx.backend.push_join_response("success", Some("tok"));

        fx.extension.on_practice_loaded(&fx.host).await.unwrap();
        fx.extension
            .on_join_submitted(&fx.host, "ada", "pw")
            .await
            .unwrap();

        // Simulate the deadline passing after authentication.
        fx.extension
            .session()
            .unwrap()
            .set_expiry(Utc::now() - ChronoDuration::seconds(1));

        fx.host.replay();
        fx.extension.pipeline().unwrap().drain().await;
        assert!(fx.backend.submissions.lock().unwrap().is_empty());
        assert!(fx
            .observer
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RecordedEvent::Suppressed(_, _))));
    }
}
