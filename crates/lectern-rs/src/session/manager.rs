//! The session join/rejoin/expiry state machine.
//!
//! Lifecycle per load:
//!
//! ```text
//! Unconfigured → Configuring → AwaitingPracticeStatus
//!                                 │
//!                 ┌───────────────┼──────────────────┐
//!                 ▼               ▼                  ▼
//!           RejoinPending    JoinFormShown      (not live: inert)
//!                 │               │ ⟲ resubmission
//!                 └───────►  Authenticated
//!
//!            Configuring ──────► Expired   (invalid/past expiry)
//! ```
//!
//! `Expired` and `Authenticated` are terminal for this load. Rejoin with a
//! stored token avoids re-prompting returning users within the same live
//! session; the expiry gives the session a hard upper bound independent of
//! token revocation on the server.

use super::context::{PracticeIdentity, SessionContext, SessionState};
use super::expiry::{ExpirySpec, validate_expiry};
use super::token_store::TokenStore;
use super::SessionError;
use crate::host::PracticeMetadata;
use crate::ui::SessionPresenter;
use crate::{Backend, JoinRequest, PracticeStatus};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`SessionManager::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The practice is neither live nor erroring (carries the raw status);
    /// the session stays non-authenticated with no further automatic action
    /// this load.
    NotLive(String),
    /// The join form was presented; the user drives the next transition
    /// through [`SessionManager::submit_join`].
    AwaitingJoin,
    /// A stored token rejoined the live session without prompting the user.
    Authenticated,
}

/// Outcome of one [`SessionManager::submit_join`] attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Authenticated,
    /// The backend rejected the join (e.g. a duplicate student name); the
    /// corrective form was surfaced and the user may resubmit.
    Rejected { status: String },
}

/// Join/rejoin/expiry state machine for one loaded practice.
pub struct SessionManager {
    ctx: Arc<SessionContext>,
    backend: Arc<dyn Backend>,
    store: TokenStore,
    presenter: Arc<dyn SessionPresenter>,
    expiry_spec: Option<ExpirySpec>,
}

impl SessionManager {
    /// Transition 1 — **Configure**: read identity and credentials from the
    /// host-supplied metadata.
    ///
    /// Returns `None` when no practice id can be resolved: the notebook is
    /// not a tracked one and the machine stops permanently. That is a
    /// legitimate "not applicable" outcome, not a failure.
    pub fn configure(
        metadata: PracticeMetadata,
        notebook_name: &str,
        backend: Arc<dyn Backend>,
        store: TokenStore,
        presenter: Arc<dyn SessionPresenter>,
    ) -> Option<Self> {
        let practice_id = metadata
            .practice_id
            .filter(|id| !id.is_empty())
            .or_else(|| (!notebook_name.is_empty()).then(|| notebook_name.to_string()))?;
        let server_url = metadata.server.filter(|url| !url.is_empty())?;

        let identity = PracticeIdentity {
            student_id: metadata.student_id,
            practice_id,
            server_url,
        };
        debug!(
            "configured practice {:?} against {}",
            identity.practice_id, identity.server_url
        );
        let ctx = Arc::new(SessionContext::new(
            identity,
            metadata.session_pwd.unwrap_or_default(),
        ));

        Some(Self {
            ctx,
            backend,
            store,
            presenter,
            expiry_spec: metadata.expiry,
        })
    }

    /// The shared session context (for wiring the attempt pipeline).
    pub fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.ctx)
    }

    /// The backend this session talks to.
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// Transitions 2–4 — validate the expiry, check the practice status, and
    /// either rejoin with the stored token or present the join form.
    ///
    /// `Err(SessionError::InvalidExpiry)` leaves the machine in `Expired`
    /// with the stored token purged; a backend error leaves it in its
    /// pre-call state so a later reload can retry.
    pub async fn start(&self) -> Result<StartOutcome, SessionError> {
        // ── Validate expiry ────────────────────────────────────────
        if let Some(spec) = &self.expiry_spec {
            match validate_expiry(spec, Utc::now()) {
                Ok(expiry) => self.ctx.set_expiry(expiry),
                Err(e) => {
                    self.ctx.set_state(SessionState::Expired);
                    if let Err(purge) = self.store.delete() {
                        warn!("failed to purge stored token: {purge}");
                    }
                    return Err(e);
                }
            }
        }

        // ── Check practice status ──────────────────────────────────
        self.ctx.set_state(SessionState::AwaitingPracticeStatus);
        let stored = match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("token store unreadable, continuing without: {e}");
                None
            }
        };

        let status = self
            .backend
            .practice_status(self.ctx.practice_id(), stored.as_deref())
            .await
            .inspect_err(|e| warn!("practice status check failed: {e}"))?;

        match status {
            // "error" covers unauthorized stored tokens too: fall back to a
            // fresh join rather than wedging the session.
            PracticeStatus::Error => {
                self.present_join_form();
                Ok(StartOutcome::AwaitingJoin)
            }
            PracticeStatus::Other(status) => {
                info!(%status, "practice is not live; staying inactive");
                Ok(StartOutcome::NotLive(status))
            }
            PracticeStatus::Live => match stored {
                Some(token) => self.rejoin(token).await,
                None => {
                    self.present_join_form();
                    Ok(StartOutcome::AwaitingJoin)
                }
            },
        }
    }

    async fn rejoin(&self, token: String) -> Result<StartOutcome, SessionError> {
        self.ctx.set_state(SessionState::RejoinPending);
        let request = JoinRequest {
            student_id: self.ctx.student_id().unwrap_or_default(),
            practice_id: self.ctx.practice_id().to_string(),
            session_pwd: self.ctx.session_pwd().to_string(),
        };
        let response = self
            .backend
            .rejoin(&request, &token)
            .await
            .inspect_err(|e| warn!("rejoin failed: {e}"))?;

        if response.is_success() {
            self.ctx.set_token(Some(token));
            self.ctx.set_state(SessionState::Authenticated);
            info!("rejoined live practice session");
            Ok(StartOutcome::Authenticated)
        } else {
            debug!(status = %response.status, "rejoin rejected; prompting for a fresh join");
            self.present_join_form();
            Ok(StartOutcome::AwaitingJoin)
        }
    }

    /// Transition 4 — **Join**, driven by a user-submitted form.
    ///
    /// Re-enterable any number of times after correctable rejections; a
    /// backend error leaves the machine in `JoinFormShown` for a retry.
    pub async fn submit_join(
        &self,
        student_id: &str,
        session_pwd: &str,
    ) -> Result<JoinOutcome, SessionError> {
        if self.ctx.state() == SessionState::Expired {
            return Err(SessionError::Expired);
        }

        let request = JoinRequest {
            student_id: student_id.to_string(),
            practice_id: self.ctx.practice_id().to_string(),
            session_pwd: session_pwd.to_string(),
        };
        let response = self
            .backend
            .join(&request)
            .await
            .inspect_err(|e| warn!("join failed: {e}"))?;

        if response.is_success() {
            let token = response.token.ok_or(SessionError::MissingToken)?;
            if let Err(e) = self.store.save(&token) {
                // The session still works for this load; only rejoin after a
                // reload is lost.
                warn!("failed to persist session token: {e}");
            }
            self.ctx.set_token(Some(token));
            self.ctx.confirm_student_id(student_id);
            self.ctx.set_state(SessionState::Authenticated);
            info!(student_id, "joined practice session");
            self.presenter.present_success(student_id);
            Ok(JoinOutcome::Authenticated)
        } else {
            self.ctx.set_state(SessionState::JoinFormShown);
            self.presenter
                .present_duplicate_name_error(student_id, &response.status);
            Ok(JoinOutcome::Rejected {
                status: response.status,
            })
        }
    }

    fn present_join_form(&self) {
        self.ctx.set_state(SessionState::JoinFormShown);
        self.presenter
            .present_join_form(self.ctx.student_id().as_deref());
    }
}
