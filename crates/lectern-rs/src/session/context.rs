//! Shared session identity and auth state.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::debug;

// ── Identity ───────────────────────────────────────────────────────

/// Who is practicing what, against which server.
///
/// `practice_id` and `server_url` are fixed for the notebook's lifetime;
/// `student_id` starts as the host's last-known value and is confirmed (or
/// replaced) by a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeIdentity {
    pub student_id: Option<String>,
    pub practice_id: String,
    pub server_url: String,
}

// ── State ──────────────────────────────────────────────────────────

/// The session lifecycle state, the single piece of mutable process-wide
/// state the core needs.
///
/// `Expired` and `Authenticated` are terminal for this load; there are no
/// further transitions without a full extension reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configuring,
    AwaitingPracticeStatus,
    RejoinPending,
    JoinFormShown,
    Authenticated,
    Expired,
}

// ── Context ────────────────────────────────────────────────────────

/// Immutable session identity plus the mutable auth/expiry state.
///
/// Constructed once when a tracked practice loads and shared by reference
/// into the manager and the attempt pipeline. Only
/// [`SessionManager`](super::SessionManager) mutates it; the pipeline reads.
pub struct SessionContext {
    practice_id: String,
    server_url: String,
    session_pwd: String,
    student_id: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    token: Mutex<Option<String>>,
    expiry: Mutex<Option<DateTime<Utc>>>,
}

impl SessionContext {
    /// Create a context in the `Configuring` state.
    pub fn new(identity: PracticeIdentity, session_pwd: String) -> Self {
        Self {
            practice_id: identity.practice_id,
            server_url: identity.server_url,
            session_pwd,
            student_id: Mutex::new(identity.student_id),
            state: Mutex::new(SessionState::Configuring),
            token: Mutex::new(None),
            expiry: Mutex::new(None),
        }
    }

    pub fn practice_id(&self) -> &str {
        &self.practice_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn session_pwd(&self) -> &str {
        &self.session_pwd
    }

    pub fn student_id(&self) -> Option<String> {
        self.student_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Record the student id the backend accepted on join.
    pub(crate) fn confirm_student_id(&self, student_id: &str) {
        *self.student_id.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(student_id.to_string());
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!("session state: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        *self.expiry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_expiry(&self, expiry: DateTime<Utc>) {
        *self.expiry.lock().unwrap_or_else(|e| e.into_inner()) = Some(expiry);
    }

    /// Whether the session's hard upper bound has passed. A session without
    /// an expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|expiry| now >= expiry)
    }

    /// The bearer token to submit with, iff the session is authenticated and
    /// unexpired *right now*. Checked at submission time, not only at setup,
    /// because a submission can race a near-expiry token.
    pub fn submission_token(&self, now: DateTime<Utc>) -> Option<String> {
        if self.state() != SessionState::Authenticated || self.is_expired_at(now) {
            return None;
        }
        self.token()
    }
}
