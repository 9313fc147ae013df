//! Shared in-memory doubles for state-machine and pipeline tests.

use crate::pipeline::{AttemptEvent, AttemptObserver, SuppressReason};
use crate::ui::SessionPresenter;
use crate::{
    Backend, BackendError, BackendFuture, EvaluationRequest, JoinRequest, JoinResponse,
    PracticeStatus, RejoinResponse,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Scripted backend ───────────────────────────────────────────────

/// A [`Backend`] whose responses are scripted up front and whose calls are
/// recorded for assertions.
pub(crate) struct ScriptedBackend {
    /// Status the status endpoint reports.
    pub status: Mutex<PracticeStatus>,
    /// Fail the status call with an HTTP error instead.
    pub fail_status: AtomicBool,
    /// Status string the rejoin endpoint reports.
    pub rejoin_status: Mutex<String>,
    /// Responses handed out per join call, in order.
    pub join_responses: Mutex<VecDeque<JoinResponse>>,
    /// Fail every evaluation submission with an HTTP error.
    pub fail_submissions: AtomicBool,

    // Call records.
    pub join_calls: Mutex<Vec<JoinRequest>>,
    pub rejoin_calls: Mutex<Vec<(JoinRequest, String)>>,
    pub status_calls: Mutex<Vec<(String, Option<String>)>>,
    pub submissions: Mutex<Vec<(EvaluationRequest, String)>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            status: Mutex::new(PracticeStatus::Live),
            fail_status: AtomicBool::new(false),
            rejoin_status: Mutex::new("success".into()),
            join_responses: Mutex::new(VecDeque::new()),
            fail_submissions: AtomicBool::new(false),
            join_calls: Mutex::new(Vec::new()),
            rejoin_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    /// A backend reporting a live practice.
    pub fn live() -> Self {
        Self::default()
    }

    pub fn with_status(status: PracticeStatus) -> Self {
        let backend = Self::default();
        *backend.status.lock().unwrap() = status;
        backend
    }

    pub fn push_join_response(&self, status: &str, token: Option<&str>) {
        self.join_responses.lock().unwrap().push_back(JoinResponse {
            status: status.to_string(),
            token: token.map(str::to_string),
        });
    }

    fn http_error(status: u16) -> BackendError {
        BackendError::Http {
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            body: "scripted failure".into(),
        }
    }
}

impl Backend for ScriptedBackend {
    fn join(&self, request: &JoinRequest) -> BackendFuture<'_, JoinResponse> {
        self.join_calls.lock().unwrap().push(request.clone());
        let response = self
            .join_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JoinResponse {
                status: "no-scripted-response".into(),
                token: None,
            });
        Box::pin(async move { Ok(response) })
    }

    fn rejoin(&self, request: &JoinRequest, token: &str) -> BackendFuture<'_, RejoinResponse> {
        self.rejoin_calls
            .lock()
            .unwrap()
            .push((request.clone(), token.to_string()));
        let status = self.rejoin_status.lock().unwrap().clone();
        Box::pin(async move { Ok(RejoinResponse { status }) })
    }

    fn practice_status(
        &self,
        practice_id: &str,
        token: Option<&str>,
    ) -> BackendFuture<'_, PracticeStatus> {
        self.status_calls
            .lock()
            .unwrap()
            .push((practice_id.to_string(), token.map(str::to_string)));
        let result = if self.fail_status.load(Ordering::SeqCst) {
            Err(Self::http_error(502))
        } else {
            Ok(self.status.lock().unwrap().clone())
        };
        Box::pin(async move { result })
    }

    fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
        token: &str,
    ) -> BackendFuture<'_, serde_json::Value> {
        self.submissions
            .lock()
            .unwrap()
            .push((request.clone(), token.to_string()));
        let result = if self.fail_submissions.load(Ordering::SeqCst) {
            Err(Self::http_error(500))
        } else {
            Ok(serde_json::json!({"ok": true}))
        };
        Box::pin(async move { result })
    }
}

// ── Capturing presenter ────────────────────────────────────────────

/// A [`SessionPresenter`] that records every requested effect.
#[derive(Default)]
pub(crate) struct CapturePresenter {
    pub join_forms: Mutex<Vec<Option<String>>>,
    pub successes: Mutex<Vec<String>>,
    pub duplicate_errors: Mutex<Vec<(String, String)>>,
}

impl SessionPresenter for CapturePresenter {
    fn present_join_form(&self, prefill_student_id: Option<&str>) {
        self.join_forms
            .lock()
            .unwrap()
            .push(prefill_student_id.map(str::to_string));
    }

    fn present_success(&self, student_id: &str) {
        self.successes.lock().unwrap().push(student_id.to_string());
    }

    fn present_duplicate_name_error(&self, rejected_id: &str, status: &str) {
        self.duplicate_errors
            .lock()
            .unwrap()
            .push((rejected_id.to_string(), status.to_string()));
    }
}

// ── Capturing observer ─────────────────────────────────────────────

/// Owned snapshot of an [`AttemptEvent`] for later assertions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordedEvent {
    Scored {
        question_id: String,
        score: f64,
        passing: bool,
    },
    Dispatched(String),
    Acknowledged(String),
    Failed(String),
    Suppressed(String, SuppressReason),
    Ignored(String),
}

/// An [`AttemptObserver`] that records every event.
#[derive(Default)]
pub(crate) struct CaptureObserver {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl AttemptObserver for CaptureObserver {
    fn on_event(&self, event: &AttemptEvent<'_>) {
        let recorded = match event {
            AttemptEvent::Scored { attempt, passing } => RecordedEvent::Scored {
                question_id: attempt.question_id.clone(),
                score: attempt.score,
                passing: *passing,
            },
            AttemptEvent::SubmissionDispatched { question_id } => {
                RecordedEvent::Dispatched(question_id.to_string())
            }
            AttemptEvent::SubmissionAcknowledged { question_id } => {
                RecordedEvent::Acknowledged(question_id.to_string())
            }
            AttemptEvent::SubmissionFailed { question_id, .. } => {
                RecordedEvent::Failed(question_id.to_string())
            }
            AttemptEvent::Suppressed {
                question_id,
                reason,
            } => RecordedEvent::Suppressed(question_id.to_string(), *reason),
            AttemptEvent::OutputIgnored { kind } => RecordedEvent::Ignored(kind.to_string()),
        };
        self.events.lock().unwrap().push(recorded);
    }
}
