//! UI effects as an injected capability.
//!
//! The state machine never touches a DOM or a toolbar; it asks its
//! [`SessionPresenter`] for three opaque effects and moves on. Embeddings
//! render these however they like; tests capture them.

use tracing::{info, warn};

/// The UI effects the session state machine can request.
pub trait SessionPresenter: Send + Sync {
    /// Show the join form, prefilled with the last-known student id.
    fn present_join_form(&self, prefill_student_id: Option<&str>);

    /// Confirm a successful join.
    fn present_success(&self, student_id: &str);

    /// Surface a correctable join rejection (e.g. a duplicate student name)
    /// so the user can resubmit with a different name.
    fn present_duplicate_name_error(&self, rejected_id: &str, status: &str);
}

/// A presenter that renders nothing. For headless embeddings and tests.
pub struct NoopPresenter;

impl SessionPresenter for NoopPresenter {
    fn present_join_form(&self, _prefill_student_id: Option<&str>) {}
    fn present_success(&self, _student_id: &str) {}
    fn present_duplicate_name_error(&self, _rejected_id: &str, _status: &str) {}
}

/// A presenter that reports effects through `tracing`. Used by the replay
/// CLI, where there is no interactive surface to draw on.
pub struct LoggingPresenter;

impl SessionPresenter for LoggingPresenter {
    fn present_join_form(&self, prefill_student_id: Option<&str>) {
        info!(
            prefill = prefill_student_id.unwrap_or(""),
            "join form requested"
        );
    }

    fn present_success(&self, student_id: &str) {
        info!(student_id, "joined session");
    }

    fn present_duplicate_name_error(&self, rejected_id: &str, status: &str) {
        warn!(rejected_id, status, "join rejected; pick a different name");
    }
}
