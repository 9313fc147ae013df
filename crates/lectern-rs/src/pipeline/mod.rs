//! The attempt pipeline: cell output → score → conditional submission.
//!
//! One [`AttemptPipeline`] is activated per tracked notebook once the
//! session authenticates. The host delivers finished cells in execution
//! order; each is processed to completion synchronously (classify the first
//! output record, trim and normalize its text, score it against the cell's
//! bound question), and a passing attempt's submission is then dispatched
//! onto the runtime fire-and-forget. Two submissions may be in
//! flight concurrently with no ordering guarantee between their
//! completions; failures are reported and dropped, never retried, and never
//! block subsequent cells.
//!
//! The pipeline only *reads* session state. The authorization check (state
//! `Authenticated`, expiry not passed) happens immediately before dispatch
//! because a submission can race a near-expiry token.

pub mod events;

pub use events::{
    AttemptEvent, AttemptObserver, CompositeObserver, FnObserver, LoggingObserver, NoopObserver,
    SuppressReason,
};

use crate::host::{CellListener, CompletedCell};
use crate::scoring::{self, DEFAULT_CORRECTNESS_THRESHOLD};
use crate::session::SessionContext;
use crate::{Backend, EvaluationRequest};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

// ── Attempt ────────────────────────────────────────────────────────

/// One scored evaluation of a single cell's captured output against its
/// bound question. Ephemeral: constructed, scored, optionally submitted,
/// then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub question_id: String,
    pub raw_output: String,
    pub normalized_output: String,
    /// Similarity against the expected output, in `[0, 1]`.
    pub score: f64,
}

// ── Counters ───────────────────────────────────────────────────────

/// Snapshot of the pipeline's lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    /// Attempts that produced a score (passing or not).
    pub scored: usize,
    /// Submissions handed to the runtime.
    pub dispatched: usize,
}

// ── Pipeline ───────────────────────────────────────────────────────

/// Scores finished cells and reports passing attempts to the backend.
pub struct AttemptPipeline {
    ctx: Arc<SessionContext>,
    backend: Arc<dyn Backend>,
    observer: Arc<dyn AttemptObserver>,
    threshold: f64,
    scored: AtomicUsize,
    dispatched: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

impl AttemptPipeline {
    pub fn new(
        ctx: Arc<SessionContext>,
        backend: Arc<dyn Backend>,
        observer: Arc<dyn AttemptObserver>,
    ) -> Self {
        Self {
            ctx,
            backend,
            observer,
            threshold: DEFAULT_CORRECTNESS_THRESHOLD,
            scored: AtomicUsize::new(0),
            dispatched: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the correctness threshold (attempts scoring strictly above
    /// it are reported).
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Lifetime counters for summaries.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            scored: self.scored.load(Ordering::SeqCst),
            dispatched: self.dispatched.load(Ordering::SeqCst),
        }
    }

    /// Wait for all dispatched submissions to resolve. Useful for replay
    /// runs and tests; a live host never needs to call this.
    pub async fn drain(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Process one finished cell. Returns the submission task handle when a
    /// submission was dispatched, `None` otherwise.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn handle_cell(&self, cell: &CompletedCell) -> Option<JoinHandle<()>> {
        // Cells without a bound question are not the pipeline's business.
        let question = cell.question()?;

        // A cell can legitimately complete without emitting output (a pure
        // side-effecting statement); that is not an error.
        let first = cell.outputs.first()?;

        let Some(raw) = first.scoreable_text() else {
            self.observer
                .on_event(&AttemptEvent::OutputIgnored { kind: first.kind() });
            return None;
        };

        let raw = raw.trim().to_string();
        let normalized = scoring::normalize(&raw).to_string();
        let score = scoring::similarity(&question.expected, &normalized);
        let attempt = Attempt {
            question_id: question.id.clone(),
            raw_output: raw,
            normalized_output: normalized,
            score,
        };

        self.scored.fetch_add(1, Ordering::SeqCst);
        let passing = score > self.threshold;
        self.observer.on_event(&AttemptEvent::Scored {
            attempt: &attempt,
            passing,
        });
        if !passing {
            return None;
        }

        // Authorization is checked at the last moment before dispatch.
        let now = Utc::now();
        let Some(token) = self.ctx.submission_token(now) else {
            let reason = if self.ctx.is_expired_at(now) {
                SuppressReason::SessionExpired
            } else {
                SuppressReason::NotAuthenticated
            };
            self.observer.on_event(&AttemptEvent::Suppressed {
                question_id: &attempt.question_id,
                reason,
            });
            return None;
        };

        let request = EvaluationRequest {
            practice_id: self.ctx.practice_id().to_string(),
            question_id: attempt.question_id.clone(),
            output: attempt.normalized_output.clone(),
        };
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.observer.on_event(&AttemptEvent::SubmissionDispatched {
            question_id: &request.question_id,
        });

        let backend = Arc::clone(&self.backend);
        let observer = Arc::clone(&self.observer);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        Some(tokio::spawn(async move {
            match backend.submit_evaluation(&request, &token).await {
                Ok(ack) => {
                    debug!(question_id = %request.question_id, "evaluation ack: {ack}");
                    observer.on_event(&AttemptEvent::SubmissionAcknowledged {
                        question_id: &request.question_id,
                    });
                }
                Err(error) => {
                    observer.on_event(&AttemptEvent::SubmissionFailed {
                        question_id: &request.question_id,
                        error: &error,
                    });
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

impl CellListener for AttemptPipeline {
    fn on_cell_finished(&self, cell: &CompletedCell) {
        // Fire-and-forget: the handle is only interesting to replay runs.
        let _ = self.handle_cell(cell);
    }
}
