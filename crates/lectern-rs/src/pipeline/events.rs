//! Structured events and observers for the attempt pipeline.
//!
//! Submission is deliberately fire-and-forget (no retries, nothing blocks
//! the next cell), but every decision the pipeline takes is still published
//! as an [`AttemptEvent`], so embedders and tests can observe outcomes
//! through a structured channel instead of scraping logs.
//!
//! # Choosing an observer
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Fire-and-forget embedding, tests |
//! | [`LoggingObserver`] | Structured logging via `tracing` |
//! | [`FnObserver`] | Quick closures for simple callbacks |
//! | [`CompositeObserver`] | Compose multiple observers in order |
//! | Custom `impl AttemptObserver` | Full control (UI badges, metrics) |

use super::Attempt;
use crate::BackendError;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Why a passing attempt was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The session never reached (or lost) the authenticated state.
    NotAuthenticated,
    /// The session expiry passed before the submission could be dispatched.
    SessionExpired,
}

/// Events emitted by the pipeline while handling a finished cell.
#[derive(Debug)]
pub enum AttemptEvent<'a> {
    /// An output was captured and scored (whether or not it passes).
    Scored { attempt: &'a Attempt, passing: bool },
    /// A passing attempt's submission request was handed to the runtime.
    SubmissionDispatched { question_id: &'a str },
    /// The backend acknowledged a submission.
    SubmissionAcknowledged { question_id: &'a str },
    /// A submission failed; it is dropped, never retried.
    SubmissionFailed {
        question_id: &'a str,
        error: &'a BackendError,
    },
    /// A passing attempt was suppressed before dispatch.
    Suppressed {
        question_id: &'a str,
        reason: SuppressReason,
    },
    /// The cell's first output record was of a kind the pipeline cannot
    /// score; the attempt was silently dropped.
    OutputIgnored { kind: &'a str },
}

// ── Observer trait and implementations ─────────────────────────────

/// Observer of pipeline events. All events are informational; the default
/// implementation ignores everything.
pub trait AttemptObserver: Send + Sync {
    fn on_event(&self, event: &AttemptEvent<'_>) {
        let _ = event;
    }
}

/// An observer that ignores every event.
pub struct NoopObserver;
impl AttemptObserver for NoopObserver {}

/// An observer that logs every event through `tracing`.
pub struct LoggingObserver;

impl AttemptObserver for LoggingObserver {
    fn on_event(&self, event: &AttemptEvent<'_>) {
        match event {
            AttemptEvent::Scored { attempt, passing } => {
                debug!(
                    question_id = %attempt.question_id,
                    score = attempt.score,
                    passing,
                    "attempt scored"
                );
            }
            AttemptEvent::SubmissionDispatched { question_id } => {
                debug!(%question_id, "submission dispatched");
            }
            AttemptEvent::SubmissionAcknowledged { question_id } => {
                info!(%question_id, "submission acknowledged");
            }
            AttemptEvent::SubmissionFailed { question_id, error } => {
                warn!(%question_id, "submission failed (dropped): {error}");
            }
            AttemptEvent::Suppressed {
                question_id,
                reason,
            } => {
                warn!(%question_id, ?reason, "passing attempt suppressed");
            }
            AttemptEvent::OutputIgnored { kind } => {
                debug!(%kind, "output kind not scoreable; attempt dropped");
            }
        }
    }
}

/// An observer backed by a closure.
pub struct FnObserver<F>(F)
where
    F: Fn(&AttemptEvent<'_>) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&AttemptEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> AttemptObserver for FnObserver<F>
where
    F: Fn(&AttemptEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AttemptEvent<'_>) {
        (self.0)(event)
    }
}

/// An observer that delegates to multiple inner observers in order.
pub struct CompositeObserver {
    observers: Vec<Box<dyn AttemptObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn with(mut self, observer: impl AttemptObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptObserver for CompositeObserver {
    fn on_event(&self, event: &AttemptEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
