//! Convenience re-exports for common `lectern-rs` types.
//!
//! Meant to be glob-imported by embeddings:
//!
//! ```ignore
//! use lectern_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of integrations:
//! the extension entry points, the host boundary traits, the presenter and
//! observer capabilities, and the backend client. Specialized items (expiry
//! parsing, raw wire types, scoring internals) are intentionally excluded;
//! import those from their modules directly when needed.

// ── Core client ─────────────────────────────────────────────────────
pub use crate::{
    Backend, BackendClient, BackendError, EvaluationRequest, JoinRequest, JoinResponse,
    PracticeStatus, RejoinResponse,
};

// ── Extension entry points ──────────────────────────────────────────
pub use crate::extension::{ExtensionConfig, LoadOutcome, PracticeExtension};

// ── Session ─────────────────────────────────────────────────────────
pub use crate::session::{
    JoinOutcome, PracticeIdentity, SessionContext, SessionError, SessionManager, SessionState,
    StartOutcome, TokenStore,
};

// ── Host boundary ───────────────────────────────────────────────────
pub use crate::host::{
    CellListener, CellOutput, CompletedCell, Notebook, NotebookHost, PracticeMetadata, Question,
    ReplayHost,
};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    Attempt, AttemptEvent, AttemptObserver, AttemptPipeline, CompositeObserver, FnObserver,
    LoggingObserver, NoopObserver, PipelineStats, SuppressReason,
};

// ── Scoring ─────────────────────────────────────────────────────────
pub use crate::scoring::{DEFAULT_CORRECTNESS_THRESHOLD, normalize, similarity};

// ── UI capability ───────────────────────────────────────────────────
pub use crate::ui::{LoggingPresenter, NoopPresenter, SessionPresenter};
