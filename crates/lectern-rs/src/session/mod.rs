//! Session identity, lifecycle state machine, and durable token storage.
//!
//! A *session* is the authenticated relationship between one learner and one
//! live practice, bounded by an optional expiry. This module owns everything
//! about that relationship:
//!
//! - [`SessionContext`] — immutable practice identity plus the mutable
//!   auth/expiry state, constructed once at load and shared by reference.
//! - [`expiry`] — parsing and validation of the host-supplied expiry field.
//! - [`TokenStore`] — the durable cell holding the bearer token across
//!   reloads.
//! - [`SessionManager`] — the join/rejoin/expiry state machine driving the
//!   backend calls.

pub mod context;
pub mod expiry;
pub mod manager;
pub mod token_store;

pub use context::{PracticeIdentity, SessionContext, SessionState};
pub use expiry::{ExpirySpec, parse_expiry, validate_expiry};
pub use manager::{JoinOutcome, SessionManager, StartOutcome};
pub use token_store::TokenStore;

use thiserror::Error;

/// Failures on the session side of the core.
///
/// None of these are fatal to the hosting notebook: the extension layer
/// degrades every one of them to "session not authenticated".
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configured expiry was unparseable or not in the future. Setup
    /// aborts, any stored token is purged, and no network calls occur.
    #[error("invalid session expiry: {reason}")]
    InvalidExpiry { reason: String },

    /// The practice session has expired; no further authentication or
    /// submission is possible this load.
    #[error("the practice session has expired")]
    Expired,

    /// A join reported success but carried no bearer token.
    #[error("join succeeded but the backend returned no token")]
    MissingToken,

    /// The extension was asked to act before a tracked practice was
    /// configured.
    #[error("no tracked practice has been configured")]
    NotConfigured,

    /// A backend call failed; the state machine stays in its pre-call state
    /// so the user can retry.
    #[error(transparent)]
    Backend(#[from] crate::BackendError),

    /// Token-store I/O failed.
    #[error("token store: {0}")]
    Store(#[from] std::io::Error),

    /// The stored token file could not be encoded.
    #[error("failed to encode stored token: {0}")]
    Encode(#[from] serde_json::Error),
}
