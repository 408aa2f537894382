//! Store-level error taxonomy.
//!
//! Every mutating store operation returns `Result<T, StateError>` so the
//! presentation layer always has an explicit failure path to acknowledge;
//! silent failures are a defect. Backend-boundary failures stay wrapped in
//! [`BackendError`](crate::backend::BackendError) rather than flattened, so
//! transient network trouble remains distinguishable from domain errors.
//!
//! Two failure classes never reach this enum by design: an unparseable
//! local cache entry falls back to an empty collection with a warning, and
//! a dangling farmer reference renders as a `"N/A"` placeholder.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the state stores.
#[derive(Debug, Error)]
pub enum StateError {
    /// Credential rejected or session invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The operation needs a signed-in user; the presentation layer must
    /// redirect to login instead of showing a generic failure.
    #[error("sign in required")]
    AuthRequired,

    /// The caller's role or ownership does not authorize the mutation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Referenced document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote read failed; local state is unchanged.
    #[error("remote read failed: {0}")]
    RemoteRead(#[source] BackendError),

    /// A remote write failed; any optimistic local change was rolled back.
    #[error("remote write failed: {0}")]
    RemoteWrite(#[source] BackendError),

    /// Checkout requires a non-empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// The input violates a data-model invariant.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl StateError {
    /// Wrap a backend failure from a read path, keeping `NotFound` distinct.
    pub(crate) fn read(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => Self::NotFound(what),
            other => Self::RemoteRead(other),
        }
    }

    /// Wrap a backend failure from a write path, keeping `NotFound` distinct.
    pub(crate) fn write(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => Self::NotFound(what),
            other => Self::RemoteWrite(other),
        }
    }
}

/// Result type alias for `StateError`.
pub type Result<T> = std::result::Result<T, StateError>;
