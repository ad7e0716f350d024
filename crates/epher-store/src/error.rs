use epher_hash::HashError;
use thiserror::Error;

/// Failure modes a [`crate::Store`] call can return.
///
/// "Not found" is deliberately *not* a variant here: every `Store` getter
/// returns `Ok(None)` for a missing object, matching the found=false/err=nil
/// convention the original store interface used.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is reachable in principle but the call did not complete —
    /// timeouts, connection resets, an overloaded peer. Safe to retry.
    #[error("transient store error: {0}")]
    Transient(#[source] anyhow::Error),

    /// The backend returned data that fails to decode or fails its own
    /// consistency checks (checksum mismatch, truncated record).
    #[error("malformed store record: {0}")]
    Malformed(String),

    /// The call was abandoned before completion, e.g. a race's loser branch
    /// or a caller-side timeout.
    #[error("store call cancelled")]
    Cancelled,

    /// Anything else: bugs, invariant violations, unexpected backend errors.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error(transparent)]
    Hash(#[from] HashError),
}

pub type StoreResult<T> = Result<T, StoreError>;
