//! Error taxonomy for the queue core.
//!
//! Every failure kind is an explicit variant propagated through ordinary
//! control flow. Submission-time errors return directly to the caller;
//! post-submission failures are observable only through status records and
//! never cross the pool boundary.

use thiserror::Error;

use crate::dispatch::HandlerError;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input was invalid (unregistered task type, priority
    /// out of range). Surfaced synchronously at submit time, never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// A processor ran past its deadline. The task is terminal, not retried.
    #[error("processor exceeded its {0:?} deadline")]
    Timeout(std::time::Duration),

    /// A processor failed. The task is terminal, not retried.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The store could not be reached. Workers log this, back off, and
    /// resume their loop; it never terminates a worker.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The service was asked for a transition its state does not allow.
    #[error("lifecycle: {0}")]
    Lifecycle(String),
}
