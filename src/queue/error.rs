//! Queue error taxonomy.

use thiserror::Error;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The metadata argument to `add` was not a mapping. Malformed field
    /// values inside a mapping are normalized instead.
    #[error("metadata must be a mapping, got {0}")]
    InvalidMetadata(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reservation handler failed; the entry was already put back when
    /// this surfaces.
    #[error("reservation handler failed: {0}")]
    Reservation(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of a reservation handler.
///
/// `Commit` deletes the reserved entry for good. `Abort` puts it back with a
/// freshly computed score and the reservation returns nothing, without an
/// error. Returning `Err` from the handler also puts the entry back, but the
/// error then propagates to the caller.
#[derive(Debug)]
pub enum Disposition<R> {
    Commit(R),
    Abort,
}
