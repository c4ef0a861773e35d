//! Client error types.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// `connect` was called before a login established an identity.
    #[error("no local identity; log in first")]
    NoIdentity,
    #[error("not connected")]
    NotConnected,
    /// The transport side of the handle is gone.
    #[error("connection closed")]
    LinkClosed,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
