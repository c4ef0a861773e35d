//! Shared error types.

use thiserror::Error;

/// Failure to turn a frame into an envelope or back.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}
