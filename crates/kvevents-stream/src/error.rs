use kvevents_core::error::{LifecycleError, TransportError};
use thiserror::Error;

/// Errors returned by [`StreamingClient::start`](crate::StreamingClient::start).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The initial connect attempt failed; no worker was launched.
    #[error("initial connect failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
