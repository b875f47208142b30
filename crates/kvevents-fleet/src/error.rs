//! Fleet-level error types.

use kvevents_core::error::LifecycleError;
use kvevents_stream::ClientError;
use thiserror::Error;

use crate::indexer::IndexerError;

/// Errors raised by [`FleetManager`](crate::FleetManager).
#[derive(Debug, Error)]
pub enum FleetError {
    /// The indexer could not be obtained at startup. Fatal for `start()`.
    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(#[source] IndexerError),

    #[error("indexer did not respond within {ms}ms")]
    IndexerTimeout { ms: u64 },

    /// Creating or starting the client for one endpoint failed.
    #[error("subscribe to '{endpoint}' failed: {source}")]
    Subscribe {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid or unreadable fleet configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate endpoint name '{0}'")]
    DuplicateEndpoint(String),

    #[error("endpoint #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("endpoint '{endpoint}' has port 0")]
    ZeroPort { endpoint: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },
}
