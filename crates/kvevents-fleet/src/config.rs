//! Fleet configuration: the endpoint list plus client and handler timing.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use kvevents_core::types::Endpoint;
use kvevents_stream::ClientSettings;

use crate::error::ConfigError;

/// Static description of every endpoint the fleet supervises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub endpoints: Vec<Endpoint>,
    /// Timing shared by every streaming client.
    #[serde(default)]
    pub client: ClientSettings,
    /// How long `start()` waits for the indexer to become reachable.
    #[serde(default = "default_indexer_timeout_ms")]
    pub indexer_timeout_ms: u64,
    /// Ceiling on processing one event, indexer lookup included.
    #[serde(default = "default_handler_deadline_ms")]
    pub handler_deadline_ms: u64,
}

fn default_indexer_timeout_ms() -> u64 { 10_000 }
fn default_handler_deadline_ms() -> u64 { 10_000 }

impl FleetConfig {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            client: ClientSettings::default(),
            indexer_timeout_ms: default_indexer_timeout_ms(),
            handler_deadline_ms: default_handler_deadline_ms(),
        }
    }

    pub fn with_client_settings(mut self, client: ClientSettings) -> Self {
        self.client = client;
        self
    }

    pub fn indexer_timeout(&self) -> Duration {
        Duration::from_millis(self.indexer_timeout_ms)
    }

    pub fn handler_deadline(&self) -> Duration {
        Duration::from_millis(self.handler_deadline_ms)
    }

    /// Check that every endpoint has a unique, non-empty name and a usable port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, ep) in self.endpoints.iter().enumerate() {
            if ep.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if ep.port == 0 {
                return Err(ConfigError::ZeroPort {
                    endpoint: ep.name.clone(),
                });
            }
            if !seen.insert(ep.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(ep.name.clone()));
            }
        }
        Ok(())
    }

    /// Load and validate a fleet config from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Read a YAML or JSON document, picking the format from the file extension.
/// Anything that is not `.json` is parsed as YAML.
pub fn load_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    })
}
