//! Endpoint name → streaming client map owned by one fleet.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use kvevents_stream::StreamingClient;

/// Concurrent registry of live clients.
///
/// Lookups are lock-free across names. Creating a client for a name goes
/// through that name's guard so two concurrent subscribes cannot both pass
/// the existence check.
#[derive(Default)]
pub struct Registry {
    clients: DashMap<String, Arc<StreamingClient>>,
    guards: DashMap<String, Arc<Mutex<()>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<StreamingClient>> {
        self.clients.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Per-name creation guard. Hold its lock while checking and inserting.
    pub fn guard(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.guards.entry(name.to_string()).or_default().value())
    }

    pub fn insert(&self, client: Arc<StreamingClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<StreamingClient>> {
        self.clients.remove(name).map(|(_, client)| client)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Every registered client, in no particular order.
    pub fn clients(&self) -> Vec<Arc<StreamingClient>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
