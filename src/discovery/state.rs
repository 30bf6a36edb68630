use crate::models::Network;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Latest discovered clusters, by token
#[derive(Debug, Default)]
pub struct NetworkState {
    networks: Mutex<HashMap<String, Network>>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole snapshot
    pub fn read(&self) -> HashMap<String, Network> {
        self.networks.lock().clone()
    }

    #[cfg(test)]
    pub fn get(&self, token: &str) -> Option<Network> {
        self.networks.lock().get(token).cloned()
    }

    /// Replace everything known about a token with the result of one pass
    pub fn replace_token(&self, token: &str, network: Network) {
        self.networks.lock().insert(token.to_string(), network);
    }

    pub fn remove(&self, token: &str) -> Option<Network> {
        self.networks.lock().remove(token)
    }
}
