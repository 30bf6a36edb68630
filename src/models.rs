use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{db::Database, discovery::NetworkState};

/// Peers that have not refreshed their record within this window are offline
pub const NODE_ONLINE_WINDOW: Duration = Duration::from_secs(40);

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub networks: Arc<NetworkState>,
}

/// Type alias for the application state that can be used with Axum
pub type SharedState = State<AppState>;

/// Capacity advertised by a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    Worker,
    Federated,
}

/// A group of online peers found under one ledger key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterData {
    #[serde(rename = "Workers")]
    pub workers: Vec<String>,
    #[serde(rename = "Type")]
    pub kind: ClusterKind,
    #[serde(rename = "NetworkID")]
    pub network_id: String,
}

/// Clusters discovered for one token during its latest successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "Clusters")]
    pub clusters: Vec<ClusterData>,
}

impl Network {
    pub fn new(clusters: Vec<ClusterData>) -> Self {
        Self { clusters }
    }

    /// Total number of online workers across all clusters
    pub fn worker_count(&self) -> usize {
        self.clusters.iter().map(|c| c.workers.len()).sum()
    }
}

/// Presence record a peer publishes on the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TunnelAddress", default)]
    pub tunnel_address: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(rename = "LastSeen")]
    pub last_seen: DateTime<Utc>,
}

impl NodeData {
    /// Decode a raw ledger value
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        match (now - self.last_seen).to_std() {
            Ok(elapsed) => elapsed < NODE_ONLINE_WINDOW,
            // Timestamps slightly ahead of our clock
            Err(_) => true,
        }
    }
}

/// Registry entry for a known network token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub name: String,
    pub description: String,
}

/// Network as listed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkView {
    pub token: String,
    pub name: String,
    pub description: String,
    pub clusters: Vec<ClusterData>,
}

/// Request body for registering a network
#[derive(Debug, Clone, Deserialize)]
pub struct AddNetworkRequest {
    pub token: String,
    pub name: String,
    pub description: String,
}
