use std::sync::Arc;
use tokio::{
    sync::broadcast,
    time::{self, Instant},
};

use super::{
    failures::FailureTracker, scanner::ClusterScan, state::NetworkState, utils::short_token,
};
use crate::{
    config::DiscoveryConfig,
    db::TokenStore,
    error::AppError,
    models::{ClusterData, Network},
    overlay::{OverlayClient, OverlayNode},
};

/// Keeps the view of every known network up to date
///
/// Networks are probed one at a time, each for at most
/// `connection_time`. Tokens that keep failing are removed from the token
/// store once their failure count exceeds the configured threshold.
pub struct DiscoveryServer {
    store: Arc<dyn TokenStore>,
    overlay: Arc<dyn OverlayClient>,
    networks: Arc<NetworkState>,
    failures: FailureTracker,
    config: DiscoveryConfig,
}

impl DiscoveryServer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        overlay: Arc<dyn OverlayClient>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            overlay,
            networks: Arc::new(NetworkState::new()),
            failures: FailureTracker::new(config.failure_threshold),
            config,
        }
    }

    /// Shared handle on the discovered networks, for readers such as the API
    pub fn network_state(&self) -> Arc<NetworkState> {
        self.networks.clone()
    }

    #[cfg(test)]
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Run discovery passes until a shutdown signal is received
    ///
    /// A pass in progress is always completed. The only return value is
    /// `Err(AppError::Cancelled)`, once the shutdown has been observed.
    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), AppError> {
        tracing::info!(
            "Starting discovery server (connection time {:?}, failure threshold {})",
            self.config.connection_time,
            self.config.failure_threshold
        );

        loop {
            // Check for shutdown signal before starting a new pass
            match shutdown_rx.try_recv() {
                Ok(_) => {
                    tracing::info!("Received shutdown signal, stopping discovery server");
                    return Err(AppError::Cancelled);
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    // No shutdown signal yet, continue
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    tracing::info!("Shutdown channel closed, stopping discovery server");
                    return Err(AppError::Cancelled);
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    tracing::info!("Shutdown signal lagged, stopping discovery server");
                    return Err(AppError::Cancelled);
                }
            }

            self.run_pass().await;
        }
    }

    /// Probe every known token once, then evict the ones that keep failing
    pub async fn run_pass(&self) {
        let tokens = self.store.list_tokens();
        if tokens.is_empty() {
            tracing::debug!("No networks to discover");
            // Avoid a busy loop
            time::sleep(self.config.idle_interval).await;
            return;
        }

        let pass_start = Instant::now();
        tracing::info!("Starting discovery pass over {} networks", tokens.len());

        // Sequential on purpose: bounds the connections held open at once
        for token in &tokens {
            self.probe_token(token).await;
        }

        self.evict_failed();

        tracing::info!(
            "Completed discovery pass over {} networks in {:?}",
            tokens.len(),
            pass_start.elapsed()
        );
    }

    async fn probe_token(&self, token: &str) {
        let network = short_token(token);
        let deadline = Instant::now() + self.config.connection_time;

        let mut node = match self.overlay.join(token).await {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("Failed to create node for network {}: {}", network, e);
                self.failures.record_failure(token);
                return;
            }
        };

        let result = self.scan_node(node.as_mut(), deadline).await;
        node.stop().await;

        match result {
            Ok(clusters) => self.record_clusters(token, clusters),
            Err(e) => {
                tracing::warn!("Failed to reach ledger of network {}: {}", network, e);
                self.failures.record_failure(token);
            }
        }
    }

    async fn scan_node(
        &self,
        node: &mut dyn OverlayNode,
        deadline: Instant,
    ) -> Result<Vec<ClusterData>, AppError> {
        node.start(deadline).await?;
        let ledger = node.ledger()?;

        // Uses the whole window: the node may need a few attempts before it
        // sees the rest of the network
        let clusters = ClusterScan::spawn(ledger, deadline, self.config.sample_interval)
            .collect_all()
            .await;

        Ok(clusters)
    }

    fn record_clusters(&self, token: &str, clusters: Vec<ClusterData>) {
        let network = short_token(token);

        tracing::debug!("Network {} has {} clusters", network, clusters.len());
        for cluster in &clusters {
            tracing::debug!("Network {} cluster: {:?}", network, cluster);
        }

        if clusters.iter().any(|c| !c.workers.is_empty()) {
            let discovered = Network::new(clusters);
            tracing::info!(
                "Network {} is up with {} workers in {} clusters",
                network,
                discovered.worker_count(),
                discovered.clusters.len()
            );
            self.networks.replace_token(token, discovered);
            self.failures.clear(token);
        } else {
            let count = self.failures.record_failure(token);
            tracing::info!(
                "Network {} has no online workers ({} consecutive failures)",
                network,
                count
            );
        }
    }

    fn evict_failed(&self) {
        for token in self.failures.sweep() {
            tracing::info!(
                "Network {} has been removed from the database",
                short_token(&token)
            );
            self.networks.remove(&token);

            if let Err(e) = self.store.delete(&token) {
                tracing::error!(
                    "Failed to delete network {} from the database: {}",
                    short_token(&token),
                    e
                );
            }
        }
    }
}
