use chrono::{DateTime, Utc};
use futures::Stream;
use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};

use super::utils::classify_key;
use crate::{
    models::{ClusterData, NodeData},
    overlay::{Ledger, Storage},
};

const CHANNEL_CAPACITY: usize = 16;

/// Clusters found on a network's ledger, produced by a background scan
///
/// The scan samples the ledger until its deadline, then hands every cluster
/// it accumulated to the stream and closes it. Dropping the stream aborts
/// the scan.
pub struct ClusterScan {
    rx: mpsc::Receiver<ClusterData>,
    handle: Option<JoinHandle<()>>,
}

impl ClusterScan {
    /// Start scanning `ledger` every `sample_interval` until `deadline`
    pub fn spawn(ledger: Arc<dyn Ledger>, deadline: Instant, sample_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(scan_ledger(ledger, deadline, sample_interval, tx));

        Self {
            rx,
            handle: Some(handle),
        }
    }

    /// Wait for the scan to finish and return everything it found
    pub async fn collect_all(mut self) -> Vec<ClusterData> {
        let mut clusters = Vec::new();
        while let Some(cluster) = self.rx.recv().await {
            clusters.push(cluster);
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Ledger scan task ended abnormally: {}", e);
            }
        }

        clusters
    }
}

impl Stream for ClusterScan {
    type Item = ClusterData;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ClusterScan {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn scan_ledger(
    ledger: Arc<dyn Ledger>,
    deadline: Instant,
    sample_interval: Duration,
    tx: mpsc::Sender<ClusterData>,
) {
    let mut clusters: BTreeMap<String, ClusterData> = BTreeMap::new();
    let mut samples = 0usize;

    // The network may not be reachable right away, keep sampling for the whole window
    loop {
        tokio::select! {
            biased;
            _ = time::sleep_until(deadline) => break,
            _ = time::sleep(sample_interval) => {}
        }

        match time::timeout_at(deadline, ledger.storage()).await {
            Ok(Ok(storage)) => {
                samples += 1;
                clusters.extend(clusters_from_storage(&storage, Utc::now()));
            }
            Ok(Err(e)) => {
                tracing::debug!("Failed to read ledger storage: {}", e);
            }
            Err(_) => break,
        }
    }

    tracing::debug!(
        "Ledger scan finished after {} samples with {} clusters",
        samples,
        clusters.len()
    );

    for cluster in clusters.into_values() {
        if tx.send(cluster).await.is_err() {
            // Receiver went away, nobody is interested anymore
            break;
        }
    }
}

/// Clusters with at least one online node, by ledger key
pub fn clusters_from_storage(
    storage: &Storage,
    now: DateTime<Utc>,
) -> BTreeMap<String, ClusterData> {
    let mut clusters = BTreeMap::new();

    for (key, values) in storage {
        let Some((kind, network_id)) = classify_key(key) else {
            continue;
        };

        let workers: Vec<String> = values
            .iter()
            .filter_map(|raw| match NodeData::decode(raw) {
                Ok(node) => Some(node),
                Err(e) => {
                    tracing::trace!("Skipping undecodable value under {}: {}", key, e);
                    None
                }
            })
            .filter(|node| node.is_online_at(now))
            .map(|node| node.id)
            .collect();

        if workers.is_empty() {
            continue;
        }

        clusters.insert(
            key.clone(),
            ClusterData {
                workers,
                kind,
                network_id,
            },
        );
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::{node_value, storage, ScriptedLedger};
    use crate::models::ClusterKind;
    use futures::StreamExt;

    const INTERVAL: Duration = Duration::from_secs(5);

    #[test]
    fn keeps_only_online_workers() {
        let storage = storage(&[(
            "net1_WORKER_ID",
            vec![node_value("A", true), node_value("B", false)],
        )]);

        let clusters = clusters_from_storage(&storage, Utc::now());
        assert_eq!(
            clusters.into_values().collect::<Vec<_>>(),
            vec![ClusterData {
                workers: vec!["A".to_string()],
                kind: ClusterKind::Worker,
                network_id: "net1".to_string(),
            }]
        );
    }

    #[test]
    fn offline_only_clusters_are_dropped() {
        let storage = storage(&[
            ("net1_WORKER_ID", vec![node_value("B", false)]),
            ("net1_FEDERATED_ID", vec![]),
        ]);

        assert!(clusters_from_storage(&storage, Utc::now()).is_empty());
    }

    #[test]
    fn unrelated_and_malformed_entries_are_skipped() {
        let storage = storage(&[
            ("services", vec![node_value("S", true)]),
            (
                "FEDERATED_ID",
                vec![b"garbage".to_vec(), node_value("F", true)],
            ),
        ]);

        let clusters = clusters_from_storage(&storage, Utc::now());
        assert_eq!(clusters.len(), 1);
        let federated = &clusters["FEDERATED_ID"];
        assert_eq!(federated.kind, ClusterKind::Federated);
        assert_eq!(federated.workers, vec!["F"]);
        assert_eq!(federated.network_id, "FEDERATED");
    }

    #[tokio::test(start_paused = true)]
    async fn clusters_are_flushed_at_deadline() {
        let ledger = ScriptedLedger::repeating(storage(&[(
            "net1_WORKER_ID",
            vec![node_value("w1", true)],
        )]));
        let deadline = Instant::now() + Duration::from_secs(12);

        let mut scan = ClusterScan::spawn(ledger.clone(), deadline, INTERVAL);
        let first = scan.next().await.unwrap();

        assert!(Instant::now() >= deadline);
        assert_eq!(first.workers, vec!["w1"]);
        assert!(scan.next().await.is_none());
        assert_eq!(ledger.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn later_samples_replace_earlier_ones() {
        let ledger = ScriptedLedger::sequence(vec![
            Err("gateway not ready".to_string()),
            Ok(storage(&[("net1_WORKER_ID", vec![node_value("w1", true)])])),
            Ok(storage(&[
                ("net1_WORKER_ID", vec![node_value("w2", true)]),
                ("net1_FEDERATED_ID", vec![node_value("f1", true)]),
            ])),
            // Going offline later does not retract what was seen
            Ok(storage(&[("net1_WORKER_ID", vec![node_value("w2", false)])])),
        ]);
        let deadline = Instant::now() + Duration::from_secs(22);

        let clusters = ClusterScan::spawn(ledger, deadline, INTERVAL)
            .collect_all()
            .await;

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].kind, ClusterKind::Federated);
        assert_eq!(clusters[0].workers, vec!["f1"]);
        assert_eq!(clusters[1].kind, ClusterKind::Worker);
        assert_eq!(clusters[1].workers, vec!["w2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_before_first_sample_yields_nothing() {
        let ledger = ScriptedLedger::repeating(storage(&[(
            "WORKER_ID",
            vec![node_value("w1", true)],
        )]));
        let deadline = Instant::now() + Duration::from_secs(3);

        let clusters = ClusterScan::spawn(ledger.clone(), deadline, INTERVAL)
            .collect_all()
            .await;

        assert!(clusters.is_empty());
        assert_eq!(ledger.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ledger_read_is_cut_at_deadline() {
        let ledger = ScriptedLedger::repeating(storage(&[(
            "WORKER_ID",
            vec![node_value("w1", true)],
        )]))
        .with_delay(Duration::from_secs(30));
        let deadline = Instant::now() + Duration::from_secs(12);

        let clusters = ClusterScan::spawn(ledger, deadline, INTERVAL)
            .collect_all()
            .await;

        assert!(clusters.is_empty());
        assert!(Instant::now() < deadline + Duration::from_secs(1));
    }
}
