use crate::models::ClusterKind;

/// Ledger key marker for general worker clusters
pub const WORKER_ID: &str = "WORKER_ID";

/// Ledger key marker for federated inference clusters
pub const FEDERATED_ID: &str = "FEDERATED_ID";

const NETWORK_DELIMITER: char = '_';

fn matches_marker(key: &str, marker: &str) -> bool {
    key == marker || (key.contains(NETWORK_DELIMITER) && key.contains(marker))
}

/// Classify a ledger key, returning the cluster kind and its network id
///
/// Keys follow the `NetworkID_MARKER` convention and the network id is the
/// text before the first `_`. Worker markers take precedence over federated ones.
pub fn classify_key(key: &str) -> Option<(ClusterKind, String)> {
    let kind = if matches_marker(key, WORKER_ID) {
        ClusterKind::Worker
    } else if matches_marker(key, FEDERATED_ID) {
        ClusterKind::Federated
    } else {
        return None;
    };

    let network_id = if key.contains(NETWORK_DELIMITER) {
        key.split(NETWORK_DELIMITER)
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        String::new()
    };

    Some((kind, network_id))
}

/// Loggable prefix of a token, tokens carry network credentials
pub fn short_token(token: &str) -> String {
    const VISIBLE: usize = 8;
    if token.chars().count() <= VISIBLE {
        return token.to_string();
    }
    let prefix: String = token.chars().take(VISIBLE).collect();
    format!("{}...", prefix)
}
