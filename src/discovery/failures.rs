use parking_lot::Mutex;
use std::collections::HashMap;

use super::utils::short_token;

/// Consecutive failed passes per token
#[derive(Debug)]
pub struct FailureTracker {
    counts: Mutex<HashMap<String, usize>>,
    threshold: usize,
}

impl FailureTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            threshold,
        }
    }

    /// Count one more failed pass for a token, returning the new count
    pub fn record_failure(&self, token: &str) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(token.to_string()).or_insert(0);
        *count += 1;

        tracing::debug!("Network {} failure count: {}", short_token(token), *count);
        *count
    }

    pub fn clear(&self, token: &str) {
        self.counts.lock().remove(token);
    }

    #[cfg(test)]
    pub fn count(&self, token: &str) -> usize {
        self.counts.lock().get(token).copied().unwrap_or(0)
    }

    /// Remove and return every token whose count exceeds the threshold
    pub fn sweep(&self) -> Vec<String> {
        let mut counts = self.counts.lock();
        let mut evicted: Vec<String> = counts
            .iter()
            .filter(|(_, count)| **count > self.threshold)
            .map(|(token, _)| token.clone())
            .collect();

        for token in &evicted {
            counts.remove(token);
        }

        evicted.sort();
        evicted
    }
}
