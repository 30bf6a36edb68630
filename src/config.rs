use crate::{cli::Cli, error::AppError};
use std::time::Duration;
use url::Url;

const DEFAULT_CONNECTION_TIME: Duration = Duration::from_secs(50);
const DEFAULT_FAILURE_THRESHOLD: usize = 3;
const IDLE_INTERVAL: Duration = Duration::from_secs(5); // No tokens to probe
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5); // Ledger sampling period

/// Settings for the discovery server
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long each network is probed per pass
    pub connection_time: Duration,

    /// A token is evicted once its failure count exceeds this value
    pub failure_threshold: usize,

    /// Sleep between passes when the token store is empty
    pub idle_interval: Duration,

    /// Period between two reads of a network's ledger
    pub sample_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            connection_time: DEFAULT_CONNECTION_TIME,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            idle_interval: IDLE_INTERVAL,
            sample_interval: SAMPLE_INTERVAL,
        }
    }
}

impl DiscoveryConfig {
    /// Build the discovery settings, zero values fall back to the defaults
    pub fn new(connection_time: Duration, failure_threshold: usize) -> Self {
        let defaults = Self::default();
        Self {
            connection_time: if connection_time.is_zero() {
                defaults.connection_time
            } else {
                connection_time
            },
            failure_threshold: if failure_threshold == 0 {
                defaults.failure_threshold
            } else {
                failure_threshold
            },
            ..defaults
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        Self::new(cli.connection_time(), cli.failure_threshold)
    }
}

/// Parse and validate the ledger gateway base URL
pub fn gateway_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::ConfigError(format!(
            "Unsupported ledger gateway scheme: {}",
            other
        ))),
    }
}
