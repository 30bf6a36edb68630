use clap::Parser;
use std::time::Duration;

/// Command-line interface for the explorer
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "explorer",
    about = "Discovers live inference clusters across token-scoped p2p networks",
    version
)]
pub struct Cli {
    /// Bind address for the API server
    #[clap(long, env("ADDRESS"), default_value = "0.0.0.0:8080")]
    pub address: String,

    /// Path to the pool database
    #[clap(long, env("POOL_DATABASE"), default_value = "explorer.json")]
    pub pool_database: String,

    /// Base URL of the ledger gateway used to reach each network
    #[clap(long, env("LEDGER_GATEWAY"), default_value = "http://127.0.0.1:8081")]
    pub ledger_gateway: String,

    /// Time in seconds spent connected to each network per pass (0 = default)
    #[clap(long, env("CONNECTION_TIME"), default_value = "50")]
    pub connection_time: u64,

    /// Consecutive failed passes tolerated before a network is removed (0 = default)
    #[clap(long, env("FAILURE_THRESHOLD"), default_value = "3")]
    pub failure_threshold: usize,

    /// Timeout for ledger gateway requests in seconds
    #[clap(long, env("REQUEST_TIMEOUT"), default_value = "10")]
    pub request_timeout: u64,
}

impl Cli {
    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Get the per-network connection time as a Duration
    pub fn connection_time(&self) -> Duration {
        Duration::from_secs(self.connection_time)
    }
}
