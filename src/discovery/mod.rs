// Modules
mod failures;
mod scanner;
mod service;
mod state;
mod utils;

#[cfg(test)]
mod testing;

// Public exports
pub use service::DiscoveryServer;
pub use state::NetworkState;
