//! Access to the overlay networks behind each token.
//!
//! The discovery server only depends on the [`OverlayClient`], [`OverlayNode`]
//! and [`Ledger`] traits. [`GatewayClient`] implements them on top of a ledger
//! gateway: an HTTP service that is joined to the networks and exposes each
//! network's ledger storage under `/api/ledger`, selected by the
//! `X-Network-Token` header.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::time::{self, Instant};
use url::Url;

use crate::error::AppError;

/// Header carrying the network token on gateway requests
pub const TOKEN_HEADER: &str = "X-Network-Token";

/// Latest ledger block storage: key -> raw values
pub type Storage = HashMap<String, Vec<Vec<u8>>>;

/// Joins overlay networks by token
#[async_trait]
pub trait OverlayClient: Send + Sync {
    async fn join(&self, token: &str) -> Result<Box<dyn OverlayNode>, AppError>;
}

/// A joined network, released with [`OverlayNode::stop`]
#[async_trait]
pub trait OverlayNode: Send {
    /// Bring the node up, giving up at `deadline`
    async fn start(&mut self, deadline: Instant) -> Result<(), AppError>;

    /// Read handle on the network's ledger, only valid after `start`
    fn ledger(&self) -> Result<Arc<dyn Ledger>, AppError>;

    async fn stop(&mut self);
}

/// Read access to a network's shared ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Storage of the latest block, fetched fresh on every call
    async fn storage(&self) -> Result<Storage, AppError>;
}

/// Create an HTTP client with appropriate configuration for ledger reads
pub fn create_http_client(timeout: Duration) -> Result<Client, AppError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("p2p-explorer/0.1.0")
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| AppError::RequestError(format!("Failed to create HTTP client: {}", e)))?;

    Ok(client)
}

/// Overlay client backed by a ledger gateway
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    ledger_url: Url,
}

impl GatewayClient {
    pub fn new(client: Client, gateway: &Url) -> Result<Self, AppError> {
        let ledger_url = gateway.join("api/ledger")?;
        Ok(Self { client, ledger_url })
    }
}

#[async_trait]
impl OverlayClient for GatewayClient {
    async fn join(&self, token: &str) -> Result<Box<dyn OverlayNode>, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::ValidationError("Empty network token".to_string()));
        }

        Ok(Box::new(GatewayNode {
            ledger: Arc::new(GatewayLedger {
                client: self.client.clone(),
                url: self.ledger_url.clone(),
                token: token.to_string(),
            }),
            started: false,
        }))
    }
}

struct GatewayNode {
    ledger: Arc<GatewayLedger>,
    started: bool,
}

#[async_trait]
impl OverlayNode for GatewayNode {
    async fn start(&mut self, deadline: Instant) -> Result<(), AppError> {
        // The gateway answers once the network is reachable
        match time::timeout_at(deadline, self.ledger.fetch()).await {
            Ok(Ok(_)) => {
                self.started = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::ConnectionError(format!(
                "Timed out reaching ledger gateway at {}",
                self.ledger.url
            ))),
        }
    }

    fn ledger(&self) -> Result<Arc<dyn Ledger>, AppError> {
        if !self.started {
            return Err(AppError::LedgerError("Node has not been started".to_string()));
        }
        Ok(self.ledger.clone())
    }

    async fn stop(&mut self) {
        self.started = false;
        tracing::debug!("Released ledger gateway session for {}", self.ledger.url);
    }
}

struct GatewayLedger {
    client: Client,
    url: Url,
    token: String,
}

impl GatewayLedger {
    async fn fetch(&self) -> Result<Storage, AppError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::LedgerError(format!(
                "Ledger gateway returned {}",
                response.status()
            )));
        }

        let body: HashMap<String, BTreeMap<String, Value>> = response
            .json()
            .await
            .map_err(|e| AppError::LedgerError(format!("Malformed ledger storage: {}", e)))?;

        Ok(flatten_storage(body))
    }
}

#[async_trait]
impl Ledger for GatewayLedger {
    async fn storage(&self) -> Result<Storage, AppError> {
        self.fetch().await
    }
}

/// Turn `{key: {subkey: value}}` into `key -> [raw value]`, ordered by subkey
fn flatten_storage(body: HashMap<String, BTreeMap<String, Value>>) -> Storage {
    body.into_iter()
        .map(|(key, entries)| {
            let values = entries
                .into_values()
                .map(|value| match value {
                    Value::String(raw) => raw.into_bytes(),
                    other => other.to_string().into_bytes(),
                })
                .collect();
            (key, values)
        })
        .collect()
}
