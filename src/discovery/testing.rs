//! In-memory collaborators for discovery tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;

use crate::{
    db::TokenStore,
    error::AppError,
    overlay::{Ledger, OverlayClient, OverlayNode, Storage},
};

/// Raw ledger value for a peer, seen just now or five minutes ago
pub fn node_value(id: &str, online: bool) -> Vec<u8> {
    let last_seen = if online {
        Utc::now()
    } else {
        Utc::now() - chrono::Duration::minutes(5)
    };

    json!({
        "Name": format!("node-{}", id),
        "ID": id,
        "TunnelAddress": "10.1.0.1",
        "ServiceID": "",
        "LastSeen": last_seen,
    })
    .to_string()
    .into_bytes()
}

pub fn storage(entries: &[(&str, Vec<Vec<u8>>)]) -> Storage {
    entries
        .iter()
        .map(|(key, values)| (key.to_string(), values.clone()))
        .collect()
}

/// Ledger replaying a list of reads, the last one repeating forever
pub struct ScriptedLedger {
    script: Mutex<VecDeque<Result<Storage, String>>>,
    delay: Mutex<Duration>,
    reads: AtomicUsize,
}

impl ScriptedLedger {
    pub fn sequence(script: Vec<Result<Storage, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay: Mutex::new(Duration::ZERO),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn repeating(storage: Storage) -> Arc<Self> {
        Self::sequence(vec![Ok(storage)])
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = delay;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn storage(&self) -> Result<Storage, AppError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);

        let next = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match next {
            Some(Ok(storage)) => Ok(storage),
            Some(Err(e)) => Err(AppError::LedgerError(e)),
            None => Ok(Storage::new()),
        }
    }
}

/// How a scripted network answers a join attempt
#[derive(Clone)]
pub enum Behavior {
    FailJoin,
    FailStart,
    FailLedger,
    Ledger(Arc<ScriptedLedger>),
}

/// Overlay client whose networks are configured per token
#[derive(Default)]
pub struct ScriptedOverlay {
    networks: Mutex<HashMap<String, Behavior>>,
    joins: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl ScriptedOverlay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, token: &str, behavior: Behavior) {
        self.networks.lock().insert(token.to_string(), behavior);
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverlayClient for ScriptedOverlay {
    async fn join(&self, token: &str) -> Result<Box<dyn OverlayNode>, AppError> {
        let behavior = self.networks.lock().get(token).cloned();
        let behavior = match behavior {
            Some(Behavior::FailJoin) | None => {
                return Err(AppError::ConnectionError(format!(
                    "cannot join {}",
                    token
                )))
            }
            Some(behavior) => behavior,
        };

        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedNode {
            behavior,
            stops: self.stops.clone(),
        }))
    }
}

struct ScriptedNode {
    behavior: Behavior,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl OverlayNode for ScriptedNode {
    async fn start(&mut self, _deadline: Instant) -> Result<(), AppError> {
        match self.behavior {
            Behavior::FailStart => Err(AppError::ConnectionError("start failed".to_string())),
            _ => Ok(()),
        }
    }

    fn ledger(&self) -> Result<Arc<dyn Ledger>, AppError> {
        match &self.behavior {
            Behavior::Ledger(ledger) => Ok(ledger.clone()),
            _ => Err(AppError::LedgerError("no ledger".to_string())),
        }
    }

    async fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Token store kept in memory, recording deletions
#[derive(Default)]
pub struct MemoryStore {
    tokens: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with_tokens(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

impl TokenStore for MemoryStore {
    fn list_tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    fn delete(&self, token: &str) -> Result<(), AppError> {
        self.tokens.lock().retain(|t| t != token);
        self.deleted.lock().push(token.to_string());
        Ok(())
    }
}
