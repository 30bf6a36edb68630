use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{error::AppError, models::TokenData};

/// Registry of network tokens the discovery server probes
pub trait TokenStore: Send + Sync {
    /// Tokens to probe, in a stable order
    fn list_tokens(&self) -> Vec<String>;

    /// Stop tracking a token
    fn delete(&self, token: &str) -> Result<(), AppError>;
}

/// JSON file backed token database
///
/// The whole map is rewritten on every change, through a temporary file
/// renamed over the existing one so readers never see a partial document.
pub struct Database {
    path: PathBuf,
    data: RwLock<HashMap<String, TokenData>>,
}

impl Database {
    /// Open the database at `path`, starting empty when the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let data = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(|b| b.is_ascii_whitespace()) => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::StoreError(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No database at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Loaded {} tokens from {}", data.len(), path.display());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self, token: &str) -> Option<TokenData> {
        self.data.read().get(token).cloned()
    }

    /// Insert a token, failing if it is already registered
    pub fn add(&self, token: &str, data: TokenData) -> Result<(), AppError> {
        let mut guard = self.data.write();
        if guard.contains_key(token) {
            return Err(AppError::ConflictError("Token already registered".to_string()));
        }
        guard.insert(token.to_string(), data);
        persist(&self.path, &guard)
    }

    /// Sorted list of all registered tokens
    pub fn token_list(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.data.read().keys().cloned().collect();
        tokens.sort();
        tokens
    }
}

impl TokenStore for Database {
    fn list_tokens(&self) -> Vec<String> {
        self.token_list()
    }

    fn delete(&self, token: &str) -> Result<(), AppError> {
        let mut guard = self.data.write();
        if guard.remove(token).is_none() {
            return Ok(());
        }
        persist(&self.path, &guard)
    }
}

fn persist(path: &Path, data: &HashMap<String, TokenData>) -> Result<(), AppError> {
    let bytes = serde_json::to_vec_pretty(data)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;

    tracing::debug!("Saved {} tokens to {}", data.len(), path.display());
    Ok(())
}
