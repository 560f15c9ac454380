//! JSON Trade Store
//!
//! Keeps signals in memory and, when backed by a file, rewrites the file after
//! every mutation (write to a temp file, then rename). A write lock is held
//! across the check, the update and the flush, which makes the conditional
//! status update atomic within the process.
//!
//! The whole store is one file. Each transition serializes every signal, so a
//! pass over N signals writes O(N^2) bytes and concurrent workers queue on the
//! write lock while the file is rewritten. Fine for thousands of signals; a
//! larger book needs a per-record store behind `TradeStore`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{TradeSignal, Transition, TransitionError};
use crate::ports::{StoreError, TradeStore};

const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    signals: Vec<TradeSignal>,
}

#[derive(Debug)]
pub struct JsonTradeStore {
    path: Option<PathBuf>,
    signals: RwLock<BTreeMap<String, TradeSignal>>,
}

impl JsonTradeStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            signals: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open a file-backed store, starting empty if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let signals = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
                    StoreError::Serialization(format!("{}: {}", path.display(), e))
                })?;
                if file.version != STORE_FORMAT_VERSION {
                    return Err(StoreError::Serialization(format!(
                        "{}: unsupported store version {}",
                        path.display(),
                        file.version
                    )));
                }
                file.signals
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No trade store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(StoreError::Io(format!("{}: {}", path.display(), e))),
        };

        tracing::debug!("Loaded {} signals from {}", signals.len(), path.display());
        Ok(Self {
            path: Some(path),
            signals: RwLock::new(signals),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrite the full snapshot. Called with the write lock held.
    async fn flush(&self, signals: &BTreeMap<String, TradeSignal>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Io(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            signals: signals.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for JsonTradeStore {
    async fn list_open(&self) -> Result<Vec<TradeSignal>, StoreError> {
        let signals = self.signals.read().await;
        Ok(signals.values().filter(|s| s.is_open()).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<TradeSignal>, StoreError> {
        let signals = self.signals.read().await;
        Ok(signals.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<TradeSignal>, StoreError> {
        Ok(self.signals.read().await.get(id).cloned())
    }

    async fn insert(&self, signal: TradeSignal) -> Result<(), StoreError> {
        signal.validate().map_err(StoreError::Invalid)?;

        let mut signals = self.signals.write().await;
        if signals.contains_key(&signal.id) {
            return Err(StoreError::Duplicate(signal.id));
        }

        let id = signal.id.clone();
        signals.insert(id.clone(), signal);
        if let Err(e) = self.flush(&signals).await {
            signals.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    async fn apply_transition(
        &self,
        id: &str,
        transition: &Transition,
    ) -> Result<TradeSignal, StoreError> {
        let mut signals = self.signals.write().await;
        let current = signals
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .clone();

        let mut updated = current.clone();
        updated.apply(transition).map_err(|e| match e {
            TransitionError::StaleStatus { expected, actual } => StoreError::StatusConflict {
                id: id.to_string(),
                expected,
                actual,
            },
            other => StoreError::Rejected {
                id: id.to_string(),
                source: other,
            },
        })?;

        signals.insert(id.to_string(), updated.clone());
        if let Err(e) = self.flush(&signals).await {
            signals.insert(id.to_string(), current);
            return Err(e);
        }
        Ok(updated)
    }
}
