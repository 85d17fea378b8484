// # Memory Config Store
//
// In-memory implementation of ConfigStore.
//
// ## Purpose
//
// Holds the configuration and run state for tests and for embedding the
// engine in another process. Nothing survives a restart.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SyncConfig;
use crate::traits::config_store::{ConfigStore, SyncState};

/// In-memory config store implementation
///
/// Clones share the same underlying document.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<MemoryDocument>>,
}

#[derive(Debug, Default)]
struct MemoryDocument {
    config: Option<SyncConfig>,
    state: SyncState,
    state_writes: usize,
}

impl MemoryConfigStore {
    /// Create an empty store (not installed)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `config` and `state`
    pub fn with_document(config: SyncConfig, state: SyncState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryDocument {
                config: Some(config),
                state,
                state_writes: 0,
            })),
        }
    }

    /// Current state, without going through the trait
    pub async fn state(&self) -> SyncState {
        self.inner.read().await.state.clone()
    }

    /// Number of `save_state` calls so far
    pub async fn state_writes(&self) -> usize {
        self.inner.read().await.state_writes
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load_config(&self) -> Result<SyncConfig, Error> {
        let guard = self.inner.read().await;
        let config = guard
            .config
            .clone()
            .ok_or_else(|| Error::config("Configuration not found. Please re-install the sync job"))?;
        config.validate()?;
        Ok(config)
    }

    async fn load_state(&self) -> Result<SyncState, Error> {
        Ok(self.inner.read().await.state.clone())
    }

    async fn save_state(&self, state: &SyncState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.state = state.clone();
        guard.state_writes += 1;
        Ok(())
    }

    async fn save_config(&self, config: &SyncConfig) -> Result<(), Error> {
        self.inner.write().await.config = Some(config.clone());
        Ok(())
    }
}
