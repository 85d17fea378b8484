// # Config Store Trait
//
// Defines the interface to the persisted configuration document.
//
// ## Purpose
//
// The document holds the validated [`SyncConfig`] and a small [`SyncState`]
// that makes runs idempotent across scheduler ticks:
// - The last upstream version token that was fully reconciled
// - Content hashes of the administrator-controlled filter lists
// - The outcome of the last run
//
// ## Implementations
//
// - File-based: `FileConfigStore` (single JSON document, atomic writes)
// - In-memory: `MemoryConfigStore` (tests and embedding)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::SyncConfig;
use crate::model::UrlCategory;

/// Outcome of the last run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Policy objects were rebuilt
    Updated,
    /// Nothing changed upstream or locally
    AlreadyCurrent,
    /// The run aborted; see `last_error_code`
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Updated => "updated",
            RunStatus::AlreadyCurrent => "already_current",
            RunStatus::Failed => "failed",
        })
    }
}

/// Persisted run state
///
/// Written exactly once at the end of each run by the `SyncEngine`. The
/// version token and hashes only advance on a successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// Last fully reconciled upstream version token (empty before the first run)
    pub previous_version: String,

    /// Hash of the excluded URL list at the last update
    pub previous_excluded_urls_hash: String,

    /// Hash of the excluded IP list at the last update
    pub previous_excluded_ips_hash: String,

    /// Hash of each included URL list at the last update
    pub previous_included_urls_hash: BTreeMap<UrlCategory, String>,

    /// Time the last run finished
    pub last_run: Option<DateTime<Utc>>,

    /// Human readable outcome of the last run
    pub last_run_description: String,

    /// Outcome of the last run
    pub last_run_status: Option<RunStatus>,

    /// Error tag of the last failed run
    pub last_error_code: Option<u16>,
}

/// Trait for configuration document stores
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for the persisted document
/// - ✅ Recover from a backup copy when the document is corrupt
///
/// ## Forbidden Capabilities
/// - ❌ Decide when state advances (owned by `SyncEngine`)
/// - ❌ Contact the endpoint web service or the policy store
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load and validate the configuration
    ///
    /// # Returns
    ///
    /// - `Ok(SyncConfig)`: The validated configuration
    /// - `Err(Error::Config)`: The document is missing or unusable (1001)
    /// - `Err(Error::Validation)`: A stored value is out of range
    async fn load_config(&self) -> Result<SyncConfig, crate::Error>;

    /// Load the run state (default state when none was saved yet)
    async fn load_state(&self) -> Result<SyncState, crate::Error>;

    /// Replace the run state, keeping the configuration
    async fn save_state(&self, state: &SyncState) -> Result<(), crate::Error>;

    /// Replace the configuration, keeping any existing run state
    async fn save_config(&self, config: &SyncConfig) -> Result<(), crate::Error>;
}
