//! Change detection
//!
//! A run rebuilds the policy objects when the upstream version token moved
//! or when any administrator-controlled filter list changed since the last
//! update. The lists are compared through order-independent content hashes.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::SyncConfig;
use crate::model::UrlCategory;
use crate::traits::SyncState;

/// SHA-256 over the sorted list joined with newlines, hex encoded
pub fn list_hash<S: AsRef<str>>(items: &[S]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Content hashes of the filter lists in a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFingerprint {
    pub excluded_urls_hash: String,
    pub excluded_ips_hash: String,
    pub included_urls_hash: BTreeMap<UrlCategory, String>,
}

impl ConfigFingerprint {
    /// Fingerprint `config`
    ///
    /// Every URL set gets a hash, including those without included URLs.
    pub fn of(config: &SyncConfig) -> Self {
        Self {
            excluded_urls_hash: list_hash(&config.excluded_urls),
            excluded_ips_hash: list_hash(&config.excluded_ips),
            included_urls_hash: UrlCategory::ALL
                .into_iter()
                .map(|category| (category, list_hash(config.included_for(category))))
                .collect(),
        }
    }

    /// Whether all hashes equal those recorded in `state`
    pub fn matches(&self, state: &SyncState) -> bool {
        self.excluded_urls_hash == state.previous_excluded_urls_hash
            && self.excluded_ips_hash == state.previous_excluded_ips_hash
            && self.included_urls_hash == state.previous_included_urls_hash
    }

    /// Record these hashes in `state`
    pub fn store(self, state: &mut SyncState) {
        state.previous_excluded_urls_hash = self.excluded_urls_hash;
        state.previous_excluded_ips_hash = self.excluded_ips_hash;
        state.previous_included_urls_hash = self.included_urls_hash;
    }
}

/// Whether a run has to rebuild the policy objects
///
/// False only when the run is not forced, the version token equals the
/// recorded one, and every filter-list hash is unchanged.
pub fn should_run(latest_version: &str, state: &SyncState, config: &SyncConfig, forced: bool) -> bool {
    if forced {
        return true;
    }

    let unchanged = latest_version == state.previous_version
        && ConfigFingerprint::of(config).matches(state);
    !unchanged
}
