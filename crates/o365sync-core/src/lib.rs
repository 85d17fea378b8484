// # o365sync-core
//
// Core library for synchronizing the Office 365 endpoint list into a policy
// store.
//
// ## Architecture Overview
//
// This library provides the core functionality for one scheduled sync run:
// - **HttpTransport**: Trait for single-shot requests to the endpoint web service
// - **PolicyStore**: Trait for the device store holding URL categories and lookup tables
// - **ConfigStore**: Trait for the persisted configuration and run state
// - **Fetcher**: Retrying client for the version and endpoint-list calls
// - **Classifier**: Filters and buckets endpoint records into output sets
// - **Reconciler**: Rebuilds the managed policy objects from those sets
// - **SyncEngine**: Orchestrates one run and records its outcome
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from transports and stores
// 2. **Engine-Owned Retry**: Only the fetcher retries; collaborators are single-shot
// 3. **Full Rebuild**: Every run replaces managed objects wholesale
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Version and content hashes make repeated runs no-ops

pub mod classifier;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod reconciler;
pub mod schedule;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use traits::{
    ConfigStore, DefaultAction, HttpResponse, HttpTransport, MatchType, PolicyStore, RunStatus,
    SyncState, TableKind, TransportSettings, UrlRule,
};
pub use engine::{
    RunOptions, RunOutcome, SyncEngine, SyncEvent, record_startup_failure,
    resolve_transport_settings,
};
pub use config::{CustomerEndpoint, ProxyConfig, RetryPolicy, SyncConfig};
pub use error::{Error, Result};
pub use model::{ClassifiedSet, ClassifiedSets, EndpointRecord, SetName, UrlCategory};
pub use reconciler::{ReconcileSummary, Reconciler};
pub use state::{FileConfigStore, MemoryConfigStore};
