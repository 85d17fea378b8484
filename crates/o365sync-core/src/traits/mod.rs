//! Core traits for the O365 sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`HttpTransport`]: Single-shot HTTPS GET against the endpoint web service
//! - [`PolicyStore`]: Create and replace URL categories and lookup tables
//! - [`ConfigStore`]: Persistent configuration and run state

pub mod config_store;
pub mod http_transport;
pub mod policy_store;

pub use config_store::{ConfigStore, RunStatus, SyncState};
pub use http_transport::{HttpResponse, HttpTransport, TransportSettings};
pub use policy_store::{DefaultAction, MatchType, PolicyStore, TableKind, UrlRule};
