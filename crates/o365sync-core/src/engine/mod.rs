//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Loading the configuration and run state
//! - Enforcing the optional start window
//! - Checking the upstream version and local filter lists for changes
//! - Classifying the endpoint list and reconciling the policy store
//! - Persisting the run state exactly once per run
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//! │ ConfigStore  │◄──────►│  SyncEngine  │───────►│    Events    │
//! │ (load/save)  │        └──────────────┘        │   (notify)   │
//! └──────────────┘                │               └──────────────┘
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!         ┌──────────────┐                ┌──────────────┐
//!         │   Fetcher    │                │  Reconciler  │
//!         │ (+ retry)    │                │              │
//!         └──────────────┘                └──────────────┘
//!                 │                               │
//!                 ▼                               ▼
//!         ┌──────────────┐                ┌──────────────┐
//!         │HttpTransport │                │ PolicyStore  │
//!         └──────────────┘                └──────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Load configuration and state
//! 2. Stop quietly if the start window has not been reached
//! 3. Fetch the version token and run change detection
//! 4. If unchanged, record "already current" and stop
//! 5. Fetch, classify and reconcile
//! 6. Record the new version token and hashes
//!
//! A fatal error records a failure description without advancing the
//! version token or hashes, so the next tick starts from the same baseline.
//!
//! Overlapping runs are not guarded against.

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::classify;
use crate::config::{ProxyConfig, SyncConfig};
use crate::detector::{ConfigFingerprint, should_run};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::model::{SetName, UrlCategory};
use crate::reconciler::{ReconcileSummary, Reconciler};
use crate::schedule;
use crate::traits::{ConfigStore, HttpTransport, PolicyStore, RunStatus, SyncState, TransportSettings};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Run started
    Started { forced: bool },

    /// The configured start window has not been reached
    BeforeStartWindow { message: String },

    /// Upstream version token fetched
    VersionChecked { latest: String, previous: String },

    /// Nothing changed; no rebuild
    AlreadyCurrent { version: String },

    /// Endpoint list classified
    Classified {
        all: usize,
        ipv4: usize,
        ipv6: usize,
    },

    /// Policy store rebuilt
    Reconciled { version: String, summary: ReconcileSummary },

    /// Run aborted
    Failed { code: u16, message: String },
}

/// Options for a single run
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Interactive run: skip change detection and fetch retries
    pub forced: bool,
    /// Wall-clock time of the run
    pub now: DateTime<Local>,
}

impl RunOptions {
    /// Options for a run starting now
    pub fn new(forced: bool) -> Self {
        Self {
            forced,
            now: Local::now(),
        }
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Skipped: the start window has not been reached (nothing recorded)
    BeforeStartWindow,
    /// Nothing changed since the last update
    AlreadyCurrent { version: String },
    /// Policy objects rebuilt for `version`
    Updated {
        version: String,
        summary: ReconcileSummary,
    },
}

/// Core sync engine
///
/// The engine runs one reconciliation per call to [`SyncEngine::run`]. It is
/// meant to be invoked by an external scheduler at most once at a time.
pub struct SyncEngine {
    /// Transport for the endpoint web service
    transport: Box<dyn HttpTransport>,

    /// Target policy store
    policy_store: Box<dyn PolicyStore>,

    /// Configuration and run state
    config_store: Box<dyn ConfigStore>,

    /// Service base URL override
    base_url: Option<String>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver). Events are dropped when the
    /// channel holds `event_capacity` unread events.
    pub fn new(
        transport: Box<dyn HttpTransport>,
        policy_store: Box<dyn PolicyStore>,
        config_store: Box<dyn ConfigStore>,
        event_capacity: usize,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(event_capacity.max(1));

        let engine = Self {
            transport,
            policy_store,
            config_store,
            base_url: None,
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Query a different endpoint web service
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Run one reconciliation
    ///
    /// # Returns
    ///
    /// - `Ok(RunOutcome)`: Updated, already current, or before the start window
    /// - `Err(Error)`: Fatal error, already recorded in the run state
    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        self.emit_event(SyncEvent::Started {
            forced: options.forced,
        });

        let config = match self.config_store.load_config().await {
            Ok(config) => config,
            Err(e) => {
                let state = self.config_store.load_state().await.unwrap_or_default();
                return Err(self.record_failure(state, e, &options).await);
            }
        };
        let state = match self.config_store.load_state().await {
            Ok(state) => state,
            Err(e) => return Err(self.record_failure(SyncState::default(), e, &options).await),
        };

        match schedule::check_start_window(&config.schedule, options.now.naive_local()) {
            Ok(()) => {}
            Err(Error::ScheduleGate(message)) => {
                info!("Skipping run: {}", message);
                self.emit_event(SyncEvent::BeforeStartWindow { message });
                return Ok(RunOutcome::BeforeStartWindow);
            }
            Err(e) => return Err(self.record_failure(state, e, &options).await),
        }

        match self.execute(&config, state.clone(), &options).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.record_failure(state, e, &options).await),
        }
    }

    async fn execute(
        &self,
        config: &SyncConfig,
        mut state: SyncState,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let request_id = Uuid::new_v4();
        debug!("Client request id {}", request_id);

        let mut fetcher = Fetcher::new(self.transport.as_ref(), config.retry, options.forced);
        if let Some(base_url) = &self.base_url {
            fetcher = fetcher.with_base_url(base_url.clone());
        }

        let latest = fetcher.latest_version(config.endpoint, request_id).await?;
        info!(
            "Upstream version {} (previous: {})",
            latest,
            if state.previous_version.is_empty() { "none" } else { state.previous_version.as_str() }
        );
        self.emit_event(SyncEvent::VersionChecked {
            latest: latest.clone(),
            previous: state.previous_version.clone(),
        });

        if !should_run(&latest, &state, config, options.forced) {
            info!("Version {} already current, nothing to do", latest);
            state.last_run = Some(options.now.with_timezone(&Utc));
            state.last_run_description = format!("Already current (version {})", latest);
            state.last_run_status = Some(RunStatus::AlreadyCurrent);
            state.last_error_code = None;
            self.config_store.save_state(&state).await?;

            self.emit_event(SyncEvent::AlreadyCurrent {
                version: latest.clone(),
            });
            return Ok(RunOutcome::AlreadyCurrent { version: latest });
        }

        let records = fetcher.endpoints(config.endpoint, request_id).await?;
        let sets = classify(&records, config);
        let count = |name: SetName| sets.get(&name).map_or(0, |set| set.len());
        self.emit_event(SyncEvent::Classified {
            all: count(SetName::Url(UrlCategory::All)),
            ipv4: count(SetName::Ipv4),
            ipv6: count(SetName::Ipv6),
        });

        let reconciler = Reconciler::new(
            self.policy_store.as_ref(),
            config.system.working_directory.clone(),
        );
        let summary = reconciler.reconcile(&sets, config, &latest).await?;

        state.previous_version = latest.clone();
        ConfigFingerprint::of(config).store(&mut state);
        state.last_run = Some(options.now.with_timezone(&Utc));
        state.last_run_description = format!("Updated to version {}: {}", latest, summary);
        state.last_run_status = Some(RunStatus::Updated);
        state.last_error_code = None;
        self.config_store.save_state(&state).await?;

        info!("Updated to version {}", latest);
        self.emit_event(SyncEvent::Reconciled {
            version: latest.clone(),
            summary: summary.clone(),
        });
        Ok(RunOutcome::Updated {
            version: latest,
            summary,
        })
    }

    /// Record a fatal error in the run state and hand it back
    ///
    /// The version token and hashes in `state` are left untouched.
    async fn record_failure(&self, mut state: SyncState, err: Error, options: &RunOptions) -> Error {
        let code = err.code();
        error!("Run failed [{}]: {}", code, err);

        mark_failed(&mut state, &err, options);

        if let Err(save_err) = self.config_store.save_state(&state).await {
            warn!("Could not record failed run: {}", save_err);
        }

        self.emit_event(SyncEvent::Failed {
            code,
            message: err.to_string(),
        });
        err
    }

    /// Emit an engine event
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("Event channel full or closed, dropping event");
        }
    }
}

/// Stamp a fatal error into `state` without touching the version or hashes
fn mark_failed(state: &mut SyncState, err: &Error, options: &RunOptions) {
    let code = err.code();
    state.last_run = Some(options.now.with_timezone(&Utc));
    state.last_run_description = format!("Failed [{}]: {}", code, err);
    state.last_run_status = Some(RunStatus::Failed);
    state.last_error_code = Some(code);
}

/// Record a fatal error raised before an engine could be built
///
/// Used when the configuration cannot be loaded or the transport cannot be
/// constructed. Recording is best effort: a state that cannot be read starts
/// from the default and a failed save is only logged.
pub async fn record_startup_failure(
    config_store: &dyn ConfigStore,
    err: &Error,
    options: &RunOptions,
) {
    let mut state = config_store.load_state().await.unwrap_or_default();
    mark_failed(&mut state, err, options);

    if let Err(save_err) = config_store.save_state(&state).await {
        warn!("Could not record failed run: {}", save_err);
    }
}

/// Resolve proxy and TLS settings for the transport
///
/// `system` mode asks the policy store for the device's upstream proxy and
/// connects directly when none is configured or the lookup fails.
pub async fn resolve_transport_settings(
    config: &SyncConfig,
    policy_store: &dyn PolicyStore,
) -> TransportSettings {
    let proxy = match &config.proxy {
        ProxyConfig::None => None,
        ProxyConfig::Explicit { url } => Some(url.clone()),
        ProxyConfig::System => match policy_store.upstream_proxy().await {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!("Could not read the device proxy configuration, connecting directly: {}", e);
                None
            }
        },
    };

    if let Some(proxy) = &proxy {
        info!("Using proxy {}", proxy);
    }

    TransportSettings {
        proxy,
        ca_bundle: config.tls.ca_bundle.clone(),
    }
}
