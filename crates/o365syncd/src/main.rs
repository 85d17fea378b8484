// # o365syncd - Office 365 Endpoint Sync
//
// This binary is a THIN integration layer:
// - Parse the command line
// - Initialize logging and the runtime
// - Wire the reqwest transport, the tmsh policy store and the file document
//   into the core engine
// - Map outcomes to exit codes
//
// All sync logic lives in o365sync-core.
//
// ## Scheduling
//
// The job is started by an external scheduler (cron). `install` prints the
// schedule entry. The scheduler must not start a run while another one is in
// progress; runs take no lock.
//
// ## Environment
//
// - `O365SYNC_STATE_FILE`: Configuration and state document
//   (default `/shared/o365/o365_sync.json`)
// - `O365SYNC_LOG_LEVEL`: trace, debug, info, warn or error. Overrides the
//   configured `system.log_level`
//
// ## Example
//
// ```bash
// o365syncd install --config '{"service_areas": {"exchange": true}}'
// o365syncd run
// o365syncd run --force
// o365syncd status
// ```

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use o365sync_core::schedule::cron_expression;
use o365sync_core::{
    ConfigStore, Error, FileConfigStore, Reconciler, RunOptions, RunOutcome, SyncConfig,
    SyncEngine, SyncEvent, record_startup_failure, resolve_transport_settings,
};
use o365sync_http::ReqwestTransport;
use o365sync_tmsh::TmshPolicyStore;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};

/// Capacity of the engine event channel
const EVENT_CAPACITY: usize = 32;

/// Exit codes reported to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    /// Updated, already current, or before the start window
    Success = 0,
    /// Missing, corrupt or invalid configuration
    ConfigError = 1,
    /// Endpoint web service unreachable or answering garbage
    FetchError = 2,
    /// Policy store rejected an operation
    ReconcileError = 3,
    /// Configuration document could not be written
    StateStoreError = 4,
}

impl SyncExitCode {
    /// Exit code for a core error
    fn for_error(err: &Error) -> Self {
        match err.code() {
            1001..=1999 => Self::ConfigError,
            2001 => Self::StateStoreError,
            3001 | 3002 => Self::FetchError,
            4001 => Self::ReconcileError,
            5001 => Self::Success,
            _ => Self::ConfigError,
        }
    }
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // One run at a time, one thread
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    rt.block_on(dispatch(cli)).into()
}

async fn dispatch(cli: Cli) -> SyncExitCode {
    let store = FileConfigStore::new(&cli.state_file);

    match cli.effective_command() {
        Commands::Run { force } => run(store, force).await,
        Commands::Status => report(print_status(&store).await),
        Commands::Config => report(print_config(&store).await),
        Commands::Install {
            config,
            config_file,
            force,
        } => {
            init_logging(None);
            match install(&store, config, config_file.as_deref()).await {
                Ok(()) if force => run(store, true).await,
                Ok(()) => SyncExitCode::Success,
                Err(e) => {
                    error!("Install failed: {:#}", e);
                    exit_code_for(&e)
                }
            }
        }
        Commands::Uninstall { full } => {
            init_logging(None);
            match uninstall(&store, full).await {
                Ok(()) => SyncExitCode::Success,
                Err(e) => {
                    error!("Uninstall failed: {:#}", e);
                    exit_code_for(&e)
                }
            }
        }
    }
}

/// Run one reconciliation with the production collaborators
///
/// Failures before the engine exists are recorded in the run state too.
async fn run(store: FileConfigStore, forced: bool) -> SyncExitCode {
    let options = RunOptions::new(forced);

    let config = match store.load_config().await {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            error!("{} [{}]", e, e.code());
            record_startup_failure(&store, &e, &options).await;
            return SyncExitCode::for_error(&e);
        }
    };
    init_logging(Some(config.system.log_level));

    info!(
        "Starting {} run for {}",
        if forced { "forced" } else { "scheduled" },
        config.endpoint.as_str()
    );

    let policy_store = TmshPolicyStore::new();
    let settings = resolve_transport_settings(&config, &policy_store).await;
    let transport = match ReqwestTransport::new(&settings) {
        Ok(transport) => transport,
        Err(e) => {
            error!("{} [{}]", e, e.code());
            record_startup_failure(&store, &e, &options).await;
            return SyncExitCode::for_error(&e);
        }
    };

    let (engine, mut events) = SyncEngine::new(
        Box::new(transport),
        Box::new(policy_store),
        Box::new(store),
        EVENT_CAPACITY,
    );

    let result = engine.run(options).await;
    drain_events(&mut events);

    match result {
        Ok(RunOutcome::BeforeStartWindow) => SyncExitCode::Success,
        Ok(RunOutcome::AlreadyCurrent { version }) => {
            info!("Already current at version {}", version);
            SyncExitCode::Success
        }
        Ok(RunOutcome::Updated { version, summary }) => {
            info!("Updated to version {}: {}", version, summary);
            SyncExitCode::Success
        }
        Err(e) => {
            error!("{} [{}]", e, e.code());
            SyncExitCode::for_error(&e)
        }
    }
}

fn drain_events(events: &mut mpsc::Receiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        debug!("Engine event: {:?}", event);
    }
}

async fn print_status(store: &FileConfigStore) -> Result<()> {
    let state = store.load_state().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn print_config(store: &FileConfigStore) -> Result<()> {
    let config = store.load_config().await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Merge, validate and persist the configuration
async fn install(
    store: &FileConfigStore,
    inline: Option<String>,
    file: Option<&Path>,
) -> Result<()> {
    let text = match (inline, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => "{}".to_string(),
    };

    let input: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| Error::config(format!("invalid JSON: {}", e)))?;
    let config = SyncConfig::merge_json(&input)?;

    tokio::fs::create_dir_all(&config.system.working_directory)
        .await
        .with_context(|| {
            format!(
                "failed to create working directory {}",
                config.system.working_directory.display()
            )
        })?;
    if let Some(parent) = store.path().parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::state_store(format!("{}: {}", parent.display(), e)))?;
    }

    store.save_config(&config).await?;
    info!("Configuration written to {}", store.path().display());

    let program = env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "o365syncd".to_string());
    println!(
        "{} {} --state-file {} run",
        cron_expression(&config.schedule)?,
        program,
        store.path().display()
    );
    Ok(())
}

/// Remove the document, and with `full` every managed policy object
async fn uninstall(store: &FileConfigStore, full: bool) -> Result<()> {
    if full {
        let working_directory = match store.load_config().await {
            Ok(config) => config.system.working_directory,
            Err(e) => {
                warn!("Using the default working directory: {}", e);
                SyncConfig::default().system.working_directory
            }
        };

        let policy_store = TmshPolicyStore::new();
        Reconciler::new(&policy_store, working_directory)
            .remove_all()
            .await?;
        info!("Removed managed policy objects");
    }

    store.remove().await?;
    info!("Removed {}", store.path().display());
    Ok(())
}

fn report(result: Result<()>) -> SyncExitCode {
    match result {
        Ok(()) => SyncExitCode::Success,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> SyncExitCode {
    match err.downcast_ref::<Error>() {
        Some(e) => SyncExitCode::for_error(e),
        None => SyncExitCode::StateStoreError,
    }
}

/// Log level from `O365SYNC_LOG_LEVEL`, else from the configured 0..=2 level
fn log_level(env_level: Option<&str>, configured: Option<u8>) -> Level {
    if let Some(level) = env_level.and_then(|l| l.trim().parse::<Level>().ok()) {
        return level;
    }
    match configured {
        Some(0) => Level::WARN,
        Some(2) => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Install the global subscriber; later calls are ignored
fn init_logging(configured: Option<u8>) {
    let env_level = env::var("O365SYNC_LOG_LEVEL").ok();
    let level = log_level(env_level.as_deref(), configured);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_error_tags() {
        assert_eq!(SyncExitCode::for_error(&Error::config("x")), SyncExitCode::ConfigError);
        assert_eq!(
            SyncExitCode::for_error(&Error::validation(1019, "x")),
            SyncExitCode::ConfigError
        );
        assert_eq!(
            SyncExitCode::for_error(&Error::state_store("x")),
            SyncExitCode::StateStoreError
        );
        assert_eq!(SyncExitCode::for_error(&Error::fetch("x")), SyncExitCode::FetchError);
        assert_eq!(SyncExitCode::for_error(&Error::malformed("x")), SyncExitCode::FetchError);
        assert_eq!(
            SyncExitCode::for_error(&Error::reconcile("create", "x")),
            SyncExitCode::ReconcileError
        );
        assert_eq!(
            SyncExitCode::for_error(&Error::schedule_gate("x")),
            SyncExitCode::Success
        );
    }

    #[test]
    fn test_anyhow_errors_keep_their_tag() {
        let err = anyhow::Error::from(Error::fetch("x"));
        assert_eq!(exit_code_for(&err), SyncExitCode::FetchError);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), SyncExitCode::StateStoreError);
    }

    #[test]
    fn test_log_level_selection() {
        assert_eq!(log_level(None, None), Level::INFO);
        assert_eq!(log_level(None, Some(0)), Level::WARN);
        assert_eq!(log_level(None, Some(1)), Level::INFO);
        assert_eq!(log_level(None, Some(2)), Level::DEBUG);
        assert_eq!(log_level(Some("trace"), Some(0)), Level::TRACE);
        assert_eq!(log_level(Some("bogus"), Some(2)), Level::DEBUG);
    }

    #[tokio::test]
    async fn test_install_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("work");
        let store = FileConfigStore::new(dir.path().join("doc").join("o365_sync.json"));

        let inline = serde_json::json!({
            "service_areas": {"exchange": true},
            "system": {"working_directory": working.display().to_string()}
        })
        .to_string();

        install(&store, Some(inline), None).await.unwrap();

        assert!(working.is_dir());
        let config = store.load_config().await.unwrap();
        assert!(config.service_areas.exchange);
        assert_eq!(config.system.working_directory, working);
    }

    #[tokio::test]
    async fn test_install_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("o365_sync.json"));

        let err = install(&store, Some("{\"only_required\": 3}".to_string()), None)
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), SyncExitCode::ConfigError);
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_invalid_stored_config_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        let store = FileConfigStore::new(&path);
        let mut config = SyncConfig::default();
        config.system.log_level = 7;
        store.save_config(&config).await.unwrap();

        let code = run(FileConfigStore::new(&path), false).await;
        assert_eq!(code, SyncExitCode::ConfigError);

        let state = store.load_state().await.unwrap();
        assert_eq!(state.last_error_code, Some(1019));
        assert!(state.last_run_description.starts_with("Failed [1019]"));
        assert_eq!(state.last_run_status, Some(o365sync_core::RunStatus::Failed));
    }

    #[tokio::test]
    async fn test_unreadable_ca_bundle_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        let store = FileConfigStore::new(&path);
        let mut config = SyncConfig::default();
        config.proxy = o365sync_core::ProxyConfig::None;
        config.tls.ca_bundle = Some(dir.path().join("missing-ca.pem"));
        store.save_config(&config).await.unwrap();

        let code = run(FileConfigStore::new(&path), false).await;
        assert_eq!(code, SyncExitCode::FetchError);

        let state = store.load_state().await.unwrap();
        assert_eq!(state.last_error_code, Some(3001));
        assert!(state.last_run_description.starts_with("Failed [3001]"));
    }

    #[tokio::test]
    async fn test_uninstall_removes_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("o365_sync.json"));
        let mut config = SyncConfig::default();
        config.system.working_directory = dir.path().to_path_buf();
        store.save_config(&config).await.unwrap();

        uninstall(&store, false).await.unwrap();
        assert!(!store.exists());
    }
}
