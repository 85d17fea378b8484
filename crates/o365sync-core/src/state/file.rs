// # File Config Store
//
// File-based implementation of ConfigStore with crash recovery.
//
// ## Purpose
//
// Holds the configuration written by the installer and the run state that
// keeps scheduled runs idempotent. The document is read at the start of every
// run and rewritten once at the end.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of the previous document
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "config": { "endpoint": "Worldwide", "...": "..." },
//   "state": {
//     "previous_version": "2021010100",
//     "last_run": "2021-01-09T12:00:00Z",
//     "last_run_status": "updated"
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::config::SyncConfig;
use crate::traits::config_store::{ConfigStore, SyncState};

/// Document format version
const DOCUMENT_VERSION: &str = "1.0";

/// Install location of the document
pub const DEFAULT_DOCUMENT_PATH: &str = "/shared/o365/o365_sync.json";

/// Serializable document format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Document {
    version: String,
    config: SyncConfig,
    #[serde(default)]
    state: SyncState,
}

/// File-based config store with crash recovery
///
/// # Crash Recovery
///
/// - **Atomic writes**: New document written to temporary file, then renamed
/// - **Backup**: Previous document kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// A missing document, or a corrupt one without a usable backup, is a
/// configuration error (1001): the system has to be re-installed.
///
/// # Example
///
/// ```rust,no_run
/// use o365sync_core::state::FileConfigStore;
/// use o365sync_core::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileConfigStore::new("/shared/o365/o365_sync.json");
///
///     let config = store.load_config().await?;
///     let state = store.load_state().await?;
///     println!("{:?} last synced {}", config.endpoint, state.previous_version);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    /// Create a store for the document at `path`
    ///
    /// Nothing is read until the first load.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a document exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the document and its backup
    pub async fn remove(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        for path in [self.path.clone(), Self::backup_path(&self.path)] {
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::state_store(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load the document with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main document
    /// 2. If it is corrupt, try loading backup and restore it
    /// 3. If backup also fails, report a configuration error
    async fn load_with_recovery(&self) -> Result<Document, Error> {
        let error = match Self::read_document(&self.path).await {
            Ok(Some(document)) => return Ok(document),
            Ok(None) => {
                return Err(Error::config(format!(
                    "Configuration document {} not found. Please re-install the sync job",
                    self.path.display()
                )));
            }
            Err(e) => e,
        };

        tracing::warn!(
            "Configuration document appears corrupted: {}. Attempting recovery from backup.",
            error
        );

        let backup_path = Self::backup_path(&self.path);
        match Self::read_document(&backup_path).await {
            Ok(Some(document)) => {
                tracing::info!("Recovered configuration document from backup");
                if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!(
                        "Failed to restore configuration document from backup: {}",
                        restore_err
                    );
                }
                Ok(document)
            }
            Ok(None) => Err(Error::config(format!(
                "{}. No backup found. Please re-install the sync job",
                error
            ))),
            Err(backup_err) => Err(Error::config(format!(
                "{}. Backup also unusable ({}). Please re-install the sync job",
                error, backup_err
            ))),
        }
    }

    /// Read and parse one document file (`None` when absent)
    async fn read_document(path: &Path) -> Result<Option<Document>, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Configuration document does not exist: {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "Failed to read configuration document {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let document: Document = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse configuration document {}: {}",
                path.display(),
                e
            ))
        })?;

        if document.version != DOCUMENT_VERSION {
            tracing::warn!(
                "Configuration document version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                DOCUMENT_VERSION,
                document.version
            );
        }

        Ok(Some(document))
    }

    /// Write the document atomically
    async fn write_document(&self, document: &Document) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| Error::state_store(format!("Failed to serialize document: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Document written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load_config(&self) -> Result<SyncConfig, Error> {
        let document = self.load_with_recovery().await?;
        document.config.validate()?;
        Ok(document.config)
    }

    async fn load_state(&self) -> Result<SyncState, Error> {
        Ok(self.load_with_recovery().await?.state)
    }

    async fn save_state(&self, state: &SyncState) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load_with_recovery().await?;
        document.state = state.clone();
        self.write_document(&document).await
    }

    async fn save_config(&self, config: &SyncConfig) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        // An unreadable document is replaced; its state is lost.
        let state = match self.load_with_recovery().await {
            Ok(document) => document.state,
            Err(e) => {
                if self.path.exists() {
                    tracing::warn!("Replacing unusable configuration document: {}", e);
                }
                SyncState::default()
            }
        };

        let document = Document {
            version: DOCUMENT_VERSION.to_string(),
            config: config.clone(),
            state,
        };
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_document_is_config_error() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("o365_sync.json"));

        let err = store.load_config().await.unwrap_err();
        assert_eq!(err.code(), 1001);
        assert!(err.to_string().contains("re-install"));
    }

    #[tokio::test]
    async fn test_save_config_keeps_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("o365_sync.json");
        let store = FileConfigStore::new(&path);

        store.save_config(&SyncConfig::default()).await.unwrap();
        assert!(path.exists());

        let state = SyncState {
            previous_version: "2021010100".to_string(),
            ..SyncState::default()
        };
        store.save_state(&state).await.unwrap();

        let mut config = SyncConfig::default();
        config.only_required = false;
        store.save_config(&config).await.unwrap();

        let store2 = FileConfigStore::new(&path);
        assert!(!store2.load_config().await.unwrap().only_required);
        assert_eq!(store2.load_state().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        let store = FileConfigStore::new(&path);

        store.save_config(&SyncConfig::default()).await.unwrap();
        let first = SyncState {
            previous_version: "2021010100".to_string(),
            ..SyncState::default()
        };
        store.save_state(&first).await.unwrap();
        let second = SyncState {
            previous_version: "2021020100".to_string(),
            ..SyncState::default()
        };
        store.save_state(&second).await.unwrap();

        let backup_path = FileConfigStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        // The backup holds the document before the last write
        let recovered = store.load_state().await.unwrap();
        assert_eq!(recovered, first);
        assert!(store.load_config().await.is_ok());
    }

    #[tokio::test]
    async fn test_corruption_without_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        fs::write(&path, b"{\"version\": \"1.0\"}").await.unwrap();

        let err = FileConfigStore::new(&path).load_config().await.unwrap_err();
        assert_eq!(err.code(), 1001);
    }

    #[tokio::test]
    async fn test_stored_values_are_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        let store = FileConfigStore::new(&path);

        let mut config = SyncConfig::default();
        config.system.log_level = 7;
        store.save_config(&config).await.unwrap();

        assert_eq!(store.load_config().await.unwrap_err().code(), 1019);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("o365_sync.json");
        let store = FileConfigStore::new(&path);

        store.save_config(&SyncConfig::default()).await.unwrap();
        store.save_config(&SyncConfig::default()).await.unwrap();
        store.remove().await.unwrap();

        assert!(!path.exists());
        assert!(!FileConfigStore::backup_path(&path).exists());
        store.remove().await.unwrap();
    }
}
