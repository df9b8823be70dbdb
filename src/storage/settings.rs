use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;

use super::provider::{Settings, SettingsStorageProvider, SettingsValue, StorageProvider};

/// User settings persisted as a single JSON object file
#[derive(Debug)]
pub struct JsonSettingsProvider {
    path: PathBuf,
    priority: i32,
    supported: bool,
    lock: Mutex<()>,
}

impl JsonSettingsProvider {
    pub fn new(path: impl Into<PathBuf>, priority: i32) -> Self {
        let path = path.into();
        let supported = path
            .parent()
            .is_none_or(|parent| std::fs::create_dir_all(parent).is_ok());
        Self {
            path,
            priority,
            supported,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Settings, StorageError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        serde_json::from_slice(&content).map_err(|e| StorageError::JsonParseFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn store(&self, settings: &Settings) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(settings)?;
        let mut partial = self.path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, json)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: partial.clone(),
                source: e,
            })?;
        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }
}

impl StorageProvider for JsonSettingsProvider {
    fn name(&self) -> &str {
        "json settings storage"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported
    }
}

#[async_trait]
impl SettingsStorageProvider for JsonSettingsProvider {
    async fn read_settings_value(&self, key: &str) -> Result<Option<SettingsValue>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn write_settings_value(
        &self,
        key: &str,
        value: SettingsValue,
    ) -> Result<(), StorageError> {
        // Read-modify-write under one lock
        let _guard = self.lock.lock().await;
        let mut settings = self.load().await?;
        settings.insert(key.to_string(), value);
        self.store(&settings).await
    }

    async fn list_settings(&self) -> Result<Settings, StorageError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn clear_settings(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}
