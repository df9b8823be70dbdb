use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configuration::ConfigurationEngine;
use crate::error::StorageError;
use crate::http::{HttpClient, ReqwestClient};
use crate::logging::Logger;
use crate::storage::{
    DataStorageProvider, DirectoryDataProvider, DirectoryFileProvider, FileStorageOptions,
    FileStorageProvider, JsonSettingsProvider, MemoryDataProvider, MemoryFileProvider,
    MemorySettingsProvider, SettingsStorageProvider, StorageFacade,
};
use crate::update::{FeedUpdater, UpdateOptions};

/// Priority of the directory backends, above the in-memory fallbacks
const DIRECTORY_PRIORITY: i32 = 100;
const MEMORY_PRIORITY: i32 = 0;

const DATA_DIR: &str = "data";
const MEDIA_DIR: &str = "media";
const SETTINGS_FILE: &str = "settings.json";

/// Collects providers before the facade is frozen into an [`AppContext`]
pub struct AppContextBuilder {
    storage: StorageFacade,
    client: Arc<dyn HttpClient>,
    logger: Logger,
    file_options: FileStorageOptions,
}

impl AppContextBuilder {
    pub fn new(logger: Logger) -> Self {
        Self {
            storage: StorageFacade::new(logger.clone()),
            client: Arc::new(ReqwestClient::new()),
            logger,
            file_options: FileStorageOptions::default(),
        }
    }

    pub fn data_provider(mut self, provider: Arc<dyn DataStorageProvider>) -> Self {
        self.storage.register_data_provider(provider);
        self
    }

    pub fn file_provider(mut self, provider: Arc<dyn FileStorageProvider>) -> Self {
        self.storage.register_file_provider(provider);
        self
    }

    pub fn settings_provider(mut self, provider: Arc<dyn SettingsStorageProvider>) -> Self {
        self.storage.register_settings_provider(provider);
        self
    }

    /// In-memory backends as lowest priority fallback
    pub fn memory_providers(self) -> Self {
        self.data_provider(Arc::new(MemoryDataProvider::new(MEMORY_PRIORITY)))
            .file_provider(Arc::new(MemoryFileProvider::new(MEMORY_PRIORITY)))
            .settings_provider(Arc::new(MemorySettingsProvider::new(MEMORY_PRIORITY)))
    }

    /// Directory backends rooted at `root`
    pub fn directory_providers(self, root: &Path) -> Self {
        self.data_provider(Arc::new(DirectoryDataProvider::new(
            root.join(DATA_DIR),
            DIRECTORY_PRIORITY,
        )))
        .file_provider(Arc::new(DirectoryFileProvider::new(
            root.join(MEDIA_DIR),
            DIRECTORY_PRIORITY,
        )))
        .settings_provider(Arc::new(JsonSettingsProvider::new(
            root.join(SETTINGS_FILE),
            DIRECTORY_PRIORITY,
        )))
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = client;
        self
    }

    pub fn file_options(mut self, options: FileStorageOptions) -> Self {
        self.file_options = options;
        self
    }

    /// Freeze the registrations and initialise file storage
    pub async fn build(self) -> Result<AppContext, StorageError> {
        let storage = Arc::new(self.storage);
        storage.init(&self.file_options).await?;

        Ok(AppContext {
            configuration: ConfigurationEngine::new(storage.clone(), self.logger.clone()),
            updater: FeedUpdater::new(storage.clone(), self.client.clone(), self.logger.clone()),
            client: self.client,
            storage,
            logger: self.logger,
        })
    }
}

/// Everything the application works with, wired once at startup
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<StorageFacade>,
    pub configuration: ConfigurationEngine,
    pub updater: FeedUpdater,
    pub client: Arc<dyn HttpClient>,
    pub logger: Logger,
}

impl AppContext {
    pub fn builder(logger: Logger) -> AppContextBuilder {
        AppContextBuilder::new(logger)
    }

    /// Context keeping everything in memory
    pub async fn in_memory(logger: Logger) -> Result<Self, StorageError> {
        Self::builder(logger).memory_providers().build().await
    }

    /// Context persisting into `root`, with in-memory fallbacks
    pub async fn with_data_dir(root: impl Into<PathBuf>, logger: Logger) -> Result<Self, StorageError> {
        let root = root.into();
        logger.debug(format!("Using data directory {}", root.display()));
        Self::builder(logger)
            .directory_providers(&root)
            .memory_providers()
            .build()
            .await
    }

    /// Update options from the stored settings, defaults where unset
    pub async fn update_options(&self) -> Result<UpdateOptions, StorageError> {
        let settings = self.storage.list_settings().await?;
        Ok(UpdateOptions::from_settings(&settings))
    }
}
