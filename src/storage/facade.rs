// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::logging::Logger;
use crate::model::{Episode, Source};
use crate::progress::SharedProgressReporter;

use super::events::{EventBus, StorageEvent};
use super::provider::{
    Capability, DataStorageProvider, FileContent, FileStorageOptions, FileStorageProvider,
    Settings, SettingsStorageProvider, SettingsValue,
};
use super::registry::ProviderRegistry;

/// Stable entry point to whichever storage backends are active.
///
/// Every operation selects the current provider for its capability and
/// forwards to it unchanged. Without a qualifying provider the operation
/// fails with [`StorageError::NoProviderRegistered`] before anything is
/// awaited. Writes of sources and episodes are announced on the event bus
/// once the provider has settled.
pub struct StorageFacade {
    registry: ProviderRegistry,
    events: EventBus,
    logger: Logger,
}

impl StorageFacade {
    pub fn new(logger: Logger) -> Self {
        Self {
            registry: ProviderRegistry::new(),
            events: EventBus::default(),
            logger: logger.for_module("storage"),
        }
    }

    pub fn register_data_provider(&mut self, provider: Arc<dyn DataStorageProvider>) {
        self.logger.debug(format!(
            "Registered data provider {} (priority {})",
            provider.name(),
            provider.priority()
        ));
        self.registry.register_data_provider(provider);
    }

    pub fn register_file_provider(&mut self, provider: Arc<dyn FileStorageProvider>) {
        self.logger.debug(format!(
            "Registered file provider {} (priority {})",
            provider.name(),
            provider.priority()
        ));
        self.registry.register_file_provider(provider);
    }

    pub fn register_settings_provider(&mut self, provider: Arc<dyn SettingsStorageProvider>) {
        self.logger.debug(format!(
            "Registered settings provider {} (priority {})",
            provider.name(),
            provider.priority()
        ));
        self.registry.register_settings_provider(provider);
    }

    /// The data provider currently in charge, if any
    pub fn data_storage_provider(&self) -> Option<Arc<dyn DataStorageProvider>> {
        self.registry.data_storage_provider()
    }

    /// The file provider currently in charge, if any
    pub fn file_storage_provider(&self) -> Option<Arc<dyn FileStorageProvider>> {
        self.registry.file_storage_provider()
    }

    /// The settings provider currently in charge, if any
    pub fn settings_storage_provider(&self) -> Option<Arc<dyn SettingsStorageProvider>> {
        self.registry.settings_storage_provider()
    }

    pub fn is_file_storage_available(&self) -> bool {
        self.file_storage_provider().is_some()
    }

    /// Receive [`StorageEvent`]s for every subsequent write
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn data(&self) -> Result<Arc<dyn DataStorageProvider>, StorageError> {
        self.data_storage_provider().ok_or_else(|| {
            self.logger.error("Missing persistent data storage");
            StorageError::NoProviderRegistered {
                capability: Capability::Data,
            }
        })
    }

    fn file(&self) -> Result<Arc<dyn FileStorageProvider>, StorageError> {
        self.file_storage_provider().ok_or_else(|| {
            self.logger
                .warn("Missing persistent file storage, offline playback is disabled");
            StorageError::NoProviderRegistered {
                capability: Capability::File,
            }
        })
    }

    fn settings(&self) -> Result<Arc<dyn SettingsStorageProvider>, StorageError> {
        self.settings_storage_provider().ok_or_else(|| {
            self.logger.error("Missing persistent settings storage");
            StorageError::NoProviderRegistered {
                capability: Capability::Settings,
            }
        })
    }

    // == Sources

    pub async fn read_source(&self, uri: &str) -> Result<Option<Source>, StorageError> {
        self.data()?.read_source(uri).await
    }

    pub async fn read_sources(&self) -> Result<Vec<Source>, StorageError> {
        self.data()?.read_sources().await
    }

    pub async fn write_source(&self, source: Source) -> Result<Source, StorageError> {
        let written = self.data()?.write_source(source).await?;
        self.events
            .publish(StorageEvent::SourcesWritten(vec![written.clone()]));
        Ok(written)
    }

    /// Write several sources. An empty batch returns at once.
    pub async fn write_sources(&self, sources: Vec<Source>) -> Result<Vec<Source>, StorageError> {
        let provider = self.data()?;
        if sources.is_empty() {
            return Ok(sources);
        }

        let written = provider.write_sources(sources).await?;
        self.events
            .publish(StorageEvent::SourcesWritten(written.clone()));
        Ok(written)
    }

    pub async fn delete_source(&self, source: &Source) -> Result<(), StorageError> {
        self.data()?.delete_source(source).await
    }

    // == Episodes

    pub async fn read_episode(&self, uri: &str) -> Result<Option<Episode>, StorageError> {
        self.data()?.read_episode(uri).await
    }

    pub async fn read_playlist(&self, include_all: bool) -> Result<Vec<Episode>, StorageError> {
        self.data()?.read_playlist(include_all).await
    }

    pub async fn read_episodes_by_source(
        &self,
        source: &Source,
    ) -> Result<Vec<Episode>, StorageError> {
        self.data()?.read_episodes_by_source(source).await
    }

    pub async fn write_episode(&self, episode: Episode) -> Result<Episode, StorageError> {
        let written = self.data()?.write_episode(episode).await?;
        self.events
            .publish(StorageEvent::EpisodesWritten(vec![written.clone()]));
        Ok(written)
    }

    /// Write several episodes. An empty batch returns at once.
    pub async fn write_episodes(
        &self,
        episodes: Vec<Episode>,
    ) -> Result<Vec<Episode>, StorageError> {
        let provider = self.data()?;
        if episodes.is_empty() {
            return Ok(episodes);
        }

        let written = provider.write_episodes(episodes).await?;
        self.events
            .publish(StorageEvent::EpisodesWritten(written.clone()));
        Ok(written)
    }

    // == Files

    /// Forward initialisation options to the file provider, if there is one
    pub async fn init(&self, options: &FileStorageOptions) -> Result<(), StorageError> {
        match self.file_storage_provider() {
            Some(provider) => provider.init(options).await,
            None => {
                self.logger
                    .warn("No file storage available, offline playback is disabled");
                Ok(())
            }
        }
    }

    /// Resolve the offline media of an episode.
    ///
    /// Episodes without a saved file, or any episode while no file storage is
    /// available, are returned unchanged.
    pub async fn open_file(&self, episode: Episode) -> Result<Episode, StorageError> {
        if !episode.is_file_saved_offline {
            return Ok(episode);
        }
        match self.file_storage_provider() {
            Some(provider) => provider.open_file(episode).await,
            None => Ok(episode),
        }
    }

    /// Store media content for an episode.
    ///
    /// The file provider writes the updated episode itself, through the
    /// active data provider; the facade only announces it.
    pub async fn save_file(
        &self,
        episode: Episode,
        content: FileContent,
        progress: &SharedProgressReporter,
    ) -> Result<Episode, StorageError> {
        let file = self.file()?;
        let data = self.data()?;

        let saved = file
            .save_file(episode, content, data.as_ref(), progress)
            .await?;
        self.events
            .publish(StorageEvent::EpisodesWritten(vec![saved.clone()]));
        Ok(saved)
    }

    /// Remove the media file of an episode. The cleared record is written
    /// by the file provider.
    pub async fn delete_file(&self, episode: Episode) -> Result<Episode, StorageError> {
        let file = self.file()?;
        let data = self.data()?;

        let cleared = file.delete_file(episode, data.as_ref()).await?;
        self.events
            .publish(StorageEvent::EpisodesWritten(vec![cleared.clone()]));
        Ok(cleared)
    }

    pub async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        self.file()?.list_files().await
    }

    // == Settings

    pub async fn read_settings_value(
        &self,
        key: &str,
    ) -> Result<Option<SettingsValue>, StorageError> {
        self.settings()?.read_settings_value(key).await
    }

    pub async fn write_settings_value(
        &self,
        key: &str,
        value: SettingsValue,
    ) -> Result<(), StorageError> {
        self.settings()?.write_settings_value(key, value).await
    }

    pub async fn list_settings(&self) -> Result<Settings, StorageError> {
        self.settings()?.list_settings().await
    }

    pub async fn clear_settings(&self) -> Result<(), StorageError> {
        self.settings()?.clear_settings().await
    }

    // == Whole storage

    /// Delete everything: settings, then data, then files.
    ///
    /// File cleanup starts only after the data cleanup has completed. Fails
    /// only when no provider at all is available.
    pub async fn clean_storage(&self) -> Result<(), StorageError> {
        let settings = self.settings_storage_provider();
        let data = self.data_storage_provider();
        let file = self.file_storage_provider();

        if settings.is_none() && data.is_none() && file.is_none() {
            return Err(StorageError::NoProviderRegistered {
                capability: Capability::Data,
            });
        }

        if let Some(settings) = settings {
            self.logger.debug("Clean settings storage");
            settings.clear_settings().await?;
        }
        if let Some(data) = data {
            self.logger.debug("Clean data storage before file storage");
            data.clean_storage().await?;
        }
        if let Some(file) = file {
            self.logger.debug("Clean file storage after data storage");
            file.clean_storage().await?;
        }

        Ok(())
    }

    /// Copy all sources and episodes from one data provider to another.
    ///
    /// Sources are removed from `old` once they are written to `new`.
    pub async fn migrate_data(
        &self,
        old: &dyn DataStorageProvider,
        new: &dyn DataStorageProvider,
    ) -> Result<(), StorageError> {
        self.logger
            .info(format!("Migrating data from {} to {}", old.name(), new.name()));

        for source in old.read_sources().await? {
            new.write_source(source.clone()).await?;
            old.delete_source(&source).await?;
        }

        let episodes = old.read_playlist(true).await?;
        if !episodes.is_empty() {
            new.write_episodes(episodes).await?;
        }

        Ok(())
    }
}

impl Default for StorageFacade {
    fn default() -> Self {
        Self::new(Logger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryAppender};
    use crate::progress::NoopReporter;
    use crate::storage::memory::{MemoryDataProvider, MemoryFileProvider, MemorySettingsProvider};

    fn facade_with_memory() -> (StorageFacade, Arc<MemoryDataProvider>) {
        let data = Arc::new(MemoryDataProvider::new(100));
        let mut facade = StorageFacade::default();
        facade.register_data_provider(data.clone());
        facade.register_settings_provider(Arc::new(MemorySettingsProvider::new(100)));
        (facade, data)
    }

    #[tokio::test]
    async fn operations_without_provider_fail_with_no_provider_registered() {
        let facade = StorageFacade::default();

        match facade.read_sources().await.unwrap_err() {
            StorageError::NoProviderRegistered { capability } => {
                assert_eq!(capability, Capability::Data)
            }
            other => panic!("Expected NoProviderRegistered, got {other:?}"),
        }

        assert!(matches!(
            facade.list_settings().await,
            Err(StorageError::NoProviderRegistered {
                capability: Capability::Settings
            })
        ));
        assert!(matches!(
            facade.list_files().await,
            Err(StorageError::NoProviderRegistered {
                capability: Capability::File
            })
        ));
    }

    #[test]
    fn file_storage_unavailable_without_supported_provider() {
        let mut facade = StorageFacade::default();
        assert!(!facade.is_file_storage_available());

        let unsupported = MemoryFileProvider::new(10);
        unsupported.set_supported(false);
        facade.register_file_provider(Arc::new(unsupported));
        assert!(!facade.is_file_storage_available());

        facade.register_file_provider(Arc::new(MemoryFileProvider::new(0)));
        assert!(facade.is_file_storage_available());
    }

    #[tokio::test]
    async fn dispatches_to_highest_priority_provider() {
        let low = Arc::new(MemoryDataProvider::new(0).with_name("low"));
        let high = Arc::new(MemoryDataProvider::new(200).with_name("high"));
        let mut facade = StorageFacade::default();
        facade.register_data_provider(low.clone());
        facade.register_data_provider(high.clone());

        facade.write_source(Source::new("https://example.com/feed")).await.unwrap();

        assert_eq!(high.read_sources().await.unwrap().len(), 1);
        assert!(low.read_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_bulk_writes_leave_storage_untouched() {
        let (facade, data) = facade_with_memory();
        facade.write_episode(Episode::new("existing")).await.unwrap();
        facade.write_source(Source::new("https://example.com/feed")).await.unwrap();
        let mut events = facade.subscribe();

        assert!(facade.write_episodes(Vec::new()).await.unwrap().is_empty());
        assert!(facade.write_sources(Vec::new()).await.unwrap().is_empty());

        assert_eq!(data.read_playlist(true).await.unwrap().len(), 1);
        assert_eq!(data.read_sources().await.unwrap().len(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn writes_publish_events() {
        let (facade, _) = facade_with_memory();
        let mut events = facade.subscribe();

        facade
            .write_episodes(vec![Episode::new("a"), Episode::new("b")])
            .await
            .unwrap();
        facade.write_source(Source::new("https://example.com/feed")).await.unwrap();

        match events.recv().await.unwrap() {
            StorageEvent::EpisodesWritten(episodes) => assert_eq!(episodes.len(), 2),
            other => panic!("Expected EpisodesWritten, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            StorageEvent::SourcesWritten(sources) => {
                assert_eq!(sources[0].uri, "https://example.com/feed")
            }
            other => panic!("Expected SourcesWritten, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_file_writes_file_and_episode_record() {
        let (mut facade, data) = facade_with_memory();
        let files = Arc::new(MemoryFileProvider::new(10));
        facade.register_file_provider(files.clone());
        facade.write_episode(Episode::new("ep1")).await.unwrap();

        let saved = facade
            .save_file(
                Episode::new("ep1"),
                FileContent::from_bytes(&b"audio"[..]),
                &NoopReporter::shared(),
            )
            .await
            .unwrap();

        assert!(saved.is_file_saved_offline);
        assert_eq!(files.list_files().await.unwrap().len(), 1);

        let stored = data.read_episode("ep1").await.unwrap().unwrap();
        assert!(stored.is_file_saved_offline);
        assert_eq!(stored.offline_media_url, saved.offline_media_url);

        let cleared = facade.delete_file(stored).await.unwrap();
        assert!(!cleared.is_file_saved_offline);
        assert!(files.list_files().await.unwrap().is_empty());
        assert!(!data.read_episode("ep1").await.unwrap().unwrap().is_file_saved_offline);
    }

    #[tokio::test]
    async fn open_file_without_file_storage_degrades_gracefully() {
        let (facade, _) = facade_with_memory();
        let mut episode = Episode::new("ep1");
        episode.is_file_saved_offline = true;

        let opened = facade.open_file(episode.clone()).await.unwrap();
        assert_eq!(opened, episode);
    }

    #[tokio::test]
    async fn missing_file_storage_is_logged_as_warning() {
        let appender = Arc::new(MemoryAppender::new());
        let facade = StorageFacade::new(Logger::new("test", appender.clone()));

        let _ = facade.list_files().await;

        let entries = appender.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].module, "storage");
    }

    #[tokio::test]
    async fn clean_storage_clears_every_capability() {
        let (mut facade, data) = facade_with_memory();
        let files = Arc::new(MemoryFileProvider::new(10));
        facade.register_file_provider(files.clone());

        facade.write_settings_value("volume", 0.8.into()).await.unwrap();
        facade.write_source(Source::new("https://example.com/feed")).await.unwrap();
        facade
            .save_file(
                Episode::new("ep1"),
                FileContent::from_bytes(&b"audio"[..]),
                &NoopReporter::shared(),
            )
            .await
            .unwrap();

        facade.clean_storage().await.unwrap();

        assert!(facade.list_settings().await.unwrap().is_empty());
        assert!(data.read_sources().await.unwrap().is_empty());
        assert!(data.read_playlist(true).await.unwrap().is_empty());
        assert!(files.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clean_storage_without_providers_fails() {
        let facade = StorageFacade::default();
        assert!(matches!(
            facade.clean_storage().await,
            Err(StorageError::NoProviderRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn migrate_data_moves_sources_and_copies_episodes() {
        let facade = StorageFacade::default();
        let old = MemoryDataProvider::new(0);
        let new = MemoryDataProvider::new(1);
        old.write_source(Source::new("https://example.com/feed")).await.unwrap();
        old.write_episode(Episode::new("ep1")).await.unwrap();

        facade.migrate_data(&old, &new).await.unwrap();

        assert!(old.read_sources().await.unwrap().is_empty());
        assert_eq!(new.read_sources().await.unwrap().len(), 1);
        assert_eq!(new.read_playlist(true).await.unwrap().len(), 1);
    }
}
