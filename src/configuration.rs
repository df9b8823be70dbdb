// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, StorageError};
use crate::logging::Logger;
use crate::model::{Episode, Source};
use crate::storage::{Settings, SettingsValue, StorageFacade, collect_batch};

/// Everything a user has stored, as exchanged between devices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub settings: Settings,
}

impl Configuration {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.episodes.is_empty() && self.settings.is_empty()
    }
}

/// How an imported configuration is combined with local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep local state, add what is new
    Merge,
    /// Replace local state entirely
    Override,
}

/// Reads, resets, merges and overrides the stored configuration
#[derive(Clone)]
pub struct ConfigurationEngine {
    storage: Arc<StorageFacade>,
    logger: Logger,
}

impl ConfigurationEngine {
    pub fn new(storage: Arc<StorageFacade>, logger: Logger) -> Self {
        Self {
            storage,
            logger: logger.for_module("configuration"),
        }
    }

    /// Snapshot of settings, sources and the complete playlist.
    ///
    /// The offline flag is cleared on every episode: a media file saved on
    /// this device is not available where the snapshot is imported.
    pub async fn read_configuration(&self) -> Result<Configuration, ConfigurationError> {
        let (settings, sources, mut episodes) = tokio::try_join!(
            self.storage.list_settings(),
            self.storage.read_sources(),
            self.storage.read_playlist(true),
        )?;

        for episode in &mut episodes {
            episode.is_file_saved_offline = false;
        }

        Ok(Configuration {
            sources,
            episodes,
            settings,
        })
    }

    /// Delete all stored state and return the now empty configuration
    pub async fn reset_configuration(&self) -> Result<Configuration, ConfigurationError> {
        self.logger.note("Resetting configuration");
        self.storage.clean_storage().await?;
        Ok(Configuration::default())
    }

    /// Replace all stored state with `configuration`
    pub async fn override_configuration(
        &self,
        configuration: Configuration,
    ) -> Result<(), ConfigurationError> {
        self.reset_configuration().await?;
        self.merge_configurations(configuration).await
    }

    /// Merge `configuration` into the stored state.
    ///
    /// A setting is only taken over when no local value exists. Sources are
    /// written before episodes; both overwrite local records with the same
    /// URI.
    pub async fn merge_configurations(
        &self,
        configuration: Configuration,
    ) -> Result<(), ConfigurationError> {
        self.logger.info(format!(
            "Merging {} sources, {} episodes and {} settings",
            configuration.sources.len(),
            configuration.episodes.len(),
            configuration.settings.len()
        ));

        if !configuration.settings.is_empty() {
            let writes = configuration
                .settings
                .into_iter()
                .map(|(key, value)| self.merge_setting(key, value));
            let merged = collect_batch(join_all(writes).await)?;
            let taken = merged.iter().filter(|taken| **taken).count();
            self.logger.debug(format!(
                "Took over {taken} of {} settings",
                merged.len()
            ));
        }

        self.storage.write_sources(configuration.sources).await?;
        self.storage.write_episodes(configuration.episodes).await?;
        Ok(())
    }

    /// Write a setting unless a local value exists. Returns whether it was written.
    async fn merge_setting(&self, key: String, value: SettingsValue) -> Result<bool, StorageError> {
        if self.storage.read_settings_value(&key).await?.is_some() {
            return Ok(false);
        }
        self.storage.write_settings_value(&key, value).await?;
        Ok(true)
    }

    /// Stored value of a setting, or `default` when unset
    pub async fn get(
        &self,
        key: &str,
        default: impl Into<SettingsValue>,
    ) -> Result<SettingsValue, ConfigurationError> {
        Ok(self
            .storage
            .read_settings_value(key)
            .await?
            .unwrap_or_else(|| default.into()))
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<SettingsValue>,
    ) -> Result<(), ConfigurationError> {
        self.storage
            .write_settings_value(key, value.into())
            .await
            .map_err(Into::into)
    }

    /// Write the current configuration to `path` as pretty JSON
    pub async fn export_to_file(&self, path: &Path) -> Result<Configuration, ConfigurationError> {
        let configuration = self.read_configuration().await?;
        let json = serde_json::to_string_pretty(&configuration)?;

        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConfigurationError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        self.logger
            .info(format!("Exported configuration to {}", path.display()));
        Ok(configuration)
    }

    /// Load a configuration from `path` and merge or override with it
    pub async fn import_from_file(
        &self,
        path: &Path,
        mode: ImportMode,
    ) -> Result<Configuration, ConfigurationError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigurationError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let configuration: Configuration =
            serde_json::from_str(&content).map_err(|e| ConfigurationError::JsonParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        match mode {
            ImportMode::Merge => self.merge_configurations(configuration.clone()).await?,
            ImportMode::Override => self.override_configuration(configuration.clone()).await?,
        }

        self.logger
            .info(format!("Imported configuration from {}", path.display()));
        Ok(configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDataProvider, MemoryFileProvider, MemorySettingsProvider};
    use tempfile::tempdir;

    fn engine() -> (ConfigurationEngine, Arc<StorageFacade>) {
        let mut facade = StorageFacade::default();
        facade.register_data_provider(Arc::new(MemoryDataProvider::new(0)));
        facade.register_file_provider(Arc::new(MemoryFileProvider::new(0)));
        facade.register_settings_provider(Arc::new(MemorySettingsProvider::new(0)));
        let facade = Arc::new(facade);
        (
            ConfigurationEngine::new(facade.clone(), Logger::default()),
            facade,
        )
    }

    fn sample() -> Configuration {
        let mut source = Source::new("https://example.com/feed.xml");
        source.title = Some("Example".to_string());

        let mut episode = Episode::new("https://example.com/ep1");
        episode.title = Some("Episode 1".to_string());
        episode.source = Some(source.uri.clone());
        episode.playback.current_time = 145.0;
        episode.playback.played = Some(true);

        let mut settings = Settings::new();
        settings.insert("proxyUrl".to_string(), "https://proxy/$url$".into());
        settings.insert("limitOfNewEpisodes".to_string(), SettingsValue::Number(5.0));

        Configuration {
            sources: vec![source],
            episodes: vec![episode],
            settings,
        }
    }

    #[test]
    fn configuration_json_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["episodes"][0]["playback"]["currentTime"], 145.0);
        assert_eq!(json["settings"]["limitOfNewEpisodes"], 5.0);
        assert!(json["episodes"][0].get("isFileSavedOffline").is_none());
    }

    #[test]
    fn partial_json_deserializes_with_defaults() {
        let configuration: Configuration =
            serde_json::from_str(r#"{"settings": {"volume": 1}}"#).unwrap();

        assert!(configuration.sources.is_empty());
        assert!(configuration.episodes.is_empty());
        assert_eq!(configuration.settings.len(), 1);
    }

    #[tokio::test]
    async fn override_then_read_round_trips() {
        let (engine, _) = engine();

        engine.override_configuration(sample()).await.unwrap();

        assert_eq!(engine.read_configuration().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn reset_leaves_empty_configuration() {
        let (engine, _) = engine();
        engine.override_configuration(sample()).await.unwrap();

        let reset = engine.reset_configuration().await.unwrap();

        assert!(reset.is_empty());
        assert!(engine.read_configuration().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merging_settings_is_first_write_wins() {
        let (engine, _) = engine();
        engine.set("proxyUrl", "https://local/$url$").await.unwrap();

        engine.merge_configurations(sample()).await.unwrap();
        engine.merge_configurations(sample()).await.unwrap();

        let settings = engine.read_configuration().await.unwrap().settings;
        assert_eq!(
            settings["proxyUrl"],
            SettingsValue::Text("https://local/$url$".to_string())
        );
        assert_eq!(settings["limitOfNewEpisodes"], SettingsValue::Number(5.0));
        assert_eq!(settings.len(), 2);
    }

    #[tokio::test]
    async fn merge_overwrites_records_with_same_uri() {
        let (engine, facade) = engine();
        let mut local = Episode::new("https://example.com/ep1");
        local.title = Some("Local".to_string());
        facade.write_episode(local).await.unwrap();

        engine.merge_configurations(sample()).await.unwrap();

        let episode = facade
            .read_episode("https://example.com/ep1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(episode.title.as_deref(), Some("Episode 1"));
        assert_eq!(episode.playback.current_time, 145.0);
    }

    #[tokio::test]
    async fn read_configuration_clears_offline_flag() {
        let (engine, facade) = engine();
        let mut episode = Episode::new("https://example.com/ep1");
        episode.is_file_saved_offline = true;
        facade.write_episode(episode).await.unwrap();

        let configuration = engine.read_configuration().await.unwrap();

        assert!(!configuration.episodes[0].is_file_saved_offline);
        // Stored record is untouched
        assert!(
            facade
                .read_episode("https://example.com/ep1")
                .await
                .unwrap()
                .unwrap()
                .is_file_saved_offline
        );
    }

    #[tokio::test]
    async fn get_falls_back_to_default() {
        let (engine, _) = engine();

        assert_eq!(
            engine.get("limitOfNewEpisodes", 5i64).await.unwrap(),
            SettingsValue::Number(5.0)
        );

        engine.set("limitOfNewEpisodes", 2i64).await.unwrap();
        assert_eq!(
            engine.get("limitOfNewEpisodes", 5i64).await.unwrap(),
            SettingsValue::Number(2.0)
        );
    }

    #[tokio::test]
    async fn export_and_import_between_installations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podcatcher.json");

        let (source_engine, _) = engine();
        source_engine.override_configuration(sample()).await.unwrap();
        source_engine.export_to_file(&path).await.unwrap();

        let (target_engine, _) = engine();
        target_engine.set("volume", 0.5).await.unwrap();
        target_engine
            .import_from_file(&path, ImportMode::Override)
            .await
            .unwrap();

        let imported = target_engine.read_configuration().await.unwrap();
        assert_eq!(imported, sample());
    }

    #[tokio::test]
    async fn import_of_invalid_json_fails_without_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ sources: ").unwrap();
        let (engine, _) = engine();
        engine.override_configuration(sample()).await.unwrap();

        let result = engine.import_from_file(&path, ImportMode::Override).await;

        assert!(matches!(
            result,
            Err(ConfigurationError::JsonParseFailed { .. })
        ));
        assert_eq!(engine.read_configuration().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn import_clamps_negative_playback_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"episodes": [{"uri": "ep1", "playback": {"currentTime": -30}}]}"#,
        )
        .unwrap();
        let (engine, storage) = engine();

        engine
            .import_from_file(&path, ImportMode::Merge)
            .await
            .unwrap();

        let episode = storage.read_episode("ep1").await.unwrap().unwrap();
        assert_eq!(episode.playback.current_time, 0.0);
    }

    #[tokio::test]
    async fn missing_provider_surfaces_as_storage_error() {
        let engine = ConfigurationEngine::new(Arc::new(StorageFacade::default()), Logger::default());

        assert!(matches!(
            engine.read_configuration().await,
            Err(ConfigurationError::Storage(
                StorageError::NoProviderRegistered { .. }
            ))
        ));
    }
}
