use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::model::{Episode, Source};
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::provider::{
    DataStorageProvider, FileContent, FileStorageProvider, Settings, SettingsStorageProvider,
    SettingsValue, StorageProvider,
};

/// Platform support switch shared by the in-memory providers.
///
/// Memory is always available; the switch exists so callers can take a
/// provider out of selection at runtime.
#[derive(Debug)]
struct Support(AtomicBool);

impl Support {
    fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, supported: bool) {
        self.0.store(supported, Ordering::SeqCst);
    }
}

/// Sources and episodes kept in process memory
#[derive(Debug)]
pub struct MemoryDataProvider {
    name: String,
    priority: i32,
    supported: Support,
    sources: RwLock<BTreeMap<String, Source>>,
    episodes: RwLock<BTreeMap<String, Episode>>,
}

impl MemoryDataProvider {
    pub fn new(priority: i32) -> Self {
        Self {
            name: "memory data storage".to_string(),
            priority,
            supported: Support::new(),
            sources: RwLock::new(BTreeMap::new()),
            episodes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }
}

impl StorageProvider for MemoryDataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported.get()
    }
}

#[async_trait]
impl DataStorageProvider for MemoryDataProvider {
    async fn read_source(&self, uri: &str) -> Result<Option<Source>, StorageError> {
        Ok(self.sources.read().await.get(uri).cloned())
    }

    async fn read_sources(&self) -> Result<Vec<Source>, StorageError> {
        let mut sources: Vec<_> = self.sources.read().await.values().cloned().collect();
        sources.sort_by(Source::title_order);
        Ok(sources)
    }

    async fn write_source(&self, source: Source) -> Result<Source, StorageError> {
        self.sources
            .write()
            .await
            .insert(source.uri.clone(), source.clone());
        Ok(source)
    }

    async fn delete_source(&self, source: &Source) -> Result<(), StorageError> {
        self.sources.write().await.remove(&source.uri);
        Ok(())
    }

    async fn read_episode(&self, uri: &str) -> Result<Option<Episode>, StorageError> {
        Ok(self.episodes.read().await.get(uri).cloned())
    }

    async fn read_playlist(&self, include_all: bool) -> Result<Vec<Episode>, StorageError> {
        let mut playlist: Vec<_> = self
            .episodes
            .read()
            .await
            .values()
            .filter(|episode| include_all || !episode.playback.is_played())
            .cloned()
            .collect();
        playlist.sort_by(Episode::playlist_order);
        Ok(playlist)
    }

    async fn read_episodes_by_source(&self, source: &Source) -> Result<Vec<Episode>, StorageError> {
        let mut episodes: Vec<_> = self
            .episodes
            .read()
            .await
            .values()
            .filter(|episode| episode.source.as_deref() == Some(source.uri.as_str()))
            .cloned()
            .collect();
        episodes.sort_by(Episode::playlist_order);
        Ok(episodes)
    }

    async fn write_episode(&self, episode: Episode) -> Result<Episode, StorageError> {
        self.episodes
            .write()
            .await
            .insert(episode.uri.clone(), episode.clone());
        Ok(episode)
    }

    async fn clean_storage(&self) -> Result<(), StorageError> {
        self.sources.write().await.clear();
        self.episodes.write().await.clear();
        Ok(())
    }
}

/// User settings kept in process memory
#[derive(Debug)]
pub struct MemorySettingsProvider {
    priority: i32,
    supported: Support,
    values: RwLock<Settings>,
}

impl MemorySettingsProvider {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            supported: Support::new(),
            values: RwLock::new(Settings::new()),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }
}

impl StorageProvider for MemorySettingsProvider {
    fn name(&self) -> &str {
        "memory settings storage"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported.get()
    }
}

#[async_trait]
impl SettingsStorageProvider for MemorySettingsProvider {
    async fn read_settings_value(&self, key: &str) -> Result<Option<SettingsValue>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write_settings_value(
        &self,
        key: &str,
        value: SettingsValue,
    ) -> Result<(), StorageError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn list_settings(&self) -> Result<Settings, StorageError> {
        Ok(self.values.read().await.clone())
    }

    async fn clear_settings(&self) -> Result<(), StorageError> {
        self.values.write().await.clear();
        Ok(())
    }
}

/// Media files kept in process memory, keyed by episode URI
#[derive(Debug)]
pub struct MemoryFileProvider {
    priority: i32,
    supported: Support,
    files: RwLock<BTreeMap<String, bytes::Bytes>>,
}

impl MemoryFileProvider {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            supported: Support::new(),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }

    /// Stored content of an episode, if any
    pub async fn content(&self, uri: &str) -> Option<bytes::Bytes> {
        self.files.read().await.get(uri).cloned()
    }

    fn media_url(uri: &str) -> String {
        format!("memory://{uri}")
    }
}

impl StorageProvider for MemoryFileProvider {
    fn name(&self) -> &str {
        "memory file storage"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported.get()
    }
}

#[async_trait]
impl FileStorageProvider for MemoryFileProvider {
    async fn open_file(&self, mut episode: Episode) -> Result<Episode, StorageError> {
        if !self.files.read().await.contains_key(&episode.uri) {
            return Err(StorageError::FileNotFound { uri: episode.uri });
        }
        episode.offline_media_url = Some(Self::media_url(&episode.uri));
        Ok(episode)
    }

    async fn save_file(
        &self,
        mut episode: Episode,
        content: FileContent,
        data: &dyn DataStorageProvider,
        progress: &SharedProgressReporter,
    ) -> Result<Episode, StorageError> {
        progress.report(ProgressEvent::FileSaveStarting {
            episode_uri: episode.uri.clone(),
            episode_title: episode.display_title().to_string(),
            content_length: content.content_length,
        });

        let mut buffer = BytesMut::new();
        let mut stream = content.body;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::ExternalFetchFailure {
                url: episode.media_url.clone().unwrap_or_else(|| episode.uri.clone()),
                reason: e.to_string(),
            })?;
            buffer.extend_from_slice(&chunk);
            progress.report(ProgressEvent::FileSaveProgress {
                episode_uri: episode.uri.clone(),
                bytes_written: buffer.len() as u64,
                total_bytes: content.content_length,
            });
        }

        let bytes_written = buffer.len() as u64;
        self.files
            .write()
            .await
            .insert(episode.uri.clone(), buffer.freeze());

        episode.is_file_saved_offline = true;
        episode.offline_media_url = Some(Self::media_url(&episode.uri));
        let episode = data.write_episode(episode).await?;

        progress.report(ProgressEvent::FileSaveCompleted {
            episode_uri: episode.uri.clone(),
            episode_title: episode.display_title().to_string(),
            bytes_written,
        });

        Ok(episode)
    }

    async fn delete_file(
        &self,
        mut episode: Episode,
        data: &dyn DataStorageProvider,
    ) -> Result<Episode, StorageError> {
        self.files.write().await.remove(&episode.uri);
        episode.is_file_saved_offline = false;
        episode.offline_media_url = None;
        data.write_episode(episode).await
    }

    async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .files
            .read()
            .await
            .keys()
            .map(|uri| Self::media_url(uri))
            .collect())
    }

    async fn clean_storage(&self) -> Result<(), StorageError> {
        self.files.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingReporter;
    use std::sync::Arc;

    fn episode(uri: &str, played: Option<bool>) -> Episode {
        let mut episode = Episode::new(uri);
        episode.title = Some(uri.to_string());
        episode.source = Some("https://example.com/feed".to_string());
        episode.playback.played = played;
        episode
    }

    #[tokio::test]
    async fn read_playlist_filters_played_unless_all_requested() {
        let provider = MemoryDataProvider::new(0);
        provider
            .write_episodes(vec![
                episode("a", None),
                episode("b", Some(true)),
                episode("c", Some(false)),
            ])
            .await
            .unwrap();

        let unplayed = provider.read_playlist(false).await.unwrap();
        let uris: Vec<_> = unplayed.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["a", "c"]);

        assert_eq!(provider.read_playlist(true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn read_episodes_by_source_matches_source_uri() {
        let provider = MemoryDataProvider::new(0);
        let mut foreign = episode("x", None);
        foreign.source = Some("https://other.example.com/feed".to_string());
        provider
            .write_episodes(vec![episode("a", None), foreign])
            .await
            .unwrap();

        let episodes = provider
            .read_episodes_by_source(&Source::new("https://example.com/feed"))
            .await
            .unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].uri, "a");
    }

    #[tokio::test]
    async fn delete_source_keeps_episodes() {
        let provider = MemoryDataProvider::new(0);
        let source = Source::new("https://example.com/feed");
        provider.write_source(source.clone()).await.unwrap();
        provider.write_episode(episode("a", None)).await.unwrap();

        provider.delete_source(&source).await.unwrap();

        assert!(provider.read_source(&source.uri).await.unwrap().is_none());
        assert!(provider.read_episode("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let provider = MemorySettingsProvider::new(0);
        provider
            .write_settings_value("proxyUrl", "https://proxy/$url$".into())
            .await
            .unwrap();

        assert_eq!(
            provider.read_settings_value("proxyUrl").await.unwrap(),
            Some(SettingsValue::Text("https://proxy/$url$".to_string()))
        );
        assert!(provider.read_settings_value("missing").await.unwrap().is_none());

        provider.clear_settings().await.unwrap();
        assert!(provider.list_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_file_reports_progress_and_persists_episode() {
        let files = MemoryFileProvider::new(0);
        let data = MemoryDataProvider::new(0);
        let reporter = Arc::new(RecordingReporter::default());
        let shared: SharedProgressReporter = reporter.clone();

        let saved = files
            .save_file(
                episode("a", None),
                FileContent::from_bytes(&b"audio bytes"[..]),
                &data,
                &shared,
            )
            .await
            .unwrap();

        assert_eq!(files.content("a").await.unwrap().as_ref(), b"audio bytes");
        assert_eq!(saved.offline_media_url.as_deref(), Some("memory://a"));
        assert!(data.read_episode("a").await.unwrap().unwrap().is_file_saved_offline);

        let events = reporter.events();
        assert!(matches!(events.first(), Some(ProgressEvent::FileSaveStarting { .. })));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::FileSaveCompleted {
                bytes_written: 11,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn open_file_fails_for_unknown_episode() {
        let files = MemoryFileProvider::new(0);
        assert!(matches!(
            files.open_file(episode("a", None)).await,
            Err(StorageError::FileNotFound { .. })
        ));
    }
}
