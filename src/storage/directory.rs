// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::model::{Episode, Source};

use super::provider::{DataStorageProvider, StorageProvider};

const SOURCES_DIR: &str = "sources";
const EPISODES_DIR: &str = "episodes";
const RECORD_EXTENSION: &str = "json";

/// Sources and episodes stored as one JSON document per record.
///
/// Layout: `<root>/sources/<key>.json` and `<root>/episodes/<key>.json`
/// where the key is the SHA-256 of the record URI. Documents are written to
/// a `.partial` file first and renamed into place.
#[derive(Debug)]
pub struct DirectoryDataProvider {
    root: PathBuf,
    priority: i32,
    supported: bool,
    write_lock: Mutex<()>,
}

impl DirectoryDataProvider {
    /// Create a provider rooted at `root`.
    ///
    /// Platform support is probed once here: the directory must exist or be
    /// creatable.
    pub fn new(root: impl Into<PathBuf>, priority: i32) -> Self {
        let root = root.into();
        let supported = std::fs::create_dir_all(&root).is_ok();
        Self {
            root,
            priority,
            supported,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    fn episodes_dir(&self) -> PathBuf {
        self.root.join(EPISODES_DIR)
    }

    async fn write_record<T: Serialize>(
        &self,
        dir: &Path,
        uri: &str,
        record: &T,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(record)?;
        let key = record_key(uri);
        let path = dir.join(format!("{key}.{RECORD_EXTENSION}"));
        let partial = dir.join(format!("{key}.{RECORD_EXTENSION}.partial"));

        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        tokio::fs::write(&partial, json)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: partial.clone(),
                source: e,
            })?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StorageError::WriteFailed { path, source: e })
    }

    async fn remove_record(&self, dir: &Path, uri: &str) -> Result<(), StorageError> {
        let path = dir.join(format!("{}.{RECORD_EXTENSION}", record_key(uri)));
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed { path, source: e }),
        }
    }

    async fn remove_dir(&self, dir: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// File name stem for a record URI
pub(crate) fn record_key(uri: &str) -> String {
    format!("{:x}", Sha256::digest(uri.as_bytes()))
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StorageError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| StorageError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Read every record in `dir`. A missing directory holds no records.
async fn read_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StorageError::ReadFailed {
                path: dir.to_path_buf(),
                source: e,
            });
        }
    };

    let mut records = Vec::new();
    loop {
        let entry = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        let Some(entry) = entry else { break };

        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        if let Some(record) = read_record(&path).await? {
            records.push(record);
        }
    }

    Ok(records)
}

impl StorageProvider for DirectoryDataProvider {
    fn name(&self) -> &str {
        "directory data storage"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported
    }
}

#[async_trait]
impl DataStorageProvider for DirectoryDataProvider {
    async fn read_source(&self, uri: &str) -> Result<Option<Source>, StorageError> {
        let path = self
            .sources_dir()
            .join(format!("{}.{RECORD_EXTENSION}", record_key(uri)));
        read_record(&path).await
    }

    async fn read_sources(&self) -> Result<Vec<Source>, StorageError> {
        let mut sources: Vec<Source> = read_all(&self.sources_dir()).await?;
        sources.sort_by(Source::title_order);
        Ok(sources)
    }

    async fn write_source(&self, source: Source) -> Result<Source, StorageError> {
        self.write_record(&self.sources_dir(), &source.uri, &source)
            .await?;
        Ok(source)
    }

    async fn delete_source(&self, source: &Source) -> Result<(), StorageError> {
        self.remove_record(&self.sources_dir(), &source.uri).await
    }

    async fn read_episode(&self, uri: &str) -> Result<Option<Episode>, StorageError> {
        let path = self
            .episodes_dir()
            .join(format!("{}.{RECORD_EXTENSION}", record_key(uri)));
        read_record(&path).await
    }

    async fn read_playlist(&self, include_all: bool) -> Result<Vec<Episode>, StorageError> {
        let mut playlist: Vec<Episode> = read_all(&self.episodes_dir()).await?;
        playlist.retain(|episode| include_all || !episode.playback.is_played());
        playlist.sort_by(Episode::playlist_order);
        Ok(playlist)
    }

    async fn read_episodes_by_source(&self, source: &Source) -> Result<Vec<Episode>, StorageError> {
        let mut episodes: Vec<Episode> = read_all(&self.episodes_dir()).await?;
        episodes.retain(|episode| episode.source.as_deref() == Some(source.uri.as_str()));
        episodes.sort_by(Episode::playlist_order);
        Ok(episodes)
    }

    async fn write_episode(&self, episode: Episode) -> Result<Episode, StorageError> {
        self.write_record(&self.episodes_dir(), &episode.uri, &episode)
            .await?;
        Ok(episode)
    }

    async fn clean_storage(&self) -> Result<(), StorageError> {
        self.remove_dir(&self.sources_dir()).await?;
        self.remove_dir(&self.episodes_dir()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_episode(uri: &str, played: Option<bool>) -> Episode {
        let mut episode = Episode::new(uri);
        episode.title = Some(format!("Title of {uri}"));
        episode.source = Some("https://example.com/feed.xml".to_string());
        episode.playback.played = played;
        episode
    }

    #[test]
    fn record_key_is_stable_hex_digest() {
        let key = record_key("https://example.com/ep1");
        assert_eq!(key.len(), 64);
        assert_eq!(key, record_key("https://example.com/ep1"));
        assert_ne!(key, record_key("https://example.com/ep2"));
    }

    #[test]
    fn creates_missing_root_and_reports_support() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("store");

        let provider = DirectoryDataProvider::new(&root, 10);

        assert!(root.exists());
        assert!(provider.is_supported_by_current_platform());
    }

    #[test]
    fn unusable_root_is_not_supported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let provider = DirectoryDataProvider::new(blocker.join("store"), 10);

        assert!(!provider.is_supported_by_current_platform());
    }

    #[tokio::test]
    async fn source_round_trip() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);
        let mut source = Source::new("https://example.com/feed.xml");
        source.title = Some("Test Podcast".to_string());

        provider.write_source(source.clone()).await.unwrap();

        assert_eq!(
            provider.read_source(&source.uri).await.unwrap(),
            Some(source.clone())
        );
        assert_eq!(provider.read_sources().await.unwrap(), vec![source]);
        assert!(provider.read_source("https://unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn episode_overwrite_keeps_single_record() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);

        provider.write_episode(make_episode("ep1", None)).await.unwrap();
        let mut updated = make_episode("ep1", None);
        updated.playback.current_time = 145.0;
        provider.write_episode(updated).await.unwrap();

        let playlist = provider.read_playlist(true).await.unwrap();
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist[0].playback.current_time, 145.0);
    }

    #[tokio::test]
    async fn concurrent_bulk_write_stores_every_episode() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);
        let episodes: Vec<_> = (0..20)
            .map(|i| make_episode(&format!("ep{i}"), Some(i % 2 == 0)))
            .collect();

        provider.write_episodes(episodes).await.unwrap();

        assert_eq!(provider.read_playlist(true).await.unwrap().len(), 20);
        assert_eq!(provider.read_playlist(false).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn read_ignores_leftover_partial_files() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);
        provider.write_episode(make_episode("ep1", None)).await.unwrap();
        std::fs::write(
            dir.path().join(EPISODES_DIR).join("abc.json.partial"),
            b"{ truncated",
        )
        .unwrap();

        assert_eq!(provider.read_playlist(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);
        let episodes_dir = dir.path().join(EPISODES_DIR);
        std::fs::create_dir_all(&episodes_dir).unwrap();
        std::fs::write(episodes_dir.join("broken.json"), b"{ not json").unwrap();

        assert!(matches!(
            provider.read_playlist(true).await,
            Err(StorageError::JsonParseFailed { .. })
        ));
    }

    #[tokio::test]
    async fn clean_storage_removes_everything() {
        let dir = tempdir().unwrap();
        let provider = DirectoryDataProvider::new(dir.path(), 0);
        provider
            .write_source(Source::new("https://example.com/feed.xml"))
            .await
            .unwrap();
        provider.write_episode(make_episode("ep1", None)).await.unwrap();

        provider.clean_storage().await.unwrap();
        // Cleaning twice is fine
        provider.clean_storage().await.unwrap();

        assert!(provider.read_sources().await.unwrap().is_empty());
        assert!(provider.read_playlist(true).await.unwrap().is_empty());
    }
}
