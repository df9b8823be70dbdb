// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::http::ByteStream;
use crate::model::{Episode, Source};
use crate::progress::SharedProgressReporter;

/// The three independent storage capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Data,
    File,
    Settings,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Data => "data",
            Capability::File => "file",
            Capability::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// Capability profile shared by every storage backend
pub trait StorageProvider: Send + Sync {
    /// Human readable name used in logs and errors
    fn name(&self) -> &str;

    /// Higher wins when several providers are usable
    fn priority(&self) -> i32;

    /// Whether the backend can be used on this platform right now
    fn is_supported_by_current_platform(&self) -> bool;

    /// Error for a capability method this backend does not implement
    fn unsupported(&self, operation: &'static str) -> StorageError {
        StorageError::UnsupportedOperation {
            provider: self.name().to_string(),
            operation,
        }
    }
}

/// A user setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for SettingsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsValue::Number(number) => write!(f, "{number}"),
            SettingsValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for SettingsValue {
    fn from(value: &str) -> Self {
        SettingsValue::Text(value.to_string())
    }
}

impl From<String> for SettingsValue {
    fn from(value: String) -> Self {
        SettingsValue::Text(value)
    }
}

impl From<f64> for SettingsValue {
    fn from(value: f64) -> Self {
        SettingsValue::Number(value)
    }
}

impl From<i64> for SettingsValue {
    fn from(value: i64) -> Self {
        SettingsValue::Number(value as f64)
    }
}

/// All user settings, ordered by key
pub type Settings = BTreeMap<String, SettingsValue>;

/// Options passed to a file storage provider on initialisation
#[derive(Debug, Clone, Default)]
pub struct FileStorageOptions {
    /// Maximum number of bytes a single saved file may occupy
    pub quota_bytes: Option<u64>,
}

/// Media content handed to a file storage provider
pub struct FileContent {
    /// Content-Length of the transfer, if known
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl FileContent {
    /// Content that is already fully in memory
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let content_length = Some(bytes.len() as u64);
        let body: ByteStream = Box::pin(futures::stream::once(async move {
            Ok::<Bytes, reqwest::Error>(bytes)
        }));
        Self {
            content_length,
            body,
        }
    }
}

/// Storage for sources and episodes
#[async_trait]
pub trait DataStorageProvider: StorageProvider {
    /// Read a single source, `None` if unknown
    async fn read_source(&self, _uri: &str) -> Result<Option<Source>, StorageError> {
        Err(self.unsupported("read_source"))
    }

    async fn read_sources(&self) -> Result<Vec<Source>, StorageError> {
        Err(self.unsupported("read_sources"))
    }

    async fn write_source(&self, _source: Source) -> Result<Source, StorageError> {
        Err(self.unsupported("write_source"))
    }

    /// Write all sources, one write per element.
    ///
    /// Not atomic: when only some writes succeed the result is
    /// [`StorageError::PartialBatchFailure`].
    async fn write_sources(&self, sources: Vec<Source>) -> Result<Vec<Source>, StorageError> {
        let writes = sources.into_iter().map(|source| self.write_source(source));
        collect_batch(join_all(writes).await)
    }

    async fn delete_source(&self, _source: &Source) -> Result<(), StorageError> {
        Err(self.unsupported("delete_source"))
    }

    /// Read a single episode, `None` if unknown
    async fn read_episode(&self, _uri: &str) -> Result<Option<Episode>, StorageError> {
        Err(self.unsupported("read_episode"))
    }

    /// Episodes in playlist order. Without `include_all` only unplayed ones.
    async fn read_playlist(&self, _include_all: bool) -> Result<Vec<Episode>, StorageError> {
        Err(self.unsupported("read_playlist"))
    }

    async fn read_episodes_by_source(&self, _source: &Source) -> Result<Vec<Episode>, StorageError> {
        Err(self.unsupported("read_episodes_by_source"))
    }

    async fn write_episode(&self, _episode: Episode) -> Result<Episode, StorageError> {
        Err(self.unsupported("write_episode"))
    }

    /// Write all episodes, one write per element. Same failure mode as
    /// [`DataStorageProvider::write_sources`].
    async fn write_episodes(&self, episodes: Vec<Episode>) -> Result<Vec<Episode>, StorageError> {
        let writes = episodes.into_iter().map(|episode| self.write_episode(episode));
        collect_batch(join_all(writes).await)
    }

    /// Delete every source and episode
    async fn clean_storage(&self) -> Result<(), StorageError> {
        Err(self.unsupported("clean_storage"))
    }
}

/// Storage for media files of episodes
#[async_trait]
pub trait FileStorageProvider: StorageProvider {
    async fn init(&self, _options: &FileStorageOptions) -> Result<(), StorageError> {
        Ok(())
    }

    /// Resolve the local media reference of a saved episode
    async fn open_file(&self, _episode: Episode) -> Result<Episode, StorageError> {
        Err(self.unsupported("open_file"))
    }

    /// Store the media content of an episode.
    ///
    /// Reports progress while transferring. On completion the provider itself
    /// writes the episode with `is_file_saved_offline` and `offline_media_url`
    /// set through `data`; callers must not write it again.
    async fn save_file(
        &self,
        _episode: Episode,
        _content: FileContent,
        _data: &dyn DataStorageProvider,
        _progress: &SharedProgressReporter,
    ) -> Result<Episode, StorageError> {
        Err(self.unsupported("save_file"))
    }

    /// Remove the media file of an episode and write the cleared record
    /// through `data`
    async fn delete_file(
        &self,
        _episode: Episode,
        _data: &dyn DataStorageProvider,
    ) -> Result<Episode, StorageError> {
        Err(self.unsupported("delete_file"))
    }

    async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        Err(self.unsupported("list_files"))
    }

    async fn clean_storage(&self) -> Result<(), StorageError> {
        Err(self.unsupported("clean_storage"))
    }
}

/// Key/value storage for user settings
#[async_trait]
pub trait SettingsStorageProvider: StorageProvider {
    async fn read_settings_value(&self, _key: &str) -> Result<Option<SettingsValue>, StorageError> {
        Err(self.unsupported("read_settings_value"))
    }

    async fn write_settings_value(
        &self,
        _key: &str,
        _value: SettingsValue,
    ) -> Result<(), StorageError> {
        Err(self.unsupported("write_settings_value"))
    }

    async fn list_settings(&self) -> Result<Settings, StorageError> {
        Err(self.unsupported("list_settings"))
    }

    async fn clear_settings(&self) -> Result<(), StorageError> {
        Err(self.unsupported("clear_settings"))
    }
}

/// Fold the settled results of a fan-out write.
///
/// All succeeded → the written records. Nothing succeeded → the first error.
/// Otherwise a partial failure carrying every error message.
pub(crate) fn collect_batch<T>(results: Vec<Result<T, StorageError>>) -> Result<Vec<T>, StorageError> {
    let mut written = Vec::with_capacity(results.len());
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(record) => written.push(record),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        return Ok(written);
    }

    if written.is_empty() {
        // Non-empty, checked above
        return Err(errors.remove(0));
    }

    Err(StorageError::PartialBatchFailure {
        succeeded: written.len(),
        failed: errors.len(),
        errors: errors.iter().map(ToString::to_string).collect(),
    })
}
