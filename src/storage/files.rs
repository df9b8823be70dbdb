// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use url::Url;

use crate::error::StorageError;
use crate::model::Episode;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::{file_key, media_filename};
use super::provider::{
    DataStorageProvider, FileContent, FileStorageOptions, FileStorageProvider, StorageProvider,
};

const PARTIAL_SUFFIX: &str = ".partial";

/// Episode media files stored in a local directory.
///
/// Files are named after the episode (see [`media_filename`]) and found again
/// by the URI digest prefix of that name. Transfers go to a `.partial` file
/// that is renamed once complete.
#[derive(Debug)]
pub struct DirectoryFileProvider {
    dir: PathBuf,
    priority: i32,
    supported: bool,
    options: RwLock<FileStorageOptions>,
}

impl DirectoryFileProvider {
    pub fn new(dir: impl Into<PathBuf>, priority: i32) -> Self {
        let dir = dir.into();
        let supported = std::fs::create_dir_all(&dir).is_ok();
        Self {
            dir,
            priority,
            supported,
            options: RwLock::new(FileStorageOptions::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Completed media files in the directory
    async fn media_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: self.dir.clone(),
                    source: e,
                });
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?
        {
            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_partial && is_file {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Stored files of an episode, normally at most one
    async fn files_of(&self, episode: &Episode) -> Result<Vec<PathBuf>, StorageError> {
        let prefix = format!("{}-", file_key(episode));
        let mut files = self.media_files().await?;
        files.retain(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        });
        Ok(files)
    }

    async fn remove_files_of(&self, episode: &Episode) -> Result<(), StorageError> {
        for path in self.files_of(episode).await? {
            remove_file(&path).await?;
        }
        Ok(())
    }

    /// Delete `.partial` leftovers of interrupted transfers
    async fn remove_partial_files(&self) -> Result<usize, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?
        {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX))
                && tokio::fs::remove_file(&path).await.is_ok()
            {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn stream_to_file(
        &self,
        episode: &Episode,
        content: FileContent,
        path: &Path,
        progress: &SharedProgressReporter,
    ) -> Result<u64, StorageError> {
        let quota = self.options.read().await.quota_bytes;
        if let (Some(quota_bytes), Some(size)) = (quota, content.content_length)
            && size > quota_bytes
        {
            return Err(StorageError::QuotaExceeded { size, quota_bytes });
        }

        let mut file = File::create(path)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut bytes_written: u64 = 0;
        let mut stream = content.body;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::ExternalFetchFailure {
                url: episode
                    .media_url
                    .clone()
                    .unwrap_or_else(|| episode.uri.clone()),
                reason: e.to_string(),
            })?;

            bytes_written += chunk.len() as u64;
            if let Some(quota_bytes) = quota
                && bytes_written > quota_bytes
            {
                return Err(StorageError::QuotaExceeded {
                    size: bytes_written,
                    quota_bytes,
                });
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::WriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;

            progress.report(ProgressEvent::FileSaveProgress {
                episode_uri: episode.uri.clone(),
                bytes_written,
                total_bytes: content.content_length,
            });
        }

        file.flush().await.map_err(|e| StorageError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(bytes_written)
    }
}

/// `file://` URL of a stored media file
fn file_url(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|()| path.display().to_string())
}

async fn remove_file(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::DeleteFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

impl StorageProvider for DirectoryFileProvider {
    fn name(&self) -> &str {
        "directory file storage"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_supported_by_current_platform(&self) -> bool {
        self.supported
    }
}

#[async_trait]
impl FileStorageProvider for DirectoryFileProvider {
    async fn init(&self, options: &FileStorageOptions) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: self.dir.clone(),
                source: e,
            })?;
        self.remove_partial_files().await?;
        *self.options.write().await = options.clone();
        Ok(())
    }

    async fn open_file(&self, mut episode: Episode) -> Result<Episode, StorageError> {
        let Some(path) = self.files_of(&episode).await?.pop() else {
            return Err(StorageError::FileNotFound { uri: episode.uri });
        };
        episode.offline_media_url = Some(file_url(&path));
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

        let path = self.dir.join(media_filename(&episode));
        let partial = self
            .dir
            .join(format!("{}{PARTIAL_SUFFIX}", media_filename(&episode)));

        let bytes_written = match self
            .stream_to_file(&episode, content, &partial, progress)
            .await
        {
            Ok(bytes_written) => bytes_written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        // A title change renames the file, drop the previous one
        self.remove_files_of(&episode).await?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        episode.is_file_saved_offline = true;
        episode.offline_media_url = Some(file_url(&path));
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
        self.remove_files_of(&episode).await?;
        episode.is_file_saved_offline = false;
        episode.offline_media_url = None;
        data.write_episode(episode).await
    }

    async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .media_files()
            .await?
            .iter()
            .map(|path| file_url(path))
            .collect())
    }

    async fn clean_storage(&self) -> Result<(), StorageError> {
        for path in self.media_files().await? {
            remove_file(&path).await?;
        }
        self.remove_partial_files().await?;
        Ok(())
    }
}
