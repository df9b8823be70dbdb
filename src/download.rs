// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use futures::StreamExt;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::model::Episode;
use crate::progress::SharedProgressReporter;
use crate::storage::{FileContent, StorageFacade};

/// Result of downloading several episodes
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Episodes now saved offline
    pub saved: Vec<Episode>,
    /// Episode URI and error message per failed download
    pub failed: Vec<(String, String)>,
}

/// Download the media of an episode into file storage.
///
/// The response body is streamed into the active file provider, which stores
/// the updated episode record. Returns that record.
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    storage: &StorageFacade,
    episode: Episode,
    reporter: &SharedProgressReporter,
) -> Result<Episode, DownloadError> {
    let url = episode
        .media_url
        .clone()
        .ok_or_else(|| DownloadError::MissingMediaUrl {
            uri: episode.uri.clone(),
        })?;

    let response = client
        .get_stream(&url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.clone(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(DownloadError::HttpStatus {
            url,
            status: response.status,
        });
    }

    let content = FileContent {
        content_length: response.content_length,
        body: response.body,
    };

    Ok(storage.save_file(episode, content, reporter).await?)
}

/// Download several episodes, at most `max_concurrent` at a time.
///
/// Failures are collected per episode and do not stop the other downloads.
pub async fn download_episodes<C: HttpClient + ?Sized>(
    client: &C,
    storage: &StorageFacade,
    episodes: Vec<Episode>,
    max_concurrent: usize,
    reporter: &SharedProgressReporter,
) -> DownloadReport {
    let results: Vec<_> = futures::stream::iter(episodes)
        .map(|episode| async move {
            let uri = episode.uri.clone();
            (uri, download_episode(client, storage, episode, reporter).await)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut report = DownloadReport::default();
    for (uri, result) in results {
        match result {
            Ok(episode) => report.saved.push(episode),
            Err(e) => report.failed.push((uri, e.to_string())),
        }
    }
    report
}
