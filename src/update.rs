// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use url::Url;

use crate::error::{FeedError, StorageError, UpdateError};
use crate::feed::{ParsedFeed, fetch_chapters, fetch_feed, is_known_chapter_format};
use crate::http::HttpClient;
use crate::logging::Logger;
use crate::model::{Episode, Source};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::storage::{Settings, SettingsValue, StorageFacade, collect_batch};

/// Settings key holding the number of newest episodes left unplayed
pub const LIMIT_OF_NEW_EPISODES_KEY: &str = "limitOfNewEpisodes";

/// Settings key holding the proxy URL pattern
pub const PROXY_URL_KEY: &str = "proxyUrl";

/// Options for refreshing sources
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Episodes beyond the newest `limit_of_new_episodes` are marked played
    /// when they are seen for the first time. Must not be negative.
    pub limit_of_new_episodes: i64,
    /// Maximum number of sources refreshed at the same time
    pub max_concurrent: usize,
    /// Proxy used when a direct fetch fails, `$url$` marks the target
    pub proxy_url_pattern: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            limit_of_new_episodes: 5,
            max_concurrent: 3,
            proxy_url_pattern: None,
        }
    }
}

impl UpdateOptions {
    /// Defaults overlaid with the user's stored settings
    pub fn from_settings(settings: &Settings) -> Self {
        let mut options = Self::default();

        match settings.get(LIMIT_OF_NEW_EPISODES_KEY) {
            Some(SettingsValue::Number(limit)) if limit.is_finite() => {
                options.limit_of_new_episodes = *limit as i64;
            }
            Some(SettingsValue::Text(limit)) => {
                if let Ok(limit) = limit.trim().parse() {
                    options.limit_of_new_episodes = limit;
                }
            }
            _ => {}
        }

        if let Some(SettingsValue::Text(pattern)) = settings.get(PROXY_URL_KEY)
            && !pattern.trim().is_empty()
        {
            options.proxy_url_pattern = Some(pattern.trim().to_string());
        }

        options
    }
}

/// Outcome of reconciling one source with its feed
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    /// The stored, refreshed source
    pub source: Source,
    /// Episodes merged into storage
    pub merged_episodes: usize,
    /// Episodes auto-marked as played
    pub marked_played: usize,
    /// Episodes whose jump points were loaded from an external document
    pub chapters_loaded: usize,
}

/// Result of refreshing all sources
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub succeeded: Vec<SourceUpdate>,
    /// Source URI and error message per failed source
    pub failed: Vec<(String, String)>,
}

impl RefreshReport {
    /// Whether every source was refreshed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What happened to a single episode during a merge
#[derive(Debug, Clone, Copy, Default)]
struct EpisodeMerge {
    marked_played: bool,
    chapters_loaded: bool,
}

/// Reconciles stored sources and episodes with freshly fetched feeds.
///
/// Feed content always wins over stored content. Playback state is local
/// and survives every refresh, except that episodes never touched by the
/// user and older than the newest `limit_of_new_episodes` are marked played.
#[derive(Clone)]
pub struct FeedUpdater {
    storage: Arc<StorageFacade>,
    client: Arc<dyn HttpClient>,
    logger: Logger,
}

fn validate(options: &UpdateOptions) -> Result<(), UpdateError> {
    if options.limit_of_new_episodes < 0 {
        return Err(UpdateError::InvalidArgument {
            name: "limit_of_new_episodes",
            reason: format!("must not be negative, got {}", options.limit_of_new_episodes),
        });
    }
    Ok(())
}

impl FeedUpdater {
    pub fn new(storage: Arc<StorageFacade>, client: Arc<dyn HttpClient>, logger: Logger) -> Self {
        Self {
            storage,
            client,
            logger: logger.for_module("update"),
        }
    }

    /// Add a source by feed URI and load its episodes
    pub async fn subscribe(
        &self,
        uri: &str,
        options: &UpdateOptions,
        reporter: &SharedProgressReporter,
    ) -> Result<SourceUpdate, UpdateError> {
        validate(options)?;
        Url::parse(uri).map_err(FeedError::InvalidUrl)?;

        let source = match self.storage.read_source(uri).await? {
            Some(existing) => existing,
            None => self.storage.write_source(Source::new(uri)).await?,
        };
        self.logger.note(format!("Subscribed to {uri}"));

        self.update_source(&source, options, reporter).await
    }

    /// Fetch the feed of `source` and merge it into storage.
    ///
    /// Nothing is written when the feed cannot be fetched or parsed.
    pub async fn update_source(
        &self,
        source: &Source,
        options: &UpdateOptions,
        reporter: &SharedProgressReporter,
    ) -> Result<SourceUpdate, UpdateError> {
        validate(options)?;

        reporter.report(ProgressEvent::FetchingFeed {
            url: source.uri.clone(),
        });
        let parsed = fetch_feed(
            self.client.as_ref(),
            source,
            options.proxy_url_pattern.as_deref(),
        )
        .await?;

        reporter.report(ProgressEvent::FeedParsed {
            source_uri: parsed.source.uri.clone(),
            source_title: parsed.source.display_title().to_string(),
            total_episodes: parsed.episodes.len(),
        });

        let update = self.merge_parsed_feed(parsed, options).await?;

        reporter.report(ProgressEvent::SourceUpdated {
            source_uri: update.source.uri.clone(),
            merged_episodes: update.merged_episodes,
            marked_played: update.marked_played,
        });

        Ok(update)
    }

    /// Merge an already parsed feed into storage.
    ///
    /// Episodes are merged concurrently. The feed's episode order decides
    /// which episodes count as new: the last `limit_of_new_episodes` ones.
    /// The source record is written after all episodes were stored.
    pub async fn merge_parsed_feed(
        &self,
        parsed: ParsedFeed,
        options: &UpdateOptions,
    ) -> Result<SourceUpdate, UpdateError> {
        validate(options)?;

        let total = parsed.episodes.len() as i64;
        let proxy = options.proxy_url_pattern.as_deref();

        let merges = parsed.episodes.iter().enumerate().map(|(index, episode)| {
            let force_played = (index as i64) < total - options.limit_of_new_episodes;
            self.merge_episode(episode, force_played, proxy)
        });
        let merged = collect_batch(join_all(merges).await)?;

        let source = self.storage.write_source(parsed.source).await?;

        let update = SourceUpdate {
            source,
            merged_episodes: merged.len(),
            marked_played: merged.iter().filter(|merge| merge.marked_played).count(),
            chapters_loaded: merged.iter().filter(|merge| merge.chapters_loaded).count(),
        };

        self.logger.info(format!(
            "Updated {}: {} episodes, {} marked played",
            update.source.display_title(),
            update.merged_episodes,
            update.marked_played
        ));

        Ok(update)
    }

    /// Refresh every stored source, at most `max_concurrent` at a time.
    ///
    /// A failing source does not affect the others.
    pub async fn update_all_sources(
        &self,
        options: &UpdateOptions,
        reporter: &SharedProgressReporter,
    ) -> Result<RefreshReport, UpdateError> {
        validate(options)?;
        let sources = self.storage.read_sources().await?;

        let results: Vec<_> = futures::stream::iter(sources)
            .map(|source| async move {
                let result = self.update_source(&source, options, reporter).await;
                (source, result)
            })
            .buffer_unordered(options.max_concurrent.max(1))
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (source, result) in results {
            match result {
                Ok(update) => report.succeeded.push(update),
                Err(e) => {
                    self.logger
                        .error(format!("Updating {} failed: {e}", source.uri));
                    reporter.report(ProgressEvent::SourceUpdateFailed {
                        source_uri: source.uri.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push((source.uri, e.to_string()));
                }
            }
        }

        reporter.report(ProgressEvent::RefreshCompleted {
            succeeded_count: report.succeeded.len(),
            failed_count: report.failed.len(),
        });

        Ok(report)
    }

    async fn merge_episode(
        &self,
        parsed: &Episode,
        force_played: bool,
        proxy: Option<&str>,
    ) -> Result<EpisodeMerge, StorageError> {
        let mut merge = EpisodeMerge {
            marked_played: self.store_merged(parsed, force_played).await?,
            chapters_loaded: false,
        };

        let Some(external) = parsed
            .external_chapters
            .as_ref()
            .filter(|_| parsed.jumppoints.is_empty())
            .filter(|external| is_known_chapter_format(&external.media_type))
        else {
            return Ok(merge);
        };

        match fetch_chapters(self.client.as_ref(), external, proxy).await {
            Ok(jumppoints) => {
                let mut with_chapters = parsed.clone();
                with_chapters.jumppoints = jumppoints;
                self.store_merged(&with_chapters, false).await?;
                merge.chapters_loaded = true;
            }
            Err(e) => {
                let failure = FeedError::ExternalFetchFailure {
                    url: external.url.clone(),
                    reason: e.to_string(),
                };
                self.logger.warn(format!(
                    "Keeping {} without chapters: {failure}",
                    parsed.uri
                ));
            }
        }

        Ok(merge)
    }

    /// Read, overwrite feed content, and write one episode. Returns whether
    /// it was marked played.
    async fn store_merged(&self, parsed: &Episode, force_played: bool) -> Result<bool, StorageError> {
        let mut episode = self
            .storage
            .read_episode(&parsed.uri)
            .await?
            .unwrap_or_else(|| Episode::new(parsed.uri.clone()));

        episode.merge_feed_content(parsed);

        let marked_played = force_played && episode.playback.played.is_none();
        if marked_played {
            episode.playback.played = Some(true);
        }

        self.storage.write_episode(episode).await?;
        Ok(marked_played)
    }
}
