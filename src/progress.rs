use std::sync::Arc;

/// Events emitted while refreshing sources and saving media files
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed has been parsed successfully
    FeedParsed {
        source_uri: String,
        source_title: String,
        total_episodes: usize,
    },

    /// All episodes and the source record of a feed have been stored
    SourceUpdated {
        source_uri: String,
        /// Episodes merged into storage
        merged_episodes: usize,
        /// Episodes auto-marked as played on first sight
        marked_played: usize,
    },

    /// Updating a source failed; other sources are not affected
    SourceUpdateFailed { source_uri: String, error: String },

    /// Refresh of all sources finished
    RefreshCompleted {
        succeeded_count: usize,
        failed_count: usize,
    },

    /// A media file transfer into file storage is starting
    FileSaveStarting {
        episode_uri: String,
        episode_title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Media file transfer progress update
    FileSaveProgress {
        episode_uri: String,
        bytes_written: u64,
        total_bytes: Option<u64>,
    },

    /// Media file is stored and the episode record updated
    FileSaveCompleted {
        episode_uri: String,
        episode_title: String,
        bytes_written: u64,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
