pub mod configuration;
pub mod context;
pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod model;
pub mod progress;
pub mod storage;
pub mod update;

// Re-export main types for convenience
pub use configuration::{Configuration, ConfigurationEngine, ImportMode};
pub use context::{AppContext, AppContextBuilder};
pub use download::{DownloadReport, download_episode, download_episodes};
pub use error::{ConfigurationError, DownloadError, FeedError, StorageError, UpdateError};
pub use feed::{ParsedFeed, fetch_feed, is_url, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use logging::{LogLevel, Logger, MemoryAppender};
pub use model::{Episode, JumpPoint, Source};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use storage::{Settings, SettingsValue, StorageEvent, StorageFacade};
pub use update::{FeedUpdater, RefreshReport, SourceUpdate, UpdateOptions};
