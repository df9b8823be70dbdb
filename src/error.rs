// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::Capability;

/// Errors raised by storage providers and the storage facade
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Operation '{operation}' is not implemented by storage provider {provider}")]
    UnsupportedOperation {
        provider: String,
        operation: &'static str,
    },

    #[error("No {capability} storage provider is registered for the current platform")]
    NoProviderRegistered { capability: Capability },

    #[error("Batch write partially failed: {succeeded} written, {failed} failed")]
    PartialBatchFailure {
        succeeded: usize,
        failed: usize,
        /// One message per failed element
        errors: Vec<String>,
    },

    #[error("No stored file for episode {uri}")]
    FileNotFound { uri: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse stored JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize record: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),

    #[error("Transfer of {url} failed: {reason}")]
    ExternalFetchFailure { url: String, reason: String },

    #[error("File of {size} bytes exceeds the storage quota of {quota_bytes} bytes")]
    QuotaExceeded { size: u64, quota_bytes: u64 },
}

/// Errors that can occur when fetching or parsing feeds and chapter documents
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse feed {url}: {source}")]
    ParseFailure {
        url: String,
        #[source]
        source: rss::Error,
    },

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to load external document {url}: {reason}")]
    ExternalFetchFailure { url: String, reason: String },

    #[error("Unsupported chapter format '{media_type}'")]
    UnsupportedChapterFormat { media_type: String },

    #[error("Failed to parse chapters from {url}: {source}")]
    ChapterParseFailure {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while reconciling a source with its feed
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that can occur when exporting or importing a configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write configuration file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur while downloading an episode for offline playback
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Episode {uri} has no media URL")]
    MissingMediaUrl { uri: String },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
