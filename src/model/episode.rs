// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single podcast episode as persisted by the data storage providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Identifies the episode across the whole system
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// URI of the owning source. Lookup only, never dereferenced eagerly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_chapters: Option<ExternalChapters>,
    #[serde(default)]
    pub jumppoints: Vec<JumpPoint>,
    #[serde(default)]
    pub playback: Playback,
    /// Local device state, never part of an exported configuration
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_file_saved_offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_media_url: Option<String>,
}

/// Playback progress of an episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    /// Position in seconds, never negative
    #[serde(default, deserialize_with = "non_negative_seconds")]
    pub current_time: f64,
    /// `None` until the played state is set explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played: Option<bool>,
}

/// A navigation mark inside an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpPoint {
    /// Offset from the start of the media in milliseconds
    pub time: u64,
    #[serde(rename = "type", default)]
    pub kind: JumpPointType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JumpPointType {
    #[default]
    Chapter,
}

/// Reference to a chapter document published outside the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalChapters {
    pub url: String,
    pub media_type: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Negative and non-finite positions read as the start of the episode
fn non_negative_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let seconds = f64::deserialize(deserializer)?;
    Ok(if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    })
}

impl Playback {
    /// Played state with the unset case read as "not played"
    pub fn is_played(&self) -> bool {
        self.played.unwrap_or(false)
    }
}

impl Episode {
    /// Create an episode stub with default playback state
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: None,
            sub_title: None,
            link: None,
            updated: None,
            language: None,
            source: None,
            media_url: None,
            media_type: None,
            duration: None,
            image: None,
            external_chapters: None,
            jumppoints: Vec::new(),
            playback: Playback::default(),
            is_file_saved_offline: false,
            offline_media_url: None,
        }
    }

    /// Overwrite every feed-provided field with the values of `parsed`.
    ///
    /// Playback and offline state are local to this device and stay as they are.
    /// Jump points are replaced as a whole.
    pub fn merge_feed_content(&mut self, parsed: &Episode) {
        self.link = parsed.link.clone();
        self.title = parsed.title.clone();
        self.sub_title = parsed.sub_title.clone();
        self.updated = parsed.updated;
        self.language = parsed.language.clone();
        self.media_url = parsed.media_url.clone();
        self.media_type = parsed.media_type.clone();
        self.duration = parsed.duration.clone();
        self.source = parsed.source.clone();
        self.jumppoints = parsed.jumppoints.clone();
        self.image = parsed.image.clone();
        self.external_chapters = parsed.external_chapters.clone();
    }

    /// Flip the played state and rewind to the start
    pub fn toggle_playback_status(&mut self) {
        self.playback.played = Some(!self.playback.is_played());
        self.playback.current_time = 0.0;
    }

    /// Playlist order: oldest `updated` first, then title ignoring case
    pub fn playlist_order(first: &Episode, second: &Episode) -> Ordering {
        first.updated.cmp(&second.updated).then_with(|| {
            let a = first.title.as_deref().unwrap_or_default().to_lowercase();
            let b = second.title.as_deref().unwrap_or_default().to_lowercase();
            a.cmp(&b)
        })
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}
