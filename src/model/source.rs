// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A subscribed feed, identified by its feed address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub uri: String,
    /// Homepage of the podcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Source {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            link: None,
            title: None,
            description: None,
            language: None,
        }
    }

    /// Sort order for source lists: title ignoring case, URI as fallback
    pub fn title_order(first: &Source, second: &Source) -> Ordering {
        first
            .display_title()
            .to_lowercase()
            .cmp(&second.display_title().to_lowercase())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}
