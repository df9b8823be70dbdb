// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use rss::extension::{Extension, ExtensionMap};

use crate::error::FeedError;
use crate::model::{Episode, ExternalChapters, JumpPoint, JumpPointType, Source};

use super::chapters::parse_normal_play_time;

const PODLOVE_CHAPTERS_NAMESPACES: &[&str] = &[
    "http://podlove.org/simple-chapters",
    "http://podlove.org/simple-chapters/",
    "https://podlove.de/simple-chapters",
];

const PODCAST_NAMESPACES: &[&str] = &[
    "https://podcastindex.org/namespace/1.0",
    "https://github.com/Podcastindex-org/podcast-namespace/blob/main/docs/1.0.md",
];

/// Media links looked for in the HTML content of items without enclosure,
/// in order of preference
const CONTENT_MEDIA_TYPES: &[(&str, &str)] = &[
    (".m4a", "audio/mp4"),
    (".mp3", "audio/mpeg"),
    (".oga", "audio/ogg"),
    (".opus", "audio/ogg; codecs=opus"),
];

/// A feed document reduced to the records it describes
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// Refreshed source metadata. The URI is the one of the source that was
    /// fetched.
    pub source: Source,
    /// Episodes in playlist order (oldest first)
    pub episodes: Vec<Episode>,
}

/// Parse RSS 2.0 feed bytes fetched for `source`
pub fn parse_feed(xml_bytes: &[u8], source: &Source) -> Result<ParsedFeed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes).map_err(|e| FeedError::ParseFailure {
        url: source.uri.clone(),
        source: e,
    })?;

    let link = non_empty(channel.link()).unwrap_or_else(|| source.uri.clone());
    let title = non_empty(channel.title()).unwrap_or_else(|| link.clone());
    let refreshed = Source {
        uri: source.uri.clone(),
        link: Some(link),
        title: Some(title),
        description: non_empty(channel.description()),
        language: channel.language().and_then(non_empty),
    };

    let image = channel
        .image()
        .map(|img| img.url().to_string())
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .map(String::from)
        });

    let prefixes = Prefixes::from_channel(&channel);
    let mut episodes: Vec<Episode> = channel
        .items()
        .iter()
        .filter_map(|item| parse_episode(item, &refreshed, image.as_deref(), &prefixes))
        .collect();
    episodes.sort_by(Episode::playlist_order);

    Ok(ParsedFeed {
        source: refreshed,
        episodes,
    })
}

/// Namespace prefixes a feed declared for the extensions we read
struct Prefixes {
    podlove: Vec<String>,
    podcast: Vec<String>,
}

impl Prefixes {
    fn from_channel(channel: &rss::Channel) -> Self {
        let lookup = |namespaces: &[&str], conventional: &str| {
            let mut prefixes: Vec<String> = channel
                .namespaces()
                .iter()
                .filter(|(_, uri)| namespaces.contains(&uri.as_str()))
                .map(|(prefix, _)| prefix.clone())
                .collect();
            if !prefixes.iter().any(|prefix| prefix == conventional) {
                prefixes.push(conventional.to_string());
            }
            prefixes
        };

        Self {
            podlove: lookup(PODLOVE_CHAPTERS_NAMESPACES, "psc"),
            podcast: lookup(PODCAST_NAMESPACES, "podcast"),
        }
    }
}

/// Extension elements called `name` under any of `prefixes`
fn extensions<'a>(map: &'a ExtensionMap, prefixes: &[String], name: &str) -> Vec<&'a Extension> {
    prefixes
        .iter()
        .filter_map(|prefix| map.get(prefix))
        .filter_map(|elements| elements.get(name))
        .flatten()
        .collect()
}

/// Child elements called `name`, keyed with or without namespace prefix
fn children<'a>(parent: &'a Extension, prefixes: &[String], name: &str) -> Vec<&'a Extension> {
    let mut keys = vec![name.to_string()];
    keys.extend(prefixes.iter().map(|prefix| format!("{prefix}:{name}")));

    keys.iter()
        .filter_map(|key| parent.children().get(key))
        .flatten()
        .collect()
}

fn parse_episode(
    item: &rss::Item,
    source: &Source,
    source_image: Option<&str>,
    prefixes: &Prefixes,
) -> Option<Episode> {
    let uri = item
        .link()
        .and_then(non_empty)
        .or_else(|| item.guid().and_then(|guid| non_empty(guid.value())))?;

    let mut episode = Episode::new(uri);
    episode.title = item.title().and_then(non_empty);
    episode.updated = item.pub_date().and_then(parse_date);
    episode.language = source.language.clone();
    episode.source = Some(source.uri.clone());
    episode.link = item.link().and_then(non_empty);

    let itunes = item.itunes_ext();
    episode.sub_title = itunes.and_then(|ext| ext.subtitle()).and_then(non_empty);
    episode.duration = itunes.and_then(|ext| ext.duration()).and_then(non_empty);
    episode.image = itunes
        .and_then(|ext| ext.image())
        .and_then(non_empty)
        .or_else(|| source_image.map(String::from));

    if let Some(enclosure) = item
        .enclosure()
        .filter(|enclosure| enclosure.mime_type().contains("audio"))
    {
        episode.media_url = non_empty(enclosure.url());
        episode.media_type = Some(normalize_media_type(enclosure.mime_type()));
    } else if let Some((url, media_type)) = item.content().and_then(media_from_content) {
        episode.media_url = Some(url);
        episode.media_type = Some(media_type.to_string());
    }

    episode.jumppoints = inline_chapters(item.extensions(), &prefixes.podlove);
    episode.external_chapters = extensions(item.extensions(), &prefixes.podcast, "chapters")
        .into_iter()
        .find_map(|element| {
            Some(ExternalChapters {
                url: element.attrs().get("url")?.clone(),
                media_type: element.attrs().get("type")?.clone(),
            })
        });

    Some(episode)
}

/// Podlove Simple Chapters embedded in an item
fn inline_chapters(map: &ExtensionMap, prefixes: &[String]) -> Vec<JumpPoint> {
    let mut jumppoints: Vec<JumpPoint> = extensions(map, prefixes, "chapters")
        .into_iter()
        .flat_map(|chapters| children(chapters, prefixes, "chapter"))
        .filter_map(|chapter| {
            let attrs = chapter.attrs();
            Some(JumpPoint {
                time: parse_normal_play_time(attrs.get("start")?)?,
                kind: JumpPointType::Chapter,
                title: attrs.get("title").cloned().unwrap_or_default(),
                uri: attrs.get("href").cloned(),
                image: attrs.get("image").cloned(),
            })
        })
        .collect();
    jumppoints.sort_by_key(|jumppoint| jumppoint.time);
    jumppoints
}

/// Opus is announced as Ogg so players pick a demuxer they know
fn normalize_media_type(mime_type: &str) -> String {
    if mime_type.eq_ignore_ascii_case("audio/opus") {
        "audio/ogg; codecs=opus".to_string()
    } else {
        mime_type.to_string()
    }
}

/// First audio link in the HTML content of an item
fn media_from_content(content: &str) -> Option<(String, &'static str)> {
    let html = html_escape::decode_html_entities(content);
    let targets = anchor_targets(&html);

    CONTENT_MEDIA_TYPES.iter().find_map(|(extension, media_type)| {
        targets
            .iter()
            .find(|target| target.to_ascii_lowercase().ends_with(extension))
            .map(|target| (target.to_string(), *media_type))
    })
}

/// Quoted `href` attribute values in document order
fn anchor_targets(html: &str) -> Vec<&str> {
    html.split("href=")
        .skip(1)
        .filter_map(|rest| {
            let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let rest = &rest[1..];
            rest.find(quote).map(|end| &rest[..end])
        })
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse RFC 2822 dates and the near misses found in real feeds
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
        .map(|date| date.with_timezone(&Utc))
}
