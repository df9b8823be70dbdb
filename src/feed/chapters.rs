use serde::Deserialize;

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::model::{ExternalChapters, JumpPoint, JumpPointType};

use super::fetch::fetch_bytes;

/// MIME type of Podcasting 2.0 JSON chapter documents
pub const JSON_CHAPTERS_MEDIA_TYPE: &str = "application/json+chapters";

/// Whether chapters of this media type can be loaded
pub fn is_known_chapter_format(media_type: &str) -> bool {
    media_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(JSON_CHAPTERS_MEDIA_TYPE))
}

/// Parse a normal play time (`[[hh:]mm:]ss[.fraction]`) into milliseconds
pub fn parse_normal_play_time(value: &str) -> Option<u64> {
    let value = value.trim();
    let (clock, fraction) = match value.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (value, None),
    };

    let millis: u64 = match fraction {
        Some(fraction) if !fraction.is_empty() => {
            let digits: String = fraction.chars().take(3).collect();
            if !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            // Right-pad so ".5" reads as 500 ms
            format!("{digits:0<3}").parse().ok()?
        }
        _ => 0,
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut seconds: u64 = 0;
    for part in &parts {
        let part: u64 = part.parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(part)?;
    }

    seconds.checked_mul(1000)?.checked_add(millis)
}

#[derive(Debug, Deserialize)]
struct ChaptersDocument {
    #[serde(default)]
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterEntry {
    start_time: Option<f64>,
    end_time: Option<f64>,
    title: Option<String>,
    url: Option<String>,
    img: Option<String>,
    /// `false` marks a silent chapter hidden from the table of contents
    toc: Option<bool>,
}

fn seconds_to_millis(seconds: f64) -> Option<u64> {
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0).round() as u64)
}

/// Parse a JSON chapters document into jump points.
///
/// Chapters without a usable start time and silent chapters are skipped. An
/// end time adds an untitled jump point marking the end of the chapter.
pub fn parse_json_chapters(url: &str, document: &[u8]) -> Result<Vec<JumpPoint>, FeedError> {
    let document: ChaptersDocument =
        serde_json::from_slice(document).map_err(|e| FeedError::ChapterParseFailure {
            url: url.to_string(),
            source: e,
        })?;

    let mut jumppoints = Vec::new();
    for chapter in document.chapters {
        if chapter.toc == Some(false) {
            continue;
        }
        let Some(time) = chapter.start_time.and_then(seconds_to_millis) else {
            continue;
        };

        jumppoints.push(JumpPoint {
            time,
            kind: JumpPointType::Chapter,
            title: chapter.title.unwrap_or_default(),
            uri: chapter.url,
            image: chapter.img,
        });

        if let Some(time) = chapter.end_time.and_then(seconds_to_millis) {
            jumppoints.push(JumpPoint {
                time,
                kind: JumpPointType::Chapter,
                title: String::new(),
                uri: None,
                image: None,
            });
        }
    }

    Ok(jumppoints)
}

/// Fetch and parse an external chapter document
pub async fn fetch_chapters<C: HttpClient + ?Sized>(
    client: &C,
    chapters: &ExternalChapters,
    proxy_url_pattern: Option<&str>,
) -> Result<Vec<JumpPoint>, FeedError> {
    if !is_known_chapter_format(&chapters.media_type) {
        return Err(FeedError::UnsupportedChapterFormat {
            media_type: chapters.media_type.clone(),
        });
    }

    let bytes = fetch_bytes(client, &chapters.url, proxy_url_pattern).await?;
    parse_json_chapters(&chapters.url, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_play_time_formats() {
        assert_eq!(parse_normal_play_time("00:00:00.000"), Some(0));
        assert_eq!(parse_normal_play_time("01:02:03"), Some(3_723_000));
        assert_eq!(parse_normal_play_time("02:03.5"), Some(123_500));
        assert_eq!(parse_normal_play_time("42"), Some(42_000));
        assert_eq!(parse_normal_play_time("00:01:00.1234"), Some(60_123));
    }

    #[test]
    fn normal_play_time_rejects_overflowing_values() {
        assert_eq!(parse_normal_play_time("19000000000000000"), None);
        assert_eq!(parse_normal_play_time("18446744073709551615:00"), None);
        assert_eq!(parse_normal_play_time("99999999999999999:59:59"), None);
    }

    #[test]
    fn normal_play_time_rejects_garbage() {
        assert_eq!(parse_normal_play_time("abc"), None);
        assert_eq!(parse_normal_play_time("1:2:3:4"), None);
        assert_eq!(parse_normal_play_time("00:10.x"), None);
        assert_eq!(parse_normal_play_time(""), None);
    }

    #[test]
    fn known_chapter_format_ignores_case_and_parameters() {
        assert!(is_known_chapter_format("application/json+chapters"));
        assert!(is_known_chapter_format("Application/JSON+Chapters; charset=utf-8"));
        assert!(!is_known_chapter_format("application/json"));
        assert!(!is_known_chapter_format("text/vtt"));
    }

    #[test]
    fn json_chapters_become_jump_points() {
        let document = br#"{
            "version": "1.2.0",
            "chapters": [
                {"startTime": 0, "title": "Intro"},
                {"startTime": 62.5, "title": "Topic", "url": "https://example.com", "img": "https://example.com/c.jpg"},
                {"startTime": 90, "title": "Hidden", "toc": false},
                {"title": "No start"},
                {"startTime": 120, "endTime": 180, "title": "Outro"}
            ]
        }"#;

        let jumppoints = parse_json_chapters("https://example.com/ch.json", document).unwrap();

        let times: Vec<u64> = jumppoints.iter().map(|jp| jp.time).collect();
        assert_eq!(times, vec![0, 62_500, 120_000, 180_000]);
        assert_eq!(jumppoints[1].uri.as_deref(), Some("https://example.com"));
        assert_eq!(jumppoints[1].image.as_deref(), Some("https://example.com/c.jpg"));
        assert_eq!(jumppoints[3].title, "");
    }

    #[test]
    fn invalid_json_chapters_fail() {
        assert!(matches!(
            parse_json_chapters("https://example.com/ch.json", b"<xml/>"),
            Err(FeedError::ChapterParseFailure { .. })
        ));
    }

    #[test]
    fn document_without_chapters_is_empty() {
        assert!(
            parse_json_chapters("u", br#"{"version": "1.2.0"}"#)
                .unwrap()
                .is_empty()
        );
    }
}
