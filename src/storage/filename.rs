use url::Url;

use crate::model::Episode;

use super::directory::record_key;

/// Maximum length for the title portion of a filename
const MAX_TITLE_LENGTH: usize = 80;

/// Length of the URI digest prefix that identifies an episode's file
pub(crate) const KEY_PREFIX_LENGTH: usize = 16;

fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Prefix shared by every media file name of an episode
pub(crate) fn file_key(episode: &Episode) -> String {
    let mut key = record_key(&episode.uri);
    key.truncate(KEY_PREFIX_LENGTH);
    key
}

/// Media file name for an episode.
///
/// Format: `<key>-YYYY-MM-DD-<title>.<ext>` where the date is `undated` when
/// the episode carries none. The key makes the name unique per episode URI.
pub(crate) fn media_filename(episode: &Episode) -> String {
    let date = episode
        .updated
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    let title = sanitize_title(episode.display_title());
    let extension = audio_extension(episode);

    let name = if title.is_empty() {
        format!("{}-{date}.{extension}", file_key(episode))
    } else {
        format!("{}-{date}-{title}.{extension}", file_key(episode))
    };

    // Reserved names and platform-specific characters
    sanitize_filename::sanitize(name)
}

/// Audio file extension from the media URL path or MIME type, `mp3` otherwise
pub(crate) fn audio_extension(episode: &Episode) -> String {
    if let Some(ext) = episode
        .media_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok())
        .as_ref()
        .and_then(|url| url.path_segments())
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.').map(|(_, ext)| ext.to_string()))
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ref mime) = episode.media_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    let collapsed = collapse_separators(&replaced);
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());

    truncate_at_boundary(trimmed, MAX_TITLE_LENGTH)
}

/// Runs of spaces and dashes become a single dash
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c == '-' || c.is_whitespace() {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    // Input is ASCII at this point, byte slicing is safe
    let truncated = &s[..max_len];
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}

fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "oga" | "opus" | "wav" | "flac"
    )
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
