pub mod chapters;
mod fetch;
mod parse;

pub use chapters::{JSON_CHAPTERS_MEDIA_TYPE, fetch_chapters, is_known_chapter_format};
pub use fetch::{PROXY_URL_PLACEHOLDER, fetch_bytes, fetch_feed, is_url, proxied_url};
pub use parse::{ParsedFeed, parse_feed};
