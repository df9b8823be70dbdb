// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::model::Source;

use super::parse::{ParsedFeed, parse_feed};

/// Placeholder replaced by the target URL in a proxy URL pattern
pub const PROXY_URL_PLACEHOLDER: &str = "$url$";

/// Address of `url` behind a proxy described by `pattern`
pub fn proxied_url(pattern: &str, url: &str) -> String {
    pattern.replace(PROXY_URL_PLACEHOLDER, url)
}

async fn fetch_direct<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    let body = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !body.is_success() {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: body.status,
        });
    }

    Ok(body.bytes)
}

/// Fetch raw bytes from a URL (without parsing).
///
/// When the direct request fails and a proxy pattern is configured the
/// request is repeated once through the proxy. The direct error is reported
/// if the proxy fails as well.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    proxy_url_pattern: Option<&str>,
) -> Result<Bytes, FeedError> {
    match fetch_direct(client, url).await {
        Ok(bytes) => Ok(bytes),
        Err(direct) => match proxy_url_pattern {
            Some(pattern) => fetch_direct(client, &proxied_url(pattern, url))
                .await
                .map_err(|_| direct),
            None => Err(direct),
        },
    }
}

/// Fetch and parse the feed document of a source
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    source: &Source,
    proxy_url_pattern: Option<&str>,
) -> Result<ParsedFeed, FeedError> {
    Url::parse(&source.uri)?;
    let bytes = fetch_bytes(client, &source.uri, proxy_url_pattern).await?;
    parse_feed(&bytes, source)
}

/// Determine if a string is an HTTP(S) URL
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpBody, HttpResponse};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies per URL, 404 for anything else
    struct MockHttpClient {
        responses: HashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        fn new(responses: &[(&str, &str)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<HttpBody, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(match self.responses.get(url) {
                Some(body) => HttpBody {
                    status: 200,
                    bytes: Bytes::from(body.clone()),
                },
                None => HttpBody {
                    status: 404,
                    bytes: Bytes::new(),
                },
            })
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unimplemented!("not used by feed fetching")
        }
    }

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Proxied</title><link>https://example.com</link><description>d</description></channel></rss>"#;

    #[test]
    fn is_url_detects_http() {
        assert!(is_url("http://example.com/feed.xml"));
        assert!(is_url("https://example.com/feed.xml"));
        assert!(!is_url("/path/to/feed.xml"));
        assert!(!is_url("feed.xml"));
    }

    #[test]
    fn proxied_url_substitutes_placeholder() {
        assert_eq!(
            proxied_url("https://proxy.example/get?u=$url$", "https://example.com/feed"),
            "https://proxy.example/get?u=https://example.com/feed"
        );
    }

    #[tokio::test]
    async fn direct_failure_without_proxy_reports_status() {
        let client = MockHttpClient::new(&[]);
        let result = fetch_bytes(&client, "https://example.com/feed", None).await;

        assert!(matches!(result, Err(FeedError::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn failed_direct_fetch_retries_through_proxy() {
        let client = MockHttpClient::new(&[("https://proxy.example/https://example.com/feed", FEED)]);
        let source = Source::new("https://example.com/feed");

        let parsed = fetch_feed(&client, &source, Some("https://proxy.example/$url$"))
            .await
            .unwrap();

        assert_eq!(parsed.source.title.as_deref(), Some("Proxied"));
        assert_eq!(parsed.source.uri, "https://example.com/feed");
        assert_eq!(
            *client.requested.lock().unwrap(),
            vec![
                "https://example.com/feed".to_string(),
                "https://proxy.example/https://example.com/feed".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn proxy_is_not_used_when_direct_fetch_succeeds() {
        let client = MockHttpClient::new(&[("https://example.com/feed", FEED)]);

        fetch_bytes(&client, "https://example.com/feed", Some("https://proxy/$url$"))
            .await
            .unwrap();

        assert_eq!(client.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_source_uri_is_rejected_before_fetching() {
        let client = MockHttpClient::new(&[]);
        let result = fetch_feed(&client, &Source::new("not a url"), None).await;

        assert!(matches!(result, Err(FeedError::InvalidUrl(_))));
        assert!(client.requested.lock().unwrap().is_empty());
    }
}
