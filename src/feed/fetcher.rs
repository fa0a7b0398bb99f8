use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use rss::Channel;

use crate::error::Result;

/// A parsed feed, stripped down to the fields the aggregator ingests.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    /// The raw pubDate string; normalization happens at ingestion time.
    pub published_at_raw: Option<String>,
}

/// Anything able to turn a feed URL into a document. The aggregation
/// scheduler is generic over this so tests can drive it with a stub.
pub trait FeedSource {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FeedDocument>> + Send;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("gator")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FeedDocument> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let channel = Channel::read_from(&bytes[..])?;
        Ok(document_from_channel(channel))
    }
}

/// Upstream feeds frequently double-encode entities, so every text field
/// passes through HTML unescaping after XML parsing.
fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn document_from_channel(channel: Channel) -> FeedDocument {
    let items = channel
        .items()
        .iter()
        .map(|item| FeedItem {
            title: unescape(item.title().unwrap_or_default()),
            link: item.link().unwrap_or_default().to_string(),
            description: item.description().map(unescape),
            published_at_raw: item.pub_date().map(str::to_string),
        })
        .collect();

    FeedDocument {
        title: unescape(channel.title()),
        link: channel.link().to_string(),
        description: unescape(channel.description()),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Caf&amp;eacute; &amp;amp; Co</title>
    <link>https://example.com</link>
    <description>News from the caf&amp;eacute;</description>
    <item>
      <title>Opening hours</title>
      <link>https://example.com/posts/hours</link>
      <description>Now open until 10pm &amp;ndash; every day</description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
    </item>
    <item>
      <link>https://example.com/posts/untitled</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn unescapes_double_encoded_entities() {
        let channel = Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let document = document_from_channel(channel);

        assert_eq!(document.title, "Café & Co");
        assert_eq!(document.description, "News from the café");
        assert_eq!(
            document.items[0].description.as_deref(),
            Some("Now open until 10pm – every day")
        );
    }

    #[test]
    fn keeps_raw_publish_date_and_item_order() {
        let channel = Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let document = document_from_channel(channel);

        assert_eq!(document.items.len(), 2);
        assert_eq!(
            document.items[0].published_at_raw.as_deref(),
            Some("Mon, 02 Jan 2006 15:04:05 -0700")
        );
        assert_eq!(document.items[1].published_at_raw, None);
    }

    #[test]
    fn missing_item_title_stays_empty_here() {
        // The placeholder is the scheduler's job, not the parser's.
        let channel = Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let document = document_from_channel(channel);
        assert_eq!(document.items[1].title, "");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(Channel::read_from(&b"this is not a feed"[..]).is_err());
    }
}
