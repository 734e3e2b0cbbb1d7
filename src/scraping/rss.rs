//! Podcast RSS feed parsing

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading a feed or converting its items
#[derive(Debug, Error)]
pub enum RssError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("feed has no <channel>")]
    MissingChannel,
    #[error("invalid publication date '{0}'")]
    InvalidDate(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// An `<item>` as it appears in the feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RssEpisode {
    pub guid: String,
    pub title: String,
    pub description: String,
    pub pub_date: String,
    pub duration: String,
    pub explicit: String,
    pub episode_type: String,
    pub audio_url: String,
    pub audio_type: String,
}

impl RssEpisode {
    /// RFC 2822 publication date (`Mon, 2 Jan 2006 15:04:05 -0700`)
    pub fn publication_date(&self) -> Result<DateTime<Utc>, RssError> {
        DateTime::parse_from_rfc2822(self.pub_date.trim())
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| RssError::InvalidDate(self.pub_date.clone()))
    }

    /// `HH:MM:SS`, `MM:SS` or a plain number of seconds
    pub fn parsed_duration(&self) -> Result<Duration, RssError> {
        parse_duration(&self.duration)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.explicit.trim().to_lowercase().as_str(), "yes" | "true" | "explicit")
    }
}

/// A parsed `<channel>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodcastChannel {
    pub title: String,
    pub image_url: Option<String>,
    pub episodes: Vec<RssEpisode>,
}

pub fn parse_duration(raw: &str) -> Result<Duration, RssError> {
    let raw = raw.trim();
    let invalid = || RssError::InvalidDuration(raw.to_string());
    if raw.is_empty() {
        return Err(invalid());
    }
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }
    let mut seconds = 0u64;
    for (idx, part) in parts.iter().rev().enumerate() {
        let magnitude: u64 = part.trim().parse().map_err(|_| invalid())?;
        seconds = 60u64
            .checked_pow(idx as u32)
            .and_then(|unit| magnitude.checked_mul(unit))
            .and_then(|value| seconds.checked_add(value))
            .ok_or_else(invalid)?;
    }
    Ok(Duration::from_secs(seconds))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

/// Parse an RSS document into its channel and episodes
pub fn parse_feed(xml: &str) -> Result<PodcastChannel, RssError> {
    let mut reader = Reader::from_str(xml);
    let mut channel = PodcastChannel::default();
    let mut seen_channel = false;
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RssEpisode> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = local_name(e);
                match name.as_str() {
                    "channel" => seen_channel = true,
                    "item" => current = Some(RssEpisode::default()),
                    "itunes:image" if current.is_none() => {
                        if let Some(href) = attr(e, "href") {
                            channel.image_url.get_or_insert(href);
                        }
                    }
                    _ => {}
                }
                stack.push(name);
                text_buf.clear();
            }
            Event::Empty(ref e) => match local_name(e).as_str() {
                "enclosure" => {
                    if let Some(ref mut episode) = current {
                        episode.audio_url = attr(e, "url").unwrap_or_default();
                        episode.audio_type = attr(e, "type").unwrap_or_default();
                    }
                }
                "itunes:image" if current.is_none() => {
                    if let Some(href) = attr(e, "href") {
                        channel.image_url.get_or_insert(href);
                    }
                }
                _ => {}
            },
            Event::Text(ref e) => {
                if let Ok(text) = e.unescape() {
                    text_buf.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                if let Ok(text) = String::from_utf8(e.to_vec()) {
                    text_buf.push_str(&text);
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(String::as_str);
                let text = text_buf.trim().to_string();
                match (parent, name.as_str()) {
                    (_, "item") => {
                        if let Some(episode) = current.take() {
                            channel.episodes.push(episode);
                        }
                    }
                    (Some("item"), field) => {
                        if let Some(ref mut episode) = current {
                            match field {
                                "guid" => episode.guid = text,
                                "title" => episode.title = text,
                                "description" => episode.description = text,
                                "pubDate" => episode.pub_date = text,
                                "itunes:duration" => episode.duration = text,
                                "itunes:explicit" => episode.explicit = text,
                                "itunes:episodeType" => episode.episode_type = text,
                                _ => {}
                            }
                        }
                    }
                    (Some("channel"), "title") => channel.title = text,
                    (Some("image"), "url") if current.is_none() => {
                        channel.image_url.get_or_insert(text);
                    }
                    _ => {}
                }
                text_buf.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_channel {
        return Err(RssError::MissingChannel);
    }
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Noticias en español</title>
    <itunes:image href="https://radio.example.com/cover.jpg"/>
    <item>
      <guid>ep-1</guid>
      <title>Episodio uno</title>
      <description><![CDATA[<p>La economía &amp; el mundo</p>]]></description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <itunes:duration>1:02:03</itunes:duration>
      <itunes:explicit>no</itunes:explicit>
      <itunes:episodeType>full</itunes:episodeType>
      <enclosure url="https://radio.example.com/ep1.mp3" type="audio/mpeg" length="1"/>
    </item>
    <item>
      <guid>ep-2</guid>
      <title>Tom &amp; Jerry</title>
      <pubDate>not a date</pubDate>
      <itunes:duration>95</itunes:duration>
      <itunes:explicit>yes</itunes:explicit>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_channel_and_items() {
        let channel = parse_feed(FEED).unwrap();
        assert_eq!(channel.title, "Noticias en español");
        assert_eq!(channel.image_url.as_deref(), Some("https://radio.example.com/cover.jpg"));
        assert_eq!(channel.episodes.len(), 2);

        let first = &channel.episodes[0];
        assert_eq!(first.guid, "ep-1");
        assert_eq!(first.title, "Episodio uno");
        assert_eq!(first.description, "<p>La economía &amp; el mundo</p>");
        assert_eq!(first.audio_url, "https://radio.example.com/ep1.mp3");
        assert_eq!(first.audio_type, "audio/mpeg");
        assert_eq!(first.episode_type, "full");
        assert!(!first.is_explicit());
        assert_eq!(first.parsed_duration().unwrap(), Duration::from_secs(3723));
        let date = first.publication_date().unwrap();
        assert_eq!(date.to_rfc3339(), "2006-01-02T22:04:05+00:00");

        let second = &channel.episodes[1];
        assert_eq!(second.title, "Tom & Jerry");
        assert!(second.is_explicit());
        assert_eq!(second.parsed_duration().unwrap(), Duration::from_secs(95));
        assert!(matches!(second.publication_date(), Err(RssError::InvalidDate(_))));
    }

    #[test]
    fn duration_formats() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("10:00").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("01:00:01").unwrap(), Duration::from_secs(3601));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1:2:3:4").is_err());
        assert!(parse_duration("ten").is_err());
        assert!(parse_duration("99999999999999999:00").is_err());
        assert!(parse_duration("18446744073709551615:59:59").is_err());
    }

    #[test]
    fn document_without_channel_is_rejected() {
        assert!(matches!(parse_feed("<html></html>"), Err(RssError::MissingChannel)));
    }
}
