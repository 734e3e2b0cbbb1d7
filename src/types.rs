//! Core types shared across the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a stored intermediate text blob
pub type BlobId = String;

/// Identifier of a queue message
pub type MessageId = String;

// ============================================================================
// Sources
// ============================================================================

/// Identifier of a configured content source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        SourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Family of fetch/parse logic applicable to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestStrategy {
    #[serde(rename = "website-html-1")]
    WebsiteHtml1,
    #[serde(rename = "podcast-rss-1")]
    PodcastRss1,
}

impl IngestStrategy {
    pub const ALL: [IngestStrategy; 2] = [IngestStrategy::WebsiteHtml1, IngestStrategy::PodcastRss1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebsiteHtml1 => "website-html-1",
            Self::PodcastRss1 => "podcast-rss-1",
        }
    }
}

impl fmt::Display for IngestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Languages the linguistic engine can process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageCode {
    #[serde(rename = "es")]
    Spanish,
}

impl LanguageCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spanish => "es",
        }
    }

    /// Map an HTML `lang` attribute (e.g. `es-ES`, `es_MX`) to a supported language
    pub fn from_html_lang(lang: &str) -> Option<Self> {
        let primary = lang
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        primary.parse().ok()
    }
}

impl FromStr for LanguageCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "es" | "spanish" => Ok(Self::Spanish),
            other => Err(format!("unsupported language code: {}", other)),
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Crawl work items
// ============================================================================

/// A discovered URL belonging to a source. Links are flagged, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub url_identifier: String,
    pub domain: String,
    pub source_id: SourceId,
    pub is_fetched: bool,
}

/// A crawl entry point for a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSeed {
    pub id: String,
    pub source_id: SourceId,
    pub url: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_lang_variants_map_to_spanish() {
        assert_eq!(LanguageCode::from_html_lang("es"), Some(LanguageCode::Spanish));
        assert_eq!(LanguageCode::from_html_lang("es-ES"), Some(LanguageCode::Spanish));
        assert_eq!(LanguageCode::from_html_lang(" ES_mx "), Some(LanguageCode::Spanish));
        assert_eq!(LanguageCode::from_html_lang("en-US"), None);
        assert_eq!(LanguageCode::from_html_lang(""), None);
    }

    #[test]
    fn ingest_strategy_serializes_as_kebab_name() {
        let json = serde_json::to_string(&IngestStrategy::PodcastRss1).unwrap();
        assert_eq!(json, "\"podcast-rss-1\"");
        let back: IngestStrategy = serde_json::from_str("\"website-html-1\"").unwrap();
        assert_eq!(back, IngestStrategy::WebsiteHtml1);
    }
}
