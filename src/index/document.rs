//! Indexed entities: article documents and podcast episodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::scraping::rss::{RssEpisode, RssError};
use crate::scraping::urls::parse_url;
use crate::types::{LanguageCode, SourceId};

/// Version 8 adds source ids
pub const CURRENT_DOCUMENT_VERSION: u32 = 8;

pub const CURRENT_EPISODE_VERSION: u32 = 1;

/// Meta keys holding the publication time, in lookup order
const PUBLICATION_TIME_KEYS: &[&str] = &["og:article:published_time", "article:published_time"];

/// Deterministic document id: hex sha256 of the canonical url identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn from_url_identifier(url_identifier: &str) -> Self {
        DocumentId(hex::encode(Sha256::digest(url_identifier.as_bytes())))
    }

    /// Id of the document a raw URL would be indexed under
    pub fn for_url(raw: &str) -> Option<Self> {
        parse_url(raw).map(|p| Self::from_url_identifier(&p.url_identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub publication_time: Option<DateTime<Utc>>,
}

impl DocumentMetadata {
    /// Build from a page's `<meta>` map. Open Graph keys win over plain ones.
    pub fn from_meta_tags(meta: &HashMap<String, String>) -> Self {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| meta.get(*k))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            title: lookup(&["og:title", "title"]),
            image: lookup(&["og:image"]),
            url: lookup(&["og:url"]),
            description: lookup(&["og:description", "description"]),
            publication_time: publication_time(meta),
        }
    }
}

/// RFC 3339 publication time; anything else is ignored
fn publication_time(meta: &HashMap<String, String>) -> Option<DateTime<Utc>> {
    PUBLICATION_TIME_KEYS
        .iter()
        .filter_map(|k| meta.get(*k))
        .find_map(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// An indexed article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub url: String,
    pub version: u32,
    pub language_code: LanguageCode,
    /// Space-separated lemma ids
    pub lemmatized_body: String,
    pub readability_score: i64,
    pub metadata: DocumentMetadata,
    pub has_paywall: bool,
    pub source_id: Option<SourceId>,
    pub domain: String,
    pub page_type: Option<String>,
    /// Unix seconds at which the document was ingested
    pub seed_job_ingest_timestamp: Option<i64>,
}

impl Document {
    pub fn lemmas(&self) -> impl Iterator<Item = &str> {
        self.lemmatized_body.split_whitespace()
    }

    /// Timestamp used to order equally relevant results
    pub fn recency(&self) -> i64 {
        self.metadata
            .publication_time
            .map(|t| t.timestamp())
            .or(self.seed_job_ingest_timestamp)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFile {
    pub url: String,
    pub mime_type: String,
}

/// An indexed podcast episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastEpisode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub publication_date: DateTime<Utc>,
    pub episode_type: String,
    pub duration_secs: u64,
    pub is_explicit: bool,
    pub audio_file: AudioFile,
    pub guid: String,
    pub version: u32,
    pub language_code: LanguageCode,
    pub source_id: SourceId,
}

impl PodcastEpisode {
    /// Hex sha256 of `source_id|guid`
    pub fn id_for(source_id: &SourceId, guid: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_id.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(guid.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Convert a feed item. Fails on an unparseable date or duration.
    pub fn from_rss(
        item: &RssEpisode,
        source_id: &SourceId,
        language_code: LanguageCode,
    ) -> Result<Self, RssError> {
        let publication_date = item.publication_date()?;
        let duration = item.parsed_duration()?;
        // feeds without guids are keyed by their audio url
        let guid = if item.guid.is_empty() {
            item.audio_url.clone()
        } else {
            item.guid.clone()
        };
        Ok(Self {
            id: Self::id_for(source_id, &guid),
            title: item.title.clone(),
            description: item.description.clone(),
            publication_date,
            episode_type: item.episode_type.clone(),
            duration_secs: duration.as_secs(),
            is_explicit: item.is_explicit(),
            audio_file: AudioFile {
                url: item.audio_url.clone(),
                mime_type: item.audio_type.clone(),
            },
            guid,
            version: CURRENT_EPISODE_VERSION,
            language_code,
            source_id: source_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_across_url_spellings() {
        let a = DocumentId::for_url("https://example.com").unwrap();
        assert_eq!(a, DocumentId::for_url("http://www.example.com/").unwrap());
        assert_eq!(a, DocumentId::for_url("example.com/?q=1#frag").unwrap());
        assert_ne!(a, DocumentId::for_url("https://example.com/other").unwrap());
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a, DocumentId::from_url_identifier("example.com"));
    }

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn metadata_prefers_open_graph() {
        let m = DocumentMetadata::from_meta_tags(&meta(&[
            ("og:title", "Titular OG"),
            ("title", "Titular"),
            ("og:image", "https://example.com/a.jpg"),
            ("description", "Resumen"),
            ("charset", "utf-8"),
        ]));
        assert_eq!(m.title.as_deref(), Some("Titular OG"));
        assert_eq!(m.image.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(m.url, None);
        assert_eq!(m.description.as_deref(), Some("Resumen"));
        assert_eq!(m.publication_time, None);
    }

    #[test]
    fn publication_time_requires_rfc3339() {
        let m = DocumentMetadata::from_meta_tags(&meta(&[(
            "og:article:published_time",
            "2020-11-24T15:30:06+00:00",
        )]));
        assert_eq!(
            m.publication_time.map(|t| t.to_rfc3339()),
            Some("2020-11-24T15:30:06+00:00".to_string())
        );

        let m = DocumentMetadata::from_meta_tags(&meta(&[(
            "article:published_time",
            "2020-11-24 15:30:06+00:00",
        )]));
        assert_eq!(m.publication_time, None);
    }

    #[test]
    fn episode_from_feed_item() {
        let item = RssEpisode {
            guid: "ep-1".to_string(),
            title: "Uno".to_string(),
            pub_date: "Tue, 03 Jan 2006 10:00:00 +0000".to_string(),
            duration: "10:00".to_string(),
            explicit: "no".to_string(),
            audio_url: "https://radio.example.com/1.mp3".to_string(),
            audio_type: "audio/mpeg".to_string(),
            ..Default::default()
        };
        let source = SourceId::new("radio");
        let episode = PodcastEpisode::from_rss(&item, &source, LanguageCode::Spanish).unwrap();
        assert_eq!(episode.id, PodcastEpisode::id_for(&source, "ep-1"));
        assert_ne!(episode.id, PodcastEpisode::id_for(&SourceId::new("other"), "ep-1"));
        assert_eq!(episode.duration_secs, 600);
        assert!(!episode.is_explicit);
        assert_eq!(episode.audio_file.mime_type, "audio/mpeg");

        let broken = RssEpisode {
            duration: "soon".to_string(),
            ..item
        };
        assert!(PodcastEpisode::from_rss(&broken, &source, LanguageCode::Spanish).is_err());
    }
}
