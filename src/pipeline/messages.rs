//! Stage payloads and topic names
//!
//! Payloads are JSON on the wire. Text moving between stages travels as blob
//! ids; the stage that consumes a blob deletes it in the same commit.

use serde::{Deserialize, Serialize};

use crate::index::{Document, DocumentId, DocumentMetadata, CURRENT_DOCUMENT_VERSION};
use crate::queue::HandlerError;
use crate::types::{BlobId, LanguageCode, SourceId};

pub const FETCH_TOPIC: &str = "fetch-queue-topic";
pub const PARSE_TOPIC: &str = "parse-queue-topic";
pub const NORMALIZE_TOPIC: &str = "normalize-queue-topic";
pub const LEMMATIZE_TOPIC: &str = "lemmatize-queue-topic";
pub const READABILITY_TOPIC: &str = "readability-queue-topic";
pub const INDEX_TOPIC: &str = "index-queue-topic";
pub const LINK_HANDLER_TOPIC: &str = "link-handler-topic";

/// Every topic the pipeline consumes, in stage order
pub const ALL_TOPICS: [&str; 7] = [
    FETCH_TOPIC,
    PARSE_TOPIC,
    NORMALIZE_TOPIC,
    LEMMATIZE_TOPIC,
    READABILITY_TOPIC,
    INDEX_TOPIC,
    LINK_HANDLER_TOPIC,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMessage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseMessage {
    pub url: String,
    /// Raw HTML
    pub blob_id: BlobId,
    pub source_id: SourceId,
    pub ingested_at: i64,
}

/// What later stages need to know about the page being processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub url_identifier: String,
    pub domain: String,
    pub source_id: SourceId,
    pub language_code: LanguageCode,
    pub page_type: Option<String>,
    pub has_paywall: bool,
    pub metadata: DocumentMetadata,
    pub ingested_at: i64,
}

impl PageContext {
    pub fn into_document(self, lemmatized_body: String, readability_score: i64) -> Document {
        Document {
            id: DocumentId::from_url_identifier(&self.url_identifier),
            url: self.url,
            version: CURRENT_DOCUMENT_VERSION,
            language_code: self.language_code,
            lemmatized_body,
            readability_score,
            metadata: self.metadata,
            has_paywall: self.has_paywall,
            source_id: Some(self.source_id),
            domain: self.domain,
            page_type: self.page_type,
            seed_job_ingest_timestamp: Some(self.ingested_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeMessage {
    pub page: PageContext,
    /// Extracted body text
    pub blob_id: BlobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LemmatizeMessage {
    pub page: PageContext,
    pub normalized_blob_id: BlobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityMessage {
    pub page: PageContext,
    pub normalized_blob_id: BlobId,
    pub lemmatized_blob_id: BlobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMessage {
    pub page: PageContext,
    pub lemmatized_blob_id: BlobId,
    pub readability_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkHandlerMessage {
    pub urls: Vec<String>,
}

/// A decoded message of any pipeline topic
#[derive(Debug, Clone, PartialEq)]
pub enum StageMessage {
    Fetch(FetchMessage),
    Parse(ParseMessage),
    Normalize(NormalizeMessage),
    Lemmatize(LemmatizeMessage),
    Readability(ReadabilityMessage),
    Index(IndexMessage),
    LinkHandler(LinkHandlerMessage),
}

impl StageMessage {
    /// Decode a body read from `topic`. Undecodable bodies are malformed.
    pub fn decode(topic: &str, body: &str) -> Result<Self, HandlerError> {
        Ok(match topic {
            FETCH_TOPIC => Self::Fetch(serde_json::from_str(body)?),
            PARSE_TOPIC => Self::Parse(serde_json::from_str(body)?),
            NORMALIZE_TOPIC => Self::Normalize(serde_json::from_str(body)?),
            LEMMATIZE_TOPIC => Self::Lemmatize(serde_json::from_str(body)?),
            READABILITY_TOPIC => Self::Readability(serde_json::from_str(body)?),
            INDEX_TOPIC => Self::Index(serde_json::from_str(body)?),
            LINK_HANDLER_TOPIC => Self::LinkHandler(serde_json::from_str(body)?),
            other => return Err(HandlerError::Malformed(format!("no stage consumes {}", other))),
        })
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Self::Fetch(_) => FETCH_TOPIC,
            Self::Parse(_) => PARSE_TOPIC,
            Self::Normalize(_) => NORMALIZE_TOPIC,
            Self::Lemmatize(_) => LEMMATIZE_TOPIC,
            Self::Readability(_) => READABILITY_TOPIC,
            Self::Index(_) => INDEX_TOPIC,
            Self::LinkHandler(_) => LINK_HANDLER_TOPIC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_by_topic() {
        let msg = StageMessage::decode(FETCH_TOPIC, r#"{"url":"https://elpais.com/a"}"#).unwrap();
        assert_eq!(
            msg,
            StageMessage::Fetch(FetchMessage {
                url: "https://elpais.com/a".to_string()
            })
        );
        assert_eq!(msg.topic(), FETCH_TOPIC);

        let msg = StageMessage::decode(LINK_HANDLER_TOPIC, r#"{"urls":["a.com/x","b.com"]}"#).unwrap();
        assert!(matches!(msg, StageMessage::LinkHandler(ref m) if m.urls.len() == 2));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = StageMessage::decode(PARSE_TOPIC, r#"{"url":"x"}"#).unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
        let err = StageMessage::decode("mystery-topic", "{}").unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn topics_are_distinct() {
        let mut topics = ALL_TOPICS.to_vec();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), ALL_TOPICS.len());
    }
}
