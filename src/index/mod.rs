//! Document indexing
//!
//! Documents are keyed by a hash of their canonical URL, so indexing the same
//! page twice overwrites one record.

pub mod document;
pub mod scoring;
pub mod store;

pub use document::{
    AudioFile, Document, DocumentId, DocumentMetadata, PodcastEpisode, CURRENT_DOCUMENT_VERSION,
};
pub use scoring::{rank_by_label, score_documents, ScoredDocument};
pub use store::{DocumentQuery, SearchHit, SearchStore, SledSearchStore};
