//! Noticiero: ingestion pipeline for Spanish-language news
//!
//! - Durable, transactional stage queue on sled with at-least-once delivery
//! - Rate-limited crawl orchestration per source over a bounded worker pool
//! - HTML fetch and parse with paywall detection, podcast RSS polling
//! - Text normalization, bigram lemma disambiguation and readability scoring
//! - Lemma document index with TF-IDF label ranking

pub mod config;
pub mod index;
pub mod linguistics;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod scraping;
pub mod sources;
pub mod storage;
pub mod types;

pub use config::Config;
pub use types::*;
