//! Fetching and parsing of source content
//!
//! - `fetcher`: HTTP GET with charset-aware decoding
//! - `parser`: single-pass HTML parsing with paywall detection
//! - `urls`: canonical URL identifiers and registrable domains
//! - `rss`: podcast feed parsing

pub mod fetcher;
pub mod parser;
pub mod rss;
pub mod urls;

pub use fetcher::{Fetch, FetchConfig, FetchEngine, FetchError, FetchResult};
pub use parser::{parse_html, ParsedPage};
pub use rss::{parse_feed, PodcastChannel, RssEpisode, RssError};
pub use urls::{domain_of, parse_url, ParsedUrl};

use thiserror::Error;

/// Errors raised when a fetched page cannot be attributed or parsed
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("no source owns domain {0}")]
    UnknownSource(String),
    #[error("page language {0:?} is not supported")]
    UnsupportedLanguage(Option<String>),
}
