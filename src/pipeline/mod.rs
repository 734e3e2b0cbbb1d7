//! Queue-driven ingestion pipeline
//!
//! ```text
//! fetch -> parse -> normalize -> lemmatize -> readability -> index
//!            \
//!             -> link-handler
//! ```

pub mod messages;
pub mod stages;

pub use messages::{
    FetchMessage, LinkHandlerMessage, PageContext, StageMessage, ALL_TOPICS, FETCH_TOPIC,
    INDEX_TOPIC, LEMMATIZE_TOPIC, LINK_HANDLER_TOPIC, NORMALIZE_TOPIC, PARSE_TOPIC,
    READABILITY_TOPIC,
};
pub use stages::{register_stages, PipelineContext, StageWorker};
