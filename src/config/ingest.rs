//! Queue, ingestion orchestrator, corpus and source catalog configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::IngestStrategy;

/// Durable queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Sleep between polls of an empty topic (milliseconds)
    pub poll_interval_ms: u64,
    /// Sleep after a handler error before the message is retried (milliseconds)
    pub retry_delay_ms: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            retry_delay_ms: 1500,
        }
    }
}

/// Worker pool and rate limit settings for one ingest strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Whether an orchestrator runs for this strategy
    pub enabled: bool,
    /// Maximum concurrently running tasks
    pub max_workers: usize,
    /// Minimum time between two task assignments for the same source (seconds)
    pub time_until_free_secs: u64,
    /// How often the source list is reloaded from the catalog (seconds)
    pub refresh_period_secs: u64,
}

impl StrategyConfig {
    pub fn website_html() -> Self {
        Self {
            enabled: true,
            max_workers: 5,
            time_until_free_secs: 10,
            refresh_period_secs: 60 * 60,
        }
    }

    pub fn podcast_rss() -> Self {
        Self {
            enabled: true,
            max_workers: 2,
            time_until_free_secs: 18 * 60 * 60,
            refresh_period_secs: 12 * 60 * 60,
        }
    }

    pub fn time_until_free(&self) -> Duration {
        Duration::from_secs(self.time_until_free_secs)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }
}

/// Ingestion orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    #[serde(default = "StrategyConfig::website_html")]
    pub website_html: StrategyConfig,
    #[serde(default = "StrategyConfig::podcast_rss")]
    pub podcast_rss: StrategyConfig,
    /// Number of pending work items fetched per prefetch refill
    pub prefetch_batch_size: usize,
}

impl IngestConfig {
    pub fn strategy(&self, strategy: IngestStrategy) -> &StrategyConfig {
        match strategy {
            IngestStrategy::WebsiteHtml1 => &self.website_html,
            IngestStrategy::PodcastRss1 => &self.podcast_rss,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            website_html: StrategyConfig::website_html(),
            podcast_rss: StrategyConfig::podcast_rss(),
            prefetch_batch_size: 300,
        }
    }
}

/// Lemma corpus location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory containing `words.tsv` and `bigrams.tsv` (None = empty corpus)
    pub dir: Option<PathBuf>,
}

/// Source catalog location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// TOML file with `[[source]]` tables
    pub path: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sources.toml"),
        }
    }
}
