//! Configuration for the ingestion pipeline

mod ingest;
mod logging;
mod node;
mod scraping;

pub use ingest::{CorpusConfig, IngestConfig, QueueConfig, SourcesConfig, StrategyConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use node::NodeConfig;
pub use scraping::ScrapingConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for all HTTP requests
pub const DEFAULT_USER_AGENT: &str = "NoticieroBot/0.1 (+https://github.com/noticiero)";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub node: NodeConfig,
    /// Durable queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// HTTP fetch configuration
    #[serde(default)]
    pub scraping: ScrapingConfig,
    /// Orchestrator configuration
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Lemma corpus
    #[serde(default)]
    pub corpus: CorpusConfig,
    /// Source catalog
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects every error and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.node.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }

        if self.queue.poll_interval_ms == 0 {
            errors.push("queue poll_interval_ms must be positive".to_string());
        }

        if self.scraping.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }
        if self.scraping.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }

        for (name, strategy) in [
            ("website_html", &self.ingest.website_html),
            ("podcast_rss", &self.ingest.podcast_rss),
        ] {
            if strategy.max_workers == 0 {
                errors.push(format!("ingest.{}.max_workers must be positive", name));
            }
            if strategy.refresh_period_secs == 0 {
                errors.push(format!("ingest.{}.refresh_period_secs must be positive", name));
            }
        }
        if self.ingest.prefetch_batch_size == 0 {
            errors.push("prefetch_batch_size must be positive".to_string());
        }

        if self.sources.path.as_os_str().is_empty() {
            errors.push("sources path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
