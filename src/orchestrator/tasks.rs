//! Task execution
//!
//! Website tasks run a whole page through fetch, parse, the linguistic
//! engine and the index in one go. Podcast tasks poll a feed and store its
//! episodes.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::{IngestError, IngestTask};
use crate::index::{DocumentId, DocumentMetadata, PodcastEpisode};
use crate::linguistics::{lemmatize_text, normalize, readability_score, rounded_score};
use crate::pipeline::stages::links_for_known_sources;
use crate::pipeline::{PageContext, PipelineContext};
use crate::scraping::{parse_feed, parse_html, parse_url};
use crate::sources::SourceCatalog;
use crate::storage::{Store, Transaction};
use crate::types::{IngestStrategy, Link, SourceSeed};

/// How a finished task went
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Indexed(DocumentId),
    /// Nothing to index; the reason is for logs
    Skipped(&'static str),
    Episodes { stored: usize, skipped: usize },
}

pub struct TaskExecutor {
    store: Arc<Store>,
    ctx: Arc<PipelineContext>,
}

impl TaskExecutor {
    pub fn new(store: Arc<Store>, ctx: Arc<PipelineContext>) -> Self {
        Self { store, ctx }
    }

    pub async fn execute(&self, strategy: IngestStrategy, task: IngestTask) -> Result<TaskOutcome, IngestError> {
        match (strategy, task) {
            (IngestStrategy::WebsiteHtml1, IngestTask::WebsiteLink(link)) => self.process_link(link).await,
            (IngestStrategy::PodcastRss1, IngestTask::PodcastSeed(seed)) => self.process_seed(seed).await,
            (strategy, task) => Err(IngestError::UnsupportedTask {
                strategy,
                task: task.kind(),
            }),
        }
    }

    async fn process_link(&self, link: Link) -> Result<TaskOutcome, IngestError> {
        let catalog = self.ctx.catalog.snapshot();
        let result = self.index_link(&catalog, &link).await;

        // a page that failed once is not retried
        let mut tx = Transaction::new();
        tx.mark_link_fetched(link.url_identifier.clone());
        self.store.commit(tx)?;
        result
    }

    async fn index_link(&self, catalog: &SourceCatalog, link: &Link) -> Result<TaskOutcome, IngestError> {
        let source = catalog
            .get(&link.source_id)
            .ok_or_else(|| IngestError::UnknownSource(link.source_id.clone()))?;
        if source.is_seed(&link.url_identifier) {
            return Ok(TaskOutcome::Skipped("seed page"));
        }
        let parsed_url = parse_url(&link.url).ok_or_else(|| IngestError::InvalidUrl(link.url.clone()))?;

        let ingested_at = Utc::now().timestamp();
        let fetched = self.ctx.fetcher.fetch(&parsed_url.url).await?;
        let page = parse_html(&fetched.body, &fetched.final_url, source.paywall.as_ref());

        let discovered = links_for_known_sources(catalog, &page.links);
        if !discovered.is_empty() {
            let mut tx = Transaction::new();
            for found in discovered {
                tx.insert_link(found);
            }
            self.store.commit(tx)?;
        }

        let Some(language_code) = source.page_language(page.language.as_deref()) else {
            return Ok(TaskOutcome::Skipped("unsupported language"));
        };
        let normalized = normalize(&page.body_text);
        if normalized.is_empty() {
            return Ok(TaskOutcome::Skipped("no text"));
        }
        let lemmatized = lemmatize_text(self.ctx.corpus.as_ref(), language_code, &normalized)?;
        let score = rounded_score(readability_score(&normalized)?);

        let document = PageContext {
            url: parsed_url.url.to_string(),
            url_identifier: parsed_url.url_identifier,
            domain: parsed_url.domain,
            source_id: source.id.clone(),
            language_code,
            page_type: page.page_type,
            has_paywall: page.is_paywalled,
            metadata: DocumentMetadata::from_meta_tags(&page.metadata),
            ingested_at,
        }
        .into_document(lemmatized, score);
        self.ctx.search.upsert_document(&document).map_err(IngestError::Search)?;
        info!(id = %document.id, url = %document.url, readability = score, "Indexed document");
        Ok(TaskOutcome::Indexed(document.id))
    }

    async fn process_seed(&self, seed: SourceSeed) -> Result<TaskOutcome, IngestError> {
        let catalog = self.ctx.catalog.snapshot();
        let source = catalog
            .get(&seed.source_id)
            .ok_or_else(|| IngestError::UnknownSource(seed.source_id.clone()))?;
        let url = Url::parse(&seed.url).map_err(|_| IngestError::InvalidUrl(seed.url.clone()))?;

        let fetched = self.ctx.fetcher.fetch(&url).await?;
        let channel = parse_feed(&fetched.body)?;
        debug!(feed = %seed.url, title = %channel.title, items = channel.episodes.len(), "Parsed feed");

        let mut stored = 0;
        let mut skipped = 0;
        for item in &channel.episodes {
            match PodcastEpisode::from_rss(item, &source.id, source.language_code) {
                Ok(episode) => {
                    self.ctx.search.upsert_episode(&episode).map_err(IngestError::Search)?;
                    stored += 1;
                }
                Err(e) => {
                    warn!(feed = %seed.url, guid = %item.guid, "Skipping episode: {}", e);
                    skipped += 1;
                }
            }
        }
        info!(feed = %seed.url, stored, skipped, "Stored podcast episodes");
        Ok(TaskOutcome::Episodes { stored, skipped })
    }
}
