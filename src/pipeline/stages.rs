//! Stage handlers
//!
//! One [`StageWorker`] per topic. Each stage reads its input blob, does its
//! work and stages the next message plus blob bookkeeping on the handler
//! transaction, so a crash between stages never loses or duplicates a hop.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::messages::*;
use crate::index::{DocumentMetadata, SearchStore};
use crate::linguistics::{lemmatize_text, normalize, readability_score, rounded_score, Corpus};
use crate::queue::{HandlerContext, HandlerError, Queue, QueueError, QueueHandler};
use crate::scraping::{parse_html, parse_url, Fetch, ParseError};
use crate::sources::{SharedCatalog, SourceCatalog};
use crate::storage::Message;
use crate::types::{BlobId, Link};

/// Services the stages share
pub struct PipelineContext {
    pub fetcher: Arc<dyn Fetch>,
    pub catalog: Arc<SharedCatalog>,
    pub corpus: Arc<dyn Corpus>,
    pub search: Arc<dyn SearchStore>,
}

/// Handler for one pipeline topic
pub struct StageWorker {
    topic: &'static str,
    ctx: Arc<PipelineContext>,
}

impl StageWorker {
    pub fn new(topic: &'static str, ctx: Arc<PipelineContext>) -> Self {
        Self { topic, ctx }
    }
}

/// Register a worker for every pipeline topic
pub fn register_stages(queue: &mut Queue, ctx: Arc<PipelineContext>) -> Result<(), QueueError> {
    for topic in ALL_TOPICS {
        queue.register(Arc::new(StageWorker::new(topic, ctx.clone())))?;
    }
    Ok(())
}

fn read_blob(ctx: &HandlerContext<'_>, id: &BlobId) -> Result<String, HandlerError> {
    ctx.store()
        .get_blob(id)?
        .ok_or_else(|| HandlerError::Malformed(format!("blob {} no longer exists", id)))
}

/// Read a blob and stage its deletion
fn take_blob(ctx: &mut HandlerContext<'_>, id: &BlobId) -> Result<String, HandlerError> {
    let text = read_blob(ctx, id)?;
    ctx.tx().delete_blob(id.clone());
    Ok(text)
}

#[async_trait]
impl QueueHandler for StageWorker {
    fn topic(&self) -> &str {
        self.topic
    }

    async fn process(&self, ctx: &mut HandlerContext<'_>, message: &Message) -> Result<(), HandlerError> {
        match StageMessage::decode(self.topic, &message.body)? {
            StageMessage::Fetch(m) => self.fetch(ctx, m).await,
            StageMessage::Parse(m) => self.parse(ctx, m),
            StageMessage::Normalize(m) => self.normalize(ctx, m),
            StageMessage::Lemmatize(m) => self.lemmatize(ctx, m),
            StageMessage::Readability(m) => self.readability(ctx, m),
            StageMessage::Index(m) => self.index(ctx, m),
            StageMessage::LinkHandler(m) => self.handle_links(ctx, m),
        }
    }
}

impl StageWorker {
    async fn fetch(&self, ctx: &mut HandlerContext<'_>, m: FetchMessage) -> Result<(), HandlerError> {
        let parsed = parse_url(&m.url)
            .ok_or_else(|| HandlerError::Malformed(ParseError::InvalidUrl(m.url.clone()).to_string()))?;
        let catalog = self.ctx.catalog.snapshot();
        let Some(source) = catalog.for_domain(&parsed.domain) else {
            info!(url = %m.url, "{}, skipping", ParseError::UnknownSource(parsed.domain.clone()));
            return Ok(());
        };

        match self.ctx.fetcher.fetch(&parsed.url).await {
            Ok(page) => {
                let blob_id = ctx.tx().put_blob(page.body);
                ctx.tx().mark_link_fetched(parsed.url_identifier.clone());
                ctx.publish(
                    PARSE_TOPIC,
                    &ParseMessage {
                        url: parsed.url.to_string(),
                        blob_id,
                        source_id: source.id.clone(),
                        ingested_at: Utc::now().timestamp(),
                    },
                )?;
                debug!(url = %parsed.url, source = %source.id, "Fetched page");
                Ok(())
            }
            Err(e) if e.is_permanent() => {
                warn!(url = %parsed.url, "Giving up on page: {}", e);
                ctx.tx().mark_link_fetched(parsed.url_identifier.clone());
                Ok(())
            }
            Err(e) => Err(HandlerError::Transient(e.into())),
        }
    }

    fn parse(&self, ctx: &mut HandlerContext<'_>, m: ParseMessage) -> Result<(), HandlerError> {
        let html = take_blob(ctx, &m.blob_id)?;
        let catalog = self.ctx.catalog.snapshot();
        let Some(source) = catalog.get(&m.source_id) else {
            warn!(url = %m.url, source = %m.source_id, "Source no longer configured, dropping page");
            return Ok(());
        };
        let base = Url::parse(&m.url).map_err(|e| HandlerError::Malformed(format!("{}: {}", m.url, e)))?;
        let parsed_url = parse_url(&m.url)
            .ok_or_else(|| HandlerError::Malformed(ParseError::InvalidUrl(m.url.clone()).to_string()))?;

        let page = parse_html(&html, &base, source.paywall.as_ref());
        if !page.links.is_empty() {
            ctx.publish(
                LINK_HANDLER_TOPIC,
                &LinkHandlerMessage {
                    urls: page.links.clone(),
                },
            )?;
        }

        let Some(language_code) = source.page_language(page.language.as_deref()) else {
            info!(url = %m.url, "{}, not indexing", ParseError::UnsupportedLanguage(page.language.clone()));
            return Ok(());
        };

        let blob_id = ctx.tx().put_blob(page.body_text);
        ctx.publish(
            NORMALIZE_TOPIC,
            &NormalizeMessage {
                page: PageContext {
                    url: m.url,
                    url_identifier: parsed_url.url_identifier,
                    domain: parsed_url.domain,
                    source_id: source.id.clone(),
                    language_code,
                    page_type: page.page_type,
                    has_paywall: page.is_paywalled,
                    metadata: DocumentMetadata::from_meta_tags(&page.metadata),
                    ingested_at: m.ingested_at,
                },
                blob_id,
            },
        )?;
        Ok(())
    }

    fn normalize(&self, ctx: &mut HandlerContext<'_>, m: NormalizeMessage) -> Result<(), HandlerError> {
        let text = take_blob(ctx, &m.blob_id)?;
        let normalized = normalize(&text);
        if normalized.is_empty() {
            info!(url = %m.page.url, "Page has no text, not indexing");
            return Ok(());
        }
        let normalized_blob_id = ctx.tx().put_blob(normalized);
        ctx.publish(
            LEMMATIZE_TOPIC,
            &LemmatizeMessage {
                page: m.page,
                normalized_blob_id,
            },
        )?;
        Ok(())
    }

    fn lemmatize(&self, ctx: &mut HandlerContext<'_>, m: LemmatizeMessage) -> Result<(), HandlerError> {
        // the readability stage still needs the normalized text
        let normalized = read_blob(ctx, &m.normalized_blob_id)?;
        let lemmas = lemmatize_text(self.ctx.corpus.as_ref(), m.page.language_code, &normalized)
            .map_err(|e| HandlerError::Transient(e.into()))?;
        let lemmatized_blob_id = ctx.tx().put_blob(lemmas);
        ctx.publish(
            READABILITY_TOPIC,
            &ReadabilityMessage {
                page: m.page,
                normalized_blob_id: m.normalized_blob_id,
                lemmatized_blob_id,
            },
        )?;
        Ok(())
    }

    fn readability(&self, ctx: &mut HandlerContext<'_>, m: ReadabilityMessage) -> Result<(), HandlerError> {
        let normalized = take_blob(ctx, &m.normalized_blob_id)?;
        let score = match readability_score(&normalized) {
            Ok(score) => score,
            Err(e) => {
                warn!(url = %m.page.url, "Cannot score readability, not indexing: {}", e);
                ctx.tx().delete_blob(m.lemmatized_blob_id);
                return Ok(());
            }
        };
        ctx.publish(
            INDEX_TOPIC,
            &IndexMessage {
                page: m.page,
                lemmatized_blob_id: m.lemmatized_blob_id,
                readability_score: rounded_score(score),
            },
        )?;
        Ok(())
    }

    fn index(&self, ctx: &mut HandlerContext<'_>, m: IndexMessage) -> Result<(), HandlerError> {
        let lemmatized_body = take_blob(ctx, &m.lemmatized_blob_id)?;
        let document = m.page.into_document(lemmatized_body, m.readability_score);
        // upserts are idempotent, so a redelivery after this point is harmless
        self.ctx.search.upsert_document(&document)?;
        info!(
            id = %document.id,
            url = %document.url,
            readability = document.readability_score,
            "Indexed document"
        );
        Ok(())
    }

    fn handle_links(&self, ctx: &mut HandlerContext<'_>, m: LinkHandlerMessage) -> Result<(), HandlerError> {
        let catalog = self.ctx.catalog.snapshot();
        let links = links_for_known_sources(&catalog, &m.urls);
        debug!(offered = m.urls.len(), inserted = links.len(), "Handled discovered links");
        for link in links {
            ctx.tx().insert_link(link);
        }
        Ok(())
    }
}

/// Unfetched links for every URL whose domain belongs to a configured source
pub(crate) fn links_for_known_sources(catalog: &SourceCatalog, urls: &[String]) -> Vec<Link> {
    urls.iter()
        .filter_map(|raw| {
            let parsed = parse_url(raw)?;
            let source = catalog.for_domain(&parsed.domain)?;
            Some(Link {
                url: parsed.url.to_string(),
                url_identifier: parsed.url_identifier,
                domain: parsed.domain,
                source_id: source.id.clone(),
                is_fetched: false,
            })
        })
        .collect()
}
