use anyhow::{bail, Result};
use noticiero::{
    config::Config,
    pipeline::{register_stages, FetchMessage, FETCH_TOPIC},
    queue::Queue,
    scraping::parse_url,
    sources::SourceCatalog,
    storage::{Store, Transaction},
    types::{IngestStrategy, Link},
};
use std::sync::Arc;
use tracing::info;

use super::{open_store, pipeline_context};

/// A queue with every pipeline stage registered, for publishing
fn pipeline_queue(config: &Config, store: Arc<Store>) -> Result<Queue> {
    let ctx = pipeline_context(config, &store)?;
    let mut queue = Queue::new(store);
    register_stages(&mut queue, ctx)?;
    Ok(queue)
}

/// Publish one URL to the fetch topic
pub async fn enqueue(config: Config, url: String) -> Result<()> {
    let Some(parsed) = parse_url(&url) else {
        bail!("Not a fetchable URL: {}", url);
    };
    let queue = pipeline_queue(&config, open_store(&config)?)?;
    queue.publish_now(
        FETCH_TOPIC,
        &FetchMessage {
            url: parsed.url.to_string(),
        },
    )?;
    println!("Enqueued {}", parsed.url);
    Ok(())
}

/// Seed links of every active website source
fn seed_links(catalog: &SourceCatalog) -> Vec<Link> {
    catalog
        .active_for(IngestStrategy::WebsiteHtml1)
        .into_iter()
        .flat_map(|source| {
            source.active_seeds().filter_map(|seed| {
                let parsed = parse_url(&seed.url)?;
                Some(Link {
                    url: parsed.url.to_string(),
                    url_identifier: parsed.url_identifier,
                    domain: parsed.domain,
                    source_id: source.id.clone(),
                    is_fetched: false,
                })
            })
        })
        .collect()
}

/// Insert website seeds as links and queue them for fetching, which feeds
/// their outbound links to the orchestrator
pub async fn seed(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let queue = pipeline_queue(&config, store.clone())?;
    let catalog = super::load_catalog(&config)?.snapshot();
    let links = seed_links(&catalog);

    let mut tx = Transaction::new();
    for link in &links {
        tx.insert_link(link.clone());
        queue.publish(&mut tx, FETCH_TOPIC, &FetchMessage { url: link.url.clone() })?;
    }
    let summary = store.commit(tx)?;
    info!(
        seeds = links.len(),
        published = summary.published,
        inserted = summary.links_inserted,
        "Seeded sources"
    );
    println!("Queued {} seed pages", links.len());
    Ok(())
}
