use anyhow::Result;
use noticiero::{
    config::Config,
    index::{SearchStore, SledSearchStore},
    pipeline::ALL_TOPICS,
};
use tracing::info;

use super::open_store;

pub async fn show_stats(config: Config) -> Result<()> {
    info!("Loading pipeline statistics...");
    let store = open_store(&config)?;
    let search = SledSearchStore::open(store.db())?;
    let links = store.link_stats();

    println!("\nNoticiero Statistics:");
    println!("=====================");
    println!("Data directory: {}", config.node.data_dir.display());
    println!("Documents: {}", search.document_count()?);
    println!("Links: {} ({} fetched, {} pending)", links.total, links.fetched, links.total - links.fetched);
    println!("Enqueued messages: {}", store.enqueued_total());
    for topic in ALL_TOPICS {
        let depth = store.enqueued_count(topic);
        if depth > 0 {
            println!("  {}: {}", topic, depth);
        }
    }
    if let Some(oldest) = ALL_TOPICS
        .iter()
        .filter_map(|topic| store.oldest_enqueued(topic).ok().flatten())
        .map(|m| m.enqueued_at)
        .min()
    {
        println!("Oldest message enqueued at: {}", oldest.to_rfc3339());
    }
    Ok(())
}
