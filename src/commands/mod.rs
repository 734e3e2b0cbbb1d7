pub mod init;
pub mod links;
pub mod run;
pub mod stats;
pub mod text;

use anyhow::{Context, Result};
use noticiero::{
    config::Config,
    index::SledSearchStore,
    linguistics::InMemoryCorpus,
    pipeline::PipelineContext,
    scraping::{FetchConfig, FetchEngine},
    sources::{FileSourceProvider, SharedCatalog},
    storage::Store,
};
use std::sync::Arc;
use tracing::{info, warn};

pub fn open_store(config: &Config) -> Result<Arc<Store>> {
    std::fs::create_dir_all(&config.node.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.node.data_dir.display()))?;
    Ok(Arc::new(Store::from_config(&config.node)?))
}

pub fn load_catalog(config: &Config) -> Result<Arc<SharedCatalog>> {
    let provider = FileSourceProvider::new(&config.sources.path);
    let catalog = SharedCatalog::new(Arc::new(provider))
        .with_context(|| format!("Failed to load sources from {}", config.sources.path.display()))?;
    info!("Loaded {} sources", catalog.snapshot().len());
    Ok(Arc::new(catalog))
}

pub fn load_corpus(config: &Config) -> Result<InMemoryCorpus> {
    match &config.corpus.dir {
        Some(dir) => {
            let corpus = InMemoryCorpus::load(dir)?;
            info!(
                words = corpus.word_count(),
                bigrams = corpus.bigram_count(),
                "Loaded corpus from {}",
                dir.display()
            );
            Ok(corpus)
        }
        None => {
            warn!("No corpus directory configured; lemmatization will drop every token");
            Ok(InMemoryCorpus::new())
        }
    }
}

/// Wire up the services shared by the queue stages and the orchestrators
pub fn pipeline_context(config: &Config, store: &Store) -> Result<Arc<PipelineContext>> {
    let fetcher = FetchEngine::new(FetchConfig::from(&config.scraping)).context("Failed to build HTTP client")?;
    Ok(Arc::new(PipelineContext {
        fetcher: Arc::new(fetcher),
        catalog: load_catalog(config)?,
        corpus: Arc::new(load_corpus(config)?),
        search: Arc::new(SledSearchStore::open(store.db())?),
    }))
}
