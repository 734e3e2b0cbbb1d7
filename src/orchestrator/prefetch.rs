//! Per-source buffers of pending work
//!
//! Each source has a buffer filled in batches from a [`PrefetchProvider`].
//! Items handed out stay "in flight" until their task finishes, so a refill
//! racing a running task never hands the same link out twice.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::{IngestError, IngestTask};
use crate::sources::Source;
use crate::storage::Store;
use crate::types::SourceId;

/// Supplies the next batch of pending work for a source
pub trait PrefetchProvider: Send + Sync {
    fn next_batch(&self, source: &Source, limit: usize) -> Result<Vec<IngestTask>, IngestError>;
}

/// Unfetched links stored for the source
pub struct UnfetchedLinks {
    store: Arc<Store>,
}

impl UnfetchedLinks {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl PrefetchProvider for UnfetchedLinks {
    fn next_batch(&self, source: &Source, limit: usize) -> Result<Vec<IngestTask>, IngestError> {
        Ok(self
            .store
            .unfetched_links(&source.id, limit)?
            .into_iter()
            .map(IngestTask::WebsiteLink)
            .collect())
    }
}

/// The source's active seeds; every refill hands them all out again
pub struct ActiveSeeds;

impl PrefetchProvider for ActiveSeeds {
    fn next_batch(&self, source: &Source, limit: usize) -> Result<Vec<IngestTask>, IngestError> {
        Ok(source
            .active_seeds()
            .take(limit)
            .cloned()
            .map(IngestTask::PodcastSeed)
            .collect())
    }
}

pub struct PrefetchCache {
    batch_size: usize,
    buffers: HashMap<SourceId, VecDeque<IngestTask>>,
    in_flight: HashSet<String>,
}

impl PrefetchCache {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            buffers: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Replace the source's buffer with a fresh batch
    pub fn force_refill(&mut self, source: &Source, provider: &dyn PrefetchProvider) -> Result<usize, IngestError> {
        let batch: VecDeque<IngestTask> = provider
            .next_batch(source, self.batch_size)?
            .into_iter()
            .filter(|task| !self.in_flight.contains(task.key()))
            .collect();
        let len = batch.len();
        self.buffers.insert(source.id.clone(), batch);
        Ok(len)
    }

    /// Pop the next item, refilling once if the buffer is empty.
    /// `None` means the source has nothing to do right now.
    pub fn next(&mut self, source: &Source, provider: &dyn PrefetchProvider) -> Result<Option<IngestTask>, IngestError> {
        if self.buffers.get(&source.id).map_or(true, VecDeque::is_empty) {
            self.force_refill(source, provider)?;
        }
        let Some(task) = self.buffers.get_mut(&source.id).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        self.in_flight.insert(task.key().to_string());
        Ok(Some(task))
    }

    /// Mark a handed-out item as done
    pub fn finish(&mut self, key: &str) {
        self.in_flight.remove(key);
    }

    pub fn forget(&mut self, source_id: &SourceId) {
        self.buffers.remove(source_id);
    }

    pub fn buffered(&self, source_id: &SourceId) -> usize {
        self.buffers.get(source_id).map_or(0, VecDeque::len)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceCatalog;
    use crate::storage::Transaction;
    use crate::types::Link;

    fn catalog() -> SourceCatalog {
        SourceCatalog::from_toml_str(
            r#"
            [[source]]
            id = "elpais"
            url = "https://elpais.com"
            ingest_strategy = "website-html-1"
            language_code = "es"
        "#,
        )
        .unwrap()
    }

    fn store_with_links(n: usize) -> Arc<Store> {
        let store = Arc::new(Store::temporary().unwrap());
        let mut tx = Transaction::new();
        for i in 0..n {
            tx.insert_link(Link {
                url: format!("https://elpais.com/nota-{}", i),
                url_identifier: format!("elpais.com|nota-{}", i),
                domain: "elpais.com".to_string(),
                source_id: SourceId::new("elpais"),
                is_fetched: false,
            });
        }
        store.commit(tx).unwrap();
        store
    }

    #[test]
    fn refills_in_batches() {
        let catalog = catalog();
        let source = catalog.get(&SourceId::new("elpais")).unwrap();
        let provider = UnfetchedLinks::new(store_with_links(5));
        let mut cache = PrefetchCache::new(2);

        assert_eq!(cache.force_refill(source, &provider).unwrap(), 2);
        assert!(cache.next(source, &provider).unwrap().is_some());
        assert_eq!(cache.buffered(&source.id), 1);
        assert_eq!(cache.in_flight(), 1);
    }

    #[test]
    fn in_flight_items_are_not_handed_out_twice() {
        let catalog = catalog();
        let source = catalog.get(&SourceId::new("elpais")).unwrap();
        let provider = UnfetchedLinks::new(store_with_links(1));
        let mut cache = PrefetchCache::new(10);

        let first = cache.next(source, &provider).unwrap().unwrap();
        // the link is still unfetched in the store, but its task is running
        assert!(cache.next(source, &provider).unwrap().is_none());

        cache.finish(first.key());
        let again = cache.next(source, &provider).unwrap().unwrap();
        assert_eq!(again.key(), first.key());
    }

    #[test]
    fn seeds_come_back_after_every_refill() {
        let catalog = SourceCatalog::from_toml_str(
            r#"
            [[source]]
            id = "radio"
            url = "https://radio.es"
            ingest_strategy = "podcast-rss-1"
            language_code = "es"
            [[source.seeds]]
            url = "https://radio.es/feed.xml"
            [[source.seeds]]
            url = "https://radio.es/old.xml"
            is_active = false
        "#,
        )
        .unwrap();
        let source = catalog.get(&SourceId::new("radio")).unwrap();
        let mut cache = PrefetchCache::new(10);

        let task = cache.next(source, &ActiveSeeds).unwrap().unwrap();
        assert!(matches!(task, IngestTask::PodcastSeed(ref s) if s.url == "https://radio.es/feed.xml"));
        assert!(cache.next(source, &ActiveSeeds).unwrap().is_none());
        cache.finish(task.key());
        assert!(cache.next(source, &ActiveSeeds).unwrap().is_some());
    }
}
