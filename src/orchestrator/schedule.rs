//! Source rotation with per-source cool-downs
//!
//! Sources sit in a queue ordered by when they were last used. A task is
//! taken from the first source whose `free_at` has passed; that source then
//! moves to the back and cools down for its time-until-free. The source list
//! and the prefetch buffers share one mutex.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::prefetch::{PrefetchCache, PrefetchProvider};
use super::{IngestError, IngestTask};
use crate::config::StrategyConfig;
use crate::sources::{SharedCatalog, Source, SourceCatalog};
use crate::types::{IngestStrategy, SourceId};

/// What the worker manager should do next
#[derive(Debug)]
pub enum TaskDecision {
    Task(IngestTask),
    /// Nothing is ready; ask again after this long
    Wait(Duration),
}

#[derive(Debug, Clone)]
struct ScheduledSource {
    source: Source,
    time_until_free: Duration,
    free_at: Instant,
}

struct ScheduleState {
    sources: VecDeque<ScheduledSource>,
    prefetch: PrefetchCache,
}

pub struct Schedule {
    strategy: IngestStrategy,
    config: StrategyConfig,
    catalog: Arc<SharedCatalog>,
    provider: Arc<dyn PrefetchProvider>,
    state: Mutex<ScheduleState>,
}

impl Schedule {
    /// Load the strategy's active sources, each cooling down from now
    pub fn new(
        strategy: IngestStrategy,
        config: StrategyConfig,
        batch_size: usize,
        catalog: Arc<SharedCatalog>,
        provider: Arc<dyn PrefetchProvider>,
    ) -> Result<Self, IngestError> {
        let schedule = Self {
            strategy,
            config,
            catalog,
            provider,
            state: Mutex::new(ScheduleState {
                sources: VecDeque::new(),
                prefetch: PrefetchCache::new(batch_size),
            }),
        };
        let snapshot = schedule.catalog.snapshot();
        schedule.apply_catalog(&snapshot, Instant::now())?;
        Ok(schedule)
    }

    pub fn strategy(&self) -> IngestStrategy {
        self.strategy
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn get_task(&self) -> Result<TaskDecision, IngestError> {
        self.get_task_at(Instant::now())
    }

    pub fn get_task_at(&self, now: Instant) -> Result<TaskDecision, IngestError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut wait: Option<Duration> = None;
        let mut idx = 0;

        while idx < state.sources.len() {
            let entry = &state.sources[idx];
            if entry.free_at > now {
                let remaining = entry.free_at - now;
                wait = Some(wait.map_or(remaining, |w| w.min(remaining)));
                idx += 1;
                continue;
            }

            match state.prefetch.next(&entry.source, self.provider.as_ref())? {
                Some(task) => {
                    if let Some(mut entry) = state.sources.remove(idx) {
                        entry.free_at = now + entry.time_until_free;
                        debug!(source = %entry.source.id, task = %task, "Assigned task");
                        state.sources.push_back(entry);
                    }
                    return Ok(TaskDecision::Task(task));
                }
                None => {
                    if let Some(dropped) = state.sources.remove(idx) {
                        debug!(source = %dropped.source.id, "Source has no pending work until the next refresh");
                        state.prefetch.forget(&dropped.source.id);
                    }
                }
            }
        }

        Ok(TaskDecision::Wait(wait.unwrap_or_else(|| self.config.refresh_period())))
    }

    /// A handed-out task finished, successfully or not
    pub fn finish(&self, key: &str) {
        self.state.lock().prefetch.finish(key);
    }

    /// Re-read the catalog. Known sources keep their cool-down.
    pub fn refresh(&self) -> Result<(), IngestError> {
        let snapshot = self.catalog.reload().map_err(IngestError::Catalog)?;
        self.apply_catalog(&snapshot, Instant::now())
    }

    fn apply_catalog(&self, catalog: &SourceCatalog, now: Instant) -> Result<(), IngestError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut previous: HashMap<SourceId, Instant> = state
            .sources
            .drain(..)
            .map(|entry| (entry.source.id, entry.free_at))
            .collect();

        for source in catalog.active_for(self.strategy) {
            let time_until_free = source.time_until_free.unwrap_or_else(|| self.config.time_until_free());
            let free_at = match previous.remove(&source.id) {
                Some(free_at) => free_at,
                None => {
                    state.prefetch.force_refill(source, self.provider.as_ref())?;
                    now + time_until_free
                }
            };
            state.sources.push_back(ScheduledSource {
                source: source.clone(),
                time_until_free,
                free_at,
            });
        }
        for gone in previous.keys() {
            state.prefetch.forget(gone);
        }

        info!(
            strategy = %self.strategy,
            sources = state.sources.len(),
            "Loaded ingest sources"
        );
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }
}
