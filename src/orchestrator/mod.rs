//! Ingestion orchestrator
//!
//! One orchestrator per ingest strategy keeps up to `max_workers` tasks in
//! flight on a [`JoinSet`], taking work from the [`Schedule`] whenever a slot
//! frees up and sleeping until the next source cools down otherwise. A
//! supervisor restarts the orchestrator if its control loop fails.

pub mod prefetch;
pub mod schedule;
pub mod tasks;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{IngestConfig, StrategyConfig};
use crate::linguistics::{CorpusError, ReadabilityError};
use crate::pipeline::PipelineContext;
use crate::scraping::{FetchError, RssError};
use crate::storage::{StorageError, Store};
use crate::types::{IngestStrategy, Link, SourceId, SourceSeed};

pub use prefetch::{ActiveSeeds, PrefetchCache, PrefetchProvider, UnfetchedLinks};
pub use schedule::{Schedule, TaskDecision};
pub use tasks::{TaskExecutor, TaskOutcome};

/// Wait before the first assignment after (re)start
const INITIAL_WAIT: Duration = Duration::from_secs(1);
/// Re-check interval while every worker slot is busy
const FALLBACK_WAIT: Duration = Duration::from_secs(10);
/// Wait after the schedule failed to produce a task
const ERROR_WAIT: Duration = Duration::from_secs(2 * 60);
/// Delay before a failed orchestrator is restarted
const RESTART_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{strategy} orchestrator cannot run a {task} task")]
    UnsupportedTask {
        strategy: IngestStrategy,
        task: &'static str,
    },
    #[error("source {0} is not configured")]
    UnknownSource(SourceId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("source catalog: {0:#}")]
    Catalog(anyhow::Error),
    #[error("search store: {0:#}")]
    Search(anyhow::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Feed(#[from] RssError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Readability(#[from] ReadabilityError),
}

/// A unit of orchestrated work
#[derive(Debug, Clone, PartialEq)]
pub enum IngestTask {
    WebsiteLink(Link),
    PodcastSeed(SourceSeed),
}

impl IngestTask {
    /// Identifies the work item while it is in flight
    pub fn key(&self) -> &str {
        match self {
            Self::WebsiteLink(link) => &link.url_identifier,
            Self::PodcastSeed(seed) => &seed.id,
        }
    }

    pub fn source_id(&self) -> &SourceId {
        match self {
            Self::WebsiteLink(link) => &link.source_id,
            Self::PodcastSeed(seed) => &seed.source_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::WebsiteLink(_) => "website link",
            Self::PodcastSeed(_) => "podcast seed",
        }
    }
}

impl fmt::Display for IngestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebsiteLink(link) => write!(f, "link {}", link.url),
            Self::PodcastSeed(seed) => write!(f, "seed {}", seed.url),
        }
    }
}

/// Releases the in-flight marker when a task ends, including by panic
struct InFlight {
    schedule: Arc<Schedule>,
    key: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.schedule.finish(&self.key);
    }
}

/// Everything an orchestrator needs to (re)build itself
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub store: Arc<Store>,
    pub pipeline: Arc<PipelineContext>,
    pub prefetch_batch_size: usize,
}

impl OrchestratorDeps {
    fn provider(&self, strategy: IngestStrategy) -> Arc<dyn PrefetchProvider> {
        match strategy {
            IngestStrategy::WebsiteHtml1 => Arc::new(UnfetchedLinks::new(self.store.clone())),
            IngestStrategy::PodcastRss1 => Arc::new(ActiveSeeds),
        }
    }
}

pub struct Orchestrator {
    strategy: IngestStrategy,
    schedule: Arc<Schedule>,
    executor: Arc<TaskExecutor>,
}

impl Orchestrator {
    pub fn new(strategy: IngestStrategy, config: StrategyConfig, deps: &OrchestratorDeps) -> Result<Self, IngestError> {
        Self::with_provider(strategy, config, deps, deps.provider(strategy))
    }

    /// Build with a custom source of pending work
    pub fn with_provider(
        strategy: IngestStrategy,
        config: StrategyConfig,
        deps: &OrchestratorDeps,
        provider: Arc<dyn PrefetchProvider>,
    ) -> Result<Self, IngestError> {
        let schedule = Schedule::new(
            strategy,
            config,
            deps.prefetch_batch_size,
            deps.pipeline.catalog.clone(),
            provider,
        )?;
        Ok(Self {
            strategy,
            schedule: Arc::new(schedule),
            executor: Arc::new(TaskExecutor::new(deps.store.clone(), deps.pipeline.clone())),
        })
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    /// Run until shutdown or until a source refresh fails. In-flight tasks
    /// are abandoned, not drained.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<(), IngestError> {
        let config = self.schedule.config().clone();
        let mut workers: JoinSet<(String, Result<TaskOutcome, IngestError>)> = JoinSet::new();
        let mut wake_at = Instant::now() + INITIAL_WAIT;
        let mut refresh_at = Instant::now() + config.refresh_period();

        info!(strategy = %self.strategy, max_workers = config.max_workers, "Orchestrator started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    workers.abort_all();
                    break;
                }
                Some(joined) = workers.join_next() => {
                    self.log_completion(joined);
                    wake_at = self.fill(&mut workers, config.max_workers);
                }
                _ = sleep_until(wake_at) => {
                    wake_at = self.fill(&mut workers, config.max_workers);
                }
                _ = sleep_until(refresh_at) => {
                    info!(strategy = %self.strategy, "Refreshing sources");
                    if let Err(e) = self.schedule.refresh() {
                        workers.abort_all();
                        return Err(e);
                    }
                    refresh_at = Instant::now() + config.refresh_period();
                    wake_at = self.fill(&mut workers, config.max_workers);
                }
            }
        }
        info!(strategy = %self.strategy, "Orchestrator stopped");
        Ok(())
    }

    /// Start tasks until the pool is full or nothing is ready.
    /// Returns when to look again.
    fn fill(&self, workers: &mut JoinSet<(String, Result<TaskOutcome, IngestError>)>, max_workers: usize) -> Instant {
        while workers.len() < max_workers {
            match self.schedule.get_task() {
                Ok(TaskDecision::Task(task)) => self.spawn(workers, task),
                Ok(TaskDecision::Wait(wait)) => {
                    debug!(strategy = %self.strategy, wait_secs = wait.as_secs(), "No task ready");
                    return Instant::now() + wait;
                }
                Err(e) => {
                    error!(strategy = %self.strategy, "Could not get next task: {}", e);
                    return Instant::now() + ERROR_WAIT;
                }
            }
        }
        Instant::now() + FALLBACK_WAIT
    }

    fn spawn(&self, workers: &mut JoinSet<(String, Result<TaskOutcome, IngestError>)>, task: IngestTask) {
        let guard = InFlight {
            schedule: self.schedule.clone(),
            key: task.key().to_string(),
        };
        let executor = self.executor.clone();
        let strategy = self.strategy;
        let label = task.to_string();
        workers.spawn(async move {
            let _guard = guard;
            let result = executor.execute(strategy, task).await;
            (label, result)
        });
    }

    fn log_completion(&self, joined: Result<(String, Result<TaskOutcome, IngestError>), tokio::task::JoinError>) {
        match joined {
            Ok((task, Ok(outcome))) => debug!(strategy = %self.strategy, %task, ?outcome, "Task finished"),
            Ok((task, Err(e))) => warn!(strategy = %self.strategy, %task, "Task failed: {}", e),
            Err(e) if e.is_panic() => error!(strategy = %self.strategy, "Task panicked: {}", e),
            Err(e) => debug!(strategy = %self.strategy, "Task cancelled: {}", e),
        }
    }
}

/// Keep an orchestrator for `strategy` running until shutdown. The control
/// loop runs as its own task; an error or a panic rebuilds the orchestrator
/// from the catalog after [`RESTART_DELAY`].
pub async fn supervise(
    strategy: IngestStrategy,
    config: StrategyConfig,
    deps: OrchestratorDeps,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        if !matches!(shutdown.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
            return;
        }
        let failure = match Orchestrator::new(strategy, config.clone(), &deps) {
            Ok(orchestrator) => {
                let control = tokio::spawn(Arc::new(orchestrator).run(shutdown.resubscribe()));
                match control.await {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(e) if e.is_panic() => format!("control loop panicked: {}", e),
                    Err(e) => {
                        warn!(strategy = %strategy, "Orchestrator cancelled: {}", e);
                        return;
                    }
                }
            }
            Err(e) => e.to_string(),
        };
        error!(strategy = %strategy, "Orchestrator failed, restarting in {:?}: {}", RESTART_DELAY, failure);
        tokio::select! {
            _ = sleep(RESTART_DELAY) => {}
            _ = shutdown.recv() => return,
        }
    }
}

/// Spawn a supervised orchestrator for every enabled strategy
pub fn start_orchestrators(
    config: &IngestConfig,
    deps: OrchestratorDeps,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    IngestStrategy::ALL
        .into_iter()
        .filter(|strategy| config.strategy(*strategy).enabled)
        .map(|strategy| {
            let strategy_config = config.strategy(strategy).clone();
            tokio::spawn(supervise(strategy, strategy_config, deps.clone(), shutdown.subscribe()))
        })
        .collect()
}
