use anyhow::Result;
use futures::future::join_all;
use noticiero::{
    config::Config,
    orchestrator::{start_orchestrators, OrchestratorDeps},
    pipeline::register_stages,
    queue::Queue,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{open_store, pipeline_context};

/// Run the queue consumers and the orchestrators until interrupted
pub async fn run(config: Config) -> Result<()> {
    info!("Data directory: {}", config.node.data_dir.display());
    let store = open_store(&config)?;
    let ctx = pipeline_context(&config, &store)?;

    let mut queue = Queue::new(store.clone())
        .with_poll_interval(config.queue.poll_interval())
        .with_retry_delay(config.queue.retry_delay());
    register_stages(&mut queue, ctx.clone())?;
    let queue = Arc::new(queue);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut handles = queue.start_consumers(&shutdown_tx);
    handles.extend(start_orchestrators(
        &config.ingest,
        OrchestratorDeps {
            store: store.clone(),
            pipeline: ctx,
            prefetch_batch_size: config.ingest.prefetch_batch_size,
        },
        &shutdown_tx,
    ));
    info!(
        pending = store.enqueued_total(),
        tasks = handles.len(),
        "Pipeline running, press Ctrl+C to stop"
    );

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
        _ = wait_for_sigterm() => info!("Received SIGTERM, shutting down"),
    }
    let _ = shutdown_tx.send(());
    for result in join_all(handles).await {
        if let Err(e) = result {
            warn!("Worker task ended abnormally: {}", e);
        }
    }
    store.flush()?;
    info!("Stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
