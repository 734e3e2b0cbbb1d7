//! Per-topic consumer loops

use super::{HandlerContext, HandlerError, Queue, QueueError};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a single poll of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing enqueued
    Empty,
    /// Handler succeeded; its writes and the completion were committed
    Completed,
    /// Payload was unprocessable; message completed without effects
    Discarded,
    /// Handler failed; message left enqueued for redelivery
    Retry,
}

impl Queue {
    /// Take the oldest enqueued message of `topic` and run its handler once
    pub async fn poll_once(&self, topic: &str) -> Result<PollOutcome, QueueError> {
        let handler = self.handler(topic)?.clone();
        let Some(message) = self.store.oldest_enqueued(topic)? else {
            return Ok(PollOutcome::Empty);
        };

        let mut ctx = HandlerContext::new(self);
        match handler.process(&mut ctx, &message).await {
            Ok(()) => {
                let mut tx = ctx.into_transaction();
                tx.clear_message(message.id.clone());
                self.store.commit(tx)?;
                debug!(topic, message_id = %message.id, "Message completed");
                Ok(PollOutcome::Completed)
            }
            Err(HandlerError::Malformed(reason)) => {
                // staged writes are dropped; only the completion lands
                warn!(
                    topic,
                    message_id = %message.id,
                    "Discarding unprocessable message: {}",
                    reason
                );
                let mut tx = crate::storage::Transaction::new();
                tx.clear_message(message.id.clone());
                self.store.commit(tx)?;
                Ok(PollOutcome::Discarded)
            }
            Err(HandlerError::Transient(e)) => {
                warn!(
                    topic,
                    message_id = %message.id,
                    position = message.queue_position,
                    "Handler failed, message stays enqueued: {:#}",
                    e
                );
                Ok(PollOutcome::Retry)
            }
        }
    }

    /// Start one supervised consumer task per registered topic
    pub fn start_consumers(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.topics()
            .into_iter()
            .map(|topic| {
                let queue = Arc::clone(self);
                let shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move { queue.supervise(topic, shutdown_rx).await })
            })
            .collect()
    }

    /// Restart the topic's consumer after a panic. The message being handled
    /// was never cleared, so it is redelivered.
    async fn supervise(self: Arc<Self>, topic: String, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            let worker = tokio::spawn(Arc::clone(&self).consume(topic.clone(), shutdown_rx.resubscribe()));
            match worker.await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    error!(topic = %topic, "Consumer panicked, restarting: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = shutdown_rx.recv() => break,
                    }
                }
                Err(e) => {
                    error!(topic = %topic, "Consumer task failed: {}", e);
                    break;
                }
            }
        }
    }

    async fn consume(self: Arc<Self>, topic: String, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(topic = %topic, "Consumer started");
        loop {
            let delay = match self.poll_once(&topic).await {
                Ok(PollOutcome::Completed) | Ok(PollOutcome::Discarded) => None,
                Ok(PollOutcome::Empty) => Some(self.poll_interval),
                Ok(PollOutcome::Retry) => Some(self.retry_delay),
                Err(e) => {
                    error!(topic = %topic, "Queue poll failed: {}", e);
                    Some(self.poll_interval)
                }
            };

            match delay {
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.recv() => break,
                    }
                }
                None => {
                    if !matches!(
                        shutdown_rx.try_recv(),
                        Err(broadcast::error::TryRecvError::Empty)
                    ) {
                        break;
                    }
                }
            }
        }
        info!(topic = %topic, "Consumer stopped");
    }
}
