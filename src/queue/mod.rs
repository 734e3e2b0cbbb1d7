//! Durable per-topic work queue
//!
//! Each topic has exactly one registered handler and one consumer task.
//! Messages are JSON payloads persisted through the [`Store`]; a handler's
//! staged writes and the completion of its message commit in the same
//! transaction, so delivery is at-least-once and never half-applied.

mod consumer;

pub use consumer::PollOutcome;

use crate::storage::{Message, StorageError, Store, Transaction};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("topic already registered: {0}")]
    DuplicateTopic(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("failed to encode message for {topic}: {source}")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of a failed handler invocation
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload can never be processed; the message is completed unprocessed
    #[error("malformed message: {0}")]
    Malformed(String),
    /// Anything else; the message stays enqueued and is retried
    #[error("transient failure: {0}")]
    Transient(#[from] anyhow::Error),
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Malformed(e.to_string())
    }
}

impl From<QueueError> for HandlerError {
    fn from(e: QueueError) -> Self {
        HandlerError::Transient(e.into())
    }
}

impl From<StorageError> for HandlerError {
    fn from(e: StorageError) -> Self {
        HandlerError::Transient(e.into())
    }
}

/// What a handler sees while processing one message
pub struct HandlerContext<'a> {
    queue: &'a Queue,
    tx: Transaction,
}

impl<'a> HandlerContext<'a> {
    fn new(queue: &'a Queue) -> Self {
        Self {
            queue,
            tx: Transaction::new(),
        }
    }

    /// Publish to another topic, atomically with this message's completion
    pub fn publish<T: Serialize>(&mut self, topic: &str, payload: &T) -> Result<(), QueueError> {
        self.queue.publish(&mut self.tx, topic, payload)
    }

    /// Writes staged alongside the message completion
    pub fn tx(&mut self) -> &mut Transaction {
        &mut self.tx
    }

    pub fn store(&self) -> &Store {
        &self.queue.store
    }

    fn into_transaction(self) -> Transaction {
        self.tx
    }
}

/// A consumer of one topic
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Topic this handler consumes
    fn topic(&self) -> &str;

    /// Process one message. Writes staged on `ctx` are committed only on `Ok`.
    async fn process(&self, ctx: &mut HandlerContext<'_>, message: &Message) -> Result<(), HandlerError>;
}

/// Topic registry plus the store that backs it.
///
/// Built once at startup with [`Queue::register`], then shared read-only
/// behind an `Arc`.
pub struct Queue {
    store: Arc<Store>,
    handlers: HashMap<String, Arc<dyn QueueHandler>>,
    poll_interval: Duration,
    retry_delay: Duration,
}

impl Queue {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            poll_interval: Duration::from_millis(1500),
            retry_delay: Duration::from_millis(1500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Register the handler for its topic. Fails if the topic is taken.
    pub fn register(&mut self, handler: Arc<dyn QueueHandler>) -> Result<(), QueueError> {
        let topic = handler.topic().to_string();
        if self.handlers.contains_key(&topic) {
            return Err(QueueError::DuplicateTopic(topic));
        }
        self.handlers.insert(topic, handler);
        Ok(())
    }

    /// Stage a message on `tx`. Fails if the topic has no handler.
    pub fn publish<T: Serialize>(
        &self,
        tx: &mut Transaction,
        topic: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        if !self.handlers.contains_key(topic) {
            return Err(QueueError::UnknownTopic(topic.to_string()));
        }
        let body = serde_json::to_string(payload).map_err(|source| QueueError::Encode {
            topic: topic.to_string(),
            source,
        })?;
        tx.stage_publish(topic, body);
        Ok(())
    }

    /// Publish a single message in its own transaction
    pub fn publish_now<T: Serialize>(&self, topic: &str, payload: &T) -> Result<(), QueueError> {
        let mut tx = Transaction::new();
        self.publish(&mut tx, topic, payload)?;
        self.store.commit(tx)?;
        Ok(())
    }

    /// Registered topic names, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn handler(&self, topic: &str) -> Result<&Arc<dyn QueueHandler>, QueueError> {
        self.handlers
            .get(topic)
            .ok_or_else(|| QueueError::UnknownTopic(topic.to_string()))
    }
}
