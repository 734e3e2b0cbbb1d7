//! Durable transactional storage
//!
//! A single sled database holds the queue tables, the link table and the
//! intermediate text blobs passed between pipeline stages. Every write goes
//! through a [`Transaction`] so that a stage's effects and the completion of
//! the message that triggered them land together.

mod transaction;

pub use transaction::Transaction;
pub(crate) use transaction::WriteOp;

use crate::config::NodeConfig;
use crate::types::{Link, MessageId, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("corrupt row in {tree}: {detail}")]
    Corrupt { tree: &'static str, detail: String },
}

/// A persisted queue message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    /// JSON payload, opaque to the store
    pub body: String,
    pub queue_position: u64,
    pub is_enqueued: bool,
    pub enqueued_at: DateTime<Utc>,
}

/// Counts of what a commit wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub published: usize,
    pub cleared: usize,
    pub links_inserted: usize,
    pub links_marked: usize,
}

/// Link table counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub total: usize,
    pub fetched: usize,
}

/// Durable store backed by sled
pub struct Store {
    db: sled::Db,
    /// message id -> Message
    messages: sled::Tree,
    /// topic \0 position(be) -> message id, only for enqueued rows
    enqueued: sled::Tree,
    /// topic -> next position(be)
    positions: sled::Tree,
    /// url identifier -> Link
    links: sled::Tree,
    /// source id \0 url identifier -> (), only for unfetched links
    unfetched: sled::Tree,
    /// blob id -> utf-8 text
    blobs: sled::Tree,
}

fn enqueued_key(topic: &str, position: u64) -> Vec<u8> {
    let mut key = topic_prefix(topic);
    key.extend_from_slice(&position.to_be_bytes());
    key
}

fn topic_prefix(topic: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(topic.len() + 9);
    key.extend_from_slice(topic.as_bytes());
    key.push(0);
    key
}

fn unfetched_key(source_id: &SourceId, url_identifier: &str) -> Vec<u8> {
    let mut key = source_prefix(source_id);
    key.extend_from_slice(url_identifier.as_bytes());
    key
}

fn source_prefix(source_id: &SourceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(source_id.as_str().len() + 1);
    key.extend_from_slice(source_id.as_str().as_bytes());
    key.push(0);
    key
}

fn decode_position(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    if bytes.len() == 8 {
        buf.copy_from_slice(bytes);
    }
    u64::from_be_bytes(buf)
}

fn abort<E: Into<StorageError>>(e: E) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(e.into())
}

impl Store {
    /// Open or create the store inside `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::open_at(&data_dir.as_ref().join("noticiero.sled"), Some(500))
    }

    /// Open the store described by the node configuration
    pub fn from_config(node: &NodeConfig) -> anyhow::Result<Self> {
        Self::open_at(&node.db_path(), node.flush_every_ms)
    }

    fn open_at(db_path: &Path, flush_every_ms: Option<u64>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let db = sled::Config::new()
            .path(db_path)
            .flush_every_ms(flush_every_ms)
            .open()
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        Self::from_db(db)
    }

    /// Temporary in-memory store, removed on drop
    pub fn temporary() -> anyhow::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> anyhow::Result<Self> {
        use anyhow::Context;

        let open = |name: &str| {
            db.open_tree(name)
                .with_context(|| format!("Failed to open {} tree", name))
        };

        Ok(Self {
            messages: open("messages")?,
            enqueued: open("enqueued")?,
            positions: open("positions")?,
            links: open("links")?,
            unfetched: open("unfetched")?,
            blobs: open("blobs")?,
            db,
        })
    }

    /// Underlying database, for components that keep their own trees
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Flush sled buffers to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Apply every staged write in one atomic sled transaction
    pub fn commit(&self, tx: Transaction) -> Result<CommitSummary, StorageError> {
        if tx.is_empty() {
            return Ok(CommitSummary::default());
        }
        let now = Utc::now();

        let result = (
            &self.messages,
            &self.enqueued,
            &self.positions,
            &self.links,
            &self.unfetched,
            &self.blobs,
        )
            .transaction(|(messages, enqueued, positions, links, unfetched, blobs)| {
                let mut summary = CommitSummary::default();
                for op in tx.ops() {
                    match op {
                        WriteOp::Publish { id, topic, body } => {
                            let position = positions
                                .get(topic.as_bytes())?
                                .map(|v| decode_position(&v))
                                .unwrap_or(0);
                            positions.insert(topic.as_bytes(), (position + 1).to_be_bytes().to_vec())?;

                            let message = Message {
                                id: id.clone(),
                                topic: topic.clone(),
                                body: body.clone(),
                                queue_position: position,
                                is_enqueued: true,
                                enqueued_at: now,
                            };
                            let data = bincode::serialize(&message).map_err(abort)?;
                            messages.insert(id.as_bytes(), data)?;
                            enqueued.insert(enqueued_key(topic, position), id.as_bytes())?;
                            summary.published += 1;
                        }
                        WriteOp::ClearMessage { id } => {
                            if let Some(mut message) = read_message(messages, id)? {
                                if message.is_enqueued {
                                    message.is_enqueued = false;
                                    let data = bincode::serialize(&message).map_err(abort)?;
                                    messages.insert(id.as_bytes(), data)?;
                                    enqueued.remove(enqueued_key(&message.topic, message.queue_position))?;
                                    summary.cleared += 1;
                                }
                            }
                        }
                        WriteOp::InsertLink(link) => {
                            if links.get(link.url_identifier.as_bytes())?.is_none() {
                                let data = bincode::serialize(link).map_err(abort)?;
                                links.insert(link.url_identifier.as_bytes(), data)?;
                                if !link.is_fetched {
                                    unfetched.insert(
                                        unfetched_key(&link.source_id, &link.url_identifier),
                                        Vec::<u8>::new(),
                                    )?;
                                }
                                summary.links_inserted += 1;
                            }
                        }
                        WriteOp::MarkLinkFetched { url_identifier } => {
                            if let Some(raw) = links.get(url_identifier.as_bytes())? {
                                let mut link: Link = bincode::deserialize(&raw).map_err(abort)?;
                                if !link.is_fetched {
                                    link.is_fetched = true;
                                    let data = bincode::serialize(&link).map_err(abort)?;
                                    links.insert(url_identifier.as_bytes(), data)?;
                                    unfetched.remove(unfetched_key(&link.source_id, url_identifier))?;
                                    summary.links_marked += 1;
                                }
                            }
                        }
                        WriteOp::PutBlob { id, text } => {
                            blobs.insert(id.as_bytes(), text.as_bytes())?;
                        }
                        WriteOp::DeleteBlob { id } => {
                            blobs.remove(id.as_bytes())?;
                        }
                    }
                }
                Ok(summary)
            });

        let summary = result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StorageError::Sled(err),
        })?;
        debug!(
            published = summary.published,
            cleared = summary.cleared,
            links_inserted = summary.links_inserted,
            "Committed transaction"
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Queue reads
    // ------------------------------------------------------------------------

    /// Oldest enqueued message for a topic
    pub fn oldest_enqueued(&self, topic: &str) -> Result<Option<Message>, StorageError> {
        let Some(entry) = self.enqueued.scan_prefix(topic_prefix(topic)).next() else {
            return Ok(None);
        };
        let (_, id) = entry?;
        let id = String::from_utf8_lossy(&id).into_owned();
        match self.get_message(&id)? {
            Some(message) => Ok(Some(message)),
            None => Err(StorageError::Corrupt {
                tree: "enqueued",
                detail: format!("index points at missing message {}", id),
            }),
        }
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>, StorageError> {
        match self.messages.get(id.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Number of enqueued messages for a topic
    pub fn enqueued_count(&self, topic: &str) -> usize {
        self.enqueued.scan_prefix(topic_prefix(topic)).count()
    }

    /// Number of enqueued messages across all topics
    pub fn enqueued_total(&self) -> usize {
        self.enqueued.len()
    }

    // ------------------------------------------------------------------------
    // Blobs
    // ------------------------------------------------------------------------

    pub fn get_blob(&self, id: &str) -> Result<Option<String>, StorageError> {
        match self.blobs.get(id.as_bytes())? {
            Some(raw) => String::from_utf8(raw.to_vec())
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    tree: "blobs",
                    detail: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    pub fn get_link(&self, url_identifier: &str) -> Result<Option<Link>, StorageError> {
        match self.links.get(url_identifier.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` unfetched links for a source
    pub fn unfetched_links(&self, source_id: &SourceId, limit: usize) -> Result<Vec<Link>, StorageError> {
        let mut out = Vec::new();
        for entry in self.unfetched.scan_prefix(source_prefix(source_id)) {
            if out.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let url_identifier = &key[source_id.as_str().len() + 1..];
            if let Some(raw) = self.links.get(url_identifier)? {
                out.push(bincode::deserialize(&raw)?);
            }
        }
        Ok(out)
    }

    pub fn link_stats(&self) -> LinkStats {
        let total = self.links.len();
        let unfetched = self.unfetched.len();
        LinkStats {
            total,
            fetched: total.saturating_sub(unfetched),
        }
    }
}

fn read_message(
    messages: &TransactionalTree,
    id: &str,
) -> Result<Option<Message>, ConflictableTransactionError<StorageError>> {
    match messages.get(id.as_bytes())? {
        Some(raw) => Ok(Some(bincode::deserialize(&raw).map_err(abort)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn link(source: &str, ident: &str) -> Link {
        Link {
            url: format!("https://{}", ident),
            url_identifier: ident.to_string(),
            domain: "example.com".to_string(),
            source_id: SourceId::new(source),
            is_fetched: false,
        }
    }

    #[test]
    fn publish_assigns_increasing_positions_per_topic() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        tx.stage_publish("a", "{\"n\":1}".to_string());
        tx.stage_publish("a", "{\"n\":2}".to_string());
        tx.stage_publish("b", "{\"n\":3}".to_string());
        let summary = store.commit(tx).unwrap();
        assert_eq!(summary.published, 3);

        let first = store.oldest_enqueued("a").unwrap().unwrap();
        assert_eq!(first.queue_position, 0);
        assert_eq!(first.body, "{\"n\":1}");
        assert!(first.is_enqueued);

        let b = store.oldest_enqueued("b").unwrap().unwrap();
        assert_eq!(b.queue_position, 0);
        assert_eq!(store.enqueued_count("a"), 2);
        assert_eq!(store.enqueued_total(), 3);
    }

    #[test]
    fn clearing_advances_to_next_message_and_keeps_row() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        let first = tx.stage_publish("topic", "1".to_string());
        tx.stage_publish("topic", "2".to_string());
        store.commit(tx).unwrap();

        let mut tx = Transaction::new();
        tx.clear_message(first.clone());
        assert_eq!(store.commit(tx).unwrap().cleared, 1);

        let next = store.oldest_enqueued("topic").unwrap().unwrap();
        assert_eq!(next.body, "2");
        assert_eq!(next.queue_position, 1);

        let cleared = store.get_message(&first).unwrap().unwrap();
        assert!(!cleared.is_enqueued);
    }

    #[test]
    fn topic_prefix_does_not_leak_into_longer_topic_names() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        tx.stage_publish("fetch-extra", "x".to_string());
        store.commit(tx).unwrap();
        assert!(store.oldest_enqueued("fetch").unwrap().is_none());
    }

    #[test]
    fn duplicate_link_insert_is_ignored() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        tx.insert_link(link("src", "example.com/a"));
        tx.insert_link(link("src", "example.com/a"));
        let summary = store.commit(tx).unwrap();
        assert_eq!(summary.links_inserted, 1);
        assert_eq!(store.link_stats().total, 1);
    }

    #[test]
    fn marking_fetched_removes_link_from_pending_but_keeps_it() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        tx.insert_link(link("src", "example.com/a"));
        tx.insert_link(link("src", "example.com/b"));
        tx.insert_link(link("other", "other.com/c"));
        store.commit(tx).unwrap();

        let pending = store.unfetched_links(&SourceId::new("src"), 10).unwrap();
        assert_eq!(pending.len(), 2);

        let mut tx = Transaction::new();
        tx.mark_link_fetched("example.com/a");
        store.commit(tx).unwrap();

        let pending = store.unfetched_links(&SourceId::new("src"), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url_identifier, "example.com/b");

        let fetched = store.get_link("example.com/a").unwrap().unwrap();
        assert!(fetched.is_fetched);
        assert_eq!(store.link_stats(), LinkStats { total: 3, fetched: 1 });

        // re-inserting a fetched link does not resurrect it
        let mut tx = Transaction::new();
        tx.insert_link(link("src", "example.com/a"));
        store.commit(tx).unwrap();
        assert_eq!(store.unfetched_links(&SourceId::new("src"), 10).unwrap().len(), 1);
    }

    #[test]
    fn unfetched_links_respects_limit() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        for i in 0..5 {
            tx.insert_link(link("src", &format!("example.com/{}", i)));
        }
        store.commit(tx).unwrap();
        assert_eq!(store.unfetched_links(&SourceId::new("src"), 3).unwrap().len(), 3);
    }

    #[test]
    fn blobs_round_through_transactions() {
        let store = Store::temporary().unwrap();
        let mut tx = Transaction::new();
        let id = tx.put_blob("hola mundo");
        store.commit(tx).unwrap();
        assert_eq!(store.get_blob(&id).unwrap().as_deref(), Some("hola mundo"));

        let mut tx = Transaction::new();
        tx.delete_blob(id.clone());
        store.commit(tx).unwrap();
        assert!(store.get_blob(&id).unwrap().is_none());
    }

    #[test]
    fn dropped_transaction_writes_nothing() {
        let store = Store::temporary().unwrap();
        {
            let mut tx = Transaction::new();
            tx.stage_publish("topic", "lost".to_string());
            tx.put_blob("lost");
        }
        assert_eq!(store.enqueued_total(), 0);
    }

    #[test]
    fn messages_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path()).unwrap();
            let mut tx = Transaction::new();
            tx.stage_publish("topic", "durable".to_string());
            store.commit(tx).unwrap();
            store.flush().unwrap();
        }
        let store = Store::open(tmp.path()).unwrap();
        let message = store.oldest_enqueued("topic").unwrap().unwrap();
        assert_eq!(message.body, "durable");
    }
}
