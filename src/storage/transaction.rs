//! Staged writes committed atomically by [`Store::commit`](super::Store::commit)

use crate::types::{BlobId, Link, MessageId};

/// A single staged write
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Publish {
        id: MessageId,
        topic: String,
        body: String,
    },
    ClearMessage {
        id: MessageId,
    },
    InsertLink(Link),
    MarkLinkFetched {
        url_identifier: String,
    },
    PutBlob {
        id: BlobId,
        text: String,
    },
    DeleteBlob {
        id: BlobId,
    },
}

/// A set of writes that either all land or none do.
///
/// Handlers stage their effects here; nothing touches disk until the
/// transaction is committed. Dropping an uncommitted transaction discards it.
#[derive(Debug, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new text blob and return its id
    pub fn put_blob(&mut self, text: impl Into<String>) -> BlobId {
        let id = uuid::Uuid::new_v4().to_string();
        self.ops.push(WriteOp::PutBlob {
            id: id.clone(),
            text: text.into(),
        });
        id
    }

    pub fn delete_blob(&mut self, id: impl Into<BlobId>) {
        self.ops.push(WriteOp::DeleteBlob { id: id.into() });
    }

    /// Stage a link insert. Existing links (by url identifier) are left untouched.
    pub fn insert_link(&mut self, link: Link) {
        self.ops.push(WriteOp::InsertLink(link));
    }

    pub fn mark_link_fetched(&mut self, url_identifier: impl Into<String>) {
        self.ops.push(WriteOp::MarkLinkFetched {
            url_identifier: url_identifier.into(),
        });
    }

    /// Stage a message row. Topic validation happens in the queue.
    pub(crate) fn stage_publish(&mut self, topic: &str, body: String) -> MessageId {
        let id = uuid::Uuid::new_v4().to_string();
        self.ops.push(WriteOp::Publish {
            id: id.clone(),
            topic: topic.to_string(),
            body,
        });
        id
    }

    pub(crate) fn clear_message(&mut self, id: impl Into<MessageId>) {
        self.ops.push(WriteOp::ClearMessage { id: id.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Number of staged message publications
    pub fn published_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, WriteOp::Publish { .. }))
            .count()
    }

    pub(crate) fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}
