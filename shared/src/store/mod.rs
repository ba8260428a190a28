//! Document store adapter.
//!
//! Documents are JSON objects addressed by [`DocumentPath`]. Collection reads are
//! ordered by the `order` field ascending; documents without one sort after those
//! that have it, ties broken by id.

mod dynamo;
mod hub;
mod memory;

pub use dynamo::DynamoStore;
pub use hub::{ListenerHub, ListenerRegistration, SnapshotFeed};
pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use shigodeki_atoms::{CollectionPath, DocumentPath, Record};
use std::collections::BTreeSet;

pub type Document = Map<String, Value>;

/// One document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self { id: id.into(), data }
    }

    pub fn order(&self) -> Option<i64> {
        self.data.get("order").and_then(Value::as_i64)
    }

    /// Decode into a record; the document id always wins over any stored `id` field.
    pub fn decode<T: Record>(&self) -> Result<T, StoreError> {
        let mut record: T = serde_json::from_value(Value::Object(self.data.clone()))?;
        record.set_id(self.id.clone());
        Ok(record)
    }
}

/// Serialize a record into document fields.
pub fn encode<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::invalid(format!(
            "documents must be JSON objects, got {other}"
        ))),
    }
}

pub fn sort_documents(docs: &mut [StoredDocument]) {
    docs.sort_by(|a, b| match (a.order(), b.order()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

/// Field value a guarded update requires the stored document to hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Expect {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace. With `merge`, only the given fields are written.
    Set {
        path: DocumentPath,
        data: Document,
        merge: bool,
    },
    /// Merge into an existing document; the batch fails if it is absent, or
    /// with `Aborted` if `expect` no longer holds.
    Update {
        path: DocumentPath,
        data: Document,
        expect: Option<Expect>,
    },
    Delete { path: DocumentPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => path,
        }
    }
}

/// Writes applied atomically by [`DocumentStore::commit`]: all or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, data: Document) -> &mut Self {
        self.ops.push(WriteOp::Set {
            path,
            data,
            merge: false,
        });
        self
    }

    pub fn set_merge(&mut self, path: DocumentPath, data: Document) -> &mut Self {
        self.ops.push(WriteOp::Set {
            path,
            data,
            merge: true,
        });
        self
    }

    pub fn set_record<T: Serialize>(&mut self, path: DocumentPath, record: &T) -> Result<&mut Self, StoreError> {
        let data = encode(record)?;
        Ok(self.set(path, data))
    }

    pub fn update(&mut self, path: DocumentPath, data: Document) -> &mut Self {
        self.ops.push(WriteOp::Update { path, data, expect: None });
        self
    }

    /// Like [`update`](Self::update), but only while `field` still equals `value`.
    pub fn update_if(&mut self, path: DocumentPath, data: Document, field: &str, value: impl Into<Value>) -> &mut Self {
        self.ops.push(WriteOp::Update {
            path,
            data,
            expect: Some(Expect {
                field: field.to_string(),
                value: value.into(),
            }),
        });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Collections whose snapshot changes when this batch commits.
    pub fn touched_collections(&self) -> BTreeSet<CollectionPath> {
        self.ops
            .iter()
            .map(|op| op.path().collection().clone())
            .collect()
    }
}

/// Single-field document, handy for merge writes such as `{"order": 3}`.
pub fn field(name: &str, value: impl Into<Value>) -> Document {
    let mut doc = Document::new();
    doc.insert(name.to_string(), value.into());
    doc
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn new_document_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Most operations one atomic batch may carry.
    fn max_batch_len(&self) -> usize;

    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError>;

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError>;

    /// Documents whose array field `field` contains `value`.
    async fn list_where_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Open a realtime feed of full snapshots of `collection`. The current
    /// snapshot is delivered first.
    async fn listen(
        &self,
        collection: &CollectionPath,
    ) -> Result<(ListenerRegistration, SnapshotFeed), StoreError>;

    async fn set(&self, path: &DocumentPath, data: Document, merge: bool) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        if merge {
            batch.set_merge(path.clone(), data);
        } else {
            batch.set(path.clone(), data);
        }
        self.commit(batch).await
    }

    async fn update(&self, path: &DocumentPath, data: Document) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(path.clone(), data);
        self.commit(batch).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(path.clone());
        self.commit(batch).await
    }

    /// Bulk delete. Not atomic across chunks; returns how many paths were deleted.
    async fn delete_many(&self, paths: Vec<DocumentPath>) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for chunk in paths.chunks(self.max_batch_len().max(1)) {
            let mut batch = WriteBatch::new();
            for path in chunk {
                batch.delete(path.clone());
            }
            self.commit(batch).await?;
            deleted += chunk.len();
        }
        Ok(deleted)
    }
}
