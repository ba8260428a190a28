//! DynamoDB document store.
//!
//! Single table:
//! PK = collection path (e.g. "projects/p1/phases")
//! SK = document id
//! Document fields are stored as top-level attributes next to PK/SK.

use super::{sort_documents, Document, DocumentStore, Expect, ListenerHub, ListenerRegistration, SnapshotFeed, StoredDocument, WriteBatch, WriteOp};
use crate::collaborators::Connectivity;
use crate::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeValue, Delete, DeleteRequest, Put, ReturnValuesOnConditionCheckFailure, TransactWriteItem, Update,
    WriteRequest,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Number, Value};
use shigodeki_atoms::{CollectionPath, DocumentPath};
use std::collections::{BTreeSet, HashMap};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// TransactWriteItems accepts at most 100 actions.
pub const DYNAMO_MAX_TRANSACTION: usize = 100;
/// BatchWriteItem accepts at most 25 requests.
const BATCH_WRITE_CHUNK: usize = 25;
const MAX_BATCH_ATTEMPTS: u64 = 5;

const PK: &str = "PK";
const SK: &str = "SK";

type Item = HashMap<String, AttributeValue>;

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
    hub: ListenerHub,
    connectivity: Connectivity,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>, connectivity: Connectivity) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            hub: ListenerHub::new(),
            connectivity,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.connectivity.is_offline() {
            return Err(StoreError::unavailable("client is offline"));
        }
        Ok(())
    }

    async fn query_collection(
        &self,
        collection: &CollectionPath,
        contains: Option<(&str, &str)>,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.check_online()?;

        let mut docs = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let mut req = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk")
                .expression_attribute_values(":pk", AttributeValue::S(collection.as_str().to_string()))
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take());

            if let Some((field, value)) = contains {
                req = req
                    .filter_expression("contains(#f, :v)")
                    .expression_attribute_names("#f", field)
                    .expression_attribute_values(":v", AttributeValue::S(value.to_string()));
            }

            let resp = req.send().await.map_err(|e| sdk_error("query", e))?;
            docs.extend(resp.items().iter().filter_map(document_from_item));

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        sort_documents(&mut docs);
        Ok(docs)
    }

    fn transact_item(&self, op: WriteOp) -> Result<TransactWriteItem, StoreError> {
        let item = match op {
            WriteOp::Set {
                path,
                data,
                merge: false,
            } => {
                let put = Put::builder()
                    .table_name(&self.table_name)
                    .set_item(Some(item_from_document(&path, &data)))
                    .build()
                    .map_err(|e| StoreError::invalid(e.to_string()))?;
                TransactWriteItem::builder().put(put).build()
            }
            WriteOp::Set {
                path,
                data,
                merge: true,
            } => TransactWriteItem::builder()
                .update(self.merge_update(&path, &data, false, None)?)
                .build(),
            WriteOp::Update { path, data, expect } => TransactWriteItem::builder()
                .update(self.merge_update(&path, &data, true, expect.as_ref())?)
                .build(),
            WriteOp::Delete { path } => {
                let delete = Delete::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(key_for(&path)))
                    .build()
                    .map_err(|e| StoreError::invalid(e.to_string()))?;
                TransactWriteItem::builder().delete(delete).build()
            }
        };
        Ok(item)
    }

    /// `SET #f0 = :v0, #f1 = :v1 ...`; with `must_exist` the write is
    /// conditioned on the document already being there, and with `expect` on
    /// one of its fields still holding the given value.
    fn merge_update(
        &self,
        path: &DocumentPath,
        data: &Document,
        must_exist: bool,
        expect: Option<&Expect>,
    ) -> Result<Update, StoreError> {
        if data.is_empty() {
            return Err(StoreError::invalid(format!("merge into {path} carries no fields")));
        }

        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut sets = Vec::with_capacity(data.len());
        for (i, (field, value)) in data.iter().enumerate() {
            names.insert(format!("#f{i}"), field.clone());
            values.insert(format!(":v{i}"), json_to_attr(value));
            sets.push(format!("#f{i} = :v{i}"));
        }

        let mut builder = Update::builder()
            .table_name(&self.table_name)
            .set_key(Some(key_for(path)))
            .update_expression(format!("SET {}", sets.join(", ")))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values));
        if must_exist {
            let condition = match expect {
                Some(expect) => {
                    builder = builder
                        .expression_attribute_names("#expect", &expect.field)
                        .expression_attribute_values(":expect", json_to_attr(&expect.value));
                    "attribute_exists(PK) AND #expect = :expect"
                }
                None => "attribute_exists(PK)",
            };
            builder = builder
                .condition_expression(condition)
                .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld);
        }
        builder.build().map_err(|e| StoreError::invalid(e.to_string()))
    }

    /// Re-read and fan out every watched collection the write touched.
    async fn publish(&self, touched: BTreeSet<CollectionPath>) {
        for collection in touched {
            if !self.hub.is_watched(&collection) {
                continue;
            }
            match self.query_collection(&collection, None).await {
                Ok(snapshot) => self.hub.publish(&collection, snapshot),
                Err(e) => warn!(collection = %collection, error = %e, "snapshot refresh failed"),
            }
        }
    }

    /// BatchWriteItem deletes in chunks of 25, retrying unprocessed items with backoff.
    async fn batch_delete_items(&self, delete_keys: &[Item]) -> Result<(), StoreError> {
        for chunk in delete_keys.chunks(BATCH_WRITE_CHUNK) {
            let write_reqs = chunk
                .iter()
                .map(|k| {
                    DeleteRequest::builder()
                        .set_key(Some(k.clone()))
                        .build()
                        .map(|del| WriteRequest::builder().delete_request(del).build())
                        .map_err(|e| StoreError::invalid(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut unprocessed = Some(write_reqs);
            let mut attempts = 0;
            while let Some(reqs) = unprocessed {
                attempts += 1;
                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, reqs)
                    .send()
                    .await
                    .map_err(|e| sdk_error("batch_write_item", e))?;

                unprocessed = result
                    .unprocessed_items()
                    .and_then(|m| m.get(&self.table_name))
                    .filter(|reqs| !reqs.is_empty())
                    .cloned();

                if unprocessed.is_some() && attempts < MAX_BATCH_ATTEMPTS {
                    sleep(Duration::from_millis(100 * attempts)).await;
                } else if unprocessed.is_some() {
                    return Err(StoreError::unavailable(format!(
                        "batch delete left unprocessed items after {attempts} attempts"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DynamoStore {
    fn max_batch_len(&self) -> usize {
        DYNAMO_MAX_TRANSACTION
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError> {
        self.check_online()?;
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_for(path)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error("get_item", e))?;

        Ok(result.item().and_then(document_from_item))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        self.query_collection(collection, None).await
    }

    async fn list_where_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.query_collection(collection, Some((field, value))).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check_online()?;
        if batch.is_empty() {
            return Ok(());
        }
        if batch.len() > DYNAMO_MAX_TRANSACTION {
            return Err(StoreError::invalid(format!(
                "batch of {} operations exceeds the limit of {DYNAMO_MAX_TRANSACTION}",
                batch.len()
            )));
        }

        let touched = batch.touched_collections();
        let count = batch.len();
        let items = batch
            .into_ops()
            .into_iter()
            .map(|op| self.transact_item(op))
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(transaction_error)?;

        info!(operations = count, "committed batch");
        self.publish(touched).await;
        Ok(())
    }

    async fn delete_many(&self, paths: Vec<DocumentPath>) -> Result<usize, StoreError> {
        self.check_online()?;
        let touched: BTreeSet<CollectionPath> = paths.iter().map(|p| p.collection().clone()).collect();
        let delete_keys: Vec<Item> = paths.iter().map(key_for).collect();

        self.batch_delete_items(&delete_keys).await?;

        info!(deleted = delete_keys.len(), "bulk delete finished");
        self.publish(touched).await;
        Ok(delete_keys.len())
    }

    async fn listen(
        &self,
        collection: &CollectionPath,
    ) -> Result<(ListenerRegistration, SnapshotFeed), StoreError> {
        let initial = self.query_collection(collection, None).await?;
        Ok(self.hub.register(collection.clone(), initial))
    }
}

// PRIVATE FUNCTIONS

fn key_for(path: &DocumentPath) -> Item {
    let mut key = HashMap::new();
    key.insert(PK.to_string(), AttributeValue::S(path.collection().as_str().to_string()));
    key.insert(SK.to_string(), AttributeValue::S(path.id().to_string()));
    key
}

fn item_from_document(path: &DocumentPath, data: &Document) -> Item {
    let mut item = key_for(path);
    for (field, value) in data {
        if field != PK && field != SK {
            item.insert(field.clone(), json_to_attr(value));
        }
    }
    item
}

fn document_from_item(item: &Item) -> Option<StoredDocument> {
    let id = item.get(SK).and_then(|v| v.as_s().ok())?.clone();
    let data = item
        .iter()
        .filter(|(k, _)| k.as_str() != PK && k.as_str() != SK)
        .map(|(k, v)| (k.clone(), attr_to_json(v)))
        .collect();
    Some(StoredDocument::new(id, data))
}

fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

fn attr_to_json(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attr_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| number_to_json(n)).collect()),
        _ => Value::Null,
    }
}

fn number_to_json(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

fn sdk_error<E, R>(op: &str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StoreErrorKind::Unavailable,
        _ => StoreErrorKind::Internal,
    };
    let message = format!("{op} failed: {}", DisplayErrorContext(&err));
    error!("DynamoDB {}", message);
    StoreError::new(kind, message)
}

/// A failed condition with no old item attached means an update targeted a
/// missing document; one with an old item means a guarded field had changed.
fn transaction_error<R>(err: SdkError<TransactWriteItemsError, R>) -> StoreError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) = err.as_service_error() {
        let missing = cancelled
            .cancellation_reasons()
            .iter()
            .any(|r| r.code() == Some("ConditionalCheckFailed") && r.item().map_or(true, HashMap::is_empty));
        let kind = if missing {
            StoreErrorKind::NotFound
        } else {
            StoreErrorKind::Aborted
        };
        warn!(?kind, "transaction cancelled");
        return StoreError::new(kind, format!("transaction cancelled: {}", DisplayErrorContext(&err)));
    }
    sdk_error("transact_write_items", err)
}
