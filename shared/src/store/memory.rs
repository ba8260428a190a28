use super::{sort_documents, Document, DocumentStore, ListenerHub, ListenerRegistration, SnapshotFeed, StoredDocument, WriteBatch, WriteOp};
use crate::collaborators::Connectivity;
use crate::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use serde_json::Value;
use shigodeki_atoms::{CollectionPath, DocumentPath};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Matches the per-transaction limit of the DynamoDB store so behaviour is the same.
pub const MEMORY_MAX_BATCH: usize = 100;

type Collections = BTreeMap<CollectionPath, BTreeMap<String, Document>>;

#[derive(Default)]
struct MemoryState {
    collections: Collections,
    commits: usize,
    fail_next: usize,
    fail_after: Option<usize>,
}

/// In-process document store with realtime listeners.
///
/// Commits are staged on a copy and swapped in only when every operation
/// applied, so a failed batch leaves nothing behind. Failures can be injected
/// to exercise that.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    hub: ListenerHub,
    connectivity: Connectivity,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_connectivity(Connectivity::online())
    }

    pub fn with_connectivity(connectivity: Connectivity) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            hub: ListenerHub::new(),
            connectivity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The next `n` commits fail with `Unavailable` and apply nothing.
    pub fn fail_next_commits(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Let `n` more commits succeed, then fail every commit after that.
    pub fn fail_after_commits(&self, n: usize) {
        self.lock().fail_after = Some(n);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_next = 0;
        state.fail_after = None;
    }

    /// Successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn hub(&self) -> &ListenerHub {
        &self.hub
    }

    /// Every stored document path, sorted.
    pub fn paths(&self) -> Vec<DocumentPath> {
        self.lock()
            .collections
            .iter()
            .flat_map(|(collection, docs)| docs.keys().map(move |id| collection.doc(id.clone())))
            .collect()
    }

    /// Number of documents whose path lies under `collection`, nested ones included.
    pub fn count_under(&self, collection: &CollectionPath) -> usize {
        let prefix = format!("{}/", collection.as_str());
        self.lock()
            .collections
            .iter()
            .filter(|(path, _)| path.as_str() == collection.as_str() || path.as_str().starts_with(&prefix))
            .map(|(_, docs)| docs.len())
            .sum()
    }

    fn snapshot(collections: &Collections, collection: &CollectionPath) -> Vec<StoredDocument> {
        let mut docs: Vec<StoredDocument> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        sort_documents(&mut docs);
        docs
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.connectivity.is_offline() {
            return Err(StoreError::unavailable("client is offline"));
        }
        Ok(())
    }

    fn take_injected_failure(state: &mut MemoryState) -> Option<StoreError> {
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Some(StoreError::unavailable("injected commit failure"));
        }
        match state.fail_after {
            Some(0) => Some(StoreError::unavailable("injected commit failure")),
            Some(ref mut n) => {
                *n -= 1;
                None
            }
            None => None,
        }
    }
}

fn apply(collections: &mut Collections, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Set { path, data, merge } => {
            let docs = collections.entry(path.collection().clone()).or_default();
            if merge {
                if let Some(existing) = docs.get_mut(path.id()) {
                    existing.extend(data);
                    return Ok(());
                }
            }
            docs.insert(path.id().to_string(), data);
        }
        WriteOp::Update { path, data, expect } => {
            let existing = collections
                .get_mut(path.collection())
                .and_then(|docs| docs.get_mut(path.id()))
                .ok_or_else(|| StoreError::not_found(&path))?;
            if let Some(expect) = expect {
                if existing.get(&expect.field) != Some(&expect.value) {
                    return Err(StoreError::new(
                        StoreErrorKind::Aborted,
                        format!("{path}: {} changed since it was read", expect.field),
                    ));
                }
            }
            existing.extend(data);
        }
        WriteOp::Delete { path } => {
            if let Some(docs) = collections.get_mut(path.collection()) {
                docs.remove(path.id());
                if docs.is_empty() {
                    collections.remove(path.collection());
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn max_batch_len(&self) -> usize {
        MEMORY_MAX_BATCH
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError> {
        self.check_online()?;
        Ok(self
            .lock()
            .collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .map(|data| StoredDocument::new(path.id(), data.clone())))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        self.check_online()?;
        Ok(Self::snapshot(&self.lock().collections, collection))
    }

    async fn list_where_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let docs = self.list(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| {
                doc.data
                    .get(field)
                    .and_then(Value::as_array)
                    .is_some_and(|items| items.iter().any(|v| v.as_str() == Some(value)))
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check_online()?;
        if batch.len() > MEMORY_MAX_BATCH {
            return Err(StoreError::invalid(format!(
                "batch of {} operations exceeds the limit of {MEMORY_MAX_BATCH}",
                batch.len()
            )));
        }

        let mut state = self.lock();
        if let Some(err) = Self::take_injected_failure(&mut state) {
            return Err(err);
        }

        let touched = batch.touched_collections();
        let mut staged = state.collections.clone();
        for op in batch.into_ops() {
            apply(&mut staged, op)?;
        }
        state.collections = staged;
        state.commits += 1;

        for collection in touched {
            if self.hub.is_watched(&collection) {
                self.hub
                    .publish(&collection, Self::snapshot(&state.collections, &collection));
            }
        }
        Ok(())
    }

    async fn listen(
        &self,
        collection: &CollectionPath,
    ) -> Result<(ListenerRegistration, SnapshotFeed), StoreError> {
        self.check_online()?;
        let state = self.lock();
        let initial = Self::snapshot(&state.collections, collection);
        Ok(self.hub.register(collection.clone(), initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::field;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shigodeki_atoms::ProjectKey;

    fn phases() -> CollectionPath {
        ProjectKey::new("p1").phases()
    }

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = MemoryStore::new();
        let path = phases().doc("f1");
        let mut data = field("name", "Design");
        data.insert("order".into(), json!(0));
        store.set(&path, data, false).await.unwrap();
        store.set(&path, field("order", 3), true).await.unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Design");
        assert_eq!(doc.order(), Some(3));
    }

    #[tokio::test]
    async fn update_of_missing_document_fails_whole_batch() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .set(phases().doc("f1"), field("order", 0))
            .update(phases().doc("missing"), field("order", 1));
        let err = store.commit(batch).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotFound);
        assert!(store.list(&phases()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn guarded_update_aborts_the_batch_on_a_changed_field() {
        let store = MemoryStore::new();
        let path = phases().doc("f1");
        store.set(&path, field("usedCount", 1), false).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .set(phases().doc("f2"), field("order", 0))
            .update_if(path.clone(), field("usedCount", 1), "usedCount", 0);
        assert_matches!(
            store.commit(batch).await,
            Err(StoreError { kind: StoreErrorKind::Aborted, .. })
        );
        assert_eq!(store.paths(), vec![path.clone()]);

        let mut batch = WriteBatch::new();
        batch.update_if(path.clone(), field("usedCount", 2), "usedCount", 1);
        store.commit(batch).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap().unwrap().data["usedCount"], 2);
    }

    #[tokio::test]
    async fn injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let mut batch = WriteBatch::new();
        batch.set(phases().doc("f1"), field("order", 0));
        assert_matches!(
            store.commit(batch.clone()).await,
            Err(StoreError { kind: StoreErrorKind::Unavailable, .. })
        );
        assert!(store.paths().is_empty());

        store.commit(batch).await.unwrap();
        assert_eq!(store.paths(), vec![phases().doc("f1")]);
    }

    #[tokio::test]
    async fn fail_after_lets_some_commits_through() {
        let store = MemoryStore::new();
        store.fail_after_commits(1);
        store.set(&phases().doc("f1"), field("order", 0), false).await.unwrap();
        assert!(store.set(&phases().doc("f2"), field("order", 1), false).await.is_err());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn offline_store_refuses_io() {
        let connectivity = Connectivity::online();
        let store = MemoryStore::with_connectivity(connectivity.clone());
        connectivity.set_offline(true);
        assert_matches!(
            store.list(&phases()).await,
            Err(StoreError { kind: StoreErrorKind::Unavailable, .. })
        );
    }

    #[tokio::test]
    async fn listeners_see_commits() {
        let store = MemoryStore::new();
        let (_reg, mut feed) = store.listen(&phases()).await.unwrap();
        assert!(feed.recv().await.unwrap().is_empty());

        store.set(&phases().doc("f1"), field("order", 0), false).await.unwrap();
        let snapshot = feed.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "f1");
    }

    #[tokio::test]
    async fn contains_query_matches_array_members() {
        let store = MemoryStore::new();
        let projects = shigodeki_atoms::paths::projects();
        let mut a = field("memberIds", json!(["u1", "u2"]));
        a.insert("name".into(), json!("A"));
        store.set(&projects.doc("a"), a, false).await.unwrap();
        store
            .set(&projects.doc("b"), field("memberIds", json!(["u3"])), false)
            .await
            .unwrap();

        let found = store.list_where_contains(&projects, "memberIds", "u2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn count_under_includes_nested_collections() {
        let store = MemoryStore::new();
        let phase = ProjectKey::new("p1").phase("f1");
        store.set(&phase.doc_path(), field("order", 0), false).await.unwrap();
        store.set(&phase.lists().doc("l1"), field("order", 0), false).await.unwrap();
        store.set(&phase.list("l1").tasks().doc("t1"), field("order", 0), false).await.unwrap();

        assert_eq!(store.count_under(&ProjectKey::new("p1").phases()), 3);
        assert_eq!(store.count_under(&phase.lists()), 2);
    }
}
