//! One manager implementation for every level of the hierarchy.
//!
//! A [`Level`] says where a record lives (its collection, derived from the
//! scope of ancestor keys) and which side effects a write has on other levels.
//! [`CollectionManager`] does the rest: validation, order resolution,
//! persistence, cascade delete, realtime subscription and the observable state.

use crate::{cascade, ordering};
use async_trait::async_trait;
use chrono::Utc;
use shigodeki_atoms::{CollectionPath, DocumentPath, EntityKind, Record, Timestamp, Validate, ValidationError};
use shigodeki_shared::store::{encode, DocumentStore, StoredDocument, WriteBatch};
use shigodeki_shared::{ListenerRegistration, StoreError, StoreErrorKind, SyncError};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What observers of a manager see.
#[derive(Debug, Clone)]
pub struct ManagerState<T> {
    /// Records of the current scope, ordered by `order`.
    pub items: Vec<T>,
    /// True while any operation is in flight.
    pub is_loading: bool,
    /// The most recent failure. Cleared by the next successful operation.
    pub last_error: Option<SyncError>,
}

impl<T> Default for ManagerState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            is_loading: false,
            last_error: None,
        }
    }
}

/// Configuration of one hierarchy level.
#[async_trait]
pub trait Level: Default + Send + Sync + 'static {
    type Record: Record + Validate + Debug;
    /// Ancestor keys that select one sibling set.
    type Scope: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Singular name used in log lines.
    const NAME: &'static str;

    fn collection(&self, scope: &Self::Scope) -> CollectionPath;

    fn scope_of(&self, record: &Self::Record) -> Self::Scope;

    /// Overwrite the record's ancestor ids with those of `scope`.
    fn attach(&self, record: &mut Self::Record, scope: &Self::Scope);

    /// The document that must exist before anything is created in `scope`.
    fn parent(&self, _scope: &Self::Scope) -> Option<(EntityKind, DocumentPath)> {
        None
    }

    fn prepare_create(&self, _record: &mut Self::Record, _now: Timestamp) {}

    /// Fields maintained by other levels. Updates never write them.
    fn derived_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Extra writes that go into the same batch as a new record.
    async fn on_create(
        &self,
        _store: &dyn DocumentStore,
        _record: &Self::Record,
        _batch: &mut WriteBatch,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    /// Runs before a record and its descendants are deleted.
    async fn before_delete(
        &self,
        _store: &dyn DocumentStore,
        _scope: &Self::Scope,
        _id: &str,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    /// Runs after every successful create, update or delete in `scope`.
    async fn after_change(&self, _store: &dyn DocumentStore, _scope: &Self::Scope) -> Result<(), SyncError> {
        Ok(())
    }
}

struct Subscription {
    _registration: ListenerRegistration,
    pump: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Keeps `is_loading` true for as long as any operation holds a guard.
struct LoadingGuard<'a, T> {
    in_flight: &'a AtomicUsize,
    state: &'a watch::Sender<ManagerState<T>>,
}

impl<'a, T> LoadingGuard<'a, T> {
    fn begin(in_flight: &'a AtomicUsize, state: &'a watch::Sender<ManagerState<T>>) -> Self {
        state.send_modify(|s| {
            in_flight.fetch_add(1, Ordering::SeqCst);
            s.is_loading = true;
        });
        Self { in_flight, state }
    }
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        let in_flight = self.in_flight;
        self.state.send_modify(|s| {
            let left = in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.is_loading = left > 0;
        });
    }
}

pub struct CollectionManager<L: Level> {
    level: L,
    store: Arc<dyn DocumentStore>,
    state: Arc<watch::Sender<ManagerState<L::Record>>>,
    in_flight: AtomicUsize,
    scope: Mutex<Option<L::Scope>>,
    subscription: Mutex<Option<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn decode_all<R: Record>(collection: &CollectionPath, docs: &[StoredDocument]) -> Vec<R> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<R>() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection = %collection, id = %doc.id, error = %e, "skipping undecodable document");
                None
            }
        })
        .collect()
}

fn sort_by_order<R: Record>(items: &mut [R]) {
    items.sort_by_key(|r| r.order().unwrap_or(i64::MAX));
}

impl<L: Level> CollectionManager<L> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (state, _) = watch::channel(ManagerState::default());
        Self {
            level: L::default(),
            store,
            state: Arc::new(state),
            in_flight: AtomicUsize::new(0),
            scope: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn level(&self) -> &L {
        &self.level
    }

    // ========== OBSERVABLE STATE ==========

    /// Receiver that is notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ManagerState<L::Record>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ManagerState<L::Record> {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Vec<L::Record> {
        self.state.borrow().items.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.state.borrow().last_error.clone()
    }

    pub fn current_scope(&self) -> Option<L::Scope> {
        lock(&self.scope).clone()
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    /// Run `fut` with the loading flag raised, recording any failure in
    /// `last_error` before handing it back to the caller.
    pub(crate) async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        let _loading = LoadingGuard::begin(&self.in_flight, &self.state);
        let result = fut.await;
        match &result {
            Ok(_) => self.state.send_modify(|s| s.last_error = None),
            Err(e) => {
                error!(level = L::NAME, op, error = %e, "operation failed");
                let e = e.clone();
                self.state.send_modify(|s| s.last_error = Some(e));
            }
        }
        result
    }

    // ========== CRUD ==========

    /// Validate, resolve `order` (max sibling order + 1 when omitted), persist
    /// with a fresh id, and return the stored record. An explicit `order` is
    /// clamped to the sibling count and later siblings move one place back in the same
    /// batch. Fails with `NotFound` and writes nothing when the parent is missing.
    pub async fn create(
        &self,
        scope: &L::Scope,
        record: L::Record,
        order: Option<i64>,
    ) -> Result<L::Record, SyncError> {
        self.run("create", self.create_inner(scope, record, order)).await
    }

    pub(crate) async fn create_inner(
        &self,
        scope: &L::Scope,
        mut record: L::Record,
        order: Option<i64>,
    ) -> Result<L::Record, SyncError> {
        self.level.attach(&mut record, scope);
        record.set_order(order.unwrap_or(0));
        record.validate()?;
        if let Some((kind, parent)) = self.level.parent(scope) {
            if self.store.get(&parent).await?.is_none() {
                return Err(SyncError::not_found(kind, parent.id()));
            }
        }

        let collection = self.level.collection(scope);
        let ordered = record.order().is_some();
        let siblings = if ordered {
            self.store.list(&collection).await?
        } else {
            Vec::new()
        };

        self.level.prepare_create(&mut record, Utc::now());
        let id = self.store.new_document_id();
        record.set_id(id.clone());

        let mut batch = WriteBatch::new();
        if ordered {
            let resolved = match order {
                Some(order) => ordering::make_room(&mut batch, &collection, &siblings, &id, order),
                None => ordering::next_order(&siblings),
            };
            record.set_order(resolved);
        }
        let shifted = batch.len();
        batch.set_record(collection.doc(&id), &record)?;
        self.level.on_create(self.store.as_ref(), &record, &mut batch).await?;
        self.store.commit(batch).await?;
        self.level.after_change(self.store.as_ref(), scope).await?;

        info!(collection = %collection, id = %id, label = record.label(), "{} created", L::NAME);
        self.upsert_local(scope, record.clone());
        if shifted > 0 {
            self.reload_if_tracking(scope).await?;
        }
        Ok(record)
    }

    /// `Ok(None)` when no such document exists.
    pub async fn read(&self, scope: &L::Scope, id: &str) -> Result<Option<L::Record>, SyncError> {
        self.run("read", self.read_inner(scope, id)).await
    }

    pub(crate) async fn read_inner(&self, scope: &L::Scope, id: &str) -> Result<Option<L::Record>, SyncError> {
        let path = self.level.collection(scope).doc(id);
        match self.store.get(&path).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Like [`read`](Self::read), but a missing document is an error.
    pub async fn fetch(&self, scope: &L::Scope, id: &str) -> Result<L::Record, SyncError> {
        self.run("fetch", async {
            self.read_inner(scope, id)
                .await?
                .ok_or_else(|| SyncError::not_found(<L::Record as Record>::KIND, id))
        })
        .await
    }

    /// All siblings in `scope`, ordered by `order`. Replaces the published items.
    pub async fn list(&self, scope: &L::Scope) -> Result<Vec<L::Record>, SyncError> {
        self.run("list", async {
            let collection = self.level.collection(scope);
            let docs = self.store.list(&collection).await?;
            let records: Vec<L::Record> = decode_all(&collection, &docs);
            self.replace_local(scope, records.clone());
            Ok(records)
        })
        .await
    }

    /// Merge-write the record's fields; fields the record does not carry are
    /// left untouched in the store.
    pub async fn update(&self, record: L::Record) -> Result<L::Record, SyncError> {
        self.run("update", self.update_inner(record)).await
    }

    pub(crate) async fn update_inner(&self, record: L::Record) -> Result<L::Record, SyncError> {
        record.validate()?;
        let id = record
            .id()
            .ok_or_else(|| ValidationError::MissingField("id".to_string()))?
            .to_string();
        let scope = self.level.scope_of(&record);
        let path = self.level.collection(&scope).doc(&id);

        let mut data = encode(&record)?;
        for name in self.level.derived_fields() {
            data.remove(*name);
        }
        self.store
            .update(&path, data)
            .await
            .map_err(|e| not_found_as::<L::Record>(e, &id))?;
        self.level.after_change(self.store.as_ref(), &scope).await?;

        self.upsert_local(&scope, record.clone());
        Ok(record)
    }

    /// Delete the record after all of its descendants, then close the gap it
    /// left in the sibling order. Returns how many documents were removed.
    pub async fn delete(&self, scope: &L::Scope, id: &str) -> Result<usize, SyncError> {
        self.run("delete", async {
            let collection = self.level.collection(scope);
            let path = collection.doc(id);
            if self.store.get(&path).await?.is_none() {
                return Err(SyncError::not_found(<L::Record as Record>::KIND, id));
            }

            self.level.before_delete(self.store.as_ref(), scope, id).await?;
            let removed = cascade::delete_cascade(self.store.as_ref(), &path).await?;
            ordering::densify(self.store.as_ref(), &collection).await?;
            self.level.after_change(self.store.as_ref(), scope).await?;

            info!(collection = %collection, id, removed, "{} deleted", L::NAME);
            self.remove_local(scope, id);
            self.reload_if_tracking(scope).await?;
            Ok(removed)
        })
        .await
    }

    /// Persist `order = index` for every sibling in one atomic batch.
    /// `ordered` must contain each sibling of `scope` exactly once.
    pub async fn reorder(&self, scope: &L::Scope, ordered: Vec<L::Record>) -> Result<Vec<L::Record>, SyncError> {
        self.run("reorder", async {
            let collection = self.level.collection(scope);
            let mut ids = Vec::with_capacity(ordered.len());
            for record in &ordered {
                let id = record
                    .id()
                    .ok_or_else(|| ValidationError::MissingField("id".to_string()))?;
                if self.level.scope_of(record) != *scope {
                    return Err(ValidationError::relationship(
                        <L::Record as Record>::KIND,
                        id,
                        "record does not belong to the sibling set being reordered",
                    )
                    .into());
                }
                ids.push(id.to_string());
            }

            let requested: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            if requested.len() != ids.len() {
                return Err(ValidationError::Duplicate(format!("id in reorder of {collection}")).into());
            }
            let siblings = self.store.list(&collection).await?;
            let stored: BTreeSet<&str> = siblings.iter().map(|d| d.id.as_str()).collect();
            if requested != stored {
                return Err(ValidationError::InvalidFormat(format!(
                    "reorder of {collection} must list every sibling exactly once"
                ))
                .into());
            }

            ordering::commit_atomic(self.store.as_ref(), ordering::reorder_batch(&collection, &ids)).await?;

            let mut reordered = ordered;
            for (index, record) in reordered.iter_mut().enumerate() {
                record.set_order(index as i64);
            }
            self.replace_local(scope, reordered.clone());
            Ok(reordered)
        })
        .await
    }

    // ========== REALTIME ==========

    /// Follow `scope` in realtime. Every snapshot replaces the published items.
    /// A previous subscription, for this or any other scope, is released first.
    pub async fn subscribe(&self, scope: &L::Scope) -> Result<(), SyncError> {
        self.run("subscribe", async {
            self.unsubscribe();

            let collection = self.level.collection(scope);
            let (registration, mut feed) = self.store.listen(&collection).await?;
            *lock(&self.scope) = Some(scope.clone());

            if let Some(first) = feed.recv().await {
                let items: Vec<L::Record> = decode_all(&collection, &first);
                self.state.send_modify(|s| s.items = items);
            }

            let state = Arc::clone(&self.state);
            let pump_collection = collection.clone();
            let pump = tokio::spawn(async move {
                while let Some(snapshot) = feed.recv().await {
                    let items: Vec<L::Record> = decode_all(&pump_collection, &snapshot);
                    state.send_modify(|s| s.items = items);
                }
            });

            *lock(&self.subscription) = Some(Subscription {
                _registration: registration,
                pump,
            });
            info!(collection = %collection, "{} subscription opened", L::NAME);
            Ok(())
        })
        .await
    }

    /// Release the realtime listener, if any. Published items are kept.
    pub fn unsubscribe(&self) {
        let previous = lock(&self.subscription).take();
        if previous.is_some() {
            info!("{} subscription released", L::NAME);
        }
    }

    // ========== LOCAL STATE ==========

    /// Whether local writes to `scope` belong in the published items. The first
    /// write on a manager with no scope yet makes `scope` the published one.
    fn claim(&self, scope: &L::Scope) -> bool {
        let mut current = lock(&self.scope);
        match current.as_ref() {
            Some(current) => current == scope,
            None => {
                *current = Some(scope.clone());
                true
            }
        }
    }

    pub(crate) fn replace_local(&self, scope: &L::Scope, items: Vec<L::Record>) {
        *lock(&self.scope) = Some(scope.clone());
        self.state.send_modify(|s| s.items = items);
    }

    pub(crate) fn upsert_local(&self, scope: &L::Scope, record: L::Record) {
        if !self.claim(scope) {
            return;
        }
        self.state.send_modify(|s| {
            s.items.retain(|r| r.id() != record.id());
            s.items.push(record);
            sort_by_order(&mut s.items);
        });
    }

    /// Drop `id` from the published items and close the gap it leaves.
    pub(crate) fn remove_local(&self, scope: &L::Scope, id: &str) {
        if !self.claim(scope) {
            return;
        }
        self.state.send_modify(|s| {
            s.items.retain(|r| r.id() != Some(id));
            for (index, record) in s.items.iter_mut().enumerate() {
                if record.order().is_some() {
                    record.set_order(index as i64);
                }
            }
        });
    }

    /// Re-read the sibling set if it is the one currently published.
    pub(crate) async fn reload_if_tracking(&self, scope: &L::Scope) -> Result<(), SyncError> {
        if self.current_scope().as_ref() != Some(scope) {
            self.state.send_modify(|_| {});
            return Ok(());
        }
        let collection = self.level.collection(scope);
        let docs = self.store.list(&collection).await?;
        let items: Vec<L::Record> = decode_all(&collection, &docs);
        self.state.send_modify(|s| s.items = items);
        Ok(())
    }
}

/// Map a store "no such document" into the manager's not-found error.
pub(crate) fn not_found_as<R: Record>(err: StoreError, id: &str) -> SyncError {
    if err.kind == StoreErrorKind::NotFound {
        SyncError::not_found(R::KIND, id)
    } else {
        SyncError::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::PhaseManager;
    use assert_matches::assert_matches;
    use shigodeki_atoms::phases::Phase;
    use shigodeki_atoms::ProjectKey;
    use shigodeki_shared::store::{field, MemoryStore};

    fn phase(name: &str, project: &ProjectKey) -> Phase {
        Phase::new(name, project, "u1")
    }

    async fn seeded(store: &MemoryStore, project_id: &str) -> ProjectKey {
        let project = ProjectKey::new(project_id);
        store.set(&project.doc_path(), field("name", "Launch"), false).await.unwrap();
        project
    }

    #[tokio::test]
    async fn validation_fails_before_any_write() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let project = ProjectKey::new("p1");

        let err = manager.create(&project, phase("", &project), None).await.unwrap_err();
        assert_matches!(err, SyncError::Validation(ValidationError::MissingField(_)));
        assert_eq!(store.commit_count(), 0);
        assert_eq!(manager.last_error(), Some(err));
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn loading_resolves_after_store_failure() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let project = seeded(&store, "p1").await;

        store.fail_next_commits(1);
        let err = manager.create(&project, phase("Design", &project), Some(0)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!manager.is_loading());
        assert!(manager.last_error().is_some());

        manager.create(&project, phase("Design", &project), Some(0)).await.unwrap();
        assert!(manager.last_error().is_none());
    }

    #[tokio::test]
    async fn create_assigns_id_and_appends() {
        let store = Arc::new(MemoryStore::new());
        let project = seeded(&store, "p1").await;
        let manager = PhaseManager::new(store);

        let created = manager.create(&project, phase("Design", &project), None).await.unwrap();
        assert!(created.id.is_some());
        assert!(created.created_at.is_some());
        assert_eq!(manager.items(), vec![created.clone()]);

        let read = manager.read(&project, created.id.as_deref().unwrap()).await.unwrap();
        assert_eq!(read, Some(created));
        assert_eq!(manager.read(&project, "missing").await.unwrap(), None);
        assert_matches!(
            manager.fetch(&project, "missing").await,
            Err(SyncError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn explicit_order_makes_room_among_siblings() {
        let store = Arc::new(MemoryStore::new());
        let project = seeded(&store, "p1").await;
        let manager = PhaseManager::new(store);
        manager.create(&project, phase("A", &project), None).await.unwrap();
        manager.create(&project, phase("B", &project), None).await.unwrap();

        let inserted = manager.create(&project, phase("X", &project), Some(1)).await.unwrap();
        assert_eq!(inserted.order, 1);
        let appended = manager.create(&project, phase("Z", &project), Some(40)).await.unwrap();
        assert_eq!(appended.order, 3);

        let listed = manager.list(&project).await.unwrap();
        let placed: Vec<_> = listed.iter().map(|p| (p.name.as_str(), p.order)).collect();
        assert_eq!(placed, [("A", 0), ("X", 1), ("B", 2), ("Z", 3)]);
    }

    #[tokio::test]
    async fn update_is_a_merge_and_needs_existing_doc() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let project = seeded(&store, "p1").await;
        let mut created = manager.create(&project, phase("Design", &project), None).await.unwrap();

        let path = project.phases().doc(created.id.clone().unwrap());
        store
            .set(&path, shigodeki_shared::store::field("color", "teal"), true)
            .await
            .unwrap();

        created.name = "Build".into();
        manager.update(created.clone()).await.unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Build");
        assert_eq!(doc.data["color"], "teal");

        let mut ghost = created;
        ghost.id = Some("ghost".into());
        assert_matches!(manager.update(ghost).await, Err(SyncError::NotFound { id, .. }) if id == "ghost");
    }

    #[tokio::test]
    async fn reorder_requires_full_sibling_set() {
        let store = Arc::new(MemoryStore::new());
        let project = seeded(&store, "p1").await;
        let manager = PhaseManager::new(store);
        let a = manager.create(&project, phase("A", &project), None).await.unwrap();
        let b = manager.create(&project, phase("B", &project), None).await.unwrap();

        assert_matches!(
            manager.reorder(&project, vec![b.clone()]).await,
            Err(SyncError::Validation(ValidationError::InvalidFormat(_)))
        );

        let reordered = manager.reorder(&project, vec![b.clone(), a.clone()]).await.unwrap();
        assert_eq!(reordered[0].id, b.id);
        assert_eq!(reordered[0].order, 0);
        let listed = manager.list(&project).await.unwrap();
        let names: Vec<_> = listed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["B", "A"]);

        assert_matches!(
            manager.reorder(&project, vec![a.clone(), a.clone()]).await,
            Err(SyncError::Validation(ValidationError::Duplicate(_)))
        );
    }

    #[tokio::test]
    async fn delete_drops_the_record_from_published_items() {
        let store = Arc::new(MemoryStore::new());
        let project = seeded(&store, "p1").await;
        let manager = PhaseManager::new(store);
        let a = manager.create(&project, phase("A", &project), None).await.unwrap();
        manager.create(&project, phase("B", &project), None).await.unwrap();

        manager.delete(&project, a.id.as_deref().unwrap()).await.unwrap();
        let published: Vec<_> = manager.items().iter().map(|p| (p.name.clone(), p.order)).collect();
        assert_eq!(published, [("B".to_string(), 0)]);
    }

    #[tokio::test]
    async fn explicit_insert_republishes_shifted_siblings() {
        let store = Arc::new(MemoryStore::new());
        let project = seeded(&store, "p1").await;
        let manager = PhaseManager::new(store);
        manager.create(&project, phase("A", &project), None).await.unwrap();
        manager.create(&project, phase("X", &project), Some(0)).await.unwrap();

        let published: Vec<_> = manager.items().iter().map(|p| (p.name.clone(), p.order)).collect();
        assert_eq!(published, [("X".to_string(), 0), ("A".to_string(), 1)]);
    }

    #[tokio::test]
    async fn create_under_missing_parent_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let project = ProjectKey::new("gone");

        assert_matches!(
            manager.create(&project, phase("Design", &project), None).await,
            Err(SyncError::NotFound { kind: EntityKind::Project, id }) if id == "gone"
        );
        assert!(store.paths().is_empty());
        assert!(manager.items().is_empty());
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_listener() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let p1 = ProjectKey::new("p1");
        let p2 = ProjectKey::new("p2");

        manager.subscribe(&p1).await.unwrap();
        manager.subscribe(&p1).await.unwrap();
        assert_eq!(store.hub().listener_count(&p1.phases()), 1);

        manager.subscribe(&p2).await.unwrap();
        assert_eq!(store.hub().listener_count(&p1.phases()), 0);
        assert_eq!(store.hub().listener_count(&p2.phases()), 1);

        drop(manager);
        assert_eq!(store.hub().total_listeners(), 0);
    }

    #[tokio::test]
    async fn subscription_replaces_items_with_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let manager = PhaseManager::new(store.clone());
        let writer = PhaseManager::new(store.clone());
        let project = seeded(&store, "p1").await;

        manager.subscribe(&project).await.unwrap();
        assert!(manager.items().is_empty());

        let mut rx = manager.watch();
        writer.create(&project, phase("Remote", &project), None).await.unwrap();
        rx.wait_for(|s| s.items.len() == 1).await.unwrap();
        assert_eq!(manager.items()[0].name, "Remote");

        manager.unsubscribe();
        assert!(!manager.is_subscribed());
        assert_eq!(store.hub().total_listeners(), 0);
    }
}
