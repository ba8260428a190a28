use super::StoredDocument;
use shigodeki_atoms::CollectionPath;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// Stream of full collection snapshots. Each item replaces the previous one.
pub type SnapshotFeed = mpsc::UnboundedReceiver<Vec<StoredDocument>>;

type Listener = mpsc::UnboundedSender<Vec<StoredDocument>>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: HashMap<CollectionPath, HashMap<u64, Listener>>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fans collection snapshots out to realtime listeners.
///
/// Stores publish after every successful commit for each collection the commit
/// touched; the hub only forwards to collections somebody is listening to.
#[derive(Clone, Default)]
pub struct ListenerHub {
    inner: Arc<Mutex<HubInner>>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and hand it `initial` straight away.
    pub fn register(
        &self,
        collection: CollectionPath,
        initial: Vec<StoredDocument>,
    ) -> (ListenerRegistration, SnapshotFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the first send cannot fail.
        let _ = tx.send(initial);

        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .listeners
            .entry(collection.clone())
            .or_default()
            .insert(id, tx);
        debug!(collection = %collection, listener = id, "listener registered");

        let registration = ListenerRegistration {
            hub: Arc::downgrade(&self.inner),
            collection,
            id,
            active: true,
        };
        (registration, rx)
    }

    pub fn is_watched(&self, collection: &CollectionPath) -> bool {
        lock(&self.inner)
            .listeners
            .get(collection)
            .is_some_and(|l| !l.is_empty())
    }

    pub fn listener_count(&self, collection: &CollectionPath) -> usize {
        lock(&self.inner)
            .listeners
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn total_listeners(&self) -> usize {
        lock(&self.inner).listeners.values().map(HashMap::len).sum()
    }

    /// Push `snapshot` to every listener of `collection`, dropping listeners
    /// whose feed has been closed.
    pub fn publish(&self, collection: &CollectionPath, snapshot: Vec<StoredDocument>) {
        let mut inner = lock(&self.inner);
        let Some(listeners) = inner.listeners.get_mut(collection) else {
            return;
        };
        listeners.retain(|_, tx| tx.send(snapshot.clone()).is_ok());
        if listeners.is_empty() {
            inner.listeners.remove(collection);
        }
    }
}

/// Keeps a realtime listener alive. Dropping it, or calling [`remove`](Self::remove),
/// detaches the listener and closes its feed.
pub struct ListenerRegistration {
    hub: Weak<Mutex<HubInner>>,
    collection: CollectionPath,
    id: u64,
    active: bool,
}

impl ListenerRegistration {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn remove(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let Some(inner) = self.hub.upgrade() else {
            return;
        };
        let mut inner = lock(&inner);
        if let Some(listeners) = inner.listeners.get_mut(&self.collection) {
            listeners.remove(&self.id);
            if listeners.is_empty() {
                inner.listeners.remove(&self.collection);
            }
        }
        debug!(collection = %self.collection, listener = self.id, "listener removed");
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .finish()
    }
}
