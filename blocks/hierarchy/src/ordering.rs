//! Sibling ordering and cross-list task moves.
//!
//! Siblings carry a dense `order` of `0..n`. Every rewrite of those values goes
//! out in one atomic batch; a batch the store cannot apply in one go is refused
//! rather than split.

use shigodeki_atoms::subtasks::Subtask;
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{CollectionPath, EntityKind, ListKey, ValidationError};
use shigodeki_shared::store::{field, DocumentStore, StoredDocument, WriteBatch};
use shigodeki_shared::{StoreError, SyncError};
use tracing::{debug, info};

/// `max(order) + 1` over the siblings, or 0 for an empty collection.
pub fn next_order(siblings: &[StoredDocument]) -> i64 {
    siblings
        .iter()
        .filter_map(StoredDocument::order)
        .max()
        .map_or(0, |max| max + 1)
}

/// `order = index` for every id, as merge updates of existing documents.
pub fn reorder_batch(collection: &CollectionPath, ids: &[String]) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for (index, id) in ids.iter().enumerate() {
        batch.update(collection.doc(id), field("order", index as i64));
    }
    batch
}

/// Commit a batch whose writes must land together.
pub async fn commit_atomic(store: &dyn DocumentStore, batch: WriteBatch) -> Result<(), SyncError> {
    if batch.is_empty() {
        return Ok(());
    }
    let limit = store.max_batch_len();
    if batch.len() > limit {
        return Err(StoreError::invalid(format!(
            "{} writes cannot be applied atomically (limit {limit})",
            batch.len()
        ))
        .into());
    }
    store.commit(batch).await?;
    Ok(())
}

/// Commit independent writes in as many batches as the store needs.
/// Returns the number of writes applied.
pub async fn commit_in_chunks(store: &dyn DocumentStore, batch: WriteBatch) -> Result<usize, SyncError> {
    let ops = batch.into_ops();
    let total = ops.len();
    let limit = store.max_batch_len().max(1);
    let mut chunk = WriteBatch::new();
    for op in ops {
        chunk.push(op);
        if chunk.len() == limit {
            store.commit(std::mem::take(&mut chunk)).await?;
        }
    }
    if !chunk.is_empty() {
        store.commit(chunk).await?;
    }
    Ok(total)
}

/// Rewrite `order` so the collection reads `0..n` in its current order.
/// Collections without an `order` field are left alone.
pub async fn densify(store: &dyn DocumentStore, collection: &CollectionPath) -> Result<usize, SyncError> {
    let docs = store.list(collection).await?;
    if docs.iter().all(|d| d.order().is_none()) {
        return Ok(0);
    }
    let mut batch = WriteBatch::new();
    for (index, doc) in docs.iter().enumerate() {
        if doc.order() != Some(index as i64) {
            batch.update(collection.doc(&doc.id), field("order", index as i64));
        }
    }
    let changed = batch.len();
    commit_atomic(store, batch).await?;
    if changed > 0 {
        debug!(collection = %collection, changed, "order densified");
    }
    Ok(changed)
}

/// Queue the shifts that make room for a new sibling `id` at `order`, clamped
/// to the end of the set. Returns the order the new sibling takes.
pub fn make_room(
    batch: &mut WriteBatch,
    collection: &CollectionPath,
    siblings: &[StoredDocument],
    id: &str,
    order: i64,
) -> i64 {
    let position = position_for(Some(order), siblings.len());
    place(batch, collection, siblings, Some(id), position);
    position as i64
}

/// Insert `id` at `position` (clamped to the end) among `siblings`, then queue
/// an order update for every sibling whose index changed.
fn place(
    batch: &mut WriteBatch,
    collection: &CollectionPath,
    siblings: &[StoredDocument],
    id: Option<&str>,
    position: usize,
) {
    let mut ids: Vec<&str> = siblings.iter().map(|d| d.id.as_str()).collect();
    if let Some(id) = id {
        ids.insert(position.min(ids.len()), id);
    }
    for (index, sibling_id) in ids.iter().enumerate() {
        if Some(*sibling_id) == id {
            continue;
        }
        let current = siblings
            .iter()
            .find(|d| d.id == *sibling_id)
            .and_then(StoredDocument::order);
        if current != Some(index as i64) {
            batch.update(collection.doc(*sibling_id), field("order", index as i64));
        }
    }
}

fn position_for(new_order: Option<i64>, len: usize) -> usize {
    match new_order {
        Some(order) if order >= 0 => (order as usize).min(len),
        _ => len,
    }
}

/// Move a task to `position` in `target`, possibly in another list, phase or
/// project. The task keeps its id. Its subtasks move with it, and both the
/// source and the target list are left with dense orders. Everything is one
/// atomic batch: on failure nothing has moved.
pub async fn move_task(
    store: &dyn DocumentStore,
    task: &Task,
    target: &ListKey,
    new_order: Option<i64>,
) -> Result<Task, SyncError> {
    let old_key = task
        .key()
        .ok_or_else(|| ValidationError::MissingField("id".to_string()))?;
    let source = old_key.list();
    let task_id = old_key.task_id.clone();

    let stored = store
        .get(&old_key.doc_path())
        .await?
        .ok_or_else(|| SyncError::not_found(EntityKind::Task, &task_id))?;
    let mut moved: Task = stored.decode()?;

    let source_siblings: Vec<StoredDocument> = store
        .list(&source.tasks())
        .await?
        .into_iter()
        .filter(|d| d.id != task_id)
        .collect();

    let mut batch = WriteBatch::new();

    if source == *target {
        let position = position_for(new_order, source_siblings.len());
        place(&mut batch, &source.tasks(), &source_siblings, Some(&task_id), position);
        if moved.order != position as i64 {
            batch.update(old_key.doc_path(), field("order", position as i64));
        }
        commit_atomic(store, batch).await?;
        moved.order = position as i64;
        debug!(task = %task_id, position, "task reordered within its list");
        return Ok(moved);
    }

    if store.get(&target.doc_path()).await?.is_none() {
        return Err(SyncError::not_found(EntityKind::TaskList, &target.list_id));
    }
    let target_siblings = store.list(&target.tasks()).await?;
    let position = position_for(new_order, target_siblings.len());
    let subtasks = store.list(&old_key.subtasks()).await?;

    moved.relocate(target);
    moved.order = position as i64;
    let new_key = target.task(&task_id);

    for doc in &subtasks {
        let mut subtask: Subtask = doc.decode()?;
        subtask.attach(&new_key);
        batch.delete(old_key.subtasks().doc(&doc.id));
        batch.set_record(new_key.subtasks().doc(&doc.id), &subtask)?;
    }
    batch.delete(old_key.doc_path());
    batch.set_record(new_key.doc_path(), &moved)?;
    place(&mut batch, &source.tasks(), &source_siblings, None, 0);
    place(&mut batch, &target.tasks(), &target_siblings, Some(&task_id), position);

    commit_atomic(store, batch).await?;
    info!(
        task = %task_id,
        from = %source.tasks(),
        to = %target.tasks(),
        subtasks = subtasks.len(),
        "task moved"
    );
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shigodeki_shared::store::{encode, MemoryStore};
    use shigodeki_shared::StoreErrorKind;
    use shigodeki_atoms::PhaseKey;

    async fn seed_task(store: &MemoryStore, list: &ListKey, id: &str, order: i64) -> Task {
        let mut task = Task::new(format!("task {id}"), list, "u1");
        task.id = Some(id.to_string());
        task.order = order;
        store
            .set(&list.tasks().doc(id), encode(&task).unwrap(), false)
            .await
            .unwrap();
        task
    }

    async fn seed_list(store: &MemoryStore, phase: &PhaseKey, id: &str) -> ListKey {
        store
            .set(&phase.lists().doc(id), field("name", id), false)
            .await
            .unwrap();
        phase.list(id)
    }

    async fn orders(store: &MemoryStore, list: &ListKey) -> Vec<(String, i64)> {
        store
            .list(&list.tasks())
            .await
            .unwrap()
            .into_iter()
            .map(|d| (d.id.clone(), d.order().unwrap()))
            .collect()
    }

    #[test]
    fn next_order_follows_max() {
        let docs = vec![
            StoredDocument::new("a", field("order", 4)),
            StoredDocument::new("b", field("order", 1)),
        ];
        assert_eq!(next_order(&docs), 5);
        assert_eq!(next_order(&[]), 0);
    }

    #[tokio::test]
    async fn move_across_lists_keeps_both_dense() {
        let store = MemoryStore::new();
        let phase = PhaseKey::new("p1", "f1");
        let a = seed_list(&store, &phase, "a").await;
        let b = seed_list(&store, &phase, "b").await;
        seed_task(&store, &a, "t0", 0).await;
        let t1 = seed_task(&store, &a, "t1", 1).await;
        seed_task(&store, &a, "t2", 2).await;
        seed_task(&store, &b, "u0", 0).await;
        store
            .set(&a.task("t1").subtasks().doc("s1"), encode(&Subtask::new("s", &a.task("t1"), "u1")).unwrap(), false)
            .await
            .unwrap();

        let commits = store.commit_count();
        let moved = move_task(&store, &t1, &b, Some(0)).await.unwrap();
        assert_eq!(store.commit_count(), commits + 1);
        assert_eq!(moved.list_id, "b");
        assert_eq!(moved.order, 0);

        assert_eq!(orders(&store, &a).await, [("t0".to_string(), 0), ("t2".to_string(), 1)]);
        assert_eq!(orders(&store, &b).await, [("t1".to_string(), 0), ("u0".to_string(), 1)]);

        let subtask = store
            .get(&b.task("t1").subtasks().doc("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subtask.data["listId"], json!("b"));
        assert!(store.get(&a.task("t1").subtasks().doc("s1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn move_within_list_reorders() {
        let store = MemoryStore::new();
        let phase = PhaseKey::new("p1", "f1");
        let a = seed_list(&store, &phase, "a").await;
        let t0 = seed_task(&store, &a, "t0", 0).await;
        seed_task(&store, &a, "t1", 1).await;
        seed_task(&store, &a, "t2", 2).await;

        let moved = move_task(&store, &t0, &a, None).await.unwrap();
        assert_eq!(moved.order, 2);
        assert_eq!(
            orders(&store, &a).await,
            [("t1".to_string(), 0), ("t2".to_string(), 1), ("t0".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn failed_move_changes_nothing() {
        let store = MemoryStore::new();
        let phase = PhaseKey::new("p1", "f1");
        let a = seed_list(&store, &phase, "a").await;
        let b = seed_list(&store, &phase, "b").await;
        let t0 = seed_task(&store, &a, "t0", 0).await;
        let before = store.paths();

        store.fail_next_commits(1);
        assert_matches!(
            move_task(&store, &t0, &b, None).await,
            Err(SyncError::Persistence(StoreError { kind: StoreErrorKind::Unavailable, .. }))
        );
        assert_eq!(store.paths(), before);
    }

    #[tokio::test]
    async fn move_into_missing_list_is_not_found() {
        let store = MemoryStore::new();
        let phase = PhaseKey::new("p1", "f1");
        let a = seed_list(&store, &phase, "a").await;
        let t0 = seed_task(&store, &a, "t0", 0).await;
        assert_matches!(
            move_task(&store, &t0, &phase.list("nowhere"), None).await,
            Err(SyncError::NotFound { kind: EntityKind::TaskList, .. })
        );
    }

    #[tokio::test]
    async fn oversized_atomic_batch_is_refused() {
        let store = MemoryStore::new();
        let collection = PhaseKey::new("p1", "f1").lists();
        let ids: Vec<String> = (0..store.max_batch_len() + 1).map(|i| format!("l{i}")).collect();
        assert_matches!(
            commit_atomic(&store, reorder_batch(&collection, &ids)).await,
            Err(SyncError::Persistence(StoreError { kind: StoreErrorKind::InvalidArgument, .. }))
        );
    }
}
