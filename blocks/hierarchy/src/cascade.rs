//! Cascade delete: a document goes only after everything beneath it.

use shigodeki_atoms::paths::child_collections;
use shigodeki_atoms::DocumentPath;
use shigodeki_shared::store::DocumentStore;
use shigodeki_shared::SyncError;
use tracing::info;

/// Every document below `root`, each listed after its own parent.
pub async fn collect_descendants(
    store: &dyn DocumentStore,
    root: &DocumentPath,
) -> Result<Vec<DocumentPath>, SyncError> {
    let mut found = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(doc) = pending.pop() {
        for name in child_collections(doc.collection().name()) {
            let collection = doc.sub(name);
            for child in store.list(&collection).await? {
                let path = collection.doc(child.id);
                found.push(path.clone());
                pending.push(path);
            }
        }
    }
    Ok(found)
}

/// Delete `root` and all of its descendants, deepest first, so an interrupted
/// delete never leaves a child without its parent. Returns the number of
/// documents removed.
pub async fn delete_cascade(store: &dyn DocumentStore, root: &DocumentPath) -> Result<usize, SyncError> {
    let mut paths = collect_descendants(store, root).await?;
    paths.reverse();
    paths.push(root.clone());
    let removed = store.delete_many(paths).await?;
    info!(root = %root, removed, "cascade delete finished");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shigodeki_atoms::{PhaseKey, ProjectKey};
    use shigodeki_shared::store::{field, MemoryStore};

    async fn seed(store: &MemoryStore, path: DocumentPath) {
        store.set(&path, field("order", 0), false).await.unwrap();
    }

    #[tokio::test]
    async fn children_come_before_parents() {
        let store = MemoryStore::new();
        let project = ProjectKey::new("p1");
        let phase = PhaseKey::new("p1", "f1");
        let task = phase.list("l1").task("t1");
        seed(&store, project.doc_path()).await;
        seed(&store, phase.doc_path()).await;
        seed(&store, phase.sections().doc("s1")).await;
        seed(&store, phase.list("l1").doc_path()).await;
        seed(&store, task.doc_path()).await;
        seed(&store, task.subtasks().doc("st1")).await;
        seed(&store, project.members().doc("u1")).await;

        let mut order = collect_descendants(&store, &project.doc_path()).await.unwrap();
        order.reverse();
        let position = |p: &DocumentPath| order.iter().position(|x| x == p).unwrap();
        assert!(position(&task.subtasks().doc("st1")) < position(&task.doc_path()));
        assert!(position(&task.doc_path()) < position(&phase.list("l1").doc_path()));
        assert!(position(&phase.list("l1").doc_path()) < position(&phase.doc_path()));

        let removed = delete_cascade(&store, &project.doc_path()).await.unwrap();
        assert_eq!(removed, 7);
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn siblings_are_untouched() {
        let store = MemoryStore::new();
        let phase = PhaseKey::new("p1", "f1");
        seed(&store, phase.list("l1").doc_path()).await;
        seed(&store, phase.list("l1").task("t1").doc_path()).await;
        seed(&store, phase.list("l2").doc_path()).await;

        delete_cascade(&store, &phase.list("l1").doc_path()).await.unwrap();
        assert_eq!(store.paths(), vec![phase.list("l2").doc_path()]);
    }
}
