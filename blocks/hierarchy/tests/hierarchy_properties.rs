use assert_matches::assert_matches;
use hierarchy_block::export::{export_project, import_project};
use hierarchy_block::relationships::validate_tree;
use hierarchy_block::{
    AcceptOutcome, InvitationManager, ListManager, MigrationUtility, PhaseManager, ProjectManager,
    ProjectTree, SubtaskManager, TaskManager,
};
use shigodeki_atoms::families::{Family, LegacyTask};
use shigodeki_atoms::invitations::InvitationTarget;
use shigodeki_atoms::lists::{ListColor, TaskList};
use shigodeki_atoms::phases::Phase;
use shigodeki_atoms::projects::{OwnerType, Project, Role};
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{EntityKind, FamilyKey, InvitationError, ListKey, PhaseKey, ProjectKey};
use shigodeki_shared::store::{encode, DocumentStore, MemoryStore};
use shigodeki_shared::SyncError;
use std::sync::Arc;

async fn project(store: &Arc<MemoryStore>) -> ProjectKey {
    let project = ProjectManager::new(store.clone())
        .create_project("Launch", None, "u1", OwnerType::Individual)
        .await
        .unwrap();
    ProjectKey::new(project.id.unwrap())
}

async fn phase(store: &Arc<MemoryStore>, key: &ProjectKey) -> PhaseKey {
    let phase = PhaseManager::new(store.clone())
        .create_phase(key, "Build", None, "u1", None)
        .await
        .unwrap();
    key.phase(phase.id.unwrap())
}

async fn list(store: &Arc<MemoryStore>, phase: &PhaseKey, name: &str) -> ListKey {
    let list = ListManager::new(store.clone())
        .create_list(phase, name, "u1", ListColor::Blue, None)
        .await
        .unwrap();
    phase.list(list.id.unwrap())
}

fn orders<R: shigodeki_atoms::Record>(records: &[R]) -> Vec<i64> {
    let mut orders: Vec<i64> = records.iter().filter_map(|r| r.order()).collect();
    orders.sort_unstable();
    orders
}

#[tokio::test]
async fn sibling_orders_stay_dense_through_create_delete_and_reorder() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phase_key = phase(&store, &key).await;
    let list_key = list(&store, &phase_key, "Todo").await;
    let tasks = TaskManager::new(store.clone());

    for title in ["a", "b", "c", "d", "e"] {
        tasks.create_task(&list_key, title, "u1", None).await.unwrap();
    }
    assert_eq!(orders(&tasks.list(&list_key).await.unwrap()), [0, 1, 2, 3, 4]);

    let second = tasks.list(&list_key).await.unwrap().remove(1);
    tasks.delete(&list_key, second.id.as_deref().unwrap()).await.unwrap();
    assert_eq!(orders(&tasks.list(&list_key).await.unwrap()), [0, 1, 2, 3]);

    let mut current = tasks.list(&list_key).await.unwrap();
    current.reverse();
    let reordered = tasks.reorder(&list_key, current).await.unwrap();
    let titles: Vec<_> = reordered.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["e", "d", "c", "a"]);
    assert_eq!(orders(&tasks.list(&list_key).await.unwrap()), [0, 1, 2, 3]);

    tasks.create_task(&list_key, "f", "u1", Some(1)).await.unwrap();
    assert_eq!(orders(&tasks.list(&list_key).await.unwrap()), [0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn deleting_a_task_deletes_its_subtasks() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phase_key = phase(&store, &key).await;
    let list_key = list(&store, &phase_key, "Todo").await;
    let tasks = TaskManager::new(store.clone());
    let task = tasks.create_task(&list_key, "API", "u1", None).await.unwrap();
    let task_key = task.key().unwrap();

    let subtasks = SubtaskManager::new(store.clone());
    for title in ["one", "two", "three"] {
        subtasks.create_subtask(&task_key, title, "u1", None).await.unwrap();
    }
    assert_eq!(store.count_under(&task_key.subtasks()), 3);

    let removed = tasks.delete(&list_key, &task_key.task_id).await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(store.count_under(&task_key.subtasks()), 0);
    assert!(store.get(&task_key.doc_path()).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_move_leaves_the_task_where_it_was() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phase_key = phase(&store, &key).await;
    let from = list(&store, &phase_key, "Todo").await;
    let to = list(&store, &phase_key, "Done").await;
    let tasks = TaskManager::new(store.clone());
    let task = tasks.create_task(&from, "API", "u1", None).await.unwrap();
    SubtaskManager::new(store.clone())
        .create_subtask(&task.key().unwrap(), "Schema", "u1", None)
        .await
        .unwrap();
    let task_id = task.id.clone().unwrap();

    store.fail_next_commits(1);
    assert_matches!(tasks.move_task(&task, &to, None).await, Err(SyncError::Persistence(_)));
    assert!(tasks.last_error().is_some());
    assert!(!tasks.is_loading());
    assert!(store.get(&from.task(&task_id).doc_path()).await.unwrap().is_some());
    assert!(store.get(&to.task(&task_id).doc_path()).await.unwrap().is_none());
    assert_eq!(store.count_under(&from.task(&task_id).subtasks()), 1);

    let moved = tasks.move_task(&task, &to, None).await.unwrap();
    assert_eq!(moved.list_id, to.list_id);
    assert!(store.get(&from.task(&task_id).doc_path()).await.unwrap().is_none());
    assert!(store.get(&to.task(&task_id).doc_path()).await.unwrap().is_some());
    assert_eq!(store.count_under(&to.task(&task_id).subtasks()), 1);
    assert_eq!(store.count_under(&from.task(&task_id).subtasks()), 0);
}

#[tokio::test]
async fn export_and_import_reproduce_the_record_set() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phase_key = phase(&store, &key).await;
    let list_key = list(&store, &phase_key, "Todo").await;
    let tasks = TaskManager::new(store.clone());
    let first = tasks.create_task(&list_key, "API", "u1", None).await.unwrap();
    tasks.create_task(&list_key, "UI", "u1", None).await.unwrap();
    SubtaskManager::new(store.clone())
        .create_subtask(&first.key().unwrap(), "Schema", "u1", None)
        .await
        .unwrap();

    let export = export_project(store.as_ref(), &key).await.unwrap();
    let json = export.to_json().unwrap();

    let target = MemoryStore::new();
    import_project(&target, &hierarchy_block::export::ProjectExport::from_json(&json).unwrap())
        .await
        .unwrap();

    let source_paths: Vec<_> = store
        .paths()
        .into_iter()
        .filter(|p| p.collection().as_str().starts_with("projects"))
        .filter(|p| !p.collection().as_str().ends_with("/members"))
        .collect();
    assert_eq!(target.paths(), source_paths);

    let reloaded = ProjectTree::load(&target, &key).await.unwrap();
    let original = ProjectTree::load(store.as_ref(), &key).await.unwrap();
    assert_eq!(reloaded, original);
}

#[tokio::test]
async fn misplaced_task_is_reported_by_tree_validation() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phase_key = phase(&store, &key).await;
    let list_key = list(&store, &phase_key, "Todo").await;
    let other = list(&store, &phase_key, "Other").await;

    let mut stray = Task::new("Stray", &other, "u1");
    stray.id = Some("stray".into());
    store
        .set(&list_key.tasks().doc("stray"), encode(&stray).unwrap(), false)
        .await
        .unwrap();

    let tree = ProjectTree::load(store.as_ref(), &key).await.unwrap();
    let violations = validate_tree(&tree);
    assert!(
        violations.iter().any(|v| v.kind == EntityKind::Task && v.id == "stray"),
        "{violations:#?}"
    );
}

#[tokio::test]
async fn phase_orders_close_the_gap_after_delete() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let phases = PhaseManager::new(store.clone());

    let f1 = phases.create_phase(&key, "F1", None, "u1", None).await.unwrap();
    let f2 = phases.create_phase(&key, "F2", None, "u1", None).await.unwrap();
    assert_eq!(f1.order, 0);
    assert_eq!(f2.order, 1);

    phases.delete(&key, f1.id.as_deref().unwrap()).await.unwrap();
    let remaining: Phase = phases.fetch(&key, f2.id.as_deref().unwrap()).await.unwrap();
    assert_eq!(remaining.order, 0);
    assert_eq!(phases.list(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn smith_family_migrates_into_one_phase() {
    let store = Arc::new(MemoryStore::new());
    let family_key = FamilyKey::new("smith");
    let family = Family {
        name: "Smith".into(),
        ..Default::default()
    };
    store.set(&family_key.doc_path(), encode(&family).unwrap(), false).await.unwrap();
    let groceries = TaskList::new_legacy("Groceries", &family_key, "owner");
    store
        .set(&family_key.task_lists().doc("groceries"), encode(&groceries).unwrap(), false)
        .await
        .unwrap();
    for (order, title) in ["Milk", "Eggs"].into_iter().enumerate() {
        let task = LegacyTask {
            title: title.to_string(),
            order: order as i64,
            family_id: "smith".into(),
            list_id: "groceries".into(),
            ..Default::default()
        };
        store
            .set(
                &family_key.list("groceries").tasks().doc(format!("t{order}")),
                encode(&task).unwrap(),
                false,
            )
            .await
            .unwrap();
    }

    let utility = MigrationUtility::new(store.clone());
    let report = utility.migrate_family("smith", Some("Smith"), "owner").await.unwrap();
    assert!(report.validated);
    assert_eq!(report.lists_migrated, 1);
    assert_eq!(report.tasks_migrated, 2);

    let tree = ProjectTree::load(store.as_ref(), &ProjectKey::new(&report.project_id))
        .await
        .unwrap();
    assert_eq!(tree.project.name, "Smith");
    assert_eq!(tree.phases.len(), 1);
    let lists: Vec<_> = tree.lists().collect();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].list.name, "Groceries");
    let tasks: Vec<_> = lists[0].tasks.iter().map(|t| (t.task.title.as_str(), t.task.order)).collect();
    assert_eq!(tasks, [("Milk", 0), ("Eggs", 1)]);
    assert!(validate_tree(&tree).is_empty());
    assert!(utility.validate_migration("smith", &report.project_id).await.unwrap());
}

#[tokio::test]
async fn used_invitation_code_leaves_members_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let key = project(&store).await;
    let invitations = InvitationManager::new(store.clone(), 30);
    let invitation = invitations
        .create_invitation(&key.project_id, InvitationTarget::Project, "u1", Role::Editor, 1)
        .await
        .unwrap();
    assert_eq!(invitation.code.len(), 6);

    assert_matches!(
        invitations.accept_invitation(&invitation.code, "u2", None).await,
        Ok(AcceptOutcome::Joined { .. })
    );
    let members_before: Project = store.get(&key.doc_path()).await.unwrap().unwrap().decode().unwrap();

    assert_matches!(
        invitations.accept_invitation(&invitation.code, "u3", None).await,
        Err(SyncError::Invitation(InvitationError::AlreadyUsed))
    );
    let members_after: Project = store.get(&key.doc_path()).await.unwrap().unwrap().decode().unwrap();
    assert_eq!(members_after.member_ids, members_before.member_ids);
    assert!(!members_after.is_member("u3"));
    assert_eq!(store.count_under(&key.members()), 2);
}
