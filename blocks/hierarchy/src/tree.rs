//! A whole project loaded into memory, for validation and export.

use crate::manager::decode_all;
use futures::future::try_join_all;
use shigodeki_atoms::lists::TaskList;
use shigodeki_atoms::phases::Phase;
use shigodeki_atoms::projects::Project;
use shigodeki_atoms::sections::PhaseSection;
use shigodeki_atoms::subtasks::Subtask;
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{EntityKind, ListKey, PhaseKey, ProjectKey, TaskKey};
use shigodeki_shared::store::DocumentStore;
use shigodeki_shared::SyncError;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    /// Path id of the task document.
    pub id: String,
    pub task: Task,
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub id: String,
    pub list: TaskList,
    pub tasks: Vec<TaskNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseNode {
    pub id: String,
    pub phase: Phase,
    pub sections: Vec<PhaseSection>,
    pub lists: Vec<ListNode>,
}

/// Each node is placed where its document was found, not where its own
/// ancestor-id fields claim it belongs, so the two can be compared.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectTree {
    pub id: String,
    pub project: Project,
    pub phases: Vec<PhaseNode>,
}

impl ProjectTree {
    pub async fn load(store: &dyn DocumentStore, key: &ProjectKey) -> Result<Self, SyncError> {
        let project: Project = store
            .get(&key.doc_path())
            .await?
            .ok_or_else(|| SyncError::not_found(EntityKind::Project, &key.project_id))?
            .decode()?;

        let phase_docs = store.list(&key.phases()).await?;
        let phases = try_join_all(
            decode_all::<Phase>(&key.phases(), &phase_docs)
                .into_iter()
                .filter_map(|phase| {
                    let id = phase.id.clone()?;
                    Some(load_phase(store, key.phase(id), phase))
                }),
        )
        .await?;

        Ok(Self {
            id: key.project_id.clone(),
            project,
            phases,
        })
    }

    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.id)
    }

    pub fn lists(&self) -> impl Iterator<Item = &ListNode> {
        self.phases.iter().flat_map(|p| p.lists.iter())
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.lists().flat_map(|l| l.tasks.iter())
    }

    pub fn subtasks(&self) -> impl Iterator<Item = &Subtask> {
        self.tasks().flat_map(|t| t.subtasks.iter())
    }

    pub fn sections(&self) -> impl Iterator<Item = &PhaseSection> {
        self.phases.iter().flat_map(|p| p.sections.iter())
    }
}

async fn load_phase(store: &dyn DocumentStore, key: PhaseKey, phase: Phase) -> Result<PhaseNode, SyncError> {
    let section_docs = store.list(&key.sections()).await?;
    let list_docs = store.list(&key.lists()).await?;
    let lists = try_join_all(
        decode_all::<TaskList>(&key.lists(), &list_docs)
            .into_iter()
            .filter_map(|list| {
                let id = list.id.clone()?;
                Some(load_list(store, key.list(id), list))
            }),
    )
    .await?;

    Ok(PhaseNode {
        id: key.phase_id.clone(),
        phase,
        sections: decode_all(&key.sections(), &section_docs),
        lists,
    })
}

async fn load_list(store: &dyn DocumentStore, key: ListKey, list: TaskList) -> Result<ListNode, SyncError> {
    let task_docs = store.list(&key.tasks()).await?;
    let tasks = try_join_all(
        decode_all::<Task>(&key.tasks(), &task_docs)
            .into_iter()
            .filter_map(|task| {
                let id = task.id.clone()?;
                Some(load_task(store, key.task(id), task))
            }),
    )
    .await?;

    Ok(ListNode {
        id: key.list_id.clone(),
        list,
        tasks,
    })
}

async fn load_task(store: &dyn DocumentStore, key: TaskKey, task: Task) -> Result<TaskNode, SyncError> {
    let subtask_docs = store.list(&key.subtasks()).await?;
    Ok(TaskNode {
        id: key.task_id.clone(),
        task,
        subtasks: decode_all(&key.subtasks(), &subtask_docs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{ListManager, PhaseManager, ProjectManager, SubtaskManager, TaskManager};
    use shigodeki_atoms::lists::ListColor;
    use shigodeki_atoms::projects::OwnerType;
    use shigodeki_shared::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn loads_every_level_in_order() {
        let store = Arc::new(MemoryStore::new());
        let project = ProjectManager::new(store.clone())
            .create_project("Launch", None, "u1", OwnerType::Individual)
            .await
            .unwrap();
        let key = ProjectKey::new(project.id.clone().unwrap());
        let phase = PhaseManager::new(store.clone())
            .create_phase(&key, "Build", None, "u1", None)
            .await
            .unwrap();
        let phase_key = key.phase(phase.id.unwrap());
        let list = ListManager::new(store.clone())
            .create_list(&phase_key, "Todo", "u1", ListColor::Blue, None)
            .await
            .unwrap();
        let list_key = phase_key.list(list.id.unwrap());
        let tasks = TaskManager::new(store.clone());
        let first = tasks.create_task(&list_key, "One", "u1", None).await.unwrap();
        tasks.create_task(&list_key, "Two", "u1", None).await.unwrap();
        SubtaskManager::new(store.clone())
            .create_subtask(&first.key().unwrap(), "Half", "u1", None)
            .await
            .unwrap();

        let tree = ProjectTree::load(store.as_ref(), &key).await.unwrap();
        assert_eq!(tree.phases.len(), 1);
        let titles: Vec<_> = tree.tasks().map(|t| t.task.title.as_str()).collect();
        assert_eq!(titles, ["One", "Two"]);
        assert_eq!(tree.subtasks().count(), 1);
        assert_eq!(tree.tasks().next().unwrap().task.subtask_count, 1);
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let store = MemoryStore::new();
        let err = ProjectTree::load(&store, &ProjectKey::new("nope")).await.unwrap_err();
        assert_eq!(err, SyncError::not_found(EntityKind::Project, "nope"));
    }
}
