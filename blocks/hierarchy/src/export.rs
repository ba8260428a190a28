//! Full-project export to one self-describing JSON document, and its inverse.

use crate::ordering;
use crate::tree::ProjectTree;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shigodeki_atoms::lists::{ListParent, TaskList};
use shigodeki_atoms::phases::Phase;
use shigodeki_atoms::projects::Project;
use shigodeki_atoms::sections::PhaseSection;
use shigodeki_atoms::subtasks::Subtask;
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{
    DocumentPath, EntityKind, ListKey, PhaseKey, ProjectKey, Record, Timestamp, Validate,
    ValidationError,
};
use shigodeki_shared::store::{DocumentStore, WriteBatch};
use shigodeki_shared::{StoreError, SyncError};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExport {
    pub project: Project,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub sections: Vec<PhaseSection>,
    pub task_lists: Vec<TaskList>,
    pub tasks: Vec<Task>,
    pub subtasks: Vec<Subtask>,
    pub export_date: Timestamp,
}

impl ProjectExport {
    pub fn from_tree(tree: &ProjectTree) -> Self {
        Self {
            project: tree.project.clone(),
            phases: tree.phases.iter().map(|p| p.phase.clone()).collect(),
            sections: tree.sections().cloned().collect(),
            task_lists: tree.lists().map(|l| l.list.clone()).collect(),
            tasks: tree.tasks().map(|t| t.task.clone()).collect(),
            subtasks: tree.subtasks().cloned().collect(),
            export_date: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string_pretty(self).map_err(|e| SyncError::from(StoreError::from(e)))
    }

    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::from(StoreError::from(e)))
    }

    pub fn record_count(&self) -> usize {
        1 + self.phases.len()
            + self.sections.len()
            + self.task_lists.len()
            + self.tasks.len()
            + self.subtasks.len()
    }

    /// One write per record, parents before children.
    fn writes(&self) -> Result<WriteBatch, SyncError> {
        let project_id = id_of(&self.project)?;
        let project_key = ProjectKey::new(&project_id);
        let mut out = WriteBatch::new();

        place(&mut out, project_key.doc_path(), &self.project)?;
        for phase in &self.phases {
            check_project(phase, &phase.project_id, &project_id)?;
            place(&mut out, project_key.phases().doc(id_of(phase)?), phase)?;
        }
        for section in &self.sections {
            check_project(section, &section.project_id, &project_id)?;
            let phase = PhaseKey::new(&project_id, &section.phase_id);
            place(&mut out, phase.sections().doc(id_of(section)?), section)?;
        }
        for list in &self.task_lists {
            let ListParent::Modern { project_id: owner, phase_id } = &list.parent else {
                return Err(ValidationError::relationship(
                    EntityKind::TaskList,
                    id_of(list)?,
                    "legacy lists cannot be imported into a project",
                )
                .into());
            };
            check_project(list, owner, &project_id)?;
            let phase = PhaseKey::new(&project_id, phase_id);
            place(&mut out, phase.lists().doc(id_of(list)?), list)?;
        }
        for task in &self.tasks {
            check_project(task, &task.project_id, &project_id)?;
            let list = ListKey::new(&project_id, &task.phase_id, &task.list_id);
            place(&mut out, list.tasks().doc(id_of(task)?), task)?;
        }
        for subtask in &self.subtasks {
            check_project(subtask, &subtask.project_id, &project_id)?;
            let task = subtask.task_key();
            place(&mut out, task.subtasks().doc(id_of(subtask)?), subtask)?;
        }
        Ok(out)
    }
}

fn id_of<R: Record>(record: &R) -> Result<String, SyncError> {
    record
        .id()
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingField(format!("{} id", R::KIND)).into())
}

fn check_project<R: Record>(record: &R, found: &str, expected: &str) -> Result<(), SyncError> {
    if found == expected {
        return Ok(());
    }
    Err(ValidationError::relationship(
        R::KIND,
        record.id().unwrap_or_default(),
        format!("belongs to project '{found}', not '{expected}'"),
    )
    .into())
}

fn place<R: Record + Validate>(batch: &mut WriteBatch, path: DocumentPath, record: &R) -> Result<(), SyncError> {
    record.validate()?;
    batch.set_record(path, record)?;
    Ok(())
}

pub async fn export_project(store: &dyn DocumentStore, key: &ProjectKey) -> Result<ProjectExport, SyncError> {
    let tree = ProjectTree::load(store, key).await?;
    let export = ProjectExport::from_tree(&tree);
    info!(project = %key.project_id, records = export.record_count(), "project exported");
    Ok(export)
}

/// Write every exported record back under its original id. All records are
/// checked before anything is written. Returns the number of records written.
pub async fn import_project(store: &dyn DocumentStore, export: &ProjectExport) -> Result<usize, SyncError> {
    let batch = export.writes()?;
    let written = ordering::commit_in_chunks(store, batch).await?;
    info!(project = ?export.project.id, records = written, "project imported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{ListManager, PhaseManager, ProjectManager, SectionManager, SubtaskManager, TaskManager};
    use assert_matches::assert_matches;
    use shigodeki_atoms::lists::ListColor;
    use shigodeki_atoms::projects::OwnerType;
    use shigodeki_shared::store::MemoryStore;
    use std::sync::Arc;

    async fn seeded() -> (Arc<MemoryStore>, ProjectKey) {
        let store = Arc::new(MemoryStore::new());
        let project = ProjectManager::new(store.clone())
            .create_project("Launch", Some("Q3".into()), "u1", OwnerType::Individual)
            .await
            .unwrap();
        let key = ProjectKey::new(project.id.unwrap());
        let phase = PhaseManager::new(store.clone())
            .create_phase(&key, "Build", None, "u1", None)
            .await
            .unwrap();
        let phase_key = key.phase(phase.id.unwrap());
        SectionManager::new(store.clone())
            .create_section(&phase_key, "Backend", Some("#336699".into()), None)
            .await
            .unwrap();
        let list = ListManager::new(store.clone())
            .create_list(&phase_key, "Todo", "u1", ListColor::Red, None)
            .await
            .unwrap();
        let list_key = phase_key.list(list.id.unwrap());
        let task = TaskManager::new(store.clone())
            .create_task(&list_key, "API", "u1", None)
            .await
            .unwrap();
        SubtaskManager::new(store.clone())
            .create_subtask(&task.key().unwrap(), "Schema", "u1", None)
            .await
            .unwrap();
        (store, key)
    }

    #[tokio::test]
    async fn export_then_import_reproduces_records() {
        let (store, key) = seeded().await;
        let export = export_project(store.as_ref(), &key).await.unwrap();
        assert_eq!(export.record_count(), 6);

        let json = export.to_json().unwrap();
        assert!(json.contains("\"taskLists\""));
        assert!(json.contains("\"exportDate\""));
        let parsed = ProjectExport::from_json(&json).unwrap();

        let target = MemoryStore::new();
        assert_eq!(import_project(&target, &parsed).await.unwrap(), 6);

        let again = export_project(&target, &key).await.unwrap();
        assert_eq!(
            ProjectExport { export_date: export.export_date, ..again },
            export
        );
    }

    #[tokio::test]
    async fn import_refuses_records_of_another_project() {
        let (store, key) = seeded().await;
        let mut export = export_project(store.as_ref(), &key).await.unwrap();
        export.tasks[0].project_id = "other".into();

        let target = MemoryStore::new();
        assert_matches!(
            import_project(&target, &export).await,
            Err(SyncError::Validation(ValidationError::Relationship { .. }))
        );
        assert!(target.paths().is_empty());
    }

    #[test]
    fn sections_default_to_empty() {
        let json = r#"{
            "project": {"id": "p1", "name": "Launch", "ownerId": "u1", "memberIds": ["u1"]},
            "phases": [], "taskLists": [], "tasks": [], "subtasks": [],
            "exportDate": "2024-01-01T00:00:00Z"
        }"#;
        let export = ProjectExport::from_json(json).unwrap();
        assert!(export.sections.is_empty());
        assert_eq!(export.record_count(), 1);
    }
}
