//! Store addressing.
//!
//! Every document lives at a path fully qualified by its ancestors' ids:
//!
//! ```text
//! /projects/{projectId}
//! /projects/{projectId}/phases/{phaseId}
//! /projects/{projectId}/phases/{phaseId}/sections/{sectionId}
//! /projects/{projectId}/phases/{phaseId}/lists/{listId}
//! /projects/{projectId}/phases/{phaseId}/lists/{listId}/tasks/{taskId}
//! /projects/{projectId}/phases/{phaseId}/lists/{listId}/tasks/{taskId}/subtasks/{subtaskId}
//! /families/{familyId}
//! /families/{familyId}/taskLists/{listId}/tasks/{taskId}
//! /users/{userId}
//! ```
//!
//! The composite key types below are the only way the rest of the workspace builds
//! these paths, so a child can never be addressed under a parent it does not name.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROJECTS: &str = "projects";
pub const PHASES: &str = "phases";
pub const SECTIONS: &str = "sections";
pub const LISTS: &str = "lists";
pub const TASKS: &str = "tasks";
pub const SUBTASKS: &str = "subtasks";
pub const MEMBERS: &str = "members";
pub const FAMILIES: &str = "families";
pub const TASK_LISTS: &str = "taskLists";
pub const USERS: &str = "users";
pub const INVITATIONS: &str = "invitations";

/// Subcollections that hang off a document of the named collection.
/// Cascade deletes walk this schema depth-first.
pub fn child_collections(collection: &str) -> &'static [&'static str] {
    match collection {
        PROJECTS => &[PHASES, MEMBERS],
        PHASES => &[SECTIONS, LISTS],
        LISTS | TASK_LISTS => &[TASKS],
        TASKS => &[SUBTASKS],
        FAMILIES => &[TASK_LISTS],
        _ => &[],
    }
}

// ========== PATHS ==========

/// Path to a collection, e.g. `projects/p1/phases`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment, i.e. the collection's own name.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// The document this collection is nested under, if any.
    pub fn parent(&self) -> Option<DocumentPath> {
        let (doc, _) = self.0.rsplit_once('/')?;
        let (collection, id) = doc.rsplit_once('/')?;
        Some(DocumentPath {
            collection: CollectionPath(collection.to_string()),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Path to a single document: its collection plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A subcollection of this document.
    pub fn sub(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection.0, self.id, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub fn projects() -> CollectionPath {
    CollectionPath::root(PROJECTS)
}

pub fn families() -> CollectionPath {
    CollectionPath::root(FAMILIES)
}

pub fn users() -> CollectionPath {
    CollectionPath::root(USERS)
}

pub fn invitations() -> CollectionPath {
    CollectionPath::root(INVITATIONS)
}

// ========== COMPOSITE KEYS ==========

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectKey {
    pub project_id: String,
}

impl ProjectKey {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    pub fn doc_path(&self) -> DocumentPath {
        projects().doc(&self.project_id)
    }

    pub fn phases(&self) -> CollectionPath {
        self.doc_path().sub(PHASES)
    }

    pub fn members(&self) -> CollectionPath {
        self.doc_path().sub(MEMBERS)
    }

    pub fn phase(&self, phase_id: impl Into<String>) -> PhaseKey {
        PhaseKey {
            project_id: self.project_id.clone(),
            phase_id: phase_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseKey {
    pub project_id: String,
    pub phase_id: String,
}

impl PhaseKey {
    pub fn new(project_id: impl Into<String>, phase_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            phase_id: phase_id.into(),
        }
    }

    pub fn project(&self) -> ProjectKey {
        ProjectKey::new(&self.project_id)
    }

    pub fn doc_path(&self) -> DocumentPath {
        self.project().phases().doc(&self.phase_id)
    }

    pub fn sections(&self) -> CollectionPath {
        self.doc_path().sub(SECTIONS)
    }

    pub fn lists(&self) -> CollectionPath {
        self.doc_path().sub(LISTS)
    }

    pub fn list(&self, list_id: impl Into<String>) -> ListKey {
        ListKey {
            project_id: self.project_id.clone(),
            phase_id: self.phase_id.clone(),
            list_id: list_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListKey {
    pub project_id: String,
    pub phase_id: String,
    pub list_id: String,
}

impl ListKey {
    pub fn new(
        project_id: impl Into<String>,
        phase_id: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            phase_id: phase_id.into(),
            list_id: list_id.into(),
        }
    }

    pub fn phase(&self) -> PhaseKey {
        PhaseKey::new(&self.project_id, &self.phase_id)
    }

    pub fn doc_path(&self) -> DocumentPath {
        self.phase().lists().doc(&self.list_id)
    }

    pub fn tasks(&self) -> CollectionPath {
        self.doc_path().sub(TASKS)
    }

    pub fn task(&self, task_id: impl Into<String>) -> TaskKey {
        TaskKey {
            project_id: self.project_id.clone(),
            phase_id: self.phase_id.clone(),
            list_id: self.list_id.clone(),
            task_id: task_id.into(),
        }
    }
}

/// The full address of a task. Subtasks are scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskKey {
    pub project_id: String,
    pub phase_id: String,
    pub list_id: String,
    pub task_id: String,
}

impl TaskKey {
    pub fn list(&self) -> ListKey {
        ListKey::new(&self.project_id, &self.phase_id, &self.list_id)
    }

    pub fn doc_path(&self) -> DocumentPath {
        self.list().tasks().doc(&self.task_id)
    }

    pub fn subtasks(&self) -> CollectionPath {
        self.doc_path().sub(SUBTASKS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyKey {
    pub family_id: String,
}

impl FamilyKey {
    pub fn new(family_id: impl Into<String>) -> Self {
        Self {
            family_id: family_id.into(),
        }
    }

    pub fn doc_path(&self) -> DocumentPath {
        families().doc(&self.family_id)
    }

    pub fn task_lists(&self) -> CollectionPath {
        self.doc_path().sub(TASK_LISTS)
    }

    pub fn list(&self, list_id: impl Into<String>) -> LegacyListKey {
        LegacyListKey {
            family_id: self.family_id.clone(),
            list_id: list_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyListKey {
    pub family_id: String,
    pub list_id: String,
}

impl LegacyListKey {
    pub fn doc_path(&self) -> DocumentPath {
        FamilyKey::new(&self.family_id)
            .task_lists()
            .doc(&self.list_id)
    }

    pub fn tasks(&self) -> CollectionPath {
        self.doc_path().sub(TASKS)
    }
}

/// Where a task list lives: under a family (legacy) or under a phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListAddress {
    Legacy(LegacyListKey),
    Modern(ListKey),
}

impl ListAddress {
    pub fn doc_path(&self) -> DocumentPath {
        match self {
            ListAddress::Legacy(key) => key.doc_path(),
            ListAddress::Modern(key) => key.doc_path(),
        }
    }

    pub fn tasks(&self) -> CollectionPath {
        match self {
            ListAddress::Legacy(key) => key.tasks(),
            ListAddress::Modern(key) => key.tasks(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtask_path_is_fully_qualified() {
        let key = ListKey::new("p1", "f1", "l1").task("t1");
        assert_eq!(
            key.subtasks().doc("s1").to_string(),
            "/projects/p1/phases/f1/lists/l1/tasks/t1/subtasks/s1"
        );
    }

    #[test]
    fn legacy_task_path() {
        let key = FamilyKey::new("fam").list("groceries");
        assert_eq!(
            key.tasks().doc("milk").to_string(),
            "/families/fam/taskLists/groceries/tasks/milk"
        );
    }

    #[test]
    fn collection_parent_and_name() {
        let tasks = ListKey::new("p1", "f1", "l1").tasks();
        assert_eq!(tasks.name(), TASKS);
        let parent = tasks.parent().unwrap();
        assert_eq!(parent.id(), "l1");
        assert_eq!(parent.collection().name(), LISTS);
        assert!(projects().parent().is_none());
    }

    #[test]
    fn cascade_schema_reaches_subtasks() {
        assert_eq!(child_collections(PROJECTS), &[PHASES, MEMBERS]);
        assert_eq!(child_collections(TASKS), &[SUBTASKS]);
        assert!(child_collections(SUBTASKS).is_empty());
    }
}
