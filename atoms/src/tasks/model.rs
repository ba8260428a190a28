use crate::record::impl_record;
use crate::validation::{self, Validate, TASK_DESCRIPTION_MAX, TITLE_MAX};
use crate::{EntityKind, ListKey, TaskKey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A unit of work under a list.
///
/// `has_subtasks`, `subtask_count` and `completed_subtask_count` are caches
/// of the subtask collection; they are recomputed by the subtask manager and
/// never edited by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub priority: Priority,
    pub list_id: String,
    pub phase_id: String,
    pub project_id: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default, rename = "linkURL")]
    pub link_url: Option<String>,
    #[serde(default)]
    pub has_subtasks: bool,
    #[serde(default)]
    pub subtask_count: u32,
    #[serde(default)]
    pub completed_subtask_count: u32,
    /// URLs of uploaded files.
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl_record!(Task, EntityKind::Task, title, order);

impl Task {
    pub fn new(title: impl Into<String>, list: &ListKey, created_by: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            created_by: created_by.into(),
            list_id: list.list_id.clone(),
            phase_id: list.phase_id.clone(),
            project_id: list.project_id.clone(),
            ..Default::default()
        }
    }

    pub fn list_key(&self) -> ListKey {
        ListKey::new(&self.project_id, &self.phase_id, &self.list_id)
    }

    pub fn key(&self) -> Option<TaskKey> {
        self.id.as_ref().map(|id| self.list_key().task(id))
    }

    /// Point the task at another list, keeping the three ancestor ids in step.
    pub fn relocate(&mut self, list: &ListKey) {
        self.list_id = list.list_id.clone();
        self.phase_id = list.phase_id.clone();
        self.project_id = list.project_id.clone();
    }

    /// Toggle completion, stamping or clearing `completedAt`.
    pub fn mark_completed(&mut self, completed: bool, at: Timestamp) {
        self.is_completed = completed;
        self.completed_at = completed.then_some(at);
    }
}

impl Validate for Task {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("title", &self.title, 1, TITLE_MAX)?;
        validation::check_optional_length("description", self.description.as_deref(), TASK_DESCRIPTION_MAX)?;
        validation::check_required("listId", &self.list_id)?;
        validation::check_required("phaseId", &self.phase_id)?;
        validation::check_required("projectId", &self.project_id)?;
        validation::check_order(self.order)?;
        validation::check_hours("estimatedHours", self.estimated_hours)?;
        validation::check_hours("actualHours", self.actual_hours)?;
        if self.completed_subtask_count > self.subtask_count {
            return Err(ValidationError::InvalidFormat(format!(
                "completedSubtaskCount {} exceeds subtaskCount {}",
                self.completed_subtask_count, self.subtask_count
            )));
        }
        if let Some(id) = &self.id {
            if self.depends_on.contains(id) {
                return Err(ValidationError::relationship(
                    EntityKind::Task,
                    id.clone(),
                    "task depends on itself",
                ));
            }
        }
        validation::check_date_range("task completion", self.created_at, self.completed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn task() -> Task {
        Task::new("Buy milk", &ListKey::new("p1", "f1", "l1"), "u1")
    }

    #[test]
    fn relocate_moves_whole_address() {
        let mut t = task();
        t.id = Some("t1".into());
        t.relocate(&ListKey::new("p1", "f2", "l9"));
        assert_eq!(t.key(), Some(ListKey::new("p1", "f2", "l9").task("t1")));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut t = task();
        t.id = Some("t1".into());
        t.depends_on.insert("t1".into());
        assert_matches!(t.validate(), Err(ValidationError::Relationship { id, .. }) if id == "t1");
    }

    #[test]
    fn counters_must_be_consistent() {
        let mut t = task();
        t.subtask_count = 1;
        t.completed_subtask_count = 2;
        assert_matches!(t.validate(), Err(ValidationError::InvalidFormat(_)));
    }

    #[test]
    fn completion_stamps_and_clears() {
        let mut t = task();
        let now = Utc::now();
        t.mark_completed(true, now);
        assert_eq!(t.completed_at, Some(now));
        t.mark_completed(false, now);
        assert!(t.completed_at.is_none());
        assert!(!t.is_completed);
    }

    #[test]
    fn link_url_keeps_its_wire_name() {
        let mut t = task();
        t.link_url = Some("https://example.com".into());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["linkURL"], "https://example.com");
        assert_eq!(json["priority"], "medium");
    }
}
