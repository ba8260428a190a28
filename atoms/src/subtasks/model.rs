use crate::record::impl_record;
use crate::validation::{self, Validate, DESCRIPTION_MAX, TITLE_MAX};
use crate::{EntityKind, TaskKey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub created_by: String,
    pub task_id: String,
    pub list_id: String,
    pub phase_id: String,
    pub project_id: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl_record!(Subtask, EntityKind::Subtask, title, order);

impl Subtask {
    pub fn new(title: impl Into<String>, task: &TaskKey, created_by: impl Into<String>) -> Self {
        let mut subtask = Self {
            title: title.into(),
            created_by: created_by.into(),
            ..Default::default()
        };
        subtask.attach(task);
        subtask
    }

    pub fn task_key(&self) -> TaskKey {
        TaskKey {
            project_id: self.project_id.clone(),
            phase_id: self.phase_id.clone(),
            list_id: self.list_id.clone(),
            task_id: self.task_id.clone(),
        }
    }

    pub fn attach(&mut self, task: &TaskKey) {
        self.task_id = task.task_id.clone();
        self.list_id = task.list_id.clone();
        self.phase_id = task.phase_id.clone();
        self.project_id = task.project_id.clone();
    }

    pub fn mark_completed(&mut self, completed: bool, at: Timestamp) {
        self.is_completed = completed;
        self.completed_at = completed.then_some(at);
    }
}

impl Validate for Subtask {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("title", &self.title, 1, TITLE_MAX)?;
        validation::check_optional_length("description", self.description.as_deref(), DESCRIPTION_MAX)?;
        validation::check_required("taskId", &self.task_id)?;
        validation::check_required("listId", &self.list_id)?;
        validation::check_order(self.order)?;
        validation::check_date_range("subtask completion", self.created_at, self.completed_at)
    }
}
