use crate::record::impl_record;
use crate::tasks::Priority;
use crate::validation::{self, Validate, NAME_MAX, TITLE_MAX};
use crate::{EntityKind, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub last_updated_at: Option<Timestamp>,
}

impl_record!(Family, EntityKind::Family, name);

impl Validate for Family {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)
    }
}

/// A task in the flat family schema. Only read during migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
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
    #[serde(default)]
    pub list_id: String,
    #[serde(default)]
    pub family_id: String,
    #[serde(default)]
    pub order: i64,
}

impl_record!(LegacyTask, EntityKind::Task, title, order);

impl Validate for LegacyTask {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("title", &self.title, 1, TITLE_MAX)
    }
}
