use crate::record::impl_record;
use crate::validation::{self, Validate, DESCRIPTION_MAX, NAME_MAX};
use crate::{EntityKind, PhaseKey, ProjectKey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// Default phase created for every new or migrated project.
pub const DEFAULT_PHASE_NAME: &str = "Main Tasks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl_record!(Phase, EntityKind::Phase, name, order);

impl Phase {
    pub fn new(name: impl Into<String>, project: &ProjectKey, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_id: project.project_id.clone(),
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> Option<PhaseKey> {
        self.id
            .as_ref()
            .map(|id| PhaseKey::new(&self.project_id, id))
    }
}

impl Validate for Phase {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)?;
        validation::check_optional_length("description", self.description.as_deref(), DESCRIPTION_MAX)?;
        validation::check_required("projectId", &self.project_id)?;
        validation::check_order(self.order)?;
        validation::check_date_range("phase schedule", self.start_date, self.end_date)?;
        validation::check_date_range("phase completion", self.created_at, self.completed_at)
    }
}
