use crate::record::impl_record;
use crate::tasks::Priority;
use crate::validation::{self, Validate, NAME_MAX};
use crate::{EntityKind, FamilyKey, LegacyListKey, ListAddress, ListKey, PhaseKey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListColor {
    #[default]
    Blue,
    Green,
    Orange,
    Red,
    Purple,
    Pink,
    Yellow,
    Gray,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSettings {
    #[serde(default)]
    pub auto_archive_completed: bool,
    #[serde(default)]
    pub default_priority: Priority,
}

/// Which schema a list belongs to. Stored flattened into the list document,
/// so a modern list carries `projectId`/`phaseId` and a legacy one `familyId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListParent {
    #[serde(rename_all = "camelCase")]
    Modern { project_id: String, phase_id: String },
    #[serde(rename_all = "camelCase")]
    Legacy { family_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub parent: ListParent,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub color: ListColor,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub settings: Option<ListSettings>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl_record!(TaskList, EntityKind::TaskList, name, order);

impl TaskList {
    pub fn new(name: impl Into<String>, phase: &PhaseKey, created_by: impl Into<String>) -> Self {
        Self::with_parent(
            name,
            ListParent::Modern {
                project_id: phase.project_id.clone(),
                phase_id: phase.phase_id.clone(),
            },
            created_by,
        )
    }

    pub fn new_legacy(name: impl Into<String>, family: &FamilyKey, created_by: impl Into<String>) -> Self {
        Self::with_parent(
            name,
            ListParent::Legacy {
                family_id: family.family_id.clone(),
            },
            created_by,
        )
    }

    fn with_parent(name: impl Into<String>, parent: ListParent, created_by: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent,
            created_by: created_by.into(),
            color: ListColor::default(),
            is_archived: false,
            order: 0,
            settings: None,
            created_at: None,
        }
    }

    /// The list's own address, once it has an id.
    pub fn address(&self) -> Option<ListAddress> {
        let id = self.id.as_ref()?;
        Some(match &self.parent {
            ListParent::Modern { project_id, phase_id } => {
                ListAddress::Modern(ListKey::new(project_id, phase_id, id))
            }
            ListParent::Legacy { family_id } => ListAddress::Legacy(LegacyListKey {
                family_id: family_id.clone(),
                list_id: id.clone(),
            }),
        })
    }

    pub fn phase_id(&self) -> Option<&str> {
        match &self.parent {
            ListParent::Modern { phase_id, .. } => Some(phase_id),
            ListParent::Legacy { .. } => None,
        }
    }
}

impl Validate for TaskList {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)?;
        validation::check_order(self.order)?;
        match &self.parent {
            ListParent::Modern { project_id, phase_id } => {
                validation::check_required("projectId", project_id)?;
                validation::check_required("phaseId", phase_id)
            }
            ListParent::Legacy { family_id } => validation::check_required("familyId", family_id),
        }
    }
}
