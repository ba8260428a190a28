use crate::record::impl_record;
use crate::validation::{self, Validate, NAME_MAX};
use crate::{EntityKind, PhaseKey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// Groups tasks within a phase. Tasks reference it through `sectionId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub phase_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl_record!(PhaseSection, EntityKind::Section, name, order);

impl PhaseSection {
    pub fn new(name: impl Into<String>, phase: &PhaseKey) -> Self {
        Self {
            name: name.into(),
            phase_id: phase.phase_id.clone(),
            project_id: phase.project_id.clone(),
            ..Default::default()
        }
    }
}

impl Validate for PhaseSection {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)?;
        validation::check_required("phaseId", &self.phase_id)?;
        validation::check_order(self.order)?;
        validation::check_color_hex(self.color_hex.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_color() {
        let mut section = PhaseSection::new("Backlog", &PhaseKey::new("p1", "f1"));
        section.color_hex = Some("#FF0000".into());
        assert!(section.validate().is_ok());
        section.color_hex = Some("red".into());
        assert!(section.validate().is_err());
    }
}
