use crate::projects::Role;
use crate::record::impl_record;
use crate::validation::{self, Validate, NAME_MAX};
use crate::{EntityKind, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `/users/{userId}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub project_ids: BTreeSet<String>,
    #[serde(default)]
    pub role_assignments: BTreeMap<String, Role>,
    #[serde(default)]
    pub family_ids: BTreeSet<String>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl_record!(User, EntityKind::User, name);

impl User {
    pub fn role_in(&self, project_id: &str) -> Option<Role> {
        self.role_assignments.get(project_id).copied()
    }
}

impl Validate for User {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)?;
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(ValidationError::InvalidFormat(format!("email '{}'", self.email)));
        }
        for project_id in self.role_assignments.keys() {
            if !self.project_ids.contains(project_id) {
                return Err(ValidationError::relationship(
                    EntityKind::User,
                    self.id.clone().unwrap_or_default(),
                    format!("role assigned for project '{project_id}' the user does not belong to"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_requires_membership() {
        let mut user = User {
            name: "Aiko".into(),
            email: "aiko@example.com".into(),
            ..Default::default()
        };
        user.role_assignments.insert("p1".into(), Role::Editor);
        assert!(user.validate().is_err());
        user.project_ids.insert("p1".into());
        assert!(user.validate().is_ok());
        assert_eq!(user.role_in("p1"), Some(Role::Editor));
    }
}
