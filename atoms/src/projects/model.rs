use crate::record::impl_record;
use crate::validation::{self, Validate, DESCRIPTION_MAX, NAME_MAX};
use crate::{EntityKind, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who owns a project: a single user or a (legacy) family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    #[default]
    Individual,
    Family,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub owner_type: OwnerType,
    #[serde(default)]
    pub member_ids: BTreeSet<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub last_modified_at: Option<Timestamp>,
}

impl_record!(Project, EntityKind::Project, name);

impl Project {
    /// A new individual project; the owner is its only member.
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        Self {
            name: name.into(),
            member_ids: BTreeSet::from([owner_id.clone()]),
            owner_id,
            ..Default::default()
        }
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.contains(user_id)
    }
}

impl Validate for Project {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_length("name", &self.name, 1, NAME_MAX)?;
        validation::check_optional_length("description", self.description.as_deref(), DESCRIPTION_MAX)?;
        validation::check_required("ownerId", &self.owner_id)?;
        if self.member_ids.is_empty() {
            return Err(ValidationError::MissingField("memberIds".to_string()));
        }
        if self.owner_type == OwnerType::Individual && !self.member_ids.contains(&self.owner_id) {
            return Err(ValidationError::relationship(
                EntityKind::Project,
                self.id.clone().unwrap_or_default(),
                format!("owner '{}' is not a member", self.owner_id),
            ));
        }
        validation::check_date_range("project completion", self.created_at, self.completed_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Invite,
    ManageMembers,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    #[default]
    Editor,
    Viewer,
}

impl Role {
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Owner => &[Read, Write, Delete, Invite, ManageMembers],
            Role::Editor => &[Read, Write, Invite],
            Role::Viewer => &[Read],
        }
    }

    pub fn can(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// `/projects/{projectId}/members/{userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub user_id: String,
    pub project_id: String,
    pub role: Role,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub invited_by: Option<String>,
    #[serde(default)]
    pub joined_at: Option<Timestamp>,
}
