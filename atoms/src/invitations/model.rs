use crate::projects::Role;
use crate::record::impl_record;
use crate::validation::{self, Validate};
use crate::{EntityKind, InvitationError, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_USES: u32 = 1;

fn default_max_uses() -> u32 {
    DEFAULT_MAX_USES
}

/// What accepting the code grants membership of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationTarget {
    #[default]
    Project,
    Family,
}

/// `/invitations/{code}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: String,
    pub target_id: String,
    #[serde(default)]
    pub target_type: InvitationTarget,
    #[serde(default)]
    pub role: Role,
    pub created_by: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    #[serde(default = "default_max_uses")]
    pub max_uses: u32,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub is_active: bool,
}

impl_record!(Invitation, EntityKind::Invitation, code);

impl Invitation {
    /// Whether the code can be redeemed at `now`.
    pub fn check_redeemable(&self, now: Timestamp) -> Result<(), InvitationError> {
        if self.used_count >= self.max_uses {
            return Err(InvitationError::AlreadyUsed);
        }
        if !self.is_active || self.expires_at <= now {
            return Err(InvitationError::Expired);
        }
        Ok(())
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.used_count)
    }
}

impl Validate for Invitation {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::check_required("code", &self.code)?;
        validation::check_required("targetId", &self.target_id)?;
        validation::check_required("createdBy", &self.created_by)?;
        if self.max_uses == 0 {
            return Err(ValidationError::InvalidFormat("maxUses must be at least 1".to_string()));
        }
        validation::check_date_range("invitation lifetime", Some(self.created_at), Some(self.expires_at))
    }
}
