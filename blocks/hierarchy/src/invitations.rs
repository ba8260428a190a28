//! Invitation codes: issue, preview, accept and revoke.

use crate::levels::add_membership;
use crate::ordering;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shigodeki_atoms::families::Family;
use shigodeki_atoms::invitations::{display_code, generate_code, normalize_code, Invitation, InvitationTarget};
use shigodeki_atoms::projects::{Permission, Project, ProjectMember, Role};
use shigodeki_atoms::{paths, EntityKind, FamilyKey, InvitationError, ProjectKey, Validate};
use shigodeki_shared::collaborators::AuthProvider;
use shigodeki_shared::store::{field, DocumentStore, WriteBatch};
use shigodeki_shared::{AppState, StoreError, StoreErrorKind, SyncError};
use std::sync::Arc;
use tracing::{info, warn};

const CODE_ATTEMPTS: usize = 5;
const ACCEPT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Joined {
        target_id: String,
        target_type: InvitationTarget,
        role: Role,
    },
    /// The user was already a member; no use of the code was consumed.
    AlreadyMember {
        target_id: String,
        target_type: InvitationTarget,
    },
}

pub struct InvitationManager {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl InvitationManager {
    pub fn new(store: Arc<dyn DocumentStore>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(Arc::clone(&state.store), state.config.invite_ttl_days)
    }

    /// Issue a fresh code for a project or family. Project codes need a member
    /// whose role may invite, and only owners hand out the owner role. Family
    /// codes need a family member.
    pub async fn create_invitation(
        &self,
        target_id: &str,
        target_type: InvitationTarget,
        created_by: &str,
        role: Role,
        max_uses: u32,
    ) -> Result<Invitation, SyncError> {
        self.check_inviter(target_id, target_type, created_by, role).await?;

        let now = Utc::now();
        let mut invitation = Invitation {
            id: None,
            code: String::new(),
            target_id: target_id.to_string(),
            target_type,
            role,
            created_by: created_by.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            max_uses,
            used_count: 0,
            is_active: true,
        };

        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code();
            let path = paths::invitations().doc(&code);
            if self.store.get(&path).await?.is_some() {
                warn!(code = %code, "invitation code collision, retrying");
                continue;
            }
            invitation.code = code.clone();
            invitation.validate()?;
            let mut batch = WriteBatch::new();
            batch.set_record(path, &invitation)?;
            self.store.commit(batch).await?;
            invitation.id = Some(code);
            info!(code = %display_code(&invitation.code), target = target_id, "invitation created");
            return Ok(invitation);
        }
        Err(StoreError::new(StoreErrorKind::Aborted, "could not allocate a unique invitation code").into())
    }

    async fn lookup(&self, code: &str) -> Result<Invitation, SyncError> {
        let code = normalize_code(code)?;
        let doc = self
            .store
            .get(&paths::invitations().doc(&code))
            .await?
            .ok_or_else(|| InvitationError::InvalidCode("no invitation uses this code".to_string()))?;
        Ok(doc.decode()?)
    }

    /// The invitation behind a code, if it can still be redeemed.
    pub async fn preview(&self, code: &str) -> Result<Invitation, SyncError> {
        let invitation = self.lookup(code).await?;
        invitation.check_redeemable(Utc::now())?;
        Ok(invitation)
    }

    /// Redeem `code` for `user_id`. Membership, the user's profile and the
    /// invitation's use count change in one atomic batch. An acceptance that
    /// loses a race on the use count is retried against the fresh invitation.
    pub async fn accept_invitation(
        &self,
        code: &str,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<AcceptOutcome, SyncError> {
        let mut attempt = 1;
        loop {
            let invitation = self.lookup(code).await?;
            if let Err(e) = invitation.check_redeemable(Utc::now()) {
                info!(code = %display_code(&invitation.code), user = user_id, reason = %e, "invitation refused");
                return Err(e.into());
            }
            match self.redeem(&invitation, user_id, display_name).await {
                Err(SyncError::Persistence(e)) if e.kind == StoreErrorKind::Aborted && attempt < ACCEPT_ATTEMPTS => {
                    warn!(code = %display_code(&invitation.code), attempt, "invitation changed while accepting, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One acceptance of `invitation` as it was read. The use count is only
    /// written while the stored count still matches.
    async fn redeem(
        &self,
        invitation: &Invitation,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<AcceptOutcome, SyncError> {
        let target_id = invitation.target_id.clone();
        let target_type = invitation.target_type;
        let mut batch = WriteBatch::new();
        let joined = match target_type {
            InvitationTarget::Project => self.join_project(invitation, user_id, display_name, &mut batch).await?,
            InvitationTarget::Family => self.join_family(invitation, user_id, &mut batch).await?,
        };
        if !joined {
            return Ok(AcceptOutcome::AlreadyMember { target_id, target_type });
        }

        let used_count = invitation.used_count + 1;
        let mut usage = field("usedCount", used_count);
        usage.insert("isActive".to_string(), json!(used_count < invitation.max_uses));
        batch.update_if(
            paths::invitations().doc(&invitation.code),
            usage,
            "usedCount",
            invitation.used_count,
        );
        ordering::commit_atomic(self.store.as_ref(), batch).await?;

        info!(code = %display_code(&invitation.code), user = user_id, target = %target_id, "invitation accepted");
        Ok(AcceptOutcome::Joined {
            target_id,
            target_type,
            role: invitation.role,
        })
    }

    pub async fn accept_for_current_user(&self, auth: &dyn AuthProvider, code: &str) -> Result<AcceptOutcome, SyncError> {
        let user = auth.current_user().await.ok_or_else(|| {
            StoreError::new(StoreErrorKind::PermissionDenied, "sign in to accept an invitation")
        })?;
        self.accept_invitation(code, &user.user_id, user.display_name.as_deref())
            .await
    }

    pub async fn revoke(&self, code: &str) -> Result<(), SyncError> {
        let code = normalize_code(code)?;
        self.store
            .update(&paths::invitations().doc(&code), field("isActive", false))
            .await
            .map_err(|e| match e.kind {
                StoreErrorKind::NotFound => {
                    SyncError::Invitation(InvitationError::InvalidCode("no invitation uses this code".to_string()))
                }
                _ => SyncError::Persistence(e),
            })?;
        info!(code = %display_code(&code), "invitation revoked");
        Ok(())
    }

    async fn check_inviter(
        &self,
        target_id: &str,
        target_type: InvitationTarget,
        created_by: &str,
        role: Role,
    ) -> Result<(), SyncError> {
        let allowed = match target_type {
            InvitationTarget::Project => {
                let key = ProjectKey::new(target_id);
                if self.store.get(&key.doc_path()).await?.is_none() {
                    return Err(SyncError::not_found(EntityKind::Project, target_id));
                }
                let inviter: Option<ProjectMember> = self
                    .store
                    .get(&key.members().doc(created_by))
                    .await?
                    .map(|doc| serde_json::from_value(Value::Object(doc.data)))
                    .transpose()
                    .map_err(StoreError::from)?;
                inviter.is_some_and(|member| {
                    member.role.can(Permission::Invite) && (role != Role::Owner || member.role == Role::Owner)
                })
            }
            InvitationTarget::Family => {
                let family: Family = self
                    .store
                    .get(&FamilyKey::new(target_id).doc_path())
                    .await?
                    .ok_or_else(|| SyncError::not_found(EntityKind::Family, target_id))?
                    .decode()?;
                family.members.contains(created_by)
            }
        };
        if !allowed {
            warn!(user = created_by, target = target_id, ?role, "invitation refused to inviter");
            return Err(StoreError::new(
                StoreErrorKind::PermissionDenied,
                format!("{created_by} may not invite to {target_id} as {role:?}"),
            )
            .into());
        }
        Ok(())
    }

    /// Queue the writes that make `user_id` a project member. `false` when
    /// the user already is one.
    async fn join_project(
        &self,
        invitation: &Invitation,
        user_id: &str,
        display_name: Option<&str>,
        batch: &mut WriteBatch,
    ) -> Result<bool, SyncError> {
        let key = ProjectKey::new(&invitation.target_id);
        let mut project: Project = self
            .store
            .get(&key.doc_path())
            .await?
            .ok_or_else(|| SyncError::not_found(EntityKind::Project, &key.project_id))?
            .decode()?;
        if project.is_member(user_id) {
            return Ok(false);
        }

        let now = Utc::now();
        project.member_ids.insert(user_id.to_string());
        let mut data = field("memberIds", project.member_ids.iter().cloned().collect::<Vec<_>>());
        data.insert("lastModifiedAt".to_string(), json!(now));
        batch.update(key.doc_path(), data);

        let member = ProjectMember {
            user_id: user_id.to_string(),
            project_id: key.project_id.clone(),
            role: invitation.role,
            display_name: display_name.map(str::to_string),
            invited_by: Some(invitation.created_by.clone()),
            joined_at: Some(now),
        };
        add_membership(self.store.as_ref(), batch, &member).await?;
        Ok(true)
    }

    async fn join_family(&self, invitation: &Invitation, user_id: &str, batch: &mut WriteBatch) -> Result<bool, SyncError> {
        let key = FamilyKey::new(&invitation.target_id);
        let mut family: Family = self
            .store
            .get(&key.doc_path())
            .await?
            .ok_or_else(|| SyncError::not_found(EntityKind::Family, &key.family_id))?
            .decode()?;
        if !family.members.insert(user_id.to_string()) {
            return Ok(false);
        }

        let mut data = field("members", family.members.iter().cloned().collect::<Vec<_>>());
        data.insert("lastUpdatedAt".to_string(), json!(Utc::now()));
        batch.update(key.doc_path(), data);

        let user_path = paths::users().doc(user_id);
        if let Some(user) = self.store.get(&user_path).await? {
            let mut family_ids: Vec<Value> = user
                .data
                .get("familyIds")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            family_ids.push(json!(key.family_id));
            batch.set_merge(user_path, field("familyIds", family_ids));
        }
        Ok(true)
    }
}
