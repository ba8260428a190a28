use hierarchy_block::{MigrationReport, MigrationUtility};
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use shigodeki_shared::collaborators::{AuthProvider, StaticAuth};
use shigodeki_shared::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum MigrationAction {
    #[default]
    Migrate,
    Validate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MigrationRequest {
    #[serde(default)]
    pub action: MigrationAction,
    pub family_id: String,
    #[serde(default)]
    pub family_name: Option<String>,
    pub owner_id: String,
    /// Required for `validate`.
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValidationResponse {
    pub family_id: String,
    pub project_id: String,
    pub validated: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum MigrationResponse {
    Migrated(MigrationReport),
    Checked(ValidationResponse),
}

pub(crate) async fn function_handler(
    state: &AppState,
    utility: &MigrationUtility,
    event: LambdaEvent<MigrationRequest>,
) -> Result<MigrationResponse, Error> {
    let request = event.payload;
    tracing::info!(
        request_id = %event.context.request_id,
        action = ?request.action,
        family = %request.family_id,
        "migration request"
    );

    if request.family_id.trim().is_empty() {
        return Err("familyId is required".into());
    }
    if state.connectivity.is_offline() {
        return Err("store is offline".into());
    }

    // The lambda acts as the owner named in the event.
    let auth = StaticAuth::signed_in(request.owner_id.trim(), None);
    let owner = match auth.current_user().await {
        Some(user) if !user.user_id.is_empty() => user,
        _ => return Err("ownerId is required".into()),
    };

    match request.action {
        MigrationAction::Migrate => {
            let report = utility
                .migrate_family(&request.family_id, request.family_name.as_deref(), &owner.user_id)
                .await
                .map_err(|e| {
                    tracing::error!(family = %request.family_id, error = %e, "migration failed");
                    Error::from(e.to_string())
                })?;
            Ok(MigrationResponse::Migrated(report))
        }
        MigrationAction::Validate => {
            let Some(project_id) = request.project_id else {
                return Err("projectId is required for validate".into());
            };
            let validated = utility
                .validate_migration(&request.family_id, &project_id)
                .await
                .map_err(|e| Error::from(e.to_string()))?;
            Ok(MigrationResponse::Checked(ValidationResponse {
                family_id: request.family_id,
                project_id,
                validated,
            }))
        }
    }
}
