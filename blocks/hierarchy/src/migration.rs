//! Family → project migration.
//!
//! Rebuilds a legacy family (`families/{id}/taskLists/{id}/tasks`) as a project
//! with one default phase. Steps run in sequence through the regular managers;
//! a failed step stops the run but nothing already created is removed. The
//! error names the partially built project so it can be cleaned up by hand.

use crate::levels::{ListManager, PhaseManager, ProjectManager, TaskManager};
use serde::Serialize;
use shigodeki_atoms::families::{Family, LegacyTask};
use shigodeki_atoms::lists::TaskList;
use shigodeki_atoms::phases::DEFAULT_PHASE_NAME;
use shigodeki_atoms::projects::Project;
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{EntityKind, FamilyKey, LegacyListKey, ListKey, PhaseKey, ProjectKey};
use shigodeki_shared::store::DocumentStore;
use shigodeki_shared::SyncError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

const DEFAULT_PHASE_DESCRIPTION: &str = "Tasks migrated from the family";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationState {
    #[default]
    NotStarted,
    ProjectCreated,
    PhaseCreated,
    ListsMigrating,
    TasksMigrating,
    Validated,
    Failed,
}

impl MigrationState {
    /// What the migration is doing while it sits in this state.
    fn activity(self) -> &'static str {
        match self {
            MigrationState::NotStarted => "creating the project",
            MigrationState::ProjectCreated => "creating the default phase",
            MigrationState::PhaseCreated | MigrationState::ListsMigrating => "migrating task lists",
            MigrationState::TasksMigrating => "migrating tasks",
            MigrationState::Validated | MigrationState::Failed => "validating the migration",
        }
    }

    fn is_running(self) -> bool {
        matches!(
            self,
            MigrationState::ProjectCreated
                | MigrationState::PhaseCreated
                | MigrationState::ListsMigrating
                | MigrationState::TasksMigrating
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::NotStarted => "notStarted",
            MigrationState::ProjectCreated => "projectCreated",
            MigrationState::PhaseCreated => "phaseCreated",
            MigrationState::ListsMigrating => "listsMigrating",
            MigrationState::TasksMigrating => "tasksMigrating",
            MigrationState::Validated => "validated",
            MigrationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub family_id: String,
    pub project_id: String,
    pub phase_id: String,
    pub lists_migrated: usize,
    pub tasks_migrated: usize,
    pub state: MigrationState,
    pub validated: bool,
}

#[derive(Default)]
struct Progress {
    states: HashMap<String, MigrationState>,
    running: HashSet<String>,
}

pub struct MigrationUtility {
    store: Arc<dyn DocumentStore>,
    projects: ProjectManager,
    phases: PhaseManager,
    lists: ListManager,
    tasks: TaskManager,
    progress: Mutex<Progress>,
}

/// Releases the per-family running flag however the run ends.
struct RunGuard<'a> {
    progress: &'a Mutex<Progress>,
    family_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(self.progress).running.remove(&self.family_id);
    }
}

fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
    progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mutable run context: where the migration got to and what it built so far.
struct Run<'a> {
    utility: &'a MigrationUtility,
    family_id: String,
    state: MigrationState,
    project_id: Option<String>,
}

impl Run<'_> {
    fn advance(&mut self, state: MigrationState) {
        self.state = state;
        lock(&self.utility.progress)
            .states
            .insert(self.family_id.clone(), state);
        info!(family = %self.family_id, state = %state, "migration advanced");
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        let activity = self.state.activity();
        self.advance(MigrationState::Failed);
        error!(
            family = %self.family_id,
            project = ?self.project_id,
            error = %err,
            "migration failed while {activity}"
        );
        SyncError::Migration {
            state: activity.to_string(),
            project_id: self.project_id.clone(),
            message: err.to_string(),
        }
    }
}

impl MigrationUtility {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            projects: ProjectManager::new(Arc::clone(&store)),
            phases: PhaseManager::new(Arc::clone(&store)),
            lists: ListManager::new(Arc::clone(&store)),
            tasks: TaskManager::new(Arc::clone(&store)),
            store,
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn state_of(&self, family_id: &str) -> MigrationState {
        lock(&self.progress)
            .states
            .get(family_id)
            .copied()
            .unwrap_or_default()
    }

    fn begin(&self, family_id: &str) -> Result<RunGuard<'_>, SyncError> {
        let mut progress = lock(&self.progress);
        let state = progress.states.get(family_id).copied().unwrap_or_default();
        let refusal = if progress.running.contains(family_id) || state.is_running() {
            Some("a migration of this family is already running")
        } else if state == MigrationState::Validated {
            Some("this family has already been migrated")
        } else {
            None
        };
        if let Some(message) = refusal {
            warn!(family = family_id, state = %state, "migration refused");
            return Err(SyncError::Migration {
                state: state.to_string(),
                project_id: None,
                message: message.to_string(),
            });
        }
        progress.running.insert(family_id.to_string());
        progress.states.insert(family_id.to_string(), MigrationState::NotStarted);
        Ok(RunGuard {
            progress: &self.progress,
            family_id: family_id.to_string(),
        })
    }

    /// Migrate one family. `family_name` falls back to the family document's
    /// name. The report's `validated` is the outcome of
    /// [`validate_migration`](Self::validate_migration).
    pub async fn migrate_family(
        &self,
        family_id: &str,
        family_name: Option<&str>,
        owner_id: &str,
    ) -> Result<MigrationReport, SyncError> {
        let _guard = self.begin(family_id)?;
        let mut run = Run {
            utility: self,
            family_id: family_id.to_string(),
            state: MigrationState::NotStarted,
            project_id: None,
        };
        info!(family = family_id, owner = owner_id, "migration started");

        match self.run_steps(&mut run, family_name, owner_id).await {
            Ok(report) => Ok(report),
            Err(e) => Err(run.fail(e)),
        }
    }

    async fn run_steps(
        &self,
        run: &mut Run<'_>,
        family_name: Option<&str>,
        owner_id: &str,
    ) -> Result<MigrationReport, SyncError> {
        let family_key = FamilyKey::new(&run.family_id);
        let family: Option<Family> = match self.store.get(&family_key.doc_path()).await? {
            Some(doc) => Some(doc.decode()?),
            None => None,
        };
        let name = match (family_name, &family) {
            (Some(name), _) => name.to_string(),
            (None, Some(family)) => family.name.clone(),
            (None, None) => return Err(SyncError::not_found(EntityKind::Family, &run.family_id)),
        };

        let mut project = Project::new(&name, owner_id);
        project.description = Some(format!("Migrated from family {name}"));
        if let Some(family) = &family {
            project.member_ids.extend(family.members.iter().cloned());
        }
        let project = self.projects.create(&(), project, None).await?;
        let project_key = ProjectKey::new(project.id.clone().unwrap_or_default());
        run.project_id = Some(project_key.project_id.clone());
        run.advance(MigrationState::ProjectCreated);

        let phase = self
            .phases
            .create_phase(
                &project_key,
                DEFAULT_PHASE_NAME,
                Some(DEFAULT_PHASE_DESCRIPTION.to_string()),
                owner_id,
                Some(0),
            )
            .await?;
        let phase_key = project_key.phase(phase.id.clone().unwrap_or_default());
        run.advance(MigrationState::PhaseCreated);

        run.advance(MigrationState::ListsMigrating);
        let migrated_lists = self.migrate_lists(&family_key, &phase_key, owner_id).await?;

        run.advance(MigrationState::TasksMigrating);
        let mut tasks_migrated = 0;
        for (legacy, list) in &migrated_lists {
            tasks_migrated += self.migrate_tasks(legacy, list, owner_id).await?;
        }

        let validated = self
            .validate_migration(&run.family_id, &project_key.project_id)
            .await?;
        run.advance(if validated {
            MigrationState::Validated
        } else {
            MigrationState::Failed
        });
        info!(
            family = %run.family_id,
            project = %project_key.project_id,
            lists = migrated_lists.len(),
            tasks = tasks_migrated,
            validated,
            "migration finished"
        );

        Ok(MigrationReport {
            family_id: run.family_id.clone(),
            project_id: project_key.project_id,
            phase_id: phase_key.phase_id,
            lists_migrated: migrated_lists.len(),
            tasks_migrated,
            state: run.state,
            validated,
        })
    }

    /// One new list per legacy list, `order` = legacy position.
    async fn migrate_lists(
        &self,
        family: &FamilyKey,
        phase: &PhaseKey,
        owner_id: &str,
    ) -> Result<Vec<(LegacyListKey, ListKey)>, SyncError> {
        let mut migrated = Vec::new();
        for (index, doc) in self.store.list(&family.task_lists()).await?.iter().enumerate() {
            let legacy: TaskList = doc.decode()?;
            let created_by = if legacy.created_by.is_empty() {
                owner_id
            } else {
                legacy.created_by.as_str()
            };
            let mut list = TaskList::new(&legacy.name, phase, created_by);
            list.color = legacy.color;
            let list = self.lists.create(phase, list, Some(index as i64)).await?;
            migrated.push((family.list(&doc.id), phase.list(list.id.unwrap_or_default())));
        }
        Ok(migrated)
    }

    /// One new task per legacy task, `order` = legacy position.
    async fn migrate_tasks(&self, legacy: &LegacyListKey, list: &ListKey, owner_id: &str) -> Result<usize, SyncError> {
        let docs = self.store.list(&legacy.tasks()).await?;
        for (index, doc) in docs.iter().enumerate() {
            let old: LegacyTask = doc.decode()?;
            let created_by = if old.created_by.is_empty() {
                owner_id
            } else {
                old.created_by.as_str()
            };
            let mut task = Task::new(&old.title, list, created_by);
            task.description = old.description;
            task.assigned_to = old.assigned_to;
            task.due_date = old.due_date;
            task.priority = old.priority;
            self.tasks.create(list, task, Some(index as i64)).await?;
        }
        Ok(docs.len())
    }

    /// Structural check only: the project exists, the family had at least one
    /// list and the project has at least one phase.
    pub async fn validate_migration(&self, family_id: &str, project_id: &str) -> Result<bool, SyncError> {
        let project = ProjectKey::new(project_id);
        if self.store.get(&project.doc_path()).await?.is_none() {
            return Ok(false);
        }
        let legacy_lists = self.store.list(&FamilyKey::new(family_id).task_lists()).await?;
        let phases = self.store.list(&project.phases()).await?;
        Ok(!legacy_lists.is_empty() && !phases.is_empty())
    }
}
