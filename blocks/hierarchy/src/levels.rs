//! The six hierarchy levels and their level-specific operations.

use crate::manager::{not_found_as, CollectionManager, Level};
use crate::ordering;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use shigodeki_atoms::families::Family;
use shigodeki_atoms::lists::{ListColor, ListParent, TaskList};
use shigodeki_atoms::paths;
use shigodeki_atoms::phases::Phase;
use shigodeki_atoms::projects::{OwnerType, Project, ProjectMember, Role};
use shigodeki_atoms::sections::PhaseSection;
use shigodeki_atoms::subtasks::Subtask;
use shigodeki_atoms::tasks::Task;
use shigodeki_atoms::{
    CollectionPath, DocumentPath, EntityKind, FamilyKey, ListKey, PhaseKey, ProjectKey, Record, TaskKey,
    Timestamp, ValidationError,
};
use shigodeki_shared::collaborators::{BlobScope, BlobStore};
use shigodeki_shared::store::{field, DocumentStore, WriteBatch};
use shigodeki_shared::{StoreError, SyncError};
use tracing::{debug, info};

pub type ProjectManager = CollectionManager<ProjectLevel>;
pub type PhaseManager = CollectionManager<PhaseLevel>;
pub type SectionManager = CollectionManager<SectionLevel>;
pub type ListManager = CollectionManager<ListLevel>;
pub type TaskManager = CollectionManager<TaskLevel>;
pub type SubtaskManager = CollectionManager<SubtaskLevel>;

fn stamp(created_at: &mut Option<Timestamp>, now: Timestamp) {
    if created_at.is_none() {
        *created_at = Some(now);
    }
}

fn require_id<R: Record>(record: &R) -> Result<String, SyncError> {
    record
        .id()
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingField("id".to_string()).into())
}

/// Queue the member document and, when the user has a profile, the user's
/// own record of the membership.
pub(crate) async fn add_membership(
    store: &dyn DocumentStore,
    batch: &mut WriteBatch,
    member: &ProjectMember,
) -> Result<(), SyncError> {
    let project = ProjectKey::new(&member.project_id);
    batch.set_record(project.members().doc(&member.user_id), member)?;

    let user_path = paths::users().doc(&member.user_id);
    if let Some(user) = store.get(&user_path).await? {
        let mut project_ids: Vec<Value> = user
            .data
            .get("projectIds")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if !project_ids.iter().any(|v| v.as_str() == Some(member.project_id.as_str())) {
            project_ids.push(json!(member.project_id));
        }
        let mut roles = user
            .data
            .get("roleAssignments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        roles.insert(
            member.project_id.clone(),
            serde_json::to_value(member.role).map_err(StoreError::from)?,
        );

        let mut data = field("projectIds", project_ids);
        data.insert("roleAssignments".to_string(), Value::Object(roles));
        batch.set_merge(user_path, data);
    }
    Ok(())
}

/// Queue the removal of the member document and of the project from the
/// user's own record.
async fn remove_membership(
    store: &dyn DocumentStore,
    batch: &mut WriteBatch,
    project: &ProjectKey,
    user_id: &str,
) -> Result<(), SyncError> {
    batch.delete(project.members().doc(user_id));

    let user_path = paths::users().doc(user_id);
    if let Some(user) = store.get(&user_path).await? {
        let project_ids: Vec<Value> = user
            .data
            .get("projectIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter(|v| v.as_str() != Some(project.project_id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let mut roles = user
            .data
            .get("roleAssignments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        roles.remove(&project.project_id);

        let mut data = field("projectIds", project_ids);
        data.insert("roleAssignments".to_string(), Value::Object(roles));
        batch.set_merge(user_path, data);
    }
    Ok(())
}

// ========== PROJECTS ==========

#[derive(Debug, Default)]
pub struct ProjectLevel;

#[async_trait]
impl Level for ProjectLevel {
    type Record = Project;
    type Scope = ();

    const NAME: &'static str = "project";

    fn collection(&self, _scope: &()) -> CollectionPath {
        paths::projects()
    }

    fn scope_of(&self, _record: &Project) {}

    fn attach(&self, _record: &mut Project, _scope: &()) {}

    fn prepare_create(&self, record: &mut Project, now: Timestamp) {
        stamp(&mut record.created_at, now);
        record.last_modified_at = Some(now);
    }

    /// Every initial member gets a member document. The owner of an individual
    /// project is `Owner`; members of a family project all own it together.
    async fn on_create(
        &self,
        store: &dyn DocumentStore,
        record: &Project,
        batch: &mut WriteBatch,
    ) -> Result<(), SyncError> {
        let project_id = require_id(record)?;
        for user_id in &record.member_ids {
            let role = match record.owner_type {
                OwnerType::Family => Role::Owner,
                OwnerType::Individual if *user_id == record.owner_id => Role::Owner,
                OwnerType::Individual => Role::Editor,
            };
            let member = ProjectMember {
                user_id: user_id.clone(),
                project_id: project_id.clone(),
                role,
                display_name: None,
                invited_by: None,
                joined_at: record.created_at,
            };
            add_membership(store, batch, &member).await?;
        }
        Ok(())
    }
}

impl CollectionManager<ProjectLevel> {
    /// Create a project. A family-owned project takes the family's members.
    pub async fn create_project(
        &self,
        name: &str,
        description: Option<String>,
        owner_id: &str,
        owner_type: OwnerType,
    ) -> Result<Project, SyncError> {
        self.run("create", async {
            let mut project = Project::new(name, owner_id);
            project.description = description;
            project.owner_type = owner_type;
            if owner_type == OwnerType::Family {
                let family: Family = self
                    .store()
                    .get(&FamilyKey::new(owner_id).doc_path())
                    .await?
                    .ok_or_else(|| SyncError::not_found(EntityKind::Family, owner_id))?
                    .decode()?;
                project.member_ids = family.members;
            }
            self.create_inner(&(), project, None).await
        })
        .await
    }

    /// Projects the user is a member of.
    pub async fn list_for_member(&self, user_id: &str) -> Result<Vec<Project>, SyncError> {
        self.run("list", async {
            let collection = paths::projects();
            let docs = self
                .store()
                .list_where_contains(&collection, "memberIds", user_id)
                .await?;
            let projects: Vec<Project> = crate::manager::decode_all(&collection, &docs);
            self.replace_local(&(), projects.clone());
            Ok(projects)
        })
        .await
    }

    pub async fn set_project_completed(&self, project: &Project, completed: bool) -> Result<Project, SyncError> {
        let mut project = project.clone();
        let now = Utc::now();
        project.is_completed = completed;
        project.completed_at = completed.then_some(now);
        project.last_modified_at = Some(now);
        self.update(project).await
    }

    /// Member documents of a project, ordered by user id.
    pub async fn members(&self, project: &ProjectKey) -> Result<Vec<ProjectMember>, SyncError> {
        self.run("members", async {
            let docs = self.store().list(&project.members()).await?;
            docs.into_iter()
                .map(|doc| {
                    serde_json::from_value(Value::Object(doc.data))
                        .map_err(|e| SyncError::from(StoreError::from(e)))
                })
                .collect::<Result<Vec<ProjectMember>, SyncError>>()
        })
        .await
    }

    async fn member_of(&self, project: &ProjectKey, user_id: &str) -> Result<(Project, ProjectMember), SyncError> {
        let record = self
            .read_inner(&(), &project.project_id)
            .await?
            .ok_or_else(|| SyncError::not_found(EntityKind::Project, &project.project_id))?;
        let member = self
            .store()
            .get(&project.members().doc(user_id))
            .await?
            .filter(|_| record.is_member(user_id))
            .ok_or_else(|| SyncError::not_found(EntityKind::Member, user_id))?;
        let member = serde_json::from_value(Value::Object(member.data)).map_err(StoreError::from)?;
        Ok((record, member))
    }

    /// Change a member's role on the member document and on the user's record
    /// together. The owner of an individual project stays `Owner`.
    pub async fn update_member_role(
        &self,
        project: &ProjectKey,
        user_id: &str,
        role: Role,
    ) -> Result<ProjectMember, SyncError> {
        self.run("update member", async {
            let (record, mut member) = self.member_of(project, user_id).await?;
            if is_individual_owner(&record, user_id) && role != Role::Owner {
                return Err(ValidationError::relationship(
                    EntityKind::Project,
                    &project.project_id,
                    format!("owner '{user_id}' must keep the owner role"),
                )
                .into());
            }

            member.role = role;
            let mut batch = WriteBatch::new();
            add_membership(self.store().as_ref(), &mut batch, &member).await?;
            ordering::commit_atomic(self.store().as_ref(), batch).await?;
            info!(project = %project.project_id, user = user_id, ?role, "member role changed");
            Ok(member)
        })
        .await
    }

    /// Take a user out of a project: `memberIds`, the member document and the
    /// user's record change in one batch. The owner of an individual project
    /// and the last member cannot be removed.
    pub async fn remove_member(&self, project: &ProjectKey, user_id: &str) -> Result<Project, SyncError> {
        self.run("remove member", async {
            let (mut record, _) = self.member_of(project, user_id).await?;
            if is_individual_owner(&record, user_id) || record.member_ids.len() == 1 {
                return Err(ValidationError::relationship(
                    EntityKind::Project,
                    &project.project_id,
                    format!("'{user_id}' cannot leave the project"),
                )
                .into());
            }

            let now = Utc::now();
            record.member_ids.remove(user_id);
            record.last_modified_at = Some(now);
            let mut batch = WriteBatch::new();
            let mut data = field("memberIds", record.member_ids.iter().cloned().collect::<Vec<_>>());
            data.insert("lastModifiedAt".to_string(), json!(now));
            batch.update(project.doc_path(), data);
            remove_membership(self.store().as_ref(), &mut batch, project, user_id).await?;
            ordering::commit_atomic(self.store().as_ref(), batch).await?;

            info!(project = %project.project_id, user = user_id, "member removed");
            self.upsert_local(&(), record.clone());
            Ok(record)
        })
        .await
    }
}

fn is_individual_owner(project: &Project, user_id: &str) -> bool {
    project.owner_type == OwnerType::Individual && project.owner_id == user_id
}

// ========== PHASES ==========

#[derive(Debug, Default)]
pub struct PhaseLevel;

#[async_trait]
impl Level for PhaseLevel {
    type Record = Phase;
    type Scope = ProjectKey;

    const NAME: &'static str = "phase";

    fn collection(&self, scope: &ProjectKey) -> CollectionPath {
        scope.phases()
    }

    fn scope_of(&self, record: &Phase) -> ProjectKey {
        ProjectKey::new(&record.project_id)
    }

    fn attach(&self, record: &mut Phase, scope: &ProjectKey) {
        record.project_id = scope.project_id.clone();
    }

    fn parent(&self, scope: &ProjectKey) -> Option<(EntityKind, DocumentPath)> {
        Some((EntityKind::Project, scope.doc_path()))
    }

    fn prepare_create(&self, record: &mut Phase, now: Timestamp) {
        stamp(&mut record.created_at, now);
    }
}

impl CollectionManager<PhaseLevel> {
    pub async fn create_phase(
        &self,
        project: &ProjectKey,
        name: &str,
        description: Option<String>,
        created_by: &str,
        order: Option<i64>,
    ) -> Result<Phase, SyncError> {
        let mut phase = Phase::new(name, project, created_by);
        phase.description = description;
        self.create(project, phase, order).await
    }

    pub async fn set_phase_completed(&self, phase: &Phase, completed: bool) -> Result<Phase, SyncError> {
        let mut phase = phase.clone();
        phase.is_completed = completed;
        phase.completed_at = completed.then(Utc::now);
        self.update(phase).await
    }
}

// ========== SECTIONS ==========

#[derive(Debug, Default)]
pub struct SectionLevel;

#[async_trait]
impl Level for SectionLevel {
    type Record = PhaseSection;
    type Scope = PhaseKey;

    const NAME: &'static str = "section";

    fn collection(&self, scope: &PhaseKey) -> CollectionPath {
        scope.sections()
    }

    fn scope_of(&self, record: &PhaseSection) -> PhaseKey {
        PhaseKey::new(&record.project_id, &record.phase_id)
    }

    fn attach(&self, record: &mut PhaseSection, scope: &PhaseKey) {
        record.project_id = scope.project_id.clone();
        record.phase_id = scope.phase_id.clone();
    }

    fn parent(&self, scope: &PhaseKey) -> Option<(EntityKind, DocumentPath)> {
        Some((EntityKind::Phase, scope.doc_path()))
    }

    fn prepare_create(&self, record: &mut PhaseSection, now: Timestamp) {
        stamp(&mut record.created_at, now);
    }

    /// Tasks of the phase that point at the section lose the reference.
    async fn before_delete(&self, store: &dyn DocumentStore, scope: &PhaseKey, id: &str) -> Result<(), SyncError> {
        let mut batch = WriteBatch::new();
        for list in store.list(&scope.lists()).await? {
            let tasks = scope.list(&list.id).tasks();
            for task in store.list(&tasks).await? {
                if task.data.get("sectionId").and_then(Value::as_str) == Some(id) {
                    batch.update(tasks.doc(&task.id), field("sectionId", Value::Null));
                }
            }
        }
        let cleared = ordering::commit_in_chunks(store, batch).await?;
        if cleared > 0 {
            debug!(section = id, cleared, "section references cleared");
        }
        Ok(())
    }
}

impl CollectionManager<SectionLevel> {
    pub async fn create_section(
        &self,
        phase: &PhaseKey,
        name: &str,
        color_hex: Option<String>,
        order: Option<i64>,
    ) -> Result<PhaseSection, SyncError> {
        let mut section = PhaseSection::new(name, phase);
        section.color_hex = color_hex;
        self.create(phase, section, order).await
    }
}

// ========== LISTS ==========

#[derive(Debug, Default)]
pub struct ListLevel;

#[async_trait]
impl Level for ListLevel {
    type Record = TaskList;
    type Scope = PhaseKey;

    const NAME: &'static str = "list";

    fn collection(&self, scope: &PhaseKey) -> CollectionPath {
        scope.lists()
    }

    /// Legacy lists never reach a list manager; they map to an empty scope.
    fn scope_of(&self, record: &TaskList) -> PhaseKey {
        match &record.parent {
            ListParent::Modern { project_id, phase_id } => PhaseKey::new(project_id, phase_id),
            ListParent::Legacy { .. } => PhaseKey::new("", ""),
        }
    }

    fn attach(&self, record: &mut TaskList, scope: &PhaseKey) {
        record.parent = ListParent::Modern {
            project_id: scope.project_id.clone(),
            phase_id: scope.phase_id.clone(),
        };
    }

    fn parent(&self, scope: &PhaseKey) -> Option<(EntityKind, DocumentPath)> {
        Some((EntityKind::Phase, scope.doc_path()))
    }

    fn prepare_create(&self, record: &mut TaskList, now: Timestamp) {
        stamp(&mut record.created_at, now);
    }
}

impl CollectionManager<ListLevel> {
    pub async fn create_list(
        &self,
        phase: &PhaseKey,
        name: &str,
        created_by: &str,
        color: ListColor,
        order: Option<i64>,
    ) -> Result<TaskList, SyncError> {
        let mut list = TaskList::new(name, phase, created_by);
        list.color = color;
        self.create(phase, list, order).await
    }

    pub async fn set_list_archived(&self, list: &TaskList, archived: bool) -> Result<TaskList, SyncError> {
        let mut list = list.clone();
        list.is_archived = archived;
        self.update(list).await
    }
}

// ========== TASKS ==========

#[derive(Debug, Default)]
pub struct TaskLevel;

#[async_trait]
impl Level for TaskLevel {
    type Record = Task;
    type Scope = ListKey;

    const NAME: &'static str = "task";

    fn collection(&self, scope: &ListKey) -> CollectionPath {
        scope.tasks()
    }

    fn scope_of(&self, record: &Task) -> ListKey {
        record.list_key()
    }

    fn attach(&self, record: &mut Task, scope: &ListKey) {
        record.relocate(scope);
    }

    fn parent(&self, scope: &ListKey) -> Option<(EntityKind, DocumentPath)> {
        Some((EntityKind::TaskList, scope.doc_path()))
    }

    fn derived_fields(&self) -> &'static [&'static str] {
        &["hasSubtasks", "subtaskCount", "completedSubtaskCount"]
    }

    fn prepare_create(&self, record: &mut Task, now: Timestamp) {
        stamp(&mut record.created_at, now);
        if record.is_completed && record.completed_at.is_none() {
            record.completed_at = Some(now);
        }
    }
}

impl CollectionManager<TaskLevel> {
    pub async fn create_task(
        &self,
        list: &ListKey,
        title: &str,
        created_by: &str,
        order: Option<i64>,
    ) -> Result<Task, SyncError> {
        self.create(list, Task::new(title, list, created_by), order).await
    }

    pub async fn set_task_completed(&self, task: &Task, completed: bool) -> Result<Task, SyncError> {
        let mut task = task.clone();
        task.mark_completed(completed, Utc::now());
        self.update(task).await
    }

    /// Move a task, with its subtasks, to `position` in `target`.
    pub async fn move_task(&self, task: &Task, target: &ListKey, position: Option<i64>) -> Result<Task, SyncError> {
        self.run("move", async {
            let source = task.list_key();
            let moved = ordering::move_task(self.store().as_ref(), task, target, position).await?;
            self.reload_if_tracking(&source).await?;
            if source != *target {
                self.reload_if_tracking(target).await?;
            }
            Ok(moved)
        })
        .await
    }

    /// Upload a file and record its URL on the task.
    pub async fn attach_file(
        &self,
        blobs: &dyn BlobStore,
        task: &Task,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Task, SyncError> {
        self.run("attach", async {
            let key = task
                .key()
                .ok_or_else(|| ValidationError::MissingField("id".to_string()))?;
            let scope = BlobScope {
                project_id: key.project_id.clone(),
                task_id: key.task_id.clone(),
            };
            let url = blobs.upload(bytes, content_type, &scope).await?;

            let mut task = task.clone();
            task.attachments.push(url.clone());
            self.store()
                .update(&key.doc_path(), field("attachments", task.attachments.clone()))
                .await
                .map_err(|e| not_found_as::<Task>(e, &key.task_id))?;
            info!(task = %key.task_id, url = %url, "file attached");
            self.upsert_local(&key.list(), task.clone());
            Ok(task)
        })
        .await
    }
}

// ========== SUBTASKS ==========

#[derive(Debug, Default)]
pub struct SubtaskLevel;

#[async_trait]
impl Level for SubtaskLevel {
    type Record = Subtask;
    type Scope = TaskKey;

    const NAME: &'static str = "subtask";

    fn collection(&self, scope: &TaskKey) -> CollectionPath {
        scope.subtasks()
    }

    fn scope_of(&self, record: &Subtask) -> TaskKey {
        record.task_key()
    }

    fn attach(&self, record: &mut Subtask, scope: &TaskKey) {
        record.attach(scope);
    }

    fn parent(&self, scope: &TaskKey) -> Option<(EntityKind, DocumentPath)> {
        Some((EntityKind::Task, scope.doc_path()))
    }

    fn prepare_create(&self, record: &mut Subtask, now: Timestamp) {
        stamp(&mut record.created_at, now);
    }

    async fn after_change(&self, store: &dyn DocumentStore, scope: &TaskKey) -> Result<(), SyncError> {
        recompute_subtask_counters(store, scope).await.map(|_| ())
    }
}

/// Recount a task's subtasks and store `hasSubtasks`, `subtaskCount` and
/// `completedSubtaskCount` on the task. Returns `(total, completed)`.
pub async fn recompute_subtask_counters(store: &dyn DocumentStore, task: &TaskKey) -> Result<(u32, u32), SyncError> {
    let subtasks = store.list(&task.subtasks()).await?;
    let total = subtasks.len() as u32;
    let completed = subtasks
        .iter()
        .filter(|d| d.data.get("isCompleted").and_then(Value::as_bool) == Some(true))
        .count() as u32;

    let mut data = field("hasSubtasks", total > 0);
    data.insert("subtaskCount".to_string(), json!(total));
    data.insert("completedSubtaskCount".to_string(), json!(completed));
    store
        .update(&task.doc_path(), data)
        .await
        .map_err(|e| not_found_as::<Task>(e, &task.task_id))?;
    debug!(task = %task.task_id, total, completed, "subtask counters updated");
    Ok((total, completed))
}

impl CollectionManager<SubtaskLevel> {
    pub async fn create_subtask(
        &self,
        task: &TaskKey,
        title: &str,
        created_by: &str,
        order: Option<i64>,
    ) -> Result<Subtask, SyncError> {
        self.create(task, Subtask::new(title, task, created_by), order).await
    }

    pub async fn set_subtask_completed(&self, subtask: &Subtask, completed: bool) -> Result<Subtask, SyncError> {
        let mut subtask = subtask.clone();
        subtask.mark_completed(completed, Utc::now());
        self.update(subtask).await
    }
}
