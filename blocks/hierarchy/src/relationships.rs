//! Whole-tree validation. Pure: works on an already loaded [`ProjectTree`]
//! and reports every violation it finds instead of stopping at the first.

use crate::tree::ProjectTree;
use shigodeki_atoms::lists::ListParent;
use shigodeki_atoms::{EntityKind, Record, Validate, ValidationError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One problem found in a tree, attributed to the record it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeViolation {
    pub kind: EntityKind,
    pub id: String,
    pub error: ValidationError,
}

impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.id, self.error)
    }
}

#[derive(Default)]
struct Report(Vec<TreeViolation>);

impl Report {
    fn push(&mut self, kind: EntityKind, id: &str, error: ValidationError) {
        self.0.push(TreeViolation {
            kind,
            id: id.to_string(),
            error,
        });
    }

    fn mismatch(&mut self, kind: EntityKind, id: &str, field: &str, found: &str, expected: &str) {
        self.push(
            kind,
            id,
            ValidationError::relationship(
                kind,
                id,
                format!("{field} is '{found}' but the record is stored under '{expected}'"),
            ),
        );
    }
}

/// Field rules, `order` density and the parent link for one sibling set.
/// `parent_link` returns a description of the mismatch, if any.
fn validate_children<C, F>(report: &mut Report, parent: (EntityKind, &str), children: &[C], parent_link: F)
where
    C: Record + Validate,
    F: Fn(&C) -> Option<(&'static str, String)>,
{
    for child in children {
        let id = child.id().unwrap_or_default();
        if let Err(e) = child.validate() {
            report.push(C::KIND, id, e);
        }
        if let Some((field, found)) = parent_link(child) {
            report.mismatch(C::KIND, id, field, &found, parent.1);
        }
    }

    let mut orders: Vec<i64> = children.iter().filter_map(Record::order).collect();
    if orders.is_empty() {
        return;
    }
    orders.sort_unstable();
    let dense = orders.iter().enumerate().all(|(i, o)| *o == i as i64);
    if !dense {
        report.push(
            parent.0,
            parent.1,
            ValidationError::InvalidFormat(format!("{} orders {orders:?} are not 0..{}", C::KIND, orders.len())),
        );
    }
}

fn differs(field: &'static str, found: &str, expected: &str) -> Option<(&'static str, String)> {
    (found != expected).then(|| (field, found.to_string()))
}

pub fn validate_tree(tree: &ProjectTree) -> Vec<TreeViolation> {
    let mut report = Report::default();
    let project_id = tree.id.as_str();

    if let Err(e) = tree.project.validate() {
        report.push(EntityKind::Project, project_id, e);
    }

    let phases: Vec<_> = tree.phases.iter().map(|p| p.phase.clone()).collect();
    validate_children(&mut report, (EntityKind::Project, project_id), &phases, |phase| {
        differs("projectId", &phase.project_id, project_id)
    });

    let task_ids: BTreeSet<&str> = tree.tasks().map(|t| t.id.as_str()).collect();

    for phase in &tree.phases {
        let phase_id = phase.id.as_str();
        validate_children(&mut report, (EntityKind::Phase, phase_id), &phase.sections, |section| {
            differs("phaseId", &section.phase_id, phase_id)
                .or_else(|| differs("projectId", &section.project_id, project_id))
        });

        let lists: Vec<_> = phase.lists.iter().map(|l| l.list.clone()).collect();
        validate_children(&mut report, (EntityKind::Phase, phase_id), &lists, |list| match &list.parent {
            ListParent::Modern {
                project_id: p,
                phase_id: f,
            } => differs("phaseId", f, phase_id).or_else(|| differs("projectId", p, project_id)),
            ListParent::Legacy { family_id } => Some(("familyId", family_id.clone())),
        });

        let section_ids: BTreeSet<&str> = phase.sections.iter().filter_map(|s| s.id()).collect();

        for list in &phase.lists {
            let list_id = list.id.as_str();
            let tasks: Vec<_> = list.tasks.iter().map(|t| t.task.clone()).collect();
            validate_children(&mut report, (EntityKind::TaskList, list_id), &tasks, |task| {
                differs("listId", &task.list_id, list_id)
                    .or_else(|| differs("phaseId", &task.phase_id, phase_id))
                    .or_else(|| differs("projectId", &task.project_id, project_id))
            });

            for node in &list.tasks {
                let task = &node.task;
                let task_id = node.id.as_str();
                validate_children(&mut report, (EntityKind::Task, task_id), &node.subtasks, |subtask| {
                    differs("taskId", &subtask.task_id, task_id)
                        .or_else(|| differs("listId", &subtask.list_id, list_id))
                        .or_else(|| differs("phaseId", &subtask.phase_id, phase_id))
                        .or_else(|| differs("projectId", &subtask.project_id, project_id))
                });

                let total = node.subtasks.len() as u32;
                let completed = node.subtasks.iter().filter(|s| s.is_completed).count() as u32;
                if task.subtask_count != total
                    || task.completed_subtask_count != completed
                    || task.has_subtasks != (total > 0)
                {
                    report.push(
                        EntityKind::Task,
                        task_id,
                        ValidationError::InvalidFormat(format!(
                            "subtask counters {}/{} are stale, live counts are {completed}/{total}",
                            task.completed_subtask_count, task.subtask_count
                        )),
                    );
                }

                if let Some(section) = &task.section_id {
                    if !section_ids.contains(section.as_str()) {
                        report.push(
                            EntityKind::Task,
                            task_id,
                            ValidationError::relationship(
                                EntityKind::Section,
                                section.clone(),
                                "referenced section does not exist in the task's phase",
                            ),
                        );
                    }
                }

                for dependency in &task.depends_on {
                    if !task_ids.contains(dependency.as_str()) {
                        report.push(
                            EntityKind::Task,
                            task_id,
                            ValidationError::relationship(
                                EntityKind::Task,
                                dependency.clone(),
                                "dependency does not exist in this project",
                            ),
                        );
                    }
                }
            }
        }
    }

    for task_id in dependency_cycles(tree, &task_ids) {
        report.push(
            EntityKind::Task,
            task_id,
            ValidationError::relationship(EntityKind::Task, task_id, "task is part of a dependency cycle"),
        );
    }

    report.0
}

/// Tasks through which a dependency edge closes a cycle.
fn dependency_cycles<'a>(tree: &'a ProjectTree, known: &BTreeSet<&'a str>) -> Vec<&'a str> {
    let graph: BTreeMap<&str, Vec<&str>> = tree
        .tasks()
        .map(|node| {
            let deps = node
                .task
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|d| known.contains(d))
                .collect();
            (node.id.as_str(), deps)
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        found: &mut BTreeSet<&'a str>,
    ) {
        marks.insert(id, Mark::Visiting);
        for next in graph.get(id).into_iter().flatten() {
            match marks.get(next) {
                Some(Mark::Visiting) => {
                    found.insert(id);
                }
                Some(Mark::Done) => {}
                None => visit(*next, graph, marks, found),
            }
        }
        marks.insert(id, Mark::Done);
    }

    let mut marks = BTreeMap::new();
    let mut found = BTreeSet::new();
    for id in graph.keys() {
        if !marks.contains_key(id) {
            visit(*id, &graph, &mut marks, &mut found);
        }
    }
    found.into_iter().collect()
}
