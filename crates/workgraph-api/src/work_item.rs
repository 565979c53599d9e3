//! Work-item domain types: rows, dependency links, inputs, filters and
//! hydrated read views.
//!
//! Everything here is plain data. Graph structure is expressed through
//! stored identifiers only; the tree views returned by the reading service
//! are transient snapshots, never an owning object graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Todo,
    InProgress,
    Review,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Review => "review",
            Status::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Status::Todo),
            "in-progress" => Some(Status::InProgress),
            "review" => Some(Status::Review),
            "done" => Some(Status::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a directed dependency link between two work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    /// The depended-on item must finish before this one can start.
    FinishToStart,
    /// Loose association; carries no scheduling semantics.
    Linked,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "finish-to-start",
            DependencyType::Linked => "linked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "finish-to-start" => Some(DependencyType::FinishToStart),
            "linked" => Some(DependencyType::Linked),
            _ => None,
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single work item row.
///
/// `is_active` is the soft-delete flag: deletion never removes rows, it
/// clears this flag and default reads skip inactive rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_item_id: Uuid,
    /// None identifies a root (project).
    pub parent_work_item_id: Option<Uuid>,
    pub name: String,
    pub shortname: Option<String>,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    /// Opaque sort key; lexicographic order among siblings of one parent.
    pub order_key: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl WorkItem {
    pub fn is_root(&self) -> bool {
        self.parent_work_item_id.is_none()
    }
}

/// A directed dependency link. Composite key `(work_item_id,
/// depends_on_work_item_id)`; deactivated rows are preserved for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyLink {
    pub work_item_id: Uuid,
    pub depends_on_work_item_id: Uuid,
    pub dependency_type: DependencyType,
    pub is_active: bool,
}

impl DependencyLink {
    /// Composite key as an ordered pair.
    pub fn key(&self) -> (Uuid, Uuid) {
        (self.work_item_id, self.depends_on_work_item_id)
    }
}

/// Input for creating a single work item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub name: String,
    pub parent_work_item_id: Option<Uuid>,
    pub description: Option<String>,
    /// Defaults to `medium`.
    pub priority: Option<Priority>,
    /// Defaults to `todo`.
    pub status: Option<Status>,
    pub due_date: Option<DateTime<Utc>>,
    pub shortname: Option<String>,
    /// When absent a key placing the item after its last active sibling is
    /// generated.
    pub order_key: Option<String>,
}

/// One dependency requested alongside an add or a dependency-add call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDependency {
    pub depends_on_work_item_id: Uuid,
    /// Defaults to `finish-to-start`.
    pub dependency_type: Option<DependencyType>,
}

/// One node of a tree passed to the add-tree operation. Children are
/// created beneath their freshly inserted parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeNodeInput {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub due_date: Option<DateTime<Utc>>,
    pub shortname: Option<String>,
    pub children: Vec<TreeNodeInput>,
}

/// Partial update payload for the repository's whitelisted columns.
///
/// The outer `Option` means "touch this column"; the inner `Option` (for
/// nullable columns) is the stored value.
#[derive(Debug, Clone, Default)]
pub struct WorkItemPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub shortname: Option<Option<String>>,
    pub order_key: Option<Option<String>>,
}

impl WorkItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.shortname.is_none()
            && self.order_key.is_none()
    }
}

/// Soft-delete visibility filter applied to reads. Defaults to active rows
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveFilter {
    #[default]
    Active,
    Inactive,
    Any,
}

/// Filter for `list_work_items`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// `Some(None)` selects roots; `Some(Some(id))` selects children of
    /// `id`; `None` leaves the parent unconstrained.
    pub parent: Option<Option<Uuid>>,
    pub roots_only: bool,
    pub status: Option<Status>,
    pub is_active: ActiveFilter,
}

/// Options for `get_full_tree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeOptions {
    /// Include inactive subtrees in the result.
    pub include_inactive: bool,
}

/// Hydrated view of a single work item: the row itself, its outgoing and
/// incoming dependency links, and its direct children in sibling order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemView {
    pub work_item: WorkItem,
    pub dependencies: Vec<DependencyLink>,
    pub dependents: Vec<DependencyLink>,
    pub children: Vec<WorkItem>,
}

/// Recursive tree snapshot rooted at one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemTree {
    pub work_item: WorkItem,
    pub children: Vec<WorkItemTree>,
}

impl WorkItemTree {
    /// Total number of items in this subtree, the root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(WorkItemTree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Result of a cascading delete: which rows were deactivated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeDeleteOutcome {
    pub deleted_work_item_ids: Vec<Uuid>,
    pub deactivated_dependency_keys: Vec<(Uuid, Uuid)>,
    /// The recorded action, when at least one row changed.
    pub action_id: Option<Uuid>,
}

impl CascadeDeleteOutcome {
    pub fn deleted_count(&self) -> usize {
        self.deleted_work_item_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [Status::Todo, Status::InProgress, Status::Review, Status::Done] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
        assert_eq!(Status::parse("blocked"), None);
    }

    #[test]
    fn priority_round_trips() {
        for p in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::parse(p.as_str()), Some(p));
        }
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn dependency_type_round_trips() {
        for d in [DependencyType::FinishToStart, DependencyType::Linked] {
            assert_eq!(DependencyType::parse(d.as_str()), Some(d));
        }
    }

    #[test]
    fn status_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn tree_len_counts_all_nodes() {
        let leaf = |name: &str| TreeNodeInput {
            name: name.to_string(),
            ..Default::default()
        };
        let input = TreeNodeInput {
            name: "root".to_string(),
            children: vec![leaf("a"), leaf("b")],
            ..Default::default()
        };
        assert_eq!(input.children.len(), 2);
    }
}
