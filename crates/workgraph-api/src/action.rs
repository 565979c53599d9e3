//! Action-history types: the closed action vocabulary, recorded actions and
//! their reversible undo steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of recorded action types.
///
/// `UNDO_ACTION` and `REDO_ACTION` are bookkeeping actions emitted by the
/// history engine itself; everything else is an original action produced by
/// a forward mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AddWorkItem,
    AddWorkItemTree,
    /// Legacy catch-all field update. Still parsed, never emitted.
    UpdateWorkItem,
    SetName,
    SetDescription,
    SetStatus,
    SetPriority,
    SetDueDate,
    SetOrderKey,
    AddDependencies,
    DeleteDependencies,
    DeleteWorkItemCascade,
    PromoteToProject,
    UndoAction,
    RedoAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddWorkItem => "ADD_WORK_ITEM",
            ActionType::AddWorkItemTree => "ADD_WORK_ITEM_TREE",
            ActionType::UpdateWorkItem => "UPDATE_WORK_ITEM",
            ActionType::SetName => "SET_NAME",
            ActionType::SetDescription => "SET_DESCRIPTION",
            ActionType::SetStatus => "SET_STATUS",
            ActionType::SetPriority => "SET_PRIORITY",
            ActionType::SetDueDate => "SET_DUE_DATE",
            ActionType::SetOrderKey => "SET_ORDER_KEY",
            ActionType::AddDependencies => "ADD_DEPENDENCIES",
            ActionType::DeleteDependencies => "DELETE_DEPENDENCIES",
            ActionType::DeleteWorkItemCascade => "DELETE_WORK_ITEM_CASCADE",
            ActionType::PromoteToProject => "PROMOTE_TO_PROJECT",
            ActionType::UndoAction => "UNDO_ACTION",
            ActionType::RedoAction => "REDO_ACTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD_WORK_ITEM" => Some(ActionType::AddWorkItem),
            "ADD_WORK_ITEM_TREE" => Some(ActionType::AddWorkItemTree),
            "UPDATE_WORK_ITEM" => Some(ActionType::UpdateWorkItem),
            "SET_NAME" => Some(ActionType::SetName),
            "SET_DESCRIPTION" => Some(ActionType::SetDescription),
            "SET_STATUS" => Some(ActionType::SetStatus),
            "SET_PRIORITY" => Some(ActionType::SetPriority),
            "SET_DUE_DATE" => Some(ActionType::SetDueDate),
            "SET_ORDER_KEY" => Some(ActionType::SetOrderKey),
            "ADD_DEPENDENCIES" => Some(ActionType::AddDependencies),
            "DELETE_DEPENDENCIES" => Some(ActionType::DeleteDependencies),
            "DELETE_WORK_ITEM_CASCADE" => Some(ActionType::DeleteWorkItemCascade),
            "PROMOTE_TO_PROJECT" => Some(ActionType::PromoteToProject),
            "UNDO_ACTION" => Some(ActionType::UndoAction),
            "REDO_ACTION" => Some(ActionType::RedoAction),
            _ => None,
        }
    }

    /// True for every type except the undo/redo bookkeeping pair.
    pub fn is_original(&self) -> bool {
        !matches!(self, ActionType::UndoAction | ActionType::RedoAction)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded action.
///
/// For an original action, `is_undone` with a backlink points at the UNDO
/// that reversed it. For an UNDO action, `is_undone` means it left the redo
/// stack: the backlink is the REDO that consumed it, a later original that
/// invalidated it, or null when invalidated without a counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    /// Primary subject, when the action has one.
    pub work_item_id: Option<Uuid>,
    pub description: String,
    pub is_undone: bool,
    pub undone_at_action_id: Option<Uuid>,
}

/// Step replay mode. Core mutations only ever emit `Update`; the other
/// variants are parsed for completeness and rejected by the replayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Update,
    Insert,
    Delete,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Update => "UPDATE",
            StepType::Insert => "INSERT",
            StepType::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPDATE" => Some(StepType::Update),
            "INSERT" => Some(StepType::Insert),
            "DELETE" => Some(StepType::Delete),
            _ => None,
        }
    }
}

/// Tables a step may target. Names are normative; history rows reference
/// them as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTable {
    WorkItems,
    WorkItemDependencies,
}

impl HistoryTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryTable::WorkItems => "work_items",
            HistoryTable::WorkItemDependencies => "work_item_dependencies",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work_items" => Some(HistoryTable::WorkItems),
            "work_item_dependencies" => Some(HistoryTable::WorkItemDependencies),
            _ => None,
        }
    }
}

/// One reversible mutation belonging to an action.
///
/// `old_data` is the row state the undo replay restores, `new_data` the
/// state the redo replay restores. Both are row documents keyed by column
/// name and always embed the primary-key fields; they are not diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoStep {
    pub undo_step_id: Uuid,
    pub action_id: Uuid,
    /// 1-based, dense, unique within the action.
    pub step_order: i64,
    pub step_type: StepType,
    pub table_name: HistoryTable,
    /// Primary-key serialization: the item id, or
    /// `"<work_item_id>:<depends_on_work_item_id>"` for links.
    pub record_id: String,
    pub old_data: serde_json::Value,
    pub new_data: serde_json::Value,
}

/// Filter for `list_recent_actions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFilter {
    pub work_item_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_round_trips() {
        let all = [
            ActionType::AddWorkItem,
            ActionType::AddWorkItemTree,
            ActionType::UpdateWorkItem,
            ActionType::SetName,
            ActionType::SetDescription,
            ActionType::SetStatus,
            ActionType::SetPriority,
            ActionType::SetDueDate,
            ActionType::SetOrderKey,
            ActionType::AddDependencies,
            ActionType::DeleteDependencies,
            ActionType::DeleteWorkItemCascade,
            ActionType::PromoteToProject,
            ActionType::UndoAction,
            ActionType::RedoAction,
        ];
        for t in all {
            assert_eq!(ActionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ActionType::parse("MERGE_WORK_ITEM"), None);
    }

    #[test]
    fn originals_exclude_undo_and_redo() {
        assert!(ActionType::AddWorkItem.is_original());
        assert!(ActionType::DeleteWorkItemCascade.is_original());
        assert!(!ActionType::UndoAction.is_original());
        assert!(!ActionType::RedoAction.is_original());
    }

    #[test]
    fn table_names_are_normative() {
        assert_eq!(HistoryTable::WorkItems.as_str(), "work_items");
        assert_eq!(
            HistoryTable::parse("work_item_dependencies"),
            Some(HistoryTable::WorkItemDependencies)
        );
        assert_eq!(HistoryTable::parse("undo_steps"), None);
    }

    #[test]
    fn step_type_parses_legacy_variants() {
        assert_eq!(StepType::parse("UPDATE"), Some(StepType::Update));
        assert_eq!(StepType::parse("INSERT"), Some(StepType::Insert));
        assert_eq!(StepType::parse("DELETE"), Some(StepType::Delete));
        assert_eq!(StepType::parse("UPSERT"), None);
    }
}
