pub mod action;
pub mod error;
pub mod work_item;

pub use action::{ActionFilter, ActionRecord, ActionType, HistoryTable, StepType, UndoStep};
pub use error::{DomainError, DomainResult, ValidationError};
pub use work_item::{
    ActiveFilter, CascadeDeleteOutcome, DependencyLink, DependencyType, ListFilter, NewDependency,
    NewWorkItem, Priority, Status, TreeNodeInput, TreeOptions, WorkItem, WorkItemPatch,
    WorkItemTree, WorkItemView,
};
