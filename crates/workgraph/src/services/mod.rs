//! Mutation and reading services.
//!
//! [`WorkItemService`] is a thin façade over small per-concern services;
//! each sub-service owns one action type and produces the history records
//! for it. Every forward mutation follows the same contract: read the
//! before-state, validate, write, re-read, diff into steps, record the
//! action (or log a no-op), invalidate the redo stack, commit, and return
//! a freshly hydrated view.

mod add;
mod delete;
mod deps;
mod fields;
mod movement;
mod promote;
mod read;

#[cfg(test)]
mod service_tests;

pub use add::AddService;
pub use delete::CascadeDeleteService;
pub use deps::DependencyService;
pub use fields::FieldUpdateService;
pub use movement::{MovePosition, MovementService};
pub use promote::PromoteService;
pub use read::ReadingService;

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, Transaction};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::history::HistoryEngine;
use crate::storage::{ActionHistoryRepository, Database, NewAction, NewUndoStep, WorkItemRepository};
use workgraph_api::{
    ActionFilter, ActionRecord, ActiveFilter, CascadeDeleteOutcome, DomainError, DomainResult,
    ListFilter, NewDependency, NewWorkItem, Status, Priority, TreeNodeInput, TreeOptions,
    ValidationError, WorkItem, WorkItemTree, WorkItemView,
};

/// Façade composing the per-concern services over one database handle.
#[derive(Debug, Clone)]
pub struct WorkItemService {
    adds: AddService,
    fields: FieldUpdateService,
    dependencies: DependencyService,
    movement: MovementService,
    deletes: CascadeDeleteService,
    promotes: PromoteService,
    reader: ReadingService,
    engine: HistoryEngine,
    history: ActionHistoryRepository,
    db: Database,
}

impl WorkItemService {
    pub fn new(db: Database) -> Self {
        Self {
            adds: AddService::new(db.clone()),
            fields: FieldUpdateService::new(db.clone()),
            dependencies: DependencyService::new(db.clone()),
            movement: MovementService::new(db.clone()),
            deletes: CascadeDeleteService::new(db.clone()),
            promotes: PromoteService::new(db.clone()),
            reader: ReadingService::new(db.clone()),
            engine: HistoryEngine::new(db.clone()),
            history: ActionHistoryRepository::new(),
            db,
        }
    }

    /// Open the configured database and build the full service stack.
    pub async fn open(config: &StorageConfig) -> DomainResult<Self> {
        Ok(Self::new(Database::open(config).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ----- forward mutations -----

    pub async fn add_work_item(&self, input: NewWorkItem) -> DomainResult<WorkItemView> {
        self.adds.add_work_item(input).await
    }

    pub async fn add_work_item_tree(
        &self,
        parent: Option<Uuid>,
        forest: Vec<TreeNodeInput>,
    ) -> DomainResult<Vec<WorkItemView>> {
        self.adds.add_work_item_tree(parent, forest).await
    }

    pub async fn set_name(&self, id: Uuid, name: String) -> DomainResult<WorkItemView> {
        self.fields.set_name(id, name).await
    }

    pub async fn set_description(
        &self,
        id: Uuid,
        description: Option<String>,
    ) -> DomainResult<WorkItemView> {
        self.fields.set_description(id, description).await
    }

    pub async fn set_status(&self, id: Uuid, status: Status) -> DomainResult<WorkItemView> {
        self.fields.set_status(id, status).await
    }

    pub async fn set_priority(&self, id: Uuid, priority: Priority) -> DomainResult<WorkItemView> {
        self.fields.set_priority(id, priority).await
    }

    pub async fn set_due_date(
        &self,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
    ) -> DomainResult<WorkItemView> {
        self.fields.set_due_date(id, due_date).await
    }

    pub async fn add_dependencies(
        &self,
        id: Uuid,
        dependencies: Vec<NewDependency>,
    ) -> DomainResult<WorkItemView> {
        self.dependencies.add_dependencies(id, dependencies).await
    }

    pub async fn delete_dependencies(
        &self,
        id: Uuid,
        targets: Vec<Uuid>,
    ) -> DomainResult<WorkItemView> {
        self.dependencies.delete_dependencies(id, targets).await
    }

    pub async fn move_to_start(&self, id: Uuid) -> DomainResult<WorkItemView> {
        self.movement.move_work_item(id, MovePosition::Start).await
    }

    pub async fn move_to_end(&self, id: Uuid) -> DomainResult<WorkItemView> {
        self.movement.move_work_item(id, MovePosition::End).await
    }

    pub async fn move_after(&self, id: Uuid, pivot: Uuid) -> DomainResult<WorkItemView> {
        self.movement
            .move_work_item(id, MovePosition::After(pivot))
            .await
    }

    pub async fn move_before(&self, id: Uuid, pivot: Uuid) -> DomainResult<WorkItemView> {
        self.movement
            .move_work_item(id, MovePosition::Before(pivot))
            .await
    }

    pub async fn delete_work_items(&self, ids: &[Uuid]) -> DomainResult<CascadeDeleteOutcome> {
        self.deletes.delete_work_items(ids).await
    }

    pub async fn promote_to_project(&self, id: Uuid) -> DomainResult<WorkItemView> {
        self.promotes.promote_to_project(id).await
    }

    // ----- history -----

    pub async fn undo(&self) -> DomainResult<Option<ActionRecord>> {
        self.engine.undo().await
    }

    pub async fn redo(&self) -> DomainResult<Option<ActionRecord>> {
        self.engine.redo().await
    }

    pub async fn list_recent_actions(
        &self,
        filter: ActionFilter,
    ) -> DomainResult<Vec<ActionRecord>> {
        self.history.list_recent_actions(self.db.pool(), filter).await
    }

    // ----- reads -----

    pub async fn get_work_item(
        &self,
        id: Uuid,
        filter: ActiveFilter,
    ) -> DomainResult<WorkItemView> {
        self.reader.get_work_item(id, filter).await
    }

    pub async fn get_full_tree(
        &self,
        id: Uuid,
        options: TreeOptions,
    ) -> DomainResult<WorkItemTree> {
        self.reader.get_full_tree(id, options).await
    }

    pub async fn list_work_items(&self, filter: ListFilter) -> DomainResult<Vec<WorkItem>> {
        self.reader.list_work_items(filter).await
    }
}

/// Fetch an item that must exist and be active, distinguishing the two
/// failure shapes.
pub(crate) async fn load_active_item<'e, E>(
    items: &WorkItemRepository,
    exec: E,
    id: Uuid,
) -> DomainResult<WorkItem>
where
    E: Executor<'e, Database = Sqlite>,
{
    let item = items
        .find_by_id(exec, id, ActiveFilter::Any)
        .await?
        .ok_or_else(|| DomainError::not_found("Work item", id))?;

    if !item.is_active {
        return Err(ValidationError::InactiveWorkItem { id: id.to_string() }.into());
    }
    Ok(item)
}

/// Record a forward action with its steps (1-based, dense order) and
/// invalidate the pending redo stack, all inside the caller's transaction.
pub(crate) async fn record_forward_action(
    tx: &mut Transaction<'_, Sqlite>,
    history: &ActionHistoryRepository,
    engine: &HistoryEngine,
    action: NewAction,
    steps: &[NewUndoStep],
) -> DomainResult<ActionRecord> {
    let record = history.create_action(tx, &action).await?;
    for (index, step) in steps.iter().enumerate() {
        history
            .create_undo_step(tx, record.action_id, (index as i64) + 1, step)
            .await?;
    }
    engine.invalidate_redo_stack(tx, record.action_id).await?;
    Ok(record)
}
