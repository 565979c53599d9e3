//! Single-field update services: name, description, status, priority and
//! due date. A call whose value equals the current one is a pure no-op:
//! no write, no history, no error.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::{load_active_item, record_forward_action, ReadingService};
use crate::storage::db::rollback_quietly;
use crate::storage::{
    format_instant, ActionHistoryRepository, Database, NewAction, NewUndoStep, WorkItemRepository,
};
use workgraph_api::{
    ActionType, ActiveFilter, DomainError, DomainResult, HistoryTable, Priority, Status,
    ValidationError, WorkItem, WorkItemPatch, WorkItemView,
};

#[derive(Debug, Clone)]
pub struct FieldUpdateService {
    db: Database,
    items: WorkItemRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
    reader: ReadingService,
}

#[derive(Debug, Clone)]
enum FieldChange {
    Name(String),
    Description(Option<String>),
    Status(Status),
    Priority(Priority),
    DueDate(Option<DateTime<Utc>>),
}

impl FieldChange {
    fn action_type(&self) -> ActionType {
        match self {
            FieldChange::Name(_) => ActionType::SetName,
            FieldChange::Description(_) => ActionType::SetDescription,
            FieldChange::Status(_) => ActionType::SetStatus,
            FieldChange::Priority(_) => ActionType::SetPriority,
            FieldChange::DueDate(_) => ActionType::SetDueDate,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            FieldChange::Name(_) => "name",
            FieldChange::Description(_) => "description",
            FieldChange::Status(_) => "status",
            FieldChange::Priority(_) => "priority",
            FieldChange::DueDate(_) => "due_date",
        }
    }

    /// Due dates compare as normalized instants; everything else by value.
    fn equals_current(&self, item: &WorkItem) -> bool {
        match self {
            FieldChange::Name(name) => *name == item.name,
            FieldChange::Description(description) => *description == item.description,
            FieldChange::Status(status) => *status == item.status,
            FieldChange::Priority(priority) => *priority == item.priority,
            FieldChange::DueDate(due) => *due == item.due_date,
        }
    }

    fn to_patch(&self) -> WorkItemPatch {
        match self {
            FieldChange::Name(name) => WorkItemPatch {
                name: Some(name.clone()),
                ..Default::default()
            },
            FieldChange::Description(description) => WorkItemPatch {
                description: Some(description.clone()),
                ..Default::default()
            },
            FieldChange::Status(status) => WorkItemPatch {
                status: Some(*status),
                ..Default::default()
            },
            FieldChange::Priority(priority) => WorkItemPatch {
                priority: Some(*priority),
                ..Default::default()
            },
            FieldChange::DueDate(due) => WorkItemPatch {
                due_date: Some(*due),
                ..Default::default()
            },
        }
    }

    fn old_value(&self, item: &WorkItem) -> Value {
        match self {
            FieldChange::Name(_) => json!(item.name),
            FieldChange::Description(_) => json!(item.description),
            FieldChange::Status(_) => json!(item.status.as_str()),
            FieldChange::Priority(_) => json!(item.priority.as_str()),
            FieldChange::DueDate(_) => json!(item.due_date.map(|d| format_instant(&d))),
        }
    }

    fn new_value(&self) -> Value {
        match self {
            FieldChange::Name(name) => json!(name),
            FieldChange::Description(description) => json!(description),
            FieldChange::Status(status) => json!(status.as_str()),
            FieldChange::Priority(priority) => json!(priority.as_str()),
            FieldChange::DueDate(due) => json!(due.map(|d| format_instant(&d))),
        }
    }

    fn describe(&self, item: &WorkItem) -> String {
        match self {
            FieldChange::Name(name) => {
                format!("Renamed work item \"{}\" to \"{name}\"", item.name)
            }
            FieldChange::Description(_) => {
                format!("Updated description of \"{}\"", item.name)
            }
            FieldChange::Status(status) => {
                format!("Set status of \"{}\" to {status}", item.name)
            }
            FieldChange::Priority(priority) => {
                format!("Set priority of \"{}\" to {priority}", item.name)
            }
            FieldChange::DueDate(Some(due)) => {
                format!("Set due date of \"{}\" to {}", item.name, format_instant(due))
            }
            FieldChange::DueDate(None) => format!("Cleared due date of \"{}\"", item.name),
        }
    }
}

impl FieldUpdateService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            history: ActionHistoryRepository::new(),
            engine: HistoryEngine::new(db.clone()),
            reader: ReadingService::new(db.clone()),
            db,
        }
    }

    pub async fn set_name(&self, id: Uuid, name: String) -> DomainResult<WorkItemView> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        self.set_field(id, FieldChange::Name(name)).await
    }

    pub async fn set_description(
        &self,
        id: Uuid,
        description: Option<String>,
    ) -> DomainResult<WorkItemView> {
        self.set_field(id, FieldChange::Description(description))
            .await
    }

    pub async fn set_status(&self, id: Uuid, status: Status) -> DomainResult<WorkItemView> {
        self.set_field(id, FieldChange::Status(status)).await
    }

    pub async fn set_priority(&self, id: Uuid, priority: Priority) -> DomainResult<WorkItemView> {
        self.set_field(id, FieldChange::Priority(priority)).await
    }

    pub async fn set_due_date(
        &self,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
    ) -> DomainResult<WorkItemView> {
        self.set_field(id, FieldChange::DueDate(due_date)).await
    }

    async fn set_field(&self, id: Uuid, change: FieldChange) -> DomainResult<WorkItemView> {
        let mut tx = self.db.begin().await?;
        match self.set_field_in_tx(&mut tx, id, &change).await {
            Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }

        self.reader.get_work_item(id, ActiveFilter::Active).await
    }

    async fn set_field_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        change: &FieldChange,
    ) -> DomainResult<()> {
        let before = load_active_item(&self.items, &mut **tx, id).await?;

        if change.equals_current(&before) {
            debug!(work_item_id = %id, column = change.column(), "value unchanged; skipping write and history");
            return Ok(());
        }

        let after = self
            .items
            .update_fields(tx, id, &change.to_patch())
            .await?
            .ok_or_else(|| DomainError::internal("work item disappeared during field update"))?;

        let step = NewUndoStep {
            table_name: HistoryTable::WorkItems,
            record_id: id.to_string(),
            old_data: steps::work_item_field_change(
                id,
                change.column(),
                change.old_value(&before),
                &before.updated_at,
            ),
            new_data: steps::work_item_field_change(
                id,
                change.column(),
                change.new_value(),
                &after.updated_at,
            ),
        };
        let action = NewAction {
            action_type: change.action_type(),
            work_item_id: Some(id),
            description: change.describe(&before),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &[step]).await?;

        Ok(())
    }
}
