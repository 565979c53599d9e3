//! Action-history repository over `action_history` and `undo_steps`.
//!
//! Actions and their steps are append-only; the only updates are the
//! undo/redo bookkeeping flags. Every "mark" operation tolerates zero
//! affected rows with a warning, never an error: a missing row means the
//! flag was already where a concurrent actor left it.

use sqlx::{Executor, Sqlite, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::errors::DbError;
use crate::storage::{format_instant, now_instant, parse_instant, parse_stored_id};
use workgraph_api::{
    ActionFilter, ActionRecord, ActionType, DomainError, DomainResult, HistoryTable, StepType,
    UndoStep,
};

const ACTION_COLUMNS: &str =
    "action_id, timestamp, action_type, work_item_id, description, is_undone, undone_at_action_id";

const STEP_COLUMNS: &str =
    "undo_step_id, action_id, step_order, step_type, table_name, record_id, old_data, new_data";

const DEFAULT_LIST_LIMIT: i64 = 100;

/// Input for recording a new action.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub action_type: ActionType,
    pub work_item_id: Option<Uuid>,
    pub description: String,
}

/// Input for recording one undo step; ids and ordering are assigned at
/// insert time.
#[derive(Debug, Clone)]
pub struct NewUndoStep {
    pub table_name: HistoryTable,
    pub record_id: String,
    pub old_data: serde_json::Value,
    pub new_data: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ActionRow {
    action_id: String,
    timestamp: String,
    action_type: String,
    work_item_id: Option<String>,
    description: String,
    is_undone: bool,
    undone_at_action_id: Option<String>,
}

impl ActionRow {
    fn into_record(self) -> DomainResult<ActionRecord> {
        let action_type = ActionType::parse(&self.action_type).ok_or_else(|| {
            DomainError::internal(format!("unknown action type {:?}", self.action_type))
        })?;

        Ok(ActionRecord {
            action_id: parse_stored_id(&self.action_id)?,
            timestamp: parse_instant(&self.timestamp)?,
            action_type,
            work_item_id: self
                .work_item_id
                .as_deref()
                .map(parse_stored_id)
                .transpose()?,
            description: self.description,
            is_undone: self.is_undone,
            undone_at_action_id: self
                .undone_at_action_id
                .as_deref()
                .map(parse_stored_id)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UndoStepRow {
    undo_step_id: String,
    action_id: String,
    step_order: i64,
    step_type: String,
    table_name: String,
    record_id: String,
    old_data: String,
    new_data: String,
}

impl UndoStepRow {
    fn into_step(self) -> DomainResult<UndoStep> {
        let step_type = StepType::parse(&self.step_type).ok_or_else(|| {
            DomainError::internal(format!("unknown step type {:?}", self.step_type))
        })?;
        let table_name = HistoryTable::parse(&self.table_name).ok_or_else(|| {
            DomainError::internal(format!("unknown step table {:?}", self.table_name))
        })?;
        let old_data = serde_json::from_str(&self.old_data)
            .map_err(|e| DomainError::internal(format!("malformed old_data: {e}")))?;
        let new_data = serde_json::from_str(&self.new_data)
            .map_err(|e| DomainError::internal(format!("malformed new_data: {e}")))?;

        Ok(UndoStep {
            undo_step_id: parse_stored_id(&self.undo_step_id)?,
            action_id: parse_stored_id(&self.action_id)?,
            step_order: self.step_order,
            step_type,
            table_name,
            record_id: self.record_id,
            old_data,
            new_data,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionHistoryRepository;

impl ActionHistoryRepository {
    pub fn new() -> Self {
        Self
    }

    /// Insert a new action row: fresh id, `timestamp = now`, not undone.
    pub async fn create_action(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        action: &NewAction,
    ) -> DomainResult<ActionRecord> {
        let record = ActionRecord {
            action_id: Uuid::new_v4(),
            timestamp: now_instant(),
            action_type: action.action_type,
            work_item_id: action.work_item_id,
            description: action.description.clone(),
            is_undone: false,
            undone_at_action_id: None,
        };

        sqlx::query(
            "INSERT INTO action_history \
             (action_id, timestamp, action_type, work_item_id, description, is_undone, \
              undone_at_action_id) VALUES (?, ?, ?, ?, ?, 0, NULL)",
        )
        .bind(record.action_id.to_string())
        .bind(format_instant(&record.timestamp))
        .bind(record.action_type.as_str())
        .bind(record.work_item_id.map(|id| id.to_string()))
        .bind(&record.description)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        Ok(record)
    }

    /// Insert one undo step. `(action_id, step_order)` uniqueness is
    /// enforced by the schema.
    pub async fn create_undo_step(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        action_id: Uuid,
        step_order: i64,
        step: &NewUndoStep,
    ) -> DomainResult<UndoStep> {
        let record = UndoStep {
            undo_step_id: Uuid::new_v4(),
            action_id,
            step_order,
            step_type: StepType::Update,
            table_name: step.table_name,
            record_id: step.record_id.clone(),
            old_data: step.old_data.clone(),
            new_data: step.new_data.clone(),
        };

        sqlx::query(
            "INSERT INTO undo_steps \
             (undo_step_id, action_id, step_order, step_type, table_name, record_id, \
              old_data, new_data) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.undo_step_id.to_string())
        .bind(record.action_id.to_string())
        .bind(record.step_order)
        .bind(record.step_type.as_str())
        .bind(record.table_name.as_str())
        .bind(&record.record_id)
        .bind(record.old_data.to_string())
        .bind(record.new_data.to_string())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        Ok(record)
    }

    pub async fn find_action_by_id<'e, E>(
        &self,
        exec: E,
        id: Uuid,
    ) -> DomainResult<Option<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {ACTION_COLUMNS} FROM action_history WHERE action_id = ?");
        let row = sqlx::query_as::<_, ActionRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(DbError::from)?;

        row.map(ActionRow::into_record).transpose()
    }

    /// Steps of one action in ascending `step_order`.
    pub async fn find_undo_steps_by_action_id<'e, E>(
        &self,
        exec: E,
        action_id: Uuid,
    ) -> DomainResult<Vec<UndoStep>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM undo_steps WHERE action_id = ? ORDER BY step_order ASC"
        );
        let rows = sqlx::query_as::<_, UndoStepRow>(&sql)
            .bind(action_id.to_string())
            .fetch_all(exec)
            .await
            .map_err(DbError::from)?;

        rows.into_iter().map(UndoStepRow::into_step).collect()
    }

    /// Most recent not-undone action that is not undo/redo bookkeeping.
    pub async fn find_last_original_action<'e, E>(
        &self,
        exec: E,
    ) -> DomainResult<Option<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM action_history \
             WHERE is_undone = 0 AND action_type NOT IN ('UNDO_ACTION', 'REDO_ACTION') \
             ORDER BY timestamp DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ActionRow>(&sql)
            .fetch_optional(exec)
            .await
            .map_err(DbError::from)?;

        row.map(ActionRow::into_record).transpose()
    }

    /// Most recent UNDO still available for redo.
    pub async fn find_last_undo_action<'e, E>(&self, exec: E) -> DomainResult<Option<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM action_history \
             WHERE is_undone = 0 AND action_type = 'UNDO_ACTION' \
             ORDER BY timestamp DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ActionRow>(&sql)
            .fetch_optional(exec)
            .await
            .map_err(DbError::from)?;

        row.map(ActionRow::into_record).transpose()
    }

    /// Recent UNDO actions still available for redo, newest first.
    pub async fn find_recent_unredone_undo_actions<'e, E>(
        &self,
        exec: E,
        limit: i64,
    ) -> DomainResult<Vec<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM action_history \
             WHERE is_undone = 0 AND action_type = 'UNDO_ACTION' \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, ActionRow>(&sql)
            .bind(limit)
            .fetch_all(exec)
            .await
            .map_err(DbError::from)?;

        rows.into_iter().map(ActionRow::into_record).collect()
    }

    /// The original action currently marked undone by the given UNDO.
    pub async fn find_action_linked_by_undo<'e, E>(
        &self,
        exec: E,
        undo_id: Uuid,
    ) -> DomainResult<Option<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM action_history \
             WHERE undone_at_action_id = ? AND is_undone = 1 \
             AND action_type NOT IN ('UNDO_ACTION', 'REDO_ACTION') \
             ORDER BY timestamp DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ActionRow>(&sql)
            .bind(undo_id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(DbError::from)?;

        row.map(ActionRow::into_record).transpose()
    }

    pub async fn mark_action_as_undone(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        original_id: Uuid,
        undo_id: Uuid,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE action_history SET is_undone = 1, undone_at_action_id = ? WHERE action_id = ?",
        )
        .bind(undo_id.to_string())
        .bind(original_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            warn!(action_id = %original_id, "mark_action_as_undone matched no rows");
        }
        Ok(())
    }

    pub async fn mark_action_as_not_undone(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        original_id: Uuid,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE action_history SET is_undone = 0, undone_at_action_id = NULL \
             WHERE action_id = ?",
        )
        .bind(original_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            warn!(action_id = %original_id, "mark_action_as_not_undone matched no rows");
        }
        Ok(())
    }

    /// Take an UNDO action off the redo stack. `by` is the consuming REDO
    /// for a proper redo, a later original for invalidation, or None when
    /// invalidated without a counterpart.
    pub async fn mark_undo_action_as_redone_or_invalidated(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        undo_id: Uuid,
        by: Option<Uuid>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE action_history SET is_undone = 1, undone_at_action_id = ? \
             WHERE action_id = ? AND action_type = 'UNDO_ACTION'",
        )
        .bind(by.map(|id| id.to_string()))
        .bind(undo_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            warn!(action_id = %undo_id, "mark_undo_action_as_redone_or_invalidated matched no rows");
        }
        Ok(())
    }

    /// Recent actions, newest first, optionally scoped to one work item.
    pub async fn list_recent_actions<'e, E>(
        &self,
        exec: E,
        filter: ActionFilter,
    ) -> DomainResult<Vec<ActionRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let subject_clause = match filter.work_item_id {
            Some(_) => " WHERE work_item_id = ?",
            None => "",
        };
        let sql = format!(
            "SELECT {ACTION_COLUMNS} FROM action_history{subject_clause} \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        );

        let mut query = sqlx::query_as::<_, ActionRow>(&sql);
        if let Some(id) = filter.work_item_id {
            query = query.bind(id.to_string());
        }
        query = query.bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));

        let rows = query.fetch_all(exec).await.map_err(DbError::from)?;
        rows.into_iter().map(ActionRow::into_record).collect()
    }
}
