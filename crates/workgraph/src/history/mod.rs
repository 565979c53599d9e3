//! History engine: undo, redo, and redo-stack invalidation.
//!
//! Undo and redo own their transactions and replay recorded steps through
//! the storage replay primitive. Invalidation runs inside the forward
//! mutation's transaction, immediately after its action row exists, so a
//! crash can never leave a stale redo stack behind a committed action.

pub mod steps;

#[cfg(test)]
mod engine_tests;

use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::db::rollback_quietly;
use crate::storage::replay::{apply_row_state, parse_dependency_record_id};
use crate::storage::{ActionHistoryRepository, Database, NewAction};
use workgraph_api::{
    ActionRecord, ActionType, DomainResult, HistoryTable, StepType, UndoStep,
};

const REDO_STACK_SCAN_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct HistoryEngine {
    db: Database,
    history: ActionHistoryRepository,
}

impl HistoryEngine {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            history: ActionHistoryRepository::new(),
        }
    }

    /// Reverse the most recent original action. Returns the undone action,
    /// or None when there is nothing to undo.
    pub async fn undo(&self) -> DomainResult<Option<ActionRecord>> {
        let pool = self.db.pool();

        let Some(original) = self.history.find_last_original_action(pool).await? else {
            info!("nothing to undo");
            return Ok(None);
        };
        let steps = self
            .history
            .find_undo_steps_by_action_id(pool, original.action_id)
            .await?;

        let mut tx = self.db.begin().await?;
        match self.undo_in_tx(&mut tx, &original, &steps).await {
            Ok(undo_id) => {
                tx.commit().await.map_err(crate::errors::DbError::from)?;
                debug!(action_id = %original.action_id, "action undone");
                Ok(Some(ActionRecord {
                    is_undone: true,
                    undone_at_action_id: Some(undo_id),
                    ..original
                }))
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    async fn undo_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        original: &ActionRecord,
        steps: &[UndoStep],
    ) -> DomainResult<Uuid> {
        let description = if steps.is_empty() {
            warn!(action_id = %original.action_id, "undoing an action with no recorded steps");
            format!(
                "Undid action (no undo steps recorded): \"{}\"",
                original.description
            )
        } else {
            for step in steps.iter().rev() {
                self.replay_step(tx, step, ReplayTarget::OldData).await?;
            }
            format!("Undid action: \"{}\"", original.description)
        };

        let undo = self
            .history
            .create_action(
                tx,
                &NewAction {
                    action_type: ActionType::UndoAction,
                    work_item_id: original.work_item_id,
                    description,
                },
            )
            .await?;
        self.history
            .mark_action_as_undone(tx, original.action_id, undo.action_id)
            .await?;

        Ok(undo.action_id)
    }

    /// Re-apply the most recently undone action. Returns the restored
    /// action, or None when the redo stack is empty.
    pub async fn redo(&self) -> DomainResult<Option<ActionRecord>> {
        let pool = self.db.pool();

        let Some(undo) = self.history.find_last_undo_action(pool).await? else {
            info!("nothing to redo");
            return Ok(None);
        };

        let Some(original) = self
            .history
            .find_action_linked_by_undo(pool, undo.action_id)
            .await?
        else {
            // The UNDO lost its counterpart; take it off the redo stack
            // with no backlink so it cannot be picked again.
            warn!(undo_id = %undo.action_id, "undo action has no linked original; invalidating");
            let mut tx = self.db.begin().await?;
            match self
                .history
                .mark_undo_action_as_redone_or_invalidated(&mut tx, undo.action_id, None)
                .await
            {
                Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
                Err(e) => {
                    rollback_quietly(tx).await;
                    return Err(e);
                }
            }
            return Ok(None);
        };

        let steps = self
            .history
            .find_undo_steps_by_action_id(pool, original.action_id)
            .await?;

        let mut tx = self.db.begin().await?;
        match self.redo_in_tx(&mut tx, &original, &undo, &steps).await {
            Ok(()) => {
                tx.commit().await.map_err(crate::errors::DbError::from)?;
                debug!(action_id = %original.action_id, "action redone");
                Ok(Some(ActionRecord {
                    is_undone: false,
                    undone_at_action_id: None,
                    ..original
                }))
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    async fn redo_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        original: &ActionRecord,
        undo: &ActionRecord,
        steps: &[UndoStep],
    ) -> DomainResult<()> {
        let description = if steps.is_empty() {
            warn!(action_id = %original.action_id, "redoing an action with no recorded steps");
            format!(
                "Redid action (no undo steps recorded): \"{}\"",
                original.description
            )
        } else {
            for step in steps {
                self.replay_step(tx, step, ReplayTarget::NewData).await?;
            }
            format!("Redid action: \"{}\"", original.description)
        };

        let redo = self
            .history
            .create_action(
                tx,
                &NewAction {
                    action_type: ActionType::RedoAction,
                    work_item_id: original.work_item_id,
                    description,
                },
            )
            .await?;
        self.history
            .mark_action_as_not_undone(tx, original.action_id)
            .await?;
        self.history
            .mark_undo_action_as_redone_or_invalidated(tx, undo.action_id, Some(redo.action_id))
            .await?;

        Ok(())
    }

    /// Invalidate every UNDO still available for redo, marking it undone
    /// by the freshly recorded forward action. Must run inside that
    /// action's transaction. Returns how many UNDOs were invalidated.
    pub async fn invalidate_redo_stack(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        new_action_id: Uuid,
    ) -> DomainResult<usize> {
        let pending = self
            .history
            .find_recent_unredone_undo_actions(&mut **tx, REDO_STACK_SCAN_LIMIT)
            .await?;

        let mut invalidated = 0;
        for undo in pending {
            if undo.action_id == new_action_id {
                continue;
            }
            self.history
                .mark_undo_action_as_redone_or_invalidated(tx, undo.action_id, Some(new_action_id))
                .await?;
            invalidated += 1;
        }

        if invalidated > 0 {
            debug!(count = invalidated, "invalidated pending redo actions");
        }
        Ok(invalidated)
    }

    async fn replay_step(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        step: &UndoStep,
        target: ReplayTarget,
    ) -> DomainResult<()> {
        if step.step_type != StepType::Update {
            // Core mutations only record UPDATE steps; anything else in
            // the table predates this engine and cannot be replayed.
            warn!(
                step_id = %step.undo_step_id,
                step_type = step.step_type.as_str(),
                "skipping non-UPDATE step"
            );
            return Ok(());
        }
        if step.table_name == HistoryTable::WorkItemDependencies {
            parse_dependency_record_id(&step.record_id)?;
        }

        let data = match target {
            ReplayTarget::OldData => &step.old_data,
            ReplayTarget::NewData => &step.new_data,
        };
        apply_row_state(tx, step.table_name, data).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ReplayTarget {
    OldData,
    NewData,
}
