//! Positional moves among siblings. The parent never changes; each move
//! derives a fresh order key from the neighbour slots and records
//! `SET_ORDER_KEY`. A move that would leave the item where it already is
//! writes nothing and records nothing.

use serde_json::json;
use sqlx::{Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::{load_active_item, record_forward_action, ReadingService};
use crate::storage::db::rollback_quietly;
use crate::storage::fractional_index::key_between;
use crate::storage::work_items::{NeighbourSide, SiblingEdge};
use crate::storage::{
    ActionHistoryRepository, Database, NewAction, NewUndoStep, WorkItemRepository,
};
use workgraph_api::{
    ActionType, ActiveFilter, DomainError, DomainResult, HistoryTable, ValidationError,
    WorkItemPatch, WorkItemView,
};

/// Requested slot for a positional move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePosition {
    Start,
    End,
    After(Uuid),
    Before(Uuid),
}

#[derive(Debug, Clone)]
pub struct MovementService {
    db: Database,
    items: WorkItemRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
    reader: ReadingService,
}

impl MovementService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            history: ActionHistoryRepository::new(),
            engine: HistoryEngine::new(db.clone()),
            reader: ReadingService::new(db.clone()),
            db,
        }
    }

    pub async fn move_work_item(
        &self,
        id: Uuid,
        position: MovePosition,
    ) -> DomainResult<WorkItemView> {
        let mut tx = self.db.begin().await?;
        match self.move_in_tx(&mut tx, id, position).await {
            Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }

        self.reader.get_work_item(id, ActiveFilter::Active).await
    }

    async fn move_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        position: MovePosition,
    ) -> DomainResult<()> {
        let item = load_active_item(&self.items, &mut **tx, id).await?;
        let parent = item.parent_work_item_id;
        let current = item.order_key.clone();

        // The moving item is excluded from every neighbour query, so an
        // item already in the requested slot degenerates into a no-op.
        let slot = match position {
            MovePosition::Start => {
                let first = self
                    .items
                    .find_sibling_edge_order_key(&mut **tx, parent, SiblingEdge::First, Some(id))
                    .await?;
                match (&current, first) {
                    (_, None) => None,
                    (Some(cur), Some(first)) if *cur < first => None,
                    (_, Some(first)) => Some((None, Some(first))),
                }
            }
            MovePosition::End => {
                let last = self
                    .items
                    .find_sibling_edge_order_key(&mut **tx, parent, SiblingEdge::Last, Some(id))
                    .await?;
                match (&current, last) {
                    (_, None) => None,
                    (Some(cur), Some(last)) if *cur > last => None,
                    (_, Some(last)) => Some((Some(last), None)),
                }
            }
            MovePosition::After(pivot) | MovePosition::Before(pivot) => {
                let side = match position {
                    MovePosition::After(_) => NeighbourSide::After,
                    _ => NeighbourSide::Before,
                };
                self.pivot_slot(tx, &item, pivot, side).await?
            }
        };

        let Some((prev, next)) = slot else {
            debug!(work_item_id = %id, "already in the requested position; skipping write and history");
            return Ok(());
        };

        let new_key = key_between(prev.as_deref(), next.as_deref())
            .map_err(|e| DomainError::internal(format!("order key generation failed: {e:#}")))?;
        if current.as_deref() == Some(new_key.as_str()) {
            debug!(work_item_id = %id, "computed key equals current; skipping write and history");
            return Ok(());
        }

        let after = self
            .items
            .update_fields(
                tx,
                id,
                &WorkItemPatch {
                    order_key: Some(Some(new_key)),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| DomainError::internal("work item disappeared during move"))?;

        let step = NewUndoStep {
            table_name: HistoryTable::WorkItems,
            record_id: id.to_string(),
            old_data: steps::work_item_field_change(
                id,
                "order_key",
                json!(current),
                &item.updated_at,
            ),
            new_data: steps::work_item_field_change(
                id,
                "order_key",
                json!(after.order_key),
                &after.updated_at,
            ),
        };
        let action = NewAction {
            action_type: ActionType::SetOrderKey,
            work_item_id: Some(id),
            description: format!("Moved work item \"{}\"", item.name),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &[step]).await?;

        Ok(())
    }

    /// Neighbour keys around the slot adjacent to `pivot`, or None when
    /// the item already occupies it.
    async fn pivot_slot(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        item: &workgraph_api::WorkItem,
        pivot: Uuid,
        side: NeighbourSide,
    ) -> DomainResult<Option<(Option<String>, Option<String>)>> {
        let id = item.work_item_id;
        if pivot == id {
            return Err(ValidationError::MoveOntoSelf { id: id.to_string() }.into());
        }

        let pivot_item = self
            .items
            .find_by_id(&mut **tx, pivot, ActiveFilter::Any)
            .await?
            .ok_or_else(|| DomainError::not_found("Work item", pivot))?;
        if !pivot_item.is_active || pivot_item.parent_work_item_id != item.parent_work_item_id {
            return Err(ValidationError::NotASibling {
                id: id.to_string(),
                pivot: pivot.to_string(),
            }
            .into());
        }
        let pivot_key = pivot_item
            .order_key
            .ok_or_else(|| DomainError::internal("pivot sibling has no order key"))?;

        let (prev, next) = self
            .items
            .find_neighbour_order_keys(
                &mut **tx,
                item.parent_work_item_id,
                &pivot_key,
                side,
                Some(id),
            )
            .await?;

        let already_in_place = match (&item.order_key, side) {
            (Some(cur), NeighbourSide::After) => {
                cur.as_str() > pivot_key.as_str()
                    && next.as_deref().map_or(true, |n| cur.as_str() < n)
            }
            (Some(cur), NeighbourSide::Before) => {
                cur.as_str() < pivot_key.as_str()
                    && prev.as_deref().map_or(true, |p| cur.as_str() > p)
            }
            (None, _) => false,
        };

        Ok(if already_in_place {
            None
        } else {
            Some((prev, next))
        })
    }
}
