//! Promote a child work item to a root project.
//!
//! The item is detached from its parent and re-keyed last among the
//! roots; a `linked` dependency from the former parent preserves the
//! association that used to be parent/child. Both effects sit in one
//! action so undo and redo move them together.

use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::{load_active_item, record_forward_action, ReadingService};
use crate::storage::db::rollback_quietly;
use crate::storage::fractional_index::key_between;
use crate::storage::replay::encode_dependency_record_id;
use crate::storage::work_items::SiblingEdge;
use crate::storage::{
    ActionHistoryRepository, Database, DependencyRepository, NewAction, NewUndoStep,
    WorkItemRepository,
};
use workgraph_api::{
    ActionType, ActiveFilter, DependencyType, DomainError, DomainResult, HistoryTable,
    ValidationError, WorkItemView,
};

#[derive(Debug, Clone)]
pub struct PromoteService {
    db: Database,
    items: WorkItemRepository,
    links: DependencyRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
    reader: ReadingService,
}

impl PromoteService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            links: DependencyRepository::new(),
            history: ActionHistoryRepository::new(),
            engine: HistoryEngine::new(db.clone()),
            reader: ReadingService::new(db.clone()),
            db,
        }
    }

    pub async fn promote_to_project(&self, id: Uuid) -> DomainResult<WorkItemView> {
        let mut tx = self.db.begin().await?;
        match self.promote_in_tx(&mut tx, id).await {
            Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }

        self.reader.get_work_item(id, ActiveFilter::Active).await
    }

    async fn promote_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> DomainResult<()> {
        let item = load_active_item(&self.items, &mut **tx, id).await?;
        let Some(former_parent) = item.parent_work_item_id else {
            return Err(ValidationError::AlreadyRoot { id: id.to_string() }.into());
        };

        let last_root_key = self
            .items
            .find_sibling_edge_order_key(&mut **tx, None, SiblingEdge::Last, Some(id))
            .await?;
        let new_key = key_between(last_root_key.as_deref(), None)
            .map_err(|e| DomainError::internal(format!("order key generation failed: {e:#}")))?;

        // Link state before the upsert decides the step's before-image:
        // an old deactivated row is restored, a missing one is recorded
        // as inactive.
        let link_key = (former_parent, id);
        let prior_link = self
            .links
            .find_by_keys(&mut **tx, &[link_key], ActiveFilter::Any)
            .await?
            .into_iter()
            .next();

        let affected = self.items.promote_to_root(tx, id, &new_key).await?;
        if affected != 1 {
            return Err(DomainError::internal(
                "work item disappeared during promote",
            ));
        }
        let after = self
            .items
            .find_by_id(&mut **tx, id, ActiveFilter::Active)
            .await?
            .ok_or_else(|| DomainError::internal("promoted work item not readable"))?;

        self.links
            .upsert(tx, former_parent, id, DependencyType::Linked, true)
            .await?;
        let new_link = self
            .links
            .find_by_keys(&mut **tx, &[link_key], ActiveFilter::Active)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("promotion link not readable"))?;

        let item_step = NewUndoStep {
            table_name: HistoryTable::WorkItems,
            record_id: id.to_string(),
            old_data: steps::work_item_placement(
                id,
                Some(former_parent),
                item.order_key.as_deref(),
                &item.updated_at,
            ),
            new_data: steps::work_item_placement(
                id,
                None,
                after.order_key.as_deref(),
                &after.updated_at,
            ),
        };
        let link_step = NewUndoStep {
            table_name: HistoryTable::WorkItemDependencies,
            record_id: encode_dependency_record_id(former_parent, id),
            old_data: match &prior_link {
                Some(link) => steps::dependency_snapshot(link),
                None => steps::dependency_deactivation(former_parent, id),
            },
            new_data: steps::dependency_snapshot(&new_link),
        };

        let action = NewAction {
            action_type: ActionType::PromoteToProject,
            work_item_id: Some(id),
            description: format!("Promoted \"{}\" to a project", item.name),
        };
        record_forward_action(
            tx,
            &self.history,
            &self.engine,
            action,
            &[item_step, link_step],
        )
        .await?;

        Ok(())
    }
}
