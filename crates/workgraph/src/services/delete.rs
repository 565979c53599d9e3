//! Cascading soft delete.
//!
//! The input set is expanded to its full descendant closure (active state
//! ignored), then every active member and every active dependency link
//! touching the closure is deactivated. One step per row; a deactivation
//! without a matching step aborts the transaction.

use std::collections::HashSet;

use sqlx::{Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::record_forward_action;
use crate::storage::db::rollback_quietly;
use crate::storage::replay::encode_dependency_record_id;
use crate::storage::{
    ActionHistoryRepository, Database, DependencyRepository, NewAction, NewUndoStep,
    WorkItemRepository,
};
use workgraph_api::{
    ActionType, ActiveFilter, CascadeDeleteOutcome, DependencyLink, DomainError, DomainResult,
    HistoryTable, WorkItem,
};

#[derive(Debug, Clone)]
pub struct CascadeDeleteService {
    db: Database,
    items: WorkItemRepository,
    links: DependencyRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
}

impl CascadeDeleteService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            links: DependencyRepository::new(),
            history: ActionHistoryRepository::new(),
            engine: HistoryEngine::new(db.clone()),
            db,
        }
    }

    pub async fn delete_work_items(&self, ids: &[Uuid]) -> DomainResult<CascadeDeleteOutcome> {
        if ids.is_empty() {
            debug!("empty delete set; nothing to do");
            return Ok(CascadeDeleteOutcome::default());
        }

        let mut unique_ids = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(*id) {
                unique_ids.push(*id);
            }
        }

        let mut tx = self.db.begin().await?;
        match self.delete_in_tx(&mut tx, &unique_ids).await {
            Ok(outcome) => {
                tx.commit().await.map_err(crate::errors::DbError::from)?;
                Ok(outcome)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    async fn delete_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        ids: &[Uuid],
    ) -> DomainResult<CascadeDeleteOutcome> {
        let roots = self
            .items
            .find_by_ids(&mut **tx, ids, ActiveFilter::Any)
            .await?;
        if roots.len() != ids.len() {
            let found: HashSet<Uuid> = roots.iter().map(|i| i.work_item_id).collect();
            if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
                return Err(DomainError::not_found("Work item", missing));
            }
        }

        // Closure over all children, active or not.
        let descendants = self.items.find_descendants(&mut **tx, ids).await?;
        let mut closure: Vec<WorkItem> = roots;
        closure.extend(descendants);
        let closure_ids: Vec<Uuid> = closure.iter().map(|i| i.work_item_id).collect();

        let deleted_items: Vec<&WorkItem> = closure.iter().filter(|i| i.is_active).collect();

        // Every link touching the closure, in either direction.
        let outgoing = self
            .links
            .find_dependencies_for_items(&mut **tx, &closure_ids, ActiveFilter::Any)
            .await?;
        let incoming = self
            .links
            .find_dependents_for_items(&mut **tx, &closure_ids, ActiveFilter::Any)
            .await?;
        let mut link_keys_seen = HashSet::new();
        let mut active_links: Vec<DependencyLink> = Vec::new();
        for link in outgoing.into_iter().chain(incoming) {
            if link.is_active && link_keys_seen.insert(link.key()) {
                active_links.push(link);
            }
        }

        if deleted_items.is_empty() && active_links.is_empty() {
            debug!("delete set already inactive; skipping history");
            return Ok(CascadeDeleteOutcome::default());
        }

        let deleted_ids: Vec<Uuid> = deleted_items.iter().map(|i| i.work_item_id).collect();
        let affected_items = self.items.soft_delete(tx, &deleted_ids).await?;
        if affected_items != deleted_ids.len() as u64 {
            return Err(DomainError::internal(format!(
                "cascade deactivated {affected_items} items, expected {}",
                deleted_ids.len()
            )));
        }

        let link_keys: Vec<(Uuid, Uuid)> = active_links.iter().map(DependencyLink::key).collect();
        let affected_links = self.links.soft_delete_by_keys(tx, &link_keys).await?;
        if affected_links != link_keys.len() as u64 {
            return Err(DomainError::internal(format!(
                "cascade deactivated {affected_links} links, expected {}",
                link_keys.len()
            )));
        }

        let mut step_records = Vec::with_capacity(deleted_items.len() + active_links.len());
        for item in &deleted_items {
            step_records.push(NewUndoStep {
                table_name: HistoryTable::WorkItems,
                record_id: item.work_item_id.to_string(),
                old_data: steps::work_item_snapshot(item),
                new_data: steps::work_item_deactivation(item.work_item_id),
            });
        }
        for link in &active_links {
            step_records.push(NewUndoStep {
                table_name: HistoryTable::WorkItemDependencies,
                record_id: encode_dependency_record_id(
                    link.work_item_id,
                    link.depends_on_work_item_id,
                ),
                old_data: steps::dependency_snapshot(link),
                new_data: steps::dependency_deactivation(
                    link.work_item_id,
                    link.depends_on_work_item_id,
                ),
            });
        }

        let action = NewAction {
            action_type: ActionType::DeleteWorkItemCascade,
            work_item_id: Some(ids[0]),
            description: format!(
                "Deleted {} work item{} and {} dependency link{}",
                deleted_ids.len(),
                if deleted_ids.len() == 1 { "" } else { "s" },
                link_keys.len(),
                if link_keys.len() == 1 { "" } else { "s" }
            ),
        };
        let record =
            record_forward_action(tx, &self.history, &self.engine, action, &step_records).await?;

        Ok(CascadeDeleteOutcome {
            deleted_work_item_ids: deleted_ids,
            deactivated_dependency_keys: link_keys,
            action_id: Some(record.action_id),
        })
    }
}
