//! Dependency add and remove.
//!
//! Adding upserts links to the active state: it creates missing rows,
//! reactivates inactive ones, and retypes active ones. Only effective
//! changes produce steps; a call that changes nothing records no action.
//! Removal deactivates active links and rejects targets with no usable
//! link, distinguishing "no link at all" from "already inactive".

use std::collections::{HashMap, HashSet};

use sqlx::{Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::{load_active_item, record_forward_action, ReadingService};
use crate::storage::db::rollback_quietly;
use crate::storage::replay::encode_dependency_record_id;
use crate::storage::{
    ActionHistoryRepository, Database, DependencyRepository, NewAction, NewUndoStep,
    WorkItemRepository,
};
use workgraph_api::{
    ActionType, ActiveFilter, DependencyLink, DependencyType, DomainError, DomainResult,
    HistoryTable, NewDependency, ValidationError, WorkItemView,
};

#[derive(Debug, Clone)]
pub struct DependencyService {
    db: Database,
    items: WorkItemRepository,
    links: DependencyRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
    reader: ReadingService,
}

impl DependencyService {
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

    pub async fn add_dependencies(
        &self,
        source: Uuid,
        dependencies: Vec<NewDependency>,
    ) -> DomainResult<WorkItemView> {
        let mut tx = self.db.begin().await?;
        match self.add_in_tx(&mut tx, source, dependencies).await {
            Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }

        self.reader.get_work_item(source, ActiveFilter::Active).await
    }

    async fn add_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        source: Uuid,
        dependencies: Vec<NewDependency>,
    ) -> DomainResult<()> {
        let source_item = load_active_item(&self.items, &mut **tx, source).await?;

        if dependencies.is_empty() {
            debug!(work_item_id = %source, "no dependencies requested; nothing to do");
            return Ok(());
        }

        let requested = dedupe_by_target(dependencies);
        for dep in &requested {
            if dep.depends_on_work_item_id == source {
                return Err(ValidationError::SelfDependency {
                    id: source.to_string(),
                }
                .into());
            }
        }

        // Targets must exist and be active; the error shape tells the
        // caller which of the two failed.
        let target_ids: Vec<Uuid> = requested.iter().map(|d| d.depends_on_work_item_id).collect();
        let targets = self
            .items
            .find_by_ids(&mut **tx, &target_ids, ActiveFilter::Any)
            .await?;
        let targets_by_id: HashMap<Uuid, bool> = targets
            .into_iter()
            .map(|item| (item.work_item_id, item.is_active))
            .collect();
        for target in &target_ids {
            match targets_by_id.get(target) {
                None => return Err(DomainError::not_found("Work item", target)),
                Some(false) => {
                    return Err(ValidationError::InactiveDependencyTarget {
                        id: target.to_string(),
                    }
                    .into())
                }
                Some(true) => {}
            }
        }

        let keys: Vec<(Uuid, Uuid)> = target_ids.iter().map(|t| (source, *t)).collect();
        let existing: HashMap<(Uuid, Uuid), DependencyLink> = self
            .links
            .find_by_keys(&mut **tx, &keys, ActiveFilter::Any)
            .await?
            .into_iter()
            .map(|link| (link.key(), link))
            .collect();

        self.links
            .add_or_update_dependencies(tx, source, &requested)
            .await?;

        let after: HashMap<(Uuid, Uuid), DependencyLink> = self
            .links
            .find_by_keys(&mut **tx, &keys, ActiveFilter::Active)
            .await?
            .into_iter()
            .map(|link| (link.key(), link))
            .collect();

        let mut step_records = Vec::new();
        for dep in &requested {
            let requested_type = dep.dependency_type.unwrap_or(DependencyType::FinishToStart);
            let key = (source, dep.depends_on_work_item_id);

            let effective = match existing.get(&key) {
                None => true,
                Some(link) if !link.is_active => true,
                Some(link) => link.dependency_type != requested_type,
            };
            if !effective {
                continue;
            }

            let new_link = after.get(&key).ok_or_else(|| {
                DomainError::internal("upserted dependency link not readable")
            })?;
            let old_data = match existing.get(&key) {
                Some(link) => steps::dependency_snapshot(link),
                None => steps::dependency_deactivation(key.0, key.1),
            };
            step_records.push(NewUndoStep {
                table_name: HistoryTable::WorkItemDependencies,
                record_id: encode_dependency_record_id(key.0, key.1),
                old_data,
                new_data: steps::dependency_snapshot(new_link),
            });
        }

        if step_records.is_empty() {
            debug!(work_item_id = %source, "dependency add changed nothing; skipping history");
            return Ok(());
        }

        let action = NewAction {
            action_type: ActionType::AddDependencies,
            work_item_id: Some(source),
            description: format!(
                "Added {} dependenc{} to \"{}\"",
                step_records.len(),
                if step_records.len() == 1 { "y" } else { "ies" },
                source_item.name
            ),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &step_records).await?;

        Ok(())
    }

    pub async fn delete_dependencies(
        &self,
        source: Uuid,
        targets: Vec<Uuid>,
    ) -> DomainResult<WorkItemView> {
        let mut tx = self.db.begin().await?;
        match self.delete_in_tx(&mut tx, source, targets).await {
            Ok(()) => tx.commit().await.map_err(crate::errors::DbError::from)?,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }

        self.reader.get_work_item(source, ActiveFilter::Active).await
    }

    async fn delete_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        source: Uuid,
        targets: Vec<Uuid>,
    ) -> DomainResult<()> {
        let source_item = load_active_item(&self.items, &mut **tx, source).await?;

        if targets.is_empty() {
            debug!(work_item_id = %source, "no dependency targets given; nothing to do");
            return Ok(());
        }

        let mut unique_targets = Vec::new();
        let mut seen = HashSet::new();
        for target in targets {
            if seen.insert(target) {
                unique_targets.push(target);
            }
        }

        let keys: Vec<(Uuid, Uuid)> = unique_targets.iter().map(|t| (source, *t)).collect();
        let existing: HashMap<(Uuid, Uuid), DependencyLink> = self
            .links
            .find_by_keys(&mut **tx, &keys, ActiveFilter::Any)
            .await?
            .into_iter()
            .map(|link| (link.key(), link))
            .collect();

        let mut to_remove = Vec::with_capacity(keys.len());
        for key in &keys {
            match existing.get(key) {
                None => {
                    return Err(ValidationError::MissingDependencyLink {
                        from: key.0.to_string(),
                        to: key.1.to_string(),
                    }
                    .into())
                }
                Some(link) if !link.is_active => {
                    return Err(ValidationError::InactiveDependencyLink {
                        from: key.0.to_string(),
                        to: key.1.to_string(),
                    }
                    .into())
                }
                Some(link) => to_remove.push(link.clone()),
            }
        }

        let affected = self.links.soft_delete_by_keys(tx, &keys).await?;
        if affected != keys.len() as u64 {
            return Err(DomainError::internal(format!(
                "dependency removal deactivated {affected} links, expected {}",
                keys.len()
            )));
        }

        let step_records: Vec<NewUndoStep> = to_remove
            .iter()
            .map(|link| NewUndoStep {
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
            })
            .collect();

        let action = NewAction {
            action_type: ActionType::DeleteDependencies,
            work_item_id: Some(source),
            description: format!(
                "Removed {} dependenc{} from \"{}\"",
                step_records.len(),
                if step_records.len() == 1 { "y" } else { "ies" },
                source_item.name
            ),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &step_records).await?;

        Ok(())
    }
}

/// Keep the last entry per target, preserving first-seen order otherwise.
fn dedupe_by_target(dependencies: Vec<NewDependency>) -> Vec<NewDependency> {
    let mut seen = HashSet::new();
    let mut deduped: Vec<NewDependency> = Vec::new();
    for dep in dependencies.into_iter().rev() {
        if seen.insert(dep.depends_on_work_item_id) {
            deduped.push(dep);
        }
    }
    deduped.reverse();
    deduped
}
