//! Add a single work item, or a whole tree in one transaction.

use std::collections::{HashMap, VecDeque};

use tracing::debug;
use uuid::Uuid;

use crate::history::{steps, HistoryEngine};
use crate::services::{record_forward_action, ReadingService};
use crate::storage::db::rollback_quietly;
use crate::storage::fractional_index::{key_between, keys_between};
use crate::storage::work_items::SiblingEdge;
use crate::storage::{
    now_instant, ActionHistoryRepository, Database, NewAction, NewUndoStep, WorkItemRepository,
};
use sqlx::{Sqlite, Transaction};
use workgraph_api::{
    ActionType, ActiveFilter, DomainError, DomainResult, HistoryTable, NewWorkItem, Priority,
    Status, TreeNodeInput, ValidationError, WorkItem, WorkItemView,
};

#[derive(Debug, Clone)]
pub struct AddService {
    db: Database,
    items: WorkItemRepository,
    history: ActionHistoryRepository,
    engine: HistoryEngine,
    reader: ReadingService,
}

impl AddService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            history: ActionHistoryRepository::new(),
            engine: HistoryEngine::new(db.clone()),
            reader: ReadingService::new(db.clone()),
            db,
        }
    }

    /// Insert one new active work item and record `ADD_WORK_ITEM`.
    ///
    /// The undo step's before-state is a deactivation marker: adds are
    /// undone by deactivation, never physical deletion.
    pub async fn add_work_item(&self, input: NewWorkItem) -> DomainResult<WorkItemView> {
        if input.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let mut tx = self.db.begin().await?;
        let created = match self.add_in_tx(&mut tx, &input).await {
            Ok(item) => {
                tx.commit().await.map_err(crate::errors::DbError::from)?;
                item
            }
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };

        self.reader
            .get_work_item(created.work_item_id, ActiveFilter::Active)
            .await
    }

    async fn add_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        input: &NewWorkItem,
    ) -> DomainResult<WorkItem> {
        self.check_parent(tx, input.parent_work_item_id).await?;

        let order_key = match &input.order_key {
            Some(key) => Some(key.clone()),
            None => {
                let last = self
                    .items
                    .find_sibling_edge_order_key(
                        &mut **tx,
                        input.parent_work_item_id,
                        SiblingEdge::Last,
                        None,
                    )
                    .await?;
                Some(key_between(last.as_deref(), None).map_err(|e| {
                    DomainError::internal(format!("order key generation failed: {e:#}"))
                })?)
            }
        };

        let now = now_instant();
        let item = WorkItem {
            work_item_id: Uuid::new_v4(),
            parent_work_item_id: input.parent_work_item_id,
            name: input.name.clone(),
            shortname: input.shortname.clone(),
            description: input.description.clone(),
            status: input.status.unwrap_or(Status::Todo),
            priority: input.priority.unwrap_or(Priority::Medium),
            order_key,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
            is_active: true,
        };
        self.items.create(tx, &item, &[]).await?;

        let stored = self
            .items
            .find_by_id(&mut **tx, item.work_item_id, ActiveFilter::Active)
            .await?
            .ok_or_else(|| DomainError::internal("inserted work item not readable"))?;

        let step = NewUndoStep {
            table_name: HistoryTable::WorkItems,
            record_id: stored.work_item_id.to_string(),
            old_data: steps::work_item_deactivation(stored.work_item_id),
            new_data: steps::work_item_snapshot(&stored),
        };
        let action = NewAction {
            action_type: ActionType::AddWorkItem,
            work_item_id: Some(stored.work_item_id),
            description: format!("Added work item \"{}\"", stored.name),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &[step]).await?;

        Ok(stored)
    }

    /// Insert a forest of new items beneath `parent`, all in one
    /// transaction, recording a single aggregate `ADD_WORK_ITEM_TREE`
    /// action with one step per item. Any failure rolls back every
    /// insertion.
    pub async fn add_work_item_tree(
        &self,
        parent: Option<Uuid>,
        forest: Vec<TreeNodeInput>,
    ) -> DomainResult<Vec<WorkItemView>> {
        if forest.is_empty() {
            debug!("empty forest; nothing to add");
            return Ok(Vec::new());
        }
        validate_names(&forest)?;

        let top_level = forest.len();
        let mut tx = self.db.begin().await?;
        let created = match self.add_tree_in_tx(&mut tx, parent, forest).await {
            Ok(created) => {
                tx.commit().await.map_err(crate::errors::DbError::from)?;
                created
            }
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };

        // The queue is breadth-first, so the first entries are the roots
        // of the inserted forest.
        let mut views = Vec::with_capacity(top_level);
        for item in created.iter().take(top_level) {
            views.push(
                self.reader
                    .get_work_item(item.work_item_id, ActiveFilter::Active)
                    .await?,
            );
        }
        Ok(views)
    }

    async fn add_tree_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        parent: Option<Uuid>,
        forest: Vec<TreeNodeInput>,
    ) -> DomainResult<Vec<WorkItem>> {
        self.check_parent(tx, parent).await?;

        let mut created: Vec<WorkItem> = Vec::new();
        let mut queue: VecDeque<(Option<Uuid>, Vec<TreeNodeInput>)> = VecDeque::new();
        queue.push_back((parent, forest));

        while let Some((layer_parent, nodes)) = queue.pop_front() {
            if nodes.is_empty() {
                continue;
            }

            let last = self
                .items
                .find_sibling_edge_order_key(&mut **tx, layer_parent, SiblingEdge::Last, None)
                .await?;
            let keys = keys_between(last.as_deref(), None, nodes.len()).map_err(|e| {
                DomainError::internal(format!("order key generation failed: {e:#}"))
            })?;

            for (node, key) in nodes.into_iter().zip(keys) {
                let now = now_instant();
                let item = WorkItem {
                    work_item_id: Uuid::new_v4(),
                    parent_work_item_id: layer_parent,
                    name: node.name,
                    shortname: node.shortname,
                    description: node.description,
                    status: node.status.unwrap_or(Status::Todo),
                    priority: node.priority.unwrap_or(Priority::Medium),
                    order_key: Some(key),
                    due_date: node.due_date,
                    created_at: now,
                    updated_at: now,
                    is_active: true,
                };
                self.items.create(tx, &item, &[]).await?;
                queue.push_back((Some(item.work_item_id), node.children));
                created.push(item);
            }
        }

        // Re-read the inserted rows so the recorded after-states are what
        // the store actually holds.
        let ids: Vec<Uuid> = created.iter().map(|i| i.work_item_id).collect();
        let stored = self
            .items
            .find_by_ids(&mut **tx, &ids, ActiveFilter::Active)
            .await?;
        let stored_by_id: HashMap<Uuid, WorkItem> = stored
            .into_iter()
            .map(|item| (item.work_item_id, item))
            .collect();

        let mut step_records = Vec::with_capacity(created.len());
        for item in &created {
            let stored = stored_by_id.get(&item.work_item_id).ok_or_else(|| {
                DomainError::internal("inserted tree member not readable")
            })?;
            step_records.push(NewUndoStep {
                table_name: HistoryTable::WorkItems,
                record_id: stored.work_item_id.to_string(),
                old_data: steps::work_item_deactivation(stored.work_item_id),
                new_data: steps::work_item_snapshot(stored),
            });
        }

        let action = NewAction {
            action_type: ActionType::AddWorkItemTree,
            work_item_id: created.first().map(|i| i.work_item_id),
            description: format!(
                "Added a tree of {} work item{}",
                created.len(),
                if created.len() == 1 { "" } else { "s" }
            ),
        };
        record_forward_action(tx, &self.history, &self.engine, action, &step_records).await?;

        Ok(created)
    }

    async fn check_parent(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        parent: Option<Uuid>,
    ) -> DomainResult<()> {
        let Some(parent_id) = parent else {
            return Ok(());
        };
        let parent_item = self
            .items
            .find_by_id(&mut **tx, parent_id, ActiveFilter::Any)
            .await?
            .ok_or_else(|| DomainError::not_found("Parent work item", parent_id))?;
        if !parent_item.is_active {
            return Err(ValidationError::InactiveParent {
                id: parent_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn validate_names(forest: &[TreeNodeInput]) -> DomainResult<()> {
    for node in forest {
        if node.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        validate_names(&node.children)?;
    }
    Ok(())
}
