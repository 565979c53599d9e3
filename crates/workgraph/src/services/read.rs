//! Reading service: hydrated single-item views, recursive tree snapshots
//! and filtered listings. Reads run directly on the pool.

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::DbError;
use crate::storage::work_items::WORK_ITEM_COLUMNS;
use crate::storage::{Database, DependencyRepository, WorkItemRepository};
use workgraph_api::{
    ActiveFilter, DomainError, DomainResult, ListFilter, TreeOptions, WorkItem, WorkItemTree,
    WorkItemView,
};

#[derive(Debug, Clone)]
pub struct ReadingService {
    db: Database,
    items: WorkItemRepository,
    links: DependencyRepository,
}

impl ReadingService {
    pub fn new(db: Database) -> Self {
        Self {
            items: WorkItemRepository::new(),
            links: DependencyRepository::new(),
            db,
        }
    }

    /// One work item with its outgoing dependencies, incoming dependents
    /// and ordered children. Links and linked items are filtered to the
    /// active ones.
    pub async fn get_work_item(
        &self,
        id: Uuid,
        filter: ActiveFilter,
    ) -> DomainResult<WorkItemView> {
        let pool = self.db.pool();

        let work_item = self
            .items
            .find_by_id(pool, id, filter)
            .await?
            .ok_or_else(|| DomainError::not_found("Work item", id))?;
        let dependencies = self
            .links
            .find_dependencies(pool, id, ActiveFilter::Active, ActiveFilter::Active)
            .await?;
        let dependents = self
            .links
            .find_dependents(pool, id, ActiveFilter::Active, ActiveFilter::Active)
            .await?;
        let children = self
            .items
            .find_children(pool, id, ActiveFilter::Active)
            .await?;

        Ok(WorkItemView {
            work_item,
            dependencies,
            dependents,
            children,
        })
    }

    /// Recursive snapshot of one subtree. Inactive subtrees are excluded
    /// unless the options enable them.
    pub async fn get_full_tree(
        &self,
        id: Uuid,
        options: TreeOptions,
    ) -> DomainResult<WorkItemTree> {
        let pool = self.db.pool();
        let filter = if options.include_inactive {
            ActiveFilter::Any
        } else {
            ActiveFilter::Active
        };

        let root = self
            .items
            .find_by_id(pool, id, filter)
            .await?
            .ok_or_else(|| DomainError::not_found("Work item", id))?;

        let mut children_of: HashMap<Uuid, Vec<WorkItem>> = HashMap::new();
        let mut queue = vec![root.work_item_id];
        while let Some(current) = queue.pop() {
            let children = self.items.find_children(pool, current, filter).await?;
            queue.extend(children.iter().map(|c| c.work_item_id));
            children_of.insert(current, children);
        }

        Ok(assemble_tree(root, &mut children_of))
    }

    /// Filtered listing in sibling order.
    pub async fn list_work_items(&self, filter: ListFilter) -> DomainResult<Vec<WorkItem>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut parent_bind: Option<String> = None;

        if filter.roots_only {
            clauses.push("parent_work_item_id IS NULL".to_string());
        }
        match filter.parent {
            Some(None) => clauses.push("parent_work_item_id IS NULL".to_string()),
            Some(Some(parent)) => {
                clauses.push("parent_work_item_id = ?".to_string());
                parent_bind = Some(parent.to_string());
            }
            None => {}
        }
        match filter.is_active {
            ActiveFilter::Active => clauses.push("is_active = 1".to_string()),
            ActiveFilter::Inactive => clauses.push("is_active = 0".to_string()),
            ActiveFilter::Any => {}
        }
        if filter.status.is_some() {
            clauses.push("status = ?".to_string());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items{where_clause} \
             ORDER BY order_key ASC, created_at ASC"
        );

        let mut query = sqlx::query_as::<_, crate::storage::work_items::WorkItemRow>(&sql);
        if let Some(parent) = parent_bind {
            query = query.bind(parent);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::from)?;
        rows.into_iter().map(|row| row.into_item()).collect()
    }
}

fn assemble_tree(item: WorkItem, children_of: &mut HashMap<Uuid, Vec<WorkItem>>) -> WorkItemTree {
    let id = item.work_item_id;
    let children = children_of.remove(&id).unwrap_or_default();
    WorkItemTree {
        work_item: item,
        children: children
            .into_iter()
            .map(|child| assemble_tree(child, children_of))
            .collect(),
    }
}
