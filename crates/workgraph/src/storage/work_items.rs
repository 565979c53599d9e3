//! Work-item repository: CRUD, soft-delete semantics and ordered-sibling
//! queries over the `work_items` table.
//!
//! Reads take any sqlx executor, so the same query runs against the pool
//! or inside a caller's transaction. Writes always require an open
//! transaction.

use std::collections::HashSet;

use sqlx::sqlite::SqliteConnection;
use sqlx::{Executor, Sqlite, Transaction};
use uuid::Uuid;

use crate::errors::DbError;
use crate::storage::dependencies::DependencyRepository;
use crate::storage::{
    active_clause, format_instant, now_instant, parse_instant, parse_stored_id, placeholders,
};
use workgraph_api::{
    ActiveFilter, DependencyType, DomainError, DomainResult, NewDependency, Priority, Status,
    ValidationError, WorkItem, WorkItemPatch,
};

pub(crate) const WORK_ITEM_COLUMNS: &str = "work_item_id, parent_work_item_id, name, shortname, \
     description, status, priority, order_key, due_date, created_at, updated_at, is_active";

const SIBLING_ORDER: &str = "ORDER BY order_key ASC, created_at ASC";

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct WorkItemRow {
    work_item_id: String,
    parent_work_item_id: Option<String>,
    name: String,
    shortname: Option<String>,
    description: Option<String>,
    status: String,
    priority: String,
    order_key: Option<String>,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
    is_active: bool,
}

impl WorkItemRow {
    pub(crate) fn into_item(self) -> DomainResult<WorkItem> {
        let status = Status::parse(&self.status)
            .ok_or_else(|| DomainError::internal(format!("unknown status {:?}", self.status)))?;
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            DomainError::internal(format!("unknown priority {:?}", self.priority))
        })?;

        Ok(WorkItem {
            work_item_id: parse_stored_id(&self.work_item_id)?,
            parent_work_item_id: self
                .parent_work_item_id
                .as_deref()
                .map(parse_stored_id)
                .transpose()?,
            name: self.name,
            shortname: self.shortname,
            description: self.description,
            status,
            priority,
            order_key: self.order_key,
            due_date: self.due_date.as_deref().map(parse_instant).transpose()?,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
            is_active: self.is_active,
        })
    }
}

/// Which end of the sibling sequence to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingEdge {
    First,
    Last,
}

/// Which side of a pivot sibling an insertion slot sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourSide {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkItemRepository;

impl WorkItemRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn find_by_id<'e, E>(
        &self,
        exec: E,
        id: Uuid,
        filter: ActiveFilter,
    ) -> DomainResult<Option<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE work_item_id = ?{}",
            active_clause("", filter)
        );
        let row = sqlx::query_as::<_, WorkItemRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(DbError::from)?;

        row.map(WorkItemRow::into_item).transpose()
    }

    pub async fn find_by_ids<'e, E>(
        &self,
        exec: E,
        ids: &[Uuid],
        filter: ActiveFilter,
    ) -> DomainResult<Vec<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE work_item_id IN ({}){}",
            placeholders(ids.len()),
            active_clause("", filter)
        );
        let mut query = sqlx::query_as::<_, WorkItemRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(exec).await.map_err(DbError::from)?;
        rows.into_iter().map(WorkItemRow::into_item).collect()
    }

    pub async fn find_roots<'e, E>(
        &self,
        exec: E,
        filter: ActiveFilter,
    ) -> DomainResult<Vec<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_siblings(exec, None, filter).await
    }

    pub async fn find_children<'e, E>(
        &self,
        exec: E,
        parent_id: Uuid,
        filter: ActiveFilter,
    ) -> DomainResult<Vec<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_siblings(exec, Some(parent_id), filter).await
    }

    /// Active-by-default children of one parent (or the roots when
    /// `parent_id` is None), in sibling order.
    pub async fn find_siblings<'e, E>(
        &self,
        exec: E,
        parent_id: Option<Uuid>,
        filter: ActiveFilter,
    ) -> DomainResult<Vec<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let parent_clause = match parent_id {
            Some(_) => "parent_work_item_id = ?",
            None => "parent_work_item_id IS NULL",
        };
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE {parent_clause}{} {SIBLING_ORDER}",
            active_clause("", filter)
        );

        let mut query = sqlx::query_as::<_, WorkItemRow>(&sql);
        if let Some(parent) = parent_id {
            query = query.bind(parent.to_string());
        }

        let rows = query.fetch_all(exec).await.map_err(DbError::from)?;
        rows.into_iter().map(WorkItemRow::into_item).collect()
    }

    /// Transitive children of the given roots, regardless of active state.
    /// The roots themselves are not included.
    pub async fn find_descendants(
        &self,
        conn: &mut SqliteConnection,
        roots: &[Uuid],
    ) -> DomainResult<Vec<WorkItem>> {
        let mut seen: HashSet<Uuid> = roots.iter().copied().collect();
        let mut frontier: Vec<Uuid> = roots.to_vec();
        let mut descendants = Vec::new();

        while !frontier.is_empty() {
            let sql = format!(
                "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE parent_work_item_id IN ({})",
                placeholders(frontier.len())
            );
            let mut query = sqlx::query_as::<_, WorkItemRow>(&sql);
            for id in &frontier {
                query = query.bind(id.to_string());
            }

            let rows = query.fetch_all(&mut *conn).await.map_err(DbError::from)?;

            frontier = Vec::new();
            for row in rows {
                let item = row.into_item()?;
                if seen.insert(item.work_item_id) {
                    frontier.push(item.work_item_id);
                    descendants.push(item);
                }
            }
        }

        Ok(descendants)
    }

    /// Case-insensitive substring match over name and description.
    pub async fn search_by_name_or_description<'e, E>(
        &self,
        exec: E,
        needle: &str,
        filter: ActiveFilter,
    ) -> DomainResult<Vec<WorkItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items \
             WHERE (lower(name) LIKE '%' || lower(?) || '%' \
                OR lower(description) LIKE '%' || lower(?) || '%'){} {SIBLING_ORDER}",
            active_clause("", filter)
        );

        let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
            .bind(needle)
            .bind(needle)
            .fetch_all(exec)
            .await
            .map_err(DbError::from)?;

        rows.into_iter().map(WorkItemRow::into_item).collect()
    }

    /// Insert a new row, optionally upserting dependency links for it.
    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        item: &WorkItem,
        dependencies: &[NewDependency],
    ) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO work_items (work_item_id, parent_work_item_id, name, shortname, \
             description, status, priority, order_key, due_date, created_at, updated_at, \
             is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.work_item_id.to_string())
        .bind(item.parent_work_item_id.map(|p| p.to_string()))
        .bind(&item.name)
        .bind(item.shortname.clone())
        .bind(item.description.clone())
        .bind(item.status.as_str())
        .bind(item.priority.as_str())
        .bind(item.order_key.clone())
        .bind(item.due_date.map(|d| format_instant(&d)))
        .bind(format_instant(&item.created_at))
        .bind(format_instant(&item.updated_at))
        .bind(item.is_active)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        for dep in dependencies {
            if dep.depends_on_work_item_id == item.work_item_id {
                return Err(ValidationError::SelfDependency {
                    id: item.work_item_id.to_string(),
                }
                .into());
            }
            DependencyRepository
                .upsert(
                    tx,
                    item.work_item_id,
                    dep.depends_on_work_item_id,
                    dep.dependency_type.unwrap_or(DependencyType::FinishToStart),
                    true,
                )
                .await?;
        }

        Ok(())
    }

    /// Update whitelisted columns of an active row, stamping `updated_at`.
    /// Returns the updated row, or None when no active row matched.
    pub async fn update_fields(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        patch: &WorkItemPatch,
    ) -> DomainResult<Option<WorkItem>> {
        if patch.is_empty() {
            return self.find_by_id(&mut **tx, id, ActiveFilter::Active).await;
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut binds: Vec<Option<String>> = Vec::new();

        if let Some(name) = &patch.name {
            sets.push("name = ?");
            binds.push(Some(name.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            binds.push(description.clone());
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            binds.push(Some(status.as_str().to_string()));
        }
        if let Some(priority) = patch.priority {
            sets.push("priority = ?");
            binds.push(Some(priority.as_str().to_string()));
        }
        if let Some(due_date) = &patch.due_date {
            sets.push("due_date = ?");
            binds.push(due_date.map(|d| format_instant(&d)));
        }
        if let Some(shortname) = &patch.shortname {
            sets.push("shortname = ?");
            binds.push(shortname.clone());
        }
        if let Some(order_key) = &patch.order_key {
            sets.push("order_key = ?");
            binds.push(order_key.clone());
        }
        sets.push("updated_at = ?");
        binds.push(Some(format_instant(&now_instant())));

        let sql = format!(
            "UPDATE work_items SET {} WHERE work_item_id = ? AND is_active = 1",
            sets.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        query = query.bind(id.to_string());

        let result = query.execute(&mut **tx).await.map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(&mut **tx, id, ActiveFilter::Any).await
    }

    /// Deactivate the currently-active rows among `ids`. Returns the
    /// affected count; rows already inactive are untouched.
    pub async fn soft_delete(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        ids: &[Uuid],
    ) -> DomainResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE work_items SET is_active = 0, updated_at = ? \
             WHERE work_item_id IN ({}) AND is_active = 1",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(format_instant(&now_instant()));
        for id in ids {
            query = query.bind(id.to_string());
        }

        let result = query.execute(&mut **tx).await.map_err(DbError::from)?;
        Ok(result.rows_affected())
    }

    /// Detach an active item from its parent and re-key it among the
    /// roots. Returns the affected row count.
    pub async fn promote_to_root(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        order_key: &str,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE work_items SET parent_work_item_id = NULL, order_key = ?, updated_at = ? \
             WHERE work_item_id = ? AND is_active = 1",
        )
        .bind(order_key)
        .bind(format_instant(&now_instant()))
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        Ok(result.rows_affected())
    }

    /// Smallest or largest order key among the active siblings of one
    /// parent, optionally ignoring the item being repositioned.
    pub async fn find_sibling_edge_order_key<'e, E>(
        &self,
        exec: E,
        parent_id: Option<Uuid>,
        edge: SiblingEdge,
        exclude: Option<Uuid>,
    ) -> DomainResult<Option<String>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let direction = match edge {
            SiblingEdge::First => "ASC",
            SiblingEdge::Last => "DESC",
        };
        let parent_clause = match parent_id {
            Some(_) => " AND parent_work_item_id = ?",
            None => " AND parent_work_item_id IS NULL",
        };
        let exclude_clause = match exclude {
            Some(_) => " AND work_item_id != ?",
            None => "",
        };
        let sql = format!(
            "SELECT order_key FROM work_items \
             WHERE is_active = 1 AND order_key IS NOT NULL{parent_clause}{exclude_clause} \
             ORDER BY order_key {direction} LIMIT 1"
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        if let Some(parent) = parent_id {
            query = query.bind(parent.to_string());
        }
        if let Some(excluded) = exclude {
            query = query.bind(excluded.to_string());
        }

        Ok(query.fetch_optional(exec).await.map_err(DbError::from)?)
    }

    /// The pair of order keys bracketing the slot directly before or after
    /// a pivot sibling, ignoring the item being repositioned.
    pub async fn find_neighbour_order_keys<'e, E>(
        &self,
        exec: E,
        parent_id: Option<Uuid>,
        pivot_key: &str,
        side: NeighbourSide,
        exclude: Option<Uuid>,
    ) -> DomainResult<(Option<String>, Option<String>)>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let (comparison, direction) = match side {
            NeighbourSide::After => (">", "ASC"),
            NeighbourSide::Before => ("<", "DESC"),
        };
        let parent_clause = match parent_id {
            Some(_) => " AND parent_work_item_id = ?",
            None => " AND parent_work_item_id IS NULL",
        };
        let exclude_clause = match exclude {
            Some(_) => " AND work_item_id != ?",
            None => "",
        };
        let sql = format!(
            "SELECT order_key FROM work_items \
             WHERE is_active = 1 AND order_key IS NOT NULL \
             AND order_key {comparison} ?{parent_clause}{exclude_clause} \
             ORDER BY order_key {direction} LIMIT 1"
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql).bind(pivot_key);
        if let Some(parent) = parent_id {
            query = query.bind(parent.to_string());
        }
        if let Some(excluded) = exclude {
            query = query.bind(excluded.to_string());
        }

        let neighbour = query.fetch_optional(exec).await.map_err(DbError::from)?;

        Ok(match side {
            NeighbourSide::After => (Some(pivot_key.to_string()), neighbour),
            NeighbourSide::Before => (neighbour, Some(pivot_key.to_string())),
        })
    }
}
