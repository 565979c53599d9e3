//! Dependency-link repository over `work_item_dependencies`.
//!
//! Link rows are never deleted; removal and cascade delete deactivate
//! them, and a later add may reactivate the same row (optionally with a
//! different type).

use sqlx::{Executor, Sqlite, Transaction};
use uuid::Uuid;

use crate::errors::DbError;
use crate::storage::{active_clause, parse_stored_id};
use workgraph_api::{
    ActiveFilter, DependencyLink, DependencyType, DomainError, DomainResult, NewDependency,
    ValidationError,
};

const LINK_COLUMNS: &str = "work_item_id, depends_on_work_item_id, dependency_type, is_active";

#[derive(Debug, Clone, sqlx::FromRow)]
struct DependencyRow {
    work_item_id: String,
    depends_on_work_item_id: String,
    dependency_type: String,
    is_active: bool,
}

impl DependencyRow {
    fn into_link(self) -> DomainResult<DependencyLink> {
        let dependency_type = DependencyType::parse(&self.dependency_type).ok_or_else(|| {
            DomainError::internal(format!(
                "unknown dependency type {:?}",
                self.dependency_type
            ))
        })?;

        Ok(DependencyLink {
            work_item_id: parse_stored_id(&self.work_item_id)?,
            depends_on_work_item_id: parse_stored_id(&self.depends_on_work_item_id)?,
            dependency_type,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyRepository;

impl DependencyRepository {
    pub fn new() -> Self {
        Self
    }

    /// Outgoing links of one item. `link_filter` restricts the link rows,
    /// `item_filter` the linked-to items.
    pub async fn find_dependencies<'e, E>(
        &self,
        exec: E,
        id: Uuid,
        link_filter: ActiveFilter,
        item_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_linked(exec, id, LinkDirection::Outgoing, link_filter, item_filter)
            .await
    }

    /// Incoming links of one item (who depends on it).
    pub async fn find_dependents<'e, E>(
        &self,
        exec: E,
        id: Uuid,
        link_filter: ActiveFilter,
        item_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_linked(exec, id, LinkDirection::Incoming, link_filter, item_filter)
            .await
    }

    async fn find_linked<'e, E>(
        &self,
        exec: E,
        id: Uuid,
        direction: LinkDirection,
        link_filter: ActiveFilter,
        item_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let (anchor, joined) = match direction {
            LinkDirection::Outgoing => ("d.work_item_id", "d.depends_on_work_item_id"),
            LinkDirection::Incoming => ("d.depends_on_work_item_id", "d.work_item_id"),
        };
        let sql = format!(
            "SELECT d.work_item_id, d.depends_on_work_item_id, d.dependency_type, d.is_active \
             FROM work_item_dependencies d \
             JOIN work_items w ON w.work_item_id = {joined} \
             WHERE {anchor} = ?{}{}",
            active_clause("d.", link_filter),
            active_clause("w.", item_filter)
        );

        let rows = sqlx::query_as::<_, DependencyRow>(&sql)
            .bind(id.to_string())
            .fetch_all(exec)
            .await
            .map_err(DbError::from)?;

        rows.into_iter().map(DependencyRow::into_link).collect()
    }

    /// Outgoing links of any of the given items.
    pub async fn find_dependencies_for_items<'e, E>(
        &self,
        exec: E,
        ids: &[Uuid],
        link_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_links_by_endpoint(exec, ids, "work_item_id", link_filter)
            .await
    }

    /// Incoming links of any of the given items.
    pub async fn find_dependents_for_items<'e, E>(
        &self,
        exec: E,
        ids: &[Uuid],
        link_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.find_links_by_endpoint(exec, ids, "depends_on_work_item_id", link_filter)
            .await
    }

    async fn find_links_by_endpoint<'e, E>(
        &self,
        exec: E,
        ids: &[Uuid],
        endpoint_column: &str,
        link_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM work_item_dependencies \
             WHERE {endpoint_column} IN ({}){}",
            crate::storage::placeholders(ids.len()),
            active_clause("", link_filter)
        );
        let mut query = sqlx::query_as::<_, DependencyRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(exec).await.map_err(DbError::from)?;
        rows.into_iter().map(DependencyRow::into_link).collect()
    }

    /// Fetch link rows by composite key.
    pub async fn find_by_keys<'e, E>(
        &self,
        exec: E,
        keys: &[(Uuid, Uuid)],
        link_filter: ActiveFilter,
    ) -> DomainResult<Vec<DependencyLink>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let pairs = keys
            .iter()
            .map(|_| "(work_item_id = ? AND depends_on_work_item_id = ?)")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM work_item_dependencies WHERE ({pairs}){}",
            active_clause("", link_filter)
        );

        let mut query = sqlx::query_as::<_, DependencyRow>(&sql);
        for (from, to) in keys {
            query = query.bind(from.to_string()).bind(to.to_string());
        }

        let rows = query.fetch_all(exec).await.map_err(DbError::from)?;
        rows.into_iter().map(DependencyRow::into_link).collect()
    }

    /// Insert or update a single link row.
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        source: Uuid,
        target: Uuid,
        dependency_type: DependencyType,
        is_active: bool,
    ) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO work_item_dependencies \
             (work_item_id, depends_on_work_item_id, dependency_type, is_active) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (work_item_id, depends_on_work_item_id) \
             DO UPDATE SET dependency_type = excluded.dependency_type, \
                           is_active = excluded.is_active",
        )
        .bind(source.to_string())
        .bind(target.to_string())
        .bind(dependency_type.as_str())
        .bind(is_active)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        Ok(())
    }

    /// Upsert every requested link to the active state. Self-links are
    /// rejected.
    pub async fn add_or_update_dependencies(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        source: Uuid,
        dependencies: &[NewDependency],
    ) -> DomainResult<()> {
        for dep in dependencies {
            if dep.depends_on_work_item_id == source {
                return Err(ValidationError::SelfDependency {
                    id: source.to_string(),
                }
                .into());
            }
            self.upsert(
                tx,
                source,
                dep.depends_on_work_item_id,
                dep.dependency_type.unwrap_or(DependencyType::FinishToStart),
                true,
            )
            .await?;
        }
        Ok(())
    }

    /// Deactivate the currently-active links among `keys`; returns the
    /// affected count.
    pub async fn soft_delete_by_keys(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        keys: &[(Uuid, Uuid)],
    ) -> DomainResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let pairs = keys
            .iter()
            .map(|_| "(work_item_id = ? AND depends_on_work_item_id = ?)")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "UPDATE work_item_dependencies SET is_active = 0 \
             WHERE ({pairs}) AND is_active = 1"
        );

        let mut query = sqlx::query(&sql);
        for (from, to) in keys {
            query = query.bind(from.to_string()).bind(to.to_string());
        }

        let result = query.execute(&mut **tx).await.map_err(DbError::from)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Copy)]
enum LinkDirection {
    Outgoing,
    Incoming,
}
