//! First-run DDL for the four core tables.
//!
//! Table and column names are normative: history rows reference
//! `work_items` and `work_item_dependencies` by name, and step documents
//! are keyed by column name.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::errors::DbError;
use workgraph_api::DomainResult;

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS work_items (
        work_item_id TEXT PRIMARY KEY,
        parent_work_item_id TEXT REFERENCES work_items(work_item_id),
        name TEXT NOT NULL,
        shortname TEXT,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'todo',
        priority TEXT NOT NULL DEFAULT 'medium',
        order_key TEXT,
        due_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS idx_work_items_parent
        ON work_items(parent_work_item_id)",
    "CREATE INDEX IF NOT EXISTS idx_work_items_active
        ON work_items(is_active)",
    "CREATE TABLE IF NOT EXISTS work_item_dependencies (
        work_item_id TEXT NOT NULL REFERENCES work_items(work_item_id),
        depends_on_work_item_id TEXT NOT NULL REFERENCES work_items(work_item_id),
        dependency_type TEXT NOT NULL DEFAULT 'finish-to-start',
        is_active INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (work_item_id, depends_on_work_item_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_target
        ON work_item_dependencies(depends_on_work_item_id)",
    "CREATE TABLE IF NOT EXISTS action_history (
        action_id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        action_type TEXT NOT NULL,
        work_item_id TEXT,
        description TEXT NOT NULL,
        is_undone INTEGER NOT NULL DEFAULT 0,
        undone_at_action_id TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_action_history_timestamp
        ON action_history(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_action_history_type
        ON action_history(action_type, is_undone)",
    "CREATE TABLE IF NOT EXISTS undo_steps (
        undo_step_id TEXT PRIMARY KEY,
        action_id TEXT NOT NULL REFERENCES action_history(action_id),
        step_order INTEGER NOT NULL,
        step_type TEXT NOT NULL DEFAULT 'UPDATE',
        table_name TEXT NOT NULL,
        record_id TEXT NOT NULL,
        old_data TEXT NOT NULL,
        new_data TEXT NOT NULL,
        UNIQUE (action_id, step_order)
    )",
];

/// Create tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> DomainResult<()> {
    for statement in DDL {
        debug!(statement, "applying schema statement");
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(DbError::from)?;
    }
    info!("database schema initialized");
    Ok(())
}
