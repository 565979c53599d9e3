//! Generic row-state replay used by the history engine, plus the
//! dependency record-id codec.
//!
//! A step's `old_data`/`new_data` is a row document keyed by column name
//! and carrying the primary-key fields. Replay writes every non-key field
//! present in the document back to the addressed row. A zero-row update is
//! the benign conflict case: soft-delete semantics guarantee the row still
//! exists, so a mismatch indicates concurrent divergence, not corruption.
//! It is logged and the transaction proceeds.

use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::errors::DbError;
use crate::storage::{format_instant, now_instant};
use workgraph_api::{DomainError, DomainResult, HistoryTable};

/// Non-key columns the replayer may write, per table.
const WORK_ITEM_FIELDS: &[&str] = &[
    "parent_work_item_id",
    "name",
    "shortname",
    "description",
    "status",
    "priority",
    "order_key",
    "due_date",
    "created_at",
    "updated_at",
    "is_active",
];

const DEPENDENCY_FIELDS: &[&str] = &["dependency_type", "is_active"];

/// Serialize a dependency composite key into a step `record_id`.
pub fn encode_dependency_record_id(work_item_id: Uuid, depends_on: Uuid) -> String {
    format!("{work_item_id}:{depends_on}")
}

/// Split a dependency `record_id` on its single colon; both halves must be
/// valid identifiers.
pub fn parse_dependency_record_id(record_id: &str) -> DomainResult<(Uuid, Uuid)> {
    let mut parts = record_id.splitn(2, ':');
    let (Some(left), Some(right)) = (parts.next(), parts.next()) else {
        return Err(DomainError::internal(format!(
            "malformed dependency record id {record_id:?}"
        )));
    };
    if right.contains(':') {
        return Err(DomainError::internal(format!(
            "malformed dependency record id {record_id:?}"
        )));
    }

    let from = Uuid::parse_str(left).map_err(|e| {
        DomainError::internal(format!("malformed dependency record id {record_id:?}: {e}"))
    })?;
    let to = Uuid::parse_str(right).map_err(|e| {
        DomainError::internal(format!("malformed dependency record id {record_id:?}: {e}"))
    })?;

    Ok((from, to))
}

/// Write the fields present in `data` to the row addressed by the primary
/// key embedded in `data`. Returns the affected row count (0 on conflict).
pub async fn apply_row_state(
    tx: &mut Transaction<'_, Sqlite>,
    table: HistoryTable,
    data: &Value,
) -> DomainResult<u64> {
    let object = data.as_object().ok_or_else(|| {
        DomainError::internal("replay data is not an object".to_string())
    })?;

    let (fields, key_columns): (&[&str], &[&str]) = match table {
        HistoryTable::WorkItems => (WORK_ITEM_FIELDS, &["work_item_id"]),
        HistoryTable::WorkItemDependencies => (
            DEPENDENCY_FIELDS,
            &["work_item_id", "depends_on_work_item_id"],
        ),
    };

    let mut key_values = Vec::with_capacity(key_columns.len());
    for column in key_columns {
        let value = object.get(*column).and_then(Value::as_str).ok_or_else(|| {
            DomainError::internal(format!(
                "replay data for {} is missing key field {column}",
                table.as_str()
            ))
        })?;
        key_values.push(value.to_string());
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for column in fields {
        if let Some(value) = object.get(*column) {
            sets.push(format!("{column} = ?"));
            values.push(value.clone());
        }
    }
    // Replayed item states always move `updated_at`, even when the
    // snapshot predates the column being recorded.
    if table == HistoryTable::WorkItems && !object.contains_key("updated_at") {
        sets.push("updated_at = ?".to_string());
        values.push(Value::String(format_instant(&now_instant())));
    }

    if sets.is_empty() {
        warn!(table = table.as_str(), "replay data carries no writable fields");
        return Ok(0);
    }

    let where_clause = key_columns
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {where_clause}",
        table.as_str(),
        sets.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = bind_json_value(query, value);
    }
    for key in &key_values {
        query = query.bind(key.clone());
    }

    let result = query.execute(&mut **tx).await.map_err(DbError::from)?;
    let affected = result.rows_affected();
    if affected == 0 {
        warn!(
            table = table.as_str(),
            keys = ?key_values,
            "replay step matched no rows; treating as applied"
        );
    }

    Ok(affected)
}

fn bind_json_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        // Structured values are stored in their JSON rendering.
        other => query.bind(other.to_string()),
    }
}
