//! Persistence layer: connection management, schema, repositories and the
//! replay primitive used by the history engine.

pub mod db;
pub mod dependencies;
pub mod fractional_index;
pub mod history;
pub mod replay;
pub mod schema;
pub mod work_items;


pub use db::Database;
pub use dependencies::DependencyRepository;
pub use history::{ActionHistoryRepository, NewAction, NewUndoStep};
pub use work_items::{NeighbourSide, SiblingEdge, WorkItemRepository};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use workgraph_api::{ActiveFilter, DomainError, DomainResult};

/// Render an instant for storage. Fixed-width fractional seconds keep the
/// lexicographic order of stored strings identical to chronological order.
pub(crate) fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_instant() -> DateTime<Utc> {
    // Truncated to the precision we store, so values survive a round trip.
    let now = Utc::now();
    parse_instant(&format_instant(&now)).unwrap_or(now)
}

pub(crate) fn parse_instant(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::internal(format!("invalid stored timestamp {s:?}: {e}")))
}

pub(crate) fn parse_stored_id(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| DomainError::internal(format!("invalid stored identifier {s:?}: {e}")))
}

/// SQL fragment restricting `is_active`, prefixed with ` AND `. `alias`
/// is either empty or a table alias including the trailing dot.
pub(crate) fn active_clause(alias: &str, filter: ActiveFilter) -> String {
    match filter {
        ActiveFilter::Active => format!(" AND {alias}is_active = 1"),
        ActiveFilter::Inactive => format!(" AND {alias}is_active = 0"),
        ActiveFilter::Any => String::new(),
    }
}

/// `?, ?, …` with one placeholder per element.
pub(crate) fn placeholders(count: usize) -> String {
    let mut s = String::new();
    for i in 0..count {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}
