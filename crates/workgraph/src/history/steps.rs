//! Builders for the row documents stored in `old_data` / `new_data`.
//!
//! Documents are keyed by column name and always embed the primary-key
//! fields so the replayer can address the row. Soft-delete semantics mean
//! every forward mutation is expressible as an UPDATE on an existing row:
//! creation is recorded as "inactive → full active row", deletion as
//! "full active row → deactivation marker".

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::storage::format_instant;
use workgraph_api::{DependencyLink, WorkItem};

/// Full row document for a work item.
pub fn work_item_snapshot(item: &WorkItem) -> Value {
    json!({
        "work_item_id": item.work_item_id.to_string(),
        "parent_work_item_id": item.parent_work_item_id.map(|id| id.to_string()),
        "name": item.name,
        "shortname": item.shortname,
        "description": item.description,
        "status": item.status.as_str(),
        "priority": item.priority.as_str(),
        "order_key": item.order_key,
        "due_date": item.due_date.map(|d| format_instant(&d)),
        "created_at": format_instant(&item.created_at),
        "updated_at": format_instant(&item.updated_at),
        "is_active": item.is_active,
    })
}

/// Deactivation marker for a work item: the state undo leaves an added
/// row in, and the state a cascade delete moves a row to.
pub fn work_item_deactivation(id: Uuid) -> Value {
    json!({
        "work_item_id": id.to_string(),
        "is_active": false,
    })
}

/// Single-column change document for the field-update services.
pub fn work_item_field_change(
    id: Uuid,
    column: &str,
    value: Value,
    updated_at: &DateTime<Utc>,
) -> Value {
    json!({
        "work_item_id": id.to_string(),
        column: value,
        "updated_at": format_instant(updated_at),
    })
}

/// Parent/position change document for promote-to-root.
pub fn work_item_placement(
    id: Uuid,
    parent: Option<Uuid>,
    order_key: Option<&str>,
    updated_at: &DateTime<Utc>,
) -> Value {
    json!({
        "work_item_id": id.to_string(),
        "parent_work_item_id": parent.map(|p| p.to_string()),
        "order_key": order_key,
        "updated_at": format_instant(updated_at),
    })
}

/// Full row document for a dependency link.
pub fn dependency_snapshot(link: &DependencyLink) -> Value {
    json!({
        "work_item_id": link.work_item_id.to_string(),
        "depends_on_work_item_id": link.depends_on_work_item_id.to_string(),
        "dependency_type": link.dependency_type.as_str(),
        "is_active": link.is_active,
    })
}

/// Deactivation marker for a dependency link. Also used as the "before"
/// state of a link that did not exist yet: after the forward mutation the
/// row exists, so undo only needs to deactivate it.
pub fn dependency_deactivation(work_item_id: Uuid, depends_on: Uuid) -> Value {
    json!({
        "work_item_id": work_item_id.to_string(),
        "depends_on_work_item_id": depends_on.to_string(),
        "is_active": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use workgraph_api::{DependencyType, Priority, Status};

    fn sample_item() -> WorkItem {
        let now = crate::storage::now_instant();
        WorkItem {
            work_item_id: Uuid::new_v4(),
            parent_work_item_id: None,
            name: "Sample".to_string(),
            shortname: None,
            description: Some("text".to_string()),
            status: Status::Todo,
            priority: Priority::Medium,
            order_key: Some("80".to_string()),
            due_date: None,
            created_at: now,
            updated_at: now,
            is_active: true,
        }
    }

    #[test]
    fn snapshot_embeds_primary_key_and_all_columns() {
        let item = sample_item();
        let doc = work_item_snapshot(&item);
        let object = doc.as_object().unwrap();

        assert_eq!(
            object.get("work_item_id").unwrap().as_str().unwrap(),
            item.work_item_id.to_string()
        );
        assert!(object.get("parent_work_item_id").unwrap().is_null());
        assert_eq!(object.get("status").unwrap(), "todo");
        assert_eq!(object.get("is_active").unwrap(), &json!(true));
        assert_eq!(object.len(), 12);
    }

    #[test]
    fn deactivation_marker_is_minimal() {
        let id = Uuid::new_v4();
        let doc = work_item_deactivation(id);
        let object = doc.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object.get("is_active").unwrap(), &json!(false));
    }

    #[test]
    fn field_change_carries_column_and_updated_at() {
        let id = Uuid::new_v4();
        let now = crate::storage::now_instant();
        let doc = work_item_field_change(id, "name", json!("New"), &now);
        let object = doc.as_object().unwrap();
        assert_eq!(object.get("name").unwrap(), "New");
        assert!(object.contains_key("updated_at"));
        assert_eq!(object.len(), 3);
    }

    #[test]
    fn dependency_documents_carry_the_composite_key() {
        let link = DependencyLink {
            work_item_id: Uuid::new_v4(),
            depends_on_work_item_id: Uuid::new_v4(),
            dependency_type: DependencyType::Linked,
            is_active: true,
        };
        let doc = dependency_snapshot(&link);
        assert_eq!(doc.get("dependency_type").unwrap(), "linked");

        let marker = dependency_deactivation(link.work_item_id, link.depends_on_work_item_id);
        assert_eq!(
            marker.get("work_item_id").unwrap().as_str().unwrap(),
            link.work_item_id.to_string()
        );
        assert_eq!(marker.get("is_active").unwrap(), &json!(false));
    }
}
