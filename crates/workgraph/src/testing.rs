//! Shared helpers for the in-crate test suites.

use crate::services::WorkItemService;
use crate::storage::Database;
use uuid::Uuid;
use workgraph_api::NewWorkItem;

pub(crate) async fn memory_database() -> Database {
    Database::in_memory().await.expect("in-memory database")
}

pub(crate) async fn memory_service() -> WorkItemService {
    WorkItemService::new(memory_database().await)
}

pub(crate) fn new_item(name: &str) -> NewWorkItem {
    NewWorkItem {
        name: name.to_string(),
        ..Default::default()
    }
}

pub(crate) fn new_child(name: &str, parent: Uuid) -> NewWorkItem {
    NewWorkItem {
        name: name.to_string(),
        parent_work_item_id: Some(parent),
        ..Default::default()
    }
}
