//! Transactional work-item graph with reversible history.
//!
//! `workgraph` persists a hierarchical graph of work items (projects,
//! tasks, subtasks) with typed dependency links in SQLite. Every mutation
//! runs inside a single transaction and records a replayable audit trail
//! in the same transaction, giving linear undo/redo with correct
//! redo-stack invalidation.
//!
//! Entry points: [`config::StorageConfig`] → [`storage::Database`] →
//! [`services::WorkItemService`].

pub mod config;
pub mod errors;
pub mod history;
pub mod services;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StorageConfig;
pub use history::HistoryEngine;
pub use services::{ReadingService, WorkItemService};
pub use storage::Database;

// The contract crate, re-exported so hosts depend on one name.
pub use workgraph_api as api;
