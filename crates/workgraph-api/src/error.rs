//! Structured error taxonomy for the service surface.
//!
//! Two kinds are surfaced to callers: `NotFound` (a referenced id does not
//! exist) and `Validation` (a logical precondition was violated). Database
//! and internal failures roll the owning transaction back and propagate
//! unchanged. Replay conflicts (a step updating zero rows) are not errors;
//! they are logged and the transaction proceeds.

use serde::{Deserialize, Serialize};

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum DomainError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DomainError::Internal(message.into())
    }
}

/// Logical precondition violations. The distinction between a missing row
/// and an inactive one matters to callers, so both shapes are kept.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("Work item name must not be empty")]
    EmptyName,

    #[error("Work item {id} is inactive")]
    InactiveWorkItem { id: String },

    #[error("Parent work item {id} is inactive")]
    InactiveParent { id: String },

    #[error("A work item cannot depend on itself: {id}")]
    SelfDependency { id: String },

    #[error("Dependency target {id} is inactive")]
    InactiveDependencyTarget { id: String },

    #[error("No dependency link exists from {from} to {to}")]
    MissingDependencyLink { from: String, to: String },

    #[error("Dependency link from {from} to {to} is already inactive")]
    InactiveDependencyLink { from: String, to: String },

    #[error("Cannot position work item {id} relative to itself")]
    MoveOntoSelf { id: String },

    #[error("Work item {pivot} is not an active sibling of {id}")]
    NotASibling { id: String, pivot: String },

    #[error("Cyclic parent assignment: {id} cannot be placed under {target}")]
    CyclicParent { id: String, target: String },

    #[error("Work item {id} is already a root")]
    AlreadyRoot { id: String },

    #[error("Malformed identifier: {0}")]
    MalformedId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = DomainError::not_found("work item", "abc");
        assert_eq!(err.to_string(), "work item not found: abc");
    }

    #[test]
    fn validation_messages_distinguish_missing_from_inactive() {
        let missing = ValidationError::MissingDependencyLink {
            from: "a".into(),
            to: "b".into(),
        };
        let inactive = ValidationError::InactiveDependencyLink {
            from: "a".into(),
            to: "b".into(),
        };
        assert!(missing.to_string().contains("No dependency link"));
        assert!(inactive.to_string().contains("already inactive"));
    }

    #[test]
    fn validation_converts_into_domain_error() {
        let err: DomainError = ValidationError::EmptyName.into();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
