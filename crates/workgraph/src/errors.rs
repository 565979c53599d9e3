//! Bridging from storage-level failures to the service error taxonomy.

use thiserror::Error;
use workgraph_api::DomainError;

/// Wrapper for sqlx failures so `?` can lift them into [`DomainError`].
///
/// Usage: `.map_err(DbError::from)?` inside any function returning
/// `DomainResult`.
#[derive(Debug, Error)]
#[error("database error: {0}")]
pub struct DbError(#[from] pub sqlx::Error);

impl From<DbError> for DomainError {
    fn from(err: DbError) -> Self {
        DomainError::Database(err.0.to_string())
    }
}
