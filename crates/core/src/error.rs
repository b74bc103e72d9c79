// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store-wide error taxonomy.
//!
//! Every public operation returns [`StoreError`]. Lower-level crates
//! (storage, engine) define their own `thiserror` enums and convert into
//! this one at the boundary via `#[from]`.

use thiserror::Error;

/// Context attached to a version-conflict error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflictCtx {
    pub entity: &'static str,
    pub id: String,
    pub expected: u64,
    pub actual: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(
        "version conflict on {ctx} (expected {expected}, actual {actual})",
        ctx = .0.entity,
        expected = .0.expected,
        actual = .0.actual
    )]
    VersionConflict(VersionConflictCtx),

    #[error("idempotency key in progress: agent={agent} request_id={request_id}")]
    IdempotencyInProgress { agent: String, request_id: String },

    #[error("claim contention on task {task_id}")]
    ClaimContention { task_id: String },

    #[error("dependency cycle: adding {depends_on} as a dependency of {task_id} would create a cycle")]
    DependencyCycle { task_id: String, depends_on: String },

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl StoreError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        StoreError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Errors which a bounded retry loop may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict(_) | StoreError::IdempotencyInProgress { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_is_retryable() {
        let err = StoreError::VersionConflict(VersionConflictCtx {
            entity: "task",
            id: "task_1".into(),
            expected: 2,
            actual: 3,
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_input_is_not_retryable() {
        let err = StoreError::invalid("title", "must not be empty");
        assert!(!err.is_retryable());
    }
}
