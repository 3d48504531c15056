use thiserror::Error;

/// A status string that does not belong to the named vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value:?}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Failure surfaced by any persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's stored version no longer matches the version the writer loaded.
    #[error("stale write on {entity} {id}: expected version {expected}")]
    StaleWrite {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn stale(entity: &'static str, id: impl ToString, expected: i64) -> Self {
        StoreError::StaleWrite {
            entity,
            id: id.to_string(),
            expected,
        }
    }
}
