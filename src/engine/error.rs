use ulid::Ulid;

use crate::model::{BookingId, BookingStatus, PropertyId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Malformed, backdated or out-of-range stay. Caller error, not retried.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// The stay overlaps these active bookings.
    #[error("conflict with bookings: {}", join_ids(.0))]
    Conflict(Vec<BookingId>),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("property not found: {0}")]
    PropertyNotFound(PropertyId),
    #[error("booking {id} is {status}")]
    InvalidState { id: BookingId, status: BookingStatus },
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("nightly price must be positive")]
    InvalidPrice,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Journal or directory failure. Safe for the caller to retry with backoff.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StorageUnavailable(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval(_) => "invalid_interval",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::PropertyNotFound(_) => "property_not_found",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidPrice => "invalid_price",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

fn join_ids(ids: &[BookingId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_lists_every_id() {
        let a = Ulid::new();
        let b = Ulid::new();
        let msg = EngineError::Conflict(vec![a, b]).to_string();
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(EngineError::StorageUnavailable("disk full".into()).is_retryable());
        assert!(!EngineError::Conflict(vec![]).is_retryable());
        assert!(!EngineError::InvalidInterval("x".into()).is_retryable());
    }

    #[test]
    fn invalid_state_message() {
        let id = Ulid::new();
        let err = EngineError::InvalidState {
            id,
            status: BookingStatus::Cancelled,
        };
        assert_eq!(err.to_string(), format!("booking {id} is cancelled"));
        assert_eq!(err.kind(), "invalid_state");
    }
}
