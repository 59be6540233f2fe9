use statmon_common::types::MetricKind;

/// Errors surfaced by the storage layer.
///
/// `InvalidMetric` marks per-request validation failures, `Unavailable` a
/// backend that did not answer its liveness ping in time; the rest wrap the
/// underlying database, file, and encoding failures.
///
/// # Examples
///
/// ```rust
/// use statmon_storage::error::StorageError;
/// use statmon_common::types::MetricKind;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Counter,
///     id: "PollCount".to_string(),
/// };
/// assert!(err.to_string().contains("PollCount"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested (kind, id) pair has never been stored.
    #[error("storage: {kind} metric '{id}' not found")]
    NotFound { kind: MetricKind, id: String },

    /// A metric entry failed validation before reaching the backend.
    #[error("storage: invalid metric: {0}")]
    InvalidMetric(String),

    /// The backend did not respond within its liveness timeout.
    #[error("storage: backend unavailable: {0}")]
    Unavailable(String),

    /// An underlying database error.
    #[error("storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Snapshot file I/O failure.
    #[error("storage: snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("storage: snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// True for errors caused by the request rather than the backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::InvalidMetric(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
