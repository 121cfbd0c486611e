use serde::{Deserialize, Serialize};
use wardrobe_types::TypeError;

/// Closed classification of data-source failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    NotFound,
    Conflict,
    Validation,
}

/// Failure reported by an [`EntitySource`](crate::traits::EntitySource).
///
/// `Display` is exactly the underlying message so callers can surface it
/// verbatim; classification goes through [`SourceError::kind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Network(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Validation(m) => m,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<TypeError> for SourceError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Errors returned by entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The data source rejected the request.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Another optimistic mutation of the same id has not settled yet.
    #[error("a mutation of {0} is already pending")]
    MutationPending(String),

    /// The store already has a running auto-refresh scheduler.
    #[error("auto-refresh already running for {0}")]
    SchedulerActive(String),
}

impl StoreError {
    /// Source error classification, if this came from the data source.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Source(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for data-source calls.
pub type SourceResult<T> = Result<T, SourceError>;
