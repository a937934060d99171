//! Error types for the sync engine.

use liftsync_model::{EntityId, EntityKind, ModelError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a remote store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The remote store could not be reached or answered with a server error.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("remote request timed out")]
    Timeout,

    /// The remote store refused the request.
    #[error("remote rejected request on {table}: {message}")]
    Rejected {
        /// Remote table.
        table: &'static str,
        /// HTTP status, when the transport has one.
        status: Option<u16>,
        /// Reason given by the remote store.
        message: String,
    },

    /// The response body did not match the expected row shape.
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true if repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout)
    }
}

/// Errors returned by a local store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No record with this id exists, not even as a tombstone.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Record id.
        id: EntityId,
    },

    /// A record with this id already exists.
    #[error("{kind} {id} already exists")]
    AlreadyExists {
        /// Entity kind.
        kind: EntityKind,
        /// Record id.
        id: EntityId,
    },

    /// The underlying storage failed.
    #[error("local storage failure: {0}")]
    Backend(String),
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local store error.
    #[error("local store error: {0}")]
    Local(#[from] StoreError),

    /// Remote store error.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// A remote response could not be mapped to the local model.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Another sync for the same user is already running.
    #[error("sync already in progress for user {user_id}")]
    SyncInProgress {
        /// User whose sync is running.
        user_id: String,
    },

    /// A phase failed terminally; later phases were not run.
    #[error("{kind} phase failed after {attempts} attempt(s): {source}")]
    PhaseFailed {
        /// Entity kind of the failed phase.
        kind: EntityKind,
        /// Attempts made.
        attempts: u32,
        /// The last error.
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Returns true if this error looks transient. Used for logging only;
    /// the retry executor retries every phase failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Local(StoreError::Backend(_)) => true,
            SyncError::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }
}
