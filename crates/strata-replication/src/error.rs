//! Replication-layer error types.
//!
//! Transport and remote-status failures are transient: the dispatcher
//! retries them up to the configured attempt budget. [`ReplicationError::
//! RetriesExhausted`] is the permanent outcome recorded against the event;
//! it never propagates to the origin path.

use strata_storage::StorageError;

/// Error type for event delivery.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The HTTP request could not be completed.
    #[error("replication request failed: {source}")]
    Transport {
        /// The underlying client error.
        #[from]
        source: reqwest::Error,
    },

    /// The remote peer answered with an unexpected status.
    #[error("remote returned {status} for event {event_id}")]
    RemoteStatus {
        /// The HTTP status code received.
        status: u16,
        /// The event that was being delivered.
        event_id: String,
    },

    /// A PUT event carried no payload to deliver.
    #[error("event {event_id} has no payload carrier")]
    MissingPayload {
        /// The event missing its payload.
        event_id: String,
    },

    /// Reading a storage-pointer payload from the local engine failed.
    #[error("reading payload from storage failed: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: StorageError,
    },

    /// All delivery attempts for an event failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made (initial + retries).
        attempts: u32,
        /// The error from the final attempt.
        last: Box<ReplicationError>,
    },
}

/// Convenience result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
