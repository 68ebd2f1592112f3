//! Service-level error kinds.
//!
//! [`ServiceError`] is what callers of the object and bucket services see.
//! The surrounding HTTP layer maps kinds to status codes (not-found to 404,
//! already-exists and not-empty to 409, storage-full to 507, invalid
//! arguments and size mismatches to 400, everything else to 500); the
//! services themselves never reason about transport.

use strata_meta::MetaError;
use strata_storage::StorageError;

/// Error type returned by the object and bucket services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// The named bucket does not exist.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// The missing bucket.
        name: String,
    },

    /// The named object does not exist.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// Bucket of the missing object.
        bucket: String,
        /// Key of the missing object.
        key: String,
    },

    /// A bucket create hit an existing name.
    #[error("bucket already exists: {name}")]
    BucketAlreadyExists {
        /// The duplicate name.
        name: String,
    },

    /// A bucket delete was attempted while objects remain.
    #[error("bucket is not empty: {name}")]
    BucketNotEmpty {
        /// The non-empty bucket.
        name: String,
    },

    /// The allocator cannot satisfy the request.
    #[error("storage full: requested {requested} bytes, {available} available")]
    StorageFull {
        /// Bytes requested.
        requested: u64,
        /// Bytes still assignable.
        available: u64,
    },

    /// Device I/O failed or transferred short.
    #[error("storage I/O failed: {source}")]
    Io {
        /// The underlying storage error.
        source: StorageError,
    },

    /// Descriptor persistence failed.
    #[error("metadata operation failed: {source}")]
    Metadata {
        /// The underlying metadata error.
        source: MetaError,
    },

    /// The payload stream ended before the declared size was reached.
    #[error("size mismatch: declared {declared} bytes, stream produced {actual}")]
    SizeMismatch {
        /// The declared payload size.
        declared: u64,
        /// Bytes actually produced by the stream.
        actual: u64,
    },

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidSize => Self::InvalidArgument {
                message: e.to_string(),
            },
            StorageError::OutOfSpace {
                requested,
                available,
            } => Self::StorageFull {
                requested,
                available,
            },
            other => Self::Io { source: other },
        }
    }
}

impl From<MetaError> for ServiceError {
    fn from(e: MetaError) -> Self {
        match e {
            MetaError::BucketNotFound { name } => Self::BucketNotFound { name },
            MetaError::ObjectNotFound { bucket, key } => Self::ObjectNotFound { bucket, key },
            MetaError::BucketAlreadyExists { name } => Self::BucketAlreadyExists { name },
            other => Self::Metadata { source: other },
        }
    }
}

/// Convenience result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
