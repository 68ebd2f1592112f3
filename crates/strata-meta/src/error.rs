//! Metadata-layer error types.

/// Error type for descriptor repositories.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// The named bucket has no descriptor on disk.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// The bucket name that was looked up.
        name: String,
    },

    /// The named object has no descriptor on disk.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// Bucket of the missing object.
        bucket: String,
        /// Key of the missing object.
        key: String,
    },

    /// A bucket create hit an existing descriptor.
    #[error("bucket already exists: {name}")]
    BucketAlreadyExists {
        /// The duplicate bucket name.
        name: String,
    },

    /// Descriptor JSON could not be produced or parsed.
    #[error("metadata serialization failed: {source}")]
    Serde {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// A filesystem operation failed.
    #[error("metadata I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

/// Convenience result type for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;
