//! Storage-layer error types.
//!
//! [`StorageError`] covers allocator failures (invalid sizes, exhaustion,
//! missing fragments) and device failures (short transfers, I/O errors).
//! Higher layers map these onto their own error kinds; see the service
//! error type in `strata-core`.

/// Error type for device and allocator operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested allocation size was zero.
    #[error("allocation size must be greater than zero")]
    InvalidSize,

    /// The allocator cannot satisfy the request within the remaining space.
    #[error("out of space: requested {requested} bytes, {available} available")]
    OutOfSpace {
        /// Bytes requested by the caller.
        requested: u64,
        /// Bytes still assignable via new slabs.
        available: u64,
    },

    /// No slab contains the given offset.
    #[error("no slab contains offset {offset}")]
    SlabNotFound {
        /// The offset that was looked up.
        offset: u64,
    },

    /// No live fragment matches the given `(offset, size)` pair exactly.
    #[error("no fragment at offset {offset} with size {size}")]
    FragmentNotFound {
        /// The fragment offset that was looked up.
        offset: u64,
        /// The fragment size that was looked up.
        size: u64,
    },

    /// A read returned fewer bytes than requested.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Offset of the read.
        offset: u64,
        /// Bytes requested.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// A write persisted fewer bytes than provided.
    #[error("short write at offset {offset}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        /// Offset of the write.
        offset: u64,
        /// Bytes provided.
        expected: usize,
        /// Bytes actually written.
        actual: usize,
    },

    /// Block-granular I/O was attempted with a buffer that is not exactly
    /// one block long.
    #[error("block data must be exactly {expected} bytes, got {actual}")]
    BlockSizeMismatch {
        /// The configured block size.
        expected: u64,
        /// The length of the provided buffer.
        actual: usize,
    },

    /// The device has not been opened yet.
    #[error("device {path} is not open")]
    NotOpen {
        /// Path of the backing store.
        path: String,
    },

    /// An underlying I/O operation failed.
    #[error("device I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
