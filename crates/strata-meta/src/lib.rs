//! Metadata persistence for Strata: bucket and object descriptors stored as
//! individual JSON files under a metadata root.
//!
//! Layout on disk:
//!
//! ```text
//! <metadata_root>/
//!   buckets/<sanitized-bucket>.json
//!   objects/<sanitized-bucket>/<sanitized-key>.meta
//! ```
//!
//! All writes go through temp-file + atomic rename, so readers never observe
//! partially written descriptors. The bucket repository serializes
//! create/delete against list with one reader/writer lock over the whole
//! namespace; the object repository holds no global lock and relies on
//! rename atomicity alone, which keeps many concurrent keys cheap.

pub mod bucket;
pub mod error;
pub mod object;
pub mod util;

pub use bucket::{BucketDescriptor, BucketRepository, LifecycleRule, VersioningStatus};
pub use error::{MetaError, MetaResult};
pub use object::{ChecksumRecord, ListOptions, ListResult, ObjectDescriptor, ObjectRepository};

/// Default page size for listings when the caller does not specify one.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Hard cap on listing page size.
pub const MAX_KEYS_LIMIT: usize = 10_000;
