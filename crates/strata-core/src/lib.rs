//! Core services for Strata: the orchestration layer between the HTTP
//! front end and the storage, metadata, and replication subsystems.
//!
//! # Architecture
//!
//! ```text
//!        HTTP front end (out of crate)
//!               |
//!       +-------+--------+
//!       v                v
//! ObjectService    BucketService
//!   |   |   \            |
//!   |   |    \           v
//!   |   |     \    BucketRepository
//!   |   |      v
//!   |   |   ObjectRepository
//!   |   v
//!   | EventSink (replication)
//!   v
//! StorageEngine (slab allocator + device)
//! ```
//!
//! A PUT flows: allocate, stream-and-hash in 4 KiB chunks, write the
//! descriptor atomically, enqueue a replication event. Any failure before
//! the descriptor commit frees the allocation through a drop guard, so a
//! descriptor never outlives its backing range.

pub mod bucket_service;
pub mod config;
pub mod error;
pub mod integrity;
pub mod object_service;
pub mod validation;

pub use bucket_service::BucketService;
pub use config::{Config, StorageConfig};
pub use error::{ServiceError, ServiceResult};
pub use integrity::{DigestSet, IntegrityHasher};
pub use object_service::ObjectService;
