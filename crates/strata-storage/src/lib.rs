//! Storage layer for Strata: a slab-allocated byte store over a single
//! backing file or raw block device.
//!
//! The layer is composed of three parts, leaves first:
//!
//! - [`Device`] -- positional I/O against the backing file descriptor
//! - [`SlabAllocator`] -- in-memory bookkeeping of byte ranges within the
//!   logical space `[0, total_size)`
//! - [`SlabEngine`] -- the façade composing both behind the
//!   [`StorageEngine`] trait
//!
//! # Architecture
//!
//! ```text
//! ObjectService
//!      |
//!      v
//! StorageEngine (trait)
//!      |
//!      v
//!  SlabEngine
//!    /    \
//!   v      v
//! Device  SlabAllocator
//! ```
//!
//! # Locking
//!
//! The allocator is serialized by its own mutex and never performs I/O under
//! it. The engine guards the device handle with a reader/writer lock so that
//! reads proceed in parallel while writes, syncs, and open/close are
//! exclusive. `allocate` and `free` never take the engine lock, which lets
//! placement decisions proceed while payload I/O is in flight.

pub mod allocator;
pub mod block;
pub mod device;
pub mod engine;
pub mod error;

pub use allocator::{AllocatorStats, SlabAllocator};
pub use block::BlockIo;
pub use device::Device;
pub use engine::{SlabEngine, StorageEngine};
pub use error::{StorageError, StorageResult};

/// Default slab size (4 MiB). Objects at or above this size receive
/// dedicated slabs; smaller objects are packed together.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;
