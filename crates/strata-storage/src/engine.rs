//! Storage engine façade.
//!
//! [`SlabEngine`] composes a [`Device`] and a [`SlabAllocator`] behind the
//! [`StorageEngine`] trait. The engine's only non-trivial job is the locking
//! discipline: the allocator serializes itself, so `allocate` and `free`
//! bypass the engine lock entirely, while device I/O takes a reader/writer
//! lock that keeps `close` exclusive with in-flight reads and writes. Many
//! concurrent PUTs can therefore obtain placements while payload I/O for
//! other objects is still streaming.

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::allocator::{AllocatorStats, SlabAllocator};
use crate::block::BlockIo;
use crate::device::Device;
use crate::error::StorageResult;

/// Byte-addressed storage with allocator-managed placement.
///
/// Implementations must be safe to share across threads; all methods take
/// `&self`.
pub trait StorageEngine: Send + Sync {
    /// Open the backing store. Idempotent.
    fn open(&self) -> StorageResult<()>;

    /// Close the backing store, waiting out in-flight I/O.
    fn close(&self) -> StorageResult<()>;

    /// Read exactly `len` bytes at `offset`.
    fn read(&self, offset: u64, len: u64) -> StorageResult<Bytes>;

    /// Write `data` at `offset`.
    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Reserve `size` bytes and return the assigned offset.
    fn allocate(&self, size: u64) -> StorageResult<u64>;

    /// Release a range previously returned by `allocate`.
    fn free(&self, offset: u64, size: u64) -> StorageResult<()>;

    /// Durability barrier: flush written data to stable storage.
    fn sync(&self) -> StorageResult<()>;

    /// Current allocation statistics.
    fn stats(&self) -> AllocatorStats;

    /// Nominal block size (also the slab size) for alignment hints.
    fn block_size(&self) -> u64;

    /// Read one block at block-granular `index`.
    fn read_block(&self, index: u64) -> StorageResult<Bytes>;

    /// Write one full block at block-granular `index`.
    fn write_block(&self, index: u64, data: &[u8]) -> StorageResult<()>;
}

/// [`StorageEngine`] backed by slab allocation over a single device.
///
/// The device opens lazily: constructing the engine never touches the
/// filesystem, and the first read, write, or sync opens the backing store on
/// demand. An explicit [`StorageEngine::open`] at startup surfaces
/// configuration problems early but is optional.
#[derive(Debug)]
pub struct SlabEngine {
    device: RwLock<Device>,
    allocator: SlabAllocator,
    block_size: u64,
}

impl SlabEngine {
    /// Create an engine over the backing store at `path` with a logical
    /// space of `total_size` bytes and the given slab/block size.
    #[must_use]
    pub fn new(path: impl AsRef<std::path::Path>, total_size: u64, block_size: u64) -> Self {
        Self {
            device: RwLock::new(Device::new(path, block_size)),
            allocator: SlabAllocator::new(total_size, block_size),
            block_size,
        }
    }

    /// Open the device under the writer lock if it is not open yet.
    fn ensure_open(&self) -> StorageResult<()> {
        {
            let device = self.device.read();
            if device.is_open() {
                return Ok(());
            }
        }
        let mut device = self.device.write();
        if !device.is_open() {
            warn!(path = %device.path().display(), "backing store not yet opened, opening lazily");
            device.open()?;
        }
        Ok(())
    }
}

impl StorageEngine for SlabEngine {
    fn open(&self) -> StorageResult<()> {
        let mut device = self.device.write();
        device.open()?;
        debug!(
            path = %device.path().display(),
            size = device.size(),
            block_size = self.block_size,
            "storage engine opened"
        );
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.device.write().close();
        Ok(())
    }

    fn read(&self, offset: u64, len: u64) -> StorageResult<Bytes> {
        self.ensure_open()?;
        self.device.read().read(offset, len)
    }

    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.ensure_open()?;
        self.device.write().write(offset, data)
    }

    fn allocate(&self, size: u64) -> StorageResult<u64> {
        // The allocator carries its own mutex; taking the engine lock here
        // would needlessly serialize placement against payload I/O.
        self.allocator.allocate(size)
    }

    fn free(&self, offset: u64, size: u64) -> StorageResult<()> {
        self.allocator.free(offset, size)
    }

    fn sync(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.device.write().sync()
    }

    fn stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn read_block(&self, index: u64) -> StorageResult<Bytes> {
        self.ensure_open()?;
        let device = self.device.read();
        BlockIo::new(&device, self.block_size).read_block(index)
    }

    fn write_block(&self, index: u64, data: &[u8]) -> StorageResult<()> {
        self.ensure_open()?;
        let device = self.device.write();
        BlockIo::new(&device, self.block_size).write_block(index, data)
    }
}
