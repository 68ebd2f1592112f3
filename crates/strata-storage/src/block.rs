//! Block-granular I/O over a [`Device`].
//!
//! [`BlockIo`] addresses the backing store as an array of fixed-size blocks
//! and refuses writes that are not exactly one block long. This is the
//! aligned counterpart to the free-form reads and writes on [`Device`]; the
//! engine exposes it for callers that choose to align their I/O.

use bytes::Bytes;

use crate::device::Device;
use crate::error::{StorageError, StorageResult};

/// Fixed-granularity view over a device.
#[derive(Debug)]
pub struct BlockIo<'a> {
    device: &'a Device,
    block_size: u64,
}

impl<'a> BlockIo<'a> {
    /// Create a block-granular view with the given block size.
    #[must_use]
    pub fn new(device: &'a Device, block_size: u64) -> Self {
        Self { device, block_size }
    }

    /// Read the block at `index`.
    ///
    /// # Errors
    ///
    /// Propagates device errors; a block that extends past the end of the
    /// backing store surfaces as [`StorageError::ShortRead`].
    pub fn read_block(&self, index: u64) -> StorageResult<Bytes> {
        self.device.read(index * self.block_size, self.block_size)
    }

    /// Write one full block at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BlockSizeMismatch`] unless `data` is exactly
    /// one block long; otherwise propagates device errors.
    pub fn write_block(&self, index: u64, data: &[u8]) -> StorageResult<()> {
        if data.len() as u64 != self.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size,
                actual: data.len(),
            });
        }
        self.device.write(index * self.block_size, data)
    }
}
