//! Slab-based byte allocator.
//!
//! The allocator hands out offsets within a logical space `[0, total_size)`
//! using a two-tier policy tuned for a bimodal size distribution:
//!
//! - **Large objects** (`size >= slab_size`) carve one or more contiguous
//!   slabs at the high-water mark. The unused tail of the final slab is
//!   permanently wasted for that allocation; simplicity is preferred over
//!   tail reclamation.
//! - **Small objects** are packed into existing small slabs (those of size
//!   exactly `slab_size`) first-fit, scanned in slab-offset order. Since
//!   slabs are only ever created at the high-water mark, offset order is
//!   also creation order, so the scan is deterministic.
//!
//! Freed fragments decrement the usage counters, but space below the
//! high-water mark is never handed back for new slabs; `free_bytes` in
//! [`AllocatorStats`] is therefore `total - high_water`, not
//! `total - used`. Empty slabs are retained so they stay eligible for
//! future packing.
//!
//! All state is plain in-memory data behind a single mutex; no operation
//! performs I/O.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{StorageError, StorageResult};

/// A live byte range within a slab belonging to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fragment {
    offset: u64,
    size: u64,
}

/// A contiguous allocation unit. Small-object slabs have size exactly
/// `slab_size`; large-object slabs span a multiple of it.
#[derive(Debug)]
struct Slab {
    offset: u64,
    size: u64,
    used: u64,
    fragments: Vec<Fragment>,
}

#[derive(Debug, Default)]
struct AllocatorState {
    /// Slab records keyed by slab start offset.
    slabs: BTreeMap<u64, Slab>,
    /// Sum of sizes of all live fragments.
    used_bytes: u64,
    /// High-water mark: new slabs are always created here.
    next_offset: u64,
}

/// Allocation statistics.
///
/// `free_bytes` is the space still assignable via new slabs
/// (`total - high_water`); freed prefixes below the high-water mark are not
/// counted as free because the current strategy cannot reuse them for new
/// slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total byte budget of the logical space.
    pub total_bytes: u64,
    /// Sum of sizes of all live fragments.
    pub used_bytes: u64,
    /// Bytes above the high-water mark.
    pub free_bytes: u64,
}

/// Slab allocator over a logical byte space of fixed total size.
///
/// Thread-safe: all operations serialize on an internal mutex held only for
/// the duration of the in-memory bookkeeping.
///
/// # Examples
///
/// ```
/// use strata_storage::SlabAllocator;
///
/// let allocator = SlabAllocator::new(64 * 1024 * 1024, 4 * 1024 * 1024);
/// let offset = allocator.allocate(13).unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(allocator.stats().used_bytes, 13);
/// allocator.free(offset, 13).unwrap();
/// assert_eq!(allocator.stats().used_bytes, 0);
/// ```
#[derive(Debug)]
pub struct SlabAllocator {
    slab_size: u64,
    total_size: u64,
    state: Mutex<AllocatorState>,
}

impl SlabAllocator {
    /// Create an allocator over `total_size` bytes with the given slab size.
    #[must_use]
    pub fn new(total_size: u64, slab_size: u64) -> Self {
        Self {
            slab_size,
            total_size,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Slab size governing the small/large allocation threshold.
    #[must_use]
    pub fn slab_size(&self) -> u64 {
        self.slab_size
    }

    /// Allocate `size` bytes and return the assigned offset.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidSize`] if `size` is zero.
    /// - [`StorageError::OutOfSpace`] if the request cannot be satisfied
    ///   above the high-water mark.
    pub fn allocate(&self, size: u64) -> StorageResult<u64> {
        if size == 0 {
            return Err(StorageError::InvalidSize);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Large objects get dedicated slab spans.
        if size >= self.slab_size {
            let slabs_needed = size.div_ceil(self.slab_size);
            let span = slabs_needed * self.slab_size;

            let offset = self.reserve_span(state, size, span)?;
            state.slabs.insert(
                offset,
                Slab {
                    offset,
                    size: span,
                    used: size,
                    fragments: vec![Fragment { offset, size }],
                },
            );
            state.used_bytes += size;
            trace!(offset, size, span, "allocated dedicated slab span");
            return Ok(offset);
        }

        // Small objects: first-fit scan over small slabs in offset order.
        for slab in state.slabs.values_mut() {
            if slab.size == self.slab_size && slab.used + size <= slab.size {
                let fragment_offset = slab.offset + slab.used;
                slab.fragments.push(Fragment {
                    offset: fragment_offset,
                    size,
                });
                slab.used += size;
                state.used_bytes += size;
                trace!(
                    offset = fragment_offset,
                    size,
                    slab = slab.offset,
                    "packed fragment into existing slab"
                );
                return Ok(fragment_offset);
            }
        }

        // No existing slab has room; open a fresh one at the high-water mark.
        let offset = self.reserve_span(state, size, self.slab_size)?;
        state.slabs.insert(
            offset,
            Slab {
                offset,
                size: self.slab_size,
                used: size,
                fragments: vec![Fragment { offset, size }],
            },
        );
        state.used_bytes += size;
        trace!(offset, size, "opened new small slab");
        Ok(offset)
    }

    /// Release the fragment previously returned by [`SlabAllocator::allocate`].
    ///
    /// The `(offset, size)` pair must match a live fragment exactly. Empty
    /// slabs are retained: their range lies below the high-water mark and
    /// cannot back new slabs, but they remain eligible for packing.
    ///
    /// # Errors
    ///
    /// - [`StorageError::SlabNotFound`] if no slab contains `offset`.
    /// - [`StorageError::FragmentNotFound`] if the slab holds no fragment
    ///   matching `(offset, size)`.
    pub fn free(&self, offset: u64, size: u64) -> StorageResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let slab = state
            .slabs
            .range_mut(..=offset)
            .next_back()
            .map(|(_, slab)| slab)
            .filter(|slab| offset < slab.offset + slab.size)
            .ok_or(StorageError::SlabNotFound { offset })?;

        let index = slab
            .fragments
            .iter()
            .position(|f| f.offset == offset && f.size == size)
            .ok_or(StorageError::FragmentNotFound { offset, size })?;

        slab.fragments.remove(index);
        slab.used -= size;
        state.used_bytes -= size;
        trace!(offset, size, "freed fragment");
        Ok(())
    }

    /// Current allocation statistics.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.lock();
        AllocatorStats {
            total_bytes: self.total_size,
            used_bytes: state.used_bytes,
            free_bytes: self.total_size - state.next_offset,
        }
    }

    /// Reserve `span` bytes at the high-water mark, advancing it.
    fn reserve_span(
        &self,
        state: &mut AllocatorState,
        requested: u64,
        span: u64,
    ) -> StorageResult<u64> {
        if state.next_offset + span > self.total_size {
            return Err(StorageError::OutOfSpace {
                requested,
                available: self.total_size - state.next_offset,
            });
        }
        let offset = state.next_offset;
        state.next_offset += span;
        Ok(offset)
    }
}
