//! Positional I/O against the backing file or raw block device.
//!
//! A [`Device`] wraps a single file descriptor and exposes offset-addressed
//! reads and writes plus a durability barrier ([`Device::sync`]). Short
//! transfers are surfaced as errors rather than silently truncated. The
//! device records a nominal block size as an alignment hint but does not
//! enforce alignment on general reads and writes; callers that choose to
//! align can go through [`crate::BlockIo`].

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Handle to the backing store.
///
/// The file is not opened at construction time; call [`Device::open`] first,
/// or let the engine open it lazily on first use.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    block_size: u64,
    file: Option<File>,
    size: u64,
}

impl Device {
    /// Create a new device handle for the given path. Does not touch the
    /// filesystem.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, block_size: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            block_size,
            file: None,
            size: 0,
        }
    }

    /// Open the backing store for reading and writing and record its size.
    ///
    /// For regular files the size comes from metadata; block devices report
    /// their capacity the same way on the platforms we target.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the path cannot be opened or stat'ed.
    pub fn open(&mut self) -> StorageResult<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        let size = file.metadata()?.len();

        debug!(path = %self.path.display(), size, "opened backing store");
        self.file = Some(file);
        self.size = size;
        Ok(())
    }

    /// Close the backing store. A no-op if it was never opened.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "closed backing store");
        }
    }

    /// Whether the backing store is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the backing store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nominal block size recorded for alignment hints.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Size of the backing store in bytes, as recorded at open time.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotOpen`] if the device has not been opened.
    /// - [`StorageError::ShortRead`] if fewer than `len` bytes are available.
    /// - [`StorageError::Io`] on an underlying read failure.
    pub fn read(&self, offset: u64, len: u64) -> StorageResult<Bytes> {
        let file = self.file()?;

        let mut buf = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(StorageError::ShortRead {
                    offset,
                    expected: len,
                    actual: filled as u64,
                });
            }
            filled += n;
        }

        Ok(Bytes::from(buf))
    }

    /// Write all of `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotOpen`] if the device has not been opened.
    /// - [`StorageError::ShortWrite`] if the kernel accepts fewer bytes than
    ///   provided.
    /// - [`StorageError::Io`] on an underlying write failure.
    pub fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let file = self.file()?;

        let mut written = 0usize;
        while written < data.len() {
            let n = file.write_at(&data[written..], offset + written as u64)?;
            if n == 0 {
                return Err(StorageError::ShortWrite {
                    offset,
                    expected: data.len(),
                    actual: written,
                });
            }
            written += n;
        }

        Ok(())
    }

    /// Flush all written data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotOpen`] or [`StorageError::Io`].
    pub fn sync(&self) -> StorageResult<()> {
        self.file()?.sync_all()?;
        Ok(())
    }

    fn file(&self) -> StorageResult<&File> {
        self.file.as_ref().ok_or_else(|| StorageError::NotOpen {
            path: self.path.display().to_string(),
        })
    }
}
