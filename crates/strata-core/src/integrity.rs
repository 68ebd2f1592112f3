//! Streaming multi-hash integrity calculator.
//!
//! [`IntegrityHasher`] updates three digests in a single pass over the
//! payload: MD5 (the ETag, for client compatibility), SHA-256 (the durable
//! content checksum), and CRC32 with the Castagnoli polynomial (cheap future
//! integrity checks). All three are returned hex-encoded by
//! [`IntegrityHasher::finish`].

use digest::Digest;

/// Hex digests produced over one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSet {
    /// Hex-encoded MD5 digest.
    pub md5_hex: String,
    /// Hex-encoded SHA-256 digest.
    pub sha256_hex: String,
    /// Hex-encoded CRC32-Castagnoli checksum (big-endian).
    pub crc32c_hex: String,
}

/// Incremental hasher fed one chunk at a time on the write path.
///
/// # Examples
///
/// ```
/// use strata_core::IntegrityHasher;
///
/// let mut hasher = IntegrityHasher::new();
/// hasher.update(b"Hello, ");
/// hasher.update(b"World!");
/// let digests = hasher.finish();
/// assert_eq!(digests.md5_hex, "65a8e27d8879283831b664bd8b7f0ad4");
/// ```
#[derive(Debug, Default)]
pub struct IntegrityHasher {
    md5: md5::Md5,
    sha256: sha2::Sha256,
    crc32c: u32,
}

impl IntegrityHasher {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk into all three digests.
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.md5, data);
        Digest::update(&mut self.sha256, data);
        self.crc32c = crc32c::crc32c_append(self.crc32c, data);
    }

    /// Finalize and return the hex digests. Consumes the hasher.
    #[must_use]
    pub fn finish(self) -> DigestSet {
        DigestSet {
            md5_hex: hex::encode(Digest::finalize(self.md5)),
            sha256_hex: hex::encode(Digest::finalize(self.sha256)),
            crc32c_hex: hex::encode(self.crc32c.to_be_bytes()),
        }
    }
}
