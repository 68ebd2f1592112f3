//! Object service: the streaming PUT/GET/DELETE/PURGE orchestration.
//!
//! A PUT allocates space, streams the payload through the integrity hasher
//! and into the engine in 4 KiB chunks, writes the descriptor atomically,
//! and enqueues a replication event. An allocation guard frees the reserved
//! range on any failure before the descriptor commit, keeping the invariant
//! that a descriptor on stable storage always refers to a live allocation.
//!
//! The declared size is authoritative: a stream that ends early fails the
//! PUT with a size mismatch, and bytes beyond the declared size are never
//! consumed.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};
use uuid::Uuid;

use strata_meta::{ChecksumRecord, ListOptions, ListResult, ObjectDescriptor, ObjectRepository};
use strata_replication::{Event, EventSink, Payload};
use strata_storage::StorageEngine;

use crate::error::{ServiceError, ServiceResult};
use crate::integrity::IntegrityHasher;

/// Chunk size used when streaming payloads into the engine.
const CHUNK_SIZE: usize = 4096;

/// PUT events for objects smaller than this carry their bytes inline;
/// anything larger ships a storage pointer to keep the queue's memory
/// footprint bounded.
const INLINE_PAYLOAD_THRESHOLD: u64 = 1024;

/// Page size used when enumerating a bucket for a purge.
const PURGE_PAGE_SIZE: usize = 1000;

/// Frees an allocation on drop unless the descriptor commit disarmed it.
///
/// Failures to free are logged rather than surfaced so they never mask the
/// primary error that triggered the unwind.
struct AllocationGuard {
    engine: Arc<dyn StorageEngine>,
    offset: u64,
    size: u64,
    armed: bool,
}

impl AllocationGuard {
    fn new(engine: Arc<dyn StorageEngine>, offset: u64, size: u64) -> Self {
        Self {
            engine,
            offset,
            size,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.engine.free(self.offset, self.size) {
                warn!(
                    offset = self.offset,
                    size = self.size,
                    error = %e,
                    "failed to free allocation after aborted put"
                );
            }
        }
    }
}

/// Orchestrates object operations across the engine, the object
/// repository, and the replication sink.
///
/// Pass [`strata_replication::NullSink`] as the sink when replication is
/// disabled; the service itself never branches on it.
pub struct ObjectService {
    repo: Arc<ObjectRepository>,
    engine: Arc<dyn StorageEngine>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ObjectService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectService").finish_non_exhaustive()
    }
}

impl ObjectService {
    /// Create a service over the given collaborators.
    #[must_use]
    pub fn new(
        repo: Arc<ObjectRepository>,
        engine: Arc<dyn StorageEngine>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            repo,
            engine,
            events,
        }
    }

    /// Upload an object, replacing any prior object under the same key.
    ///
    /// Streams `declared_size` bytes from `payload` into freshly allocated
    /// space, hashing as it goes, then commits the descriptor and enqueues
    /// a replication event.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::StorageFull`] when the allocator is exhausted.
    /// - [`ServiceError::SizeMismatch`] when the stream ends early.
    /// - [`ServiceError::Io`] / [`ServiceError::Metadata`] on engine or
    ///   repository failures. In every error case the allocation has been
    ///   returned to the engine.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut payload: impl AsyncRead + Unpin + Send,
        declared_size: u64,
        content_type: &str,
        user_metadata: HashMap<String, String>,
    ) -> ServiceResult<ObjectDescriptor> {
        let version_id = Uuid::new_v4().to_string();

        let offset = self.engine.allocate(declared_size)?;
        let mut guard = AllocationGuard::new(Arc::clone(&self.engine), offset, declared_size);

        // Stream, hash, and write in lockstep. The buffer never reads past
        // the declared size; surplus input is simply left unconsumed.
        let mut hasher = IntegrityHasher::new();
        let mut buf = [0u8; CHUNK_SIZE];
        let mut current_offset = offset;
        let mut remaining = declared_size;
        while remaining > 0 {
            let want = CHUNK_SIZE.min(usize::try_from(remaining).unwrap_or(CHUNK_SIZE));
            let n = payload
                .read(&mut buf[..want])
                .await
                .map_err(strata_storage::StorageError::from)?;
            if n == 0 {
                return Err(ServiceError::SizeMismatch {
                    declared: declared_size,
                    actual: declared_size - remaining,
                });
            }

            hasher.update(&buf[..n]);
            self.engine.write(current_offset, &buf[..n])?;
            current_offset += n as u64;
            remaining -= n as u64;
        }

        let digests = hasher.finish();
        let now = Utc::now();
        let descriptor = ObjectDescriptor {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id,
            size: declared_size,
            content_type: content_type.to_owned(),
            etag: digests.md5_hex,
            checksum: ChecksumRecord::sha256(digests.sha256_hex),
            created_at: now,
            modified_at: now,
            offset,
            user_metadata,
        };

        self.repo.put(&descriptor).await?;
        guard.disarm();

        self.events.enqueue(Event::put_object(
            bucket,
            key,
            put_event_metadata(content_type, declared_size),
            self.put_payload_carrier(offset, declared_size),
        ));

        debug!(
            bucket,
            key,
            version_id = %descriptor.version_id,
            size = declared_size,
            offset,
            "put object committed"
        );
        Ok(descriptor)
    }

    /// Fetch an object's descriptor and its payload bytes.
    ///
    /// When `version` is given it must match the stored version identifier.
    ///
    /// # Errors
    ///
    /// [`ServiceError::ObjectNotFound`] when no matching descriptor exists;
    /// [`ServiceError::Io`] when the payload cannot be read back.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
    ) -> ServiceResult<(ObjectDescriptor, Bytes)> {
        let descriptor = self.repo.get(bucket, key).await?;
        if version.is_some_and(|v| v != descriptor.version_id) {
            return Err(ServiceError::ObjectNotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }

        let data = self.engine.read(descriptor.offset, descriptor.size)?;
        Ok((descriptor, data))
    }

    /// Fetch an object's descriptor without touching the payload.
    ///
    /// # Errors
    ///
    /// [`ServiceError::ObjectNotFound`] when no descriptor exists.
    pub async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> ServiceResult<ObjectDescriptor> {
        Ok(self.repo.head(bucket, key).await?)
    }

    /// Delete one object.
    ///
    /// The descriptor is removed first; only then is the allocation freed.
    /// A failed free leaves dead space below the high-water mark (which the
    /// allocator never reclaims anyway) but can never leave a descriptor
    /// pointing at freed bytes. Free failures are logged, not surfaced.
    ///
    /// # Errors
    ///
    /// [`ServiceError::ObjectNotFound`] when no descriptor exists.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> ServiceResult<()> {
        let descriptor = self.repo.get(bucket, key).await?;
        self.repo.delete(bucket, key).await?;

        if let Err(e) = self.engine.free(descriptor.offset, descriptor.size) {
            warn!(
                bucket,
                key,
                offset = descriptor.offset,
                size = descriptor.size,
                error = %e,
                "failed to free storage for deleted object"
            );
        }

        self.events.enqueue(Event::delete_object(bucket, key));
        debug!(bucket, key, "deleted object");
        Ok(())
    }

    /// List objects in a bucket. See [`ObjectRepository::list`] for the
    /// pagination and delimiter semantics.
    pub async fn list_objects(&self, bucket: &str, opts: &ListOptions) -> ServiceResult<ListResult> {
        Ok(self.repo.list(bucket, opts).await?)
    }

    /// Delete every object in a bucket. Returns the number of deleted
    /// objects and their total payload size.
    ///
    /// Pages through the listing to free each allocation (free failures are
    /// logged and skipped), bulk-deletes the descriptors, and enqueues a
    /// single purge event.
    pub async fn delete_all_objects(&self, bucket: &str) -> ServiceResult<(usize, u64)> {
        let mut descriptors = Vec::new();
        let mut opts = ListOptions {
            max_keys: Some(PURGE_PAGE_SIZE),
            ..ListOptions::default()
        };
        loop {
            let page = self.repo.list(bucket, &opts).await?;
            let truncated = page.is_truncated;
            let next = page.next_marker.clone();
            descriptors.extend(page.objects);
            if !truncated {
                break;
            }
            opts.start_after = next.unwrap_or_default();
        }

        for descriptor in &descriptors {
            if let Err(e) = self.engine.free(descriptor.offset, descriptor.size) {
                warn!(
                    bucket,
                    key = %descriptor.key,
                    error = %e,
                    "failed to free storage during purge"
                );
            }
        }

        let (count, total_size) = self.repo.delete_all(bucket).await?;
        self.events.enqueue(Event::purge_bucket(bucket));

        debug!(bucket, count, total_size, "purged bucket");
        Ok((count, total_size))
    }

    /// Count objects and total payload bytes in a bucket without loading
    /// every descriptor into memory.
    pub async fn count_objects(&self, bucket: &str) -> ServiceResult<(usize, u64)> {
        Ok(self.repo.count(bucket).await?)
    }

    /// Choose the payload carrier for a PUT event: small objects are read
    /// back and carried inline, everything else ships a storage pointer.
    /// A failed read-back falls back to the pointer.
    fn put_payload_carrier(&self, offset: u64, size: u64) -> Payload {
        if size < INLINE_PAYLOAD_THRESHOLD {
            match self.engine.read(offset, size) {
                Ok(bytes) => return Payload::Inline(bytes),
                Err(e) => {
                    warn!(
                        offset,
                        size,
                        error = %e,
                        "inline read-back failed, falling back to storage pointer"
                    );
                }
            }
        }
        Payload::Pointer { offset, size }
    }
}

fn put_event_metadata(
    content_type: &str,
    size: u64,
) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert(
        "content_type".to_owned(),
        serde_json::Value::from(content_type),
    );
    metadata.insert("size".to_owned(), serde_json::Value::from(size));
    metadata
}
