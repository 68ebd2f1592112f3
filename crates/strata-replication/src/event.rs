//! Replication event model.
//!
//! An [`Event`] describes one committed mutation. PUT events carry their
//! payload in one of three forms: inline bytes (only for very small
//! objects), a source URL the dispatcher fetches with a streaming GET, or a
//! pointer into the local storage engine. Carrying a pointer instead of the
//! bytes keeps large objects out of the queue's memory footprint.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An object was written.
    PutObject,
    /// An object was deleted.
    DeleteObject,
    /// Every object in a bucket was deleted.
    PurgeBucket,
}

impl EventKind {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PutObject => "put_object",
            Self::DeleteObject => "delete_object",
            Self::PurgeBucket => "purge_bucket",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carrier for PUT events.
#[derive(Debug, Clone)]
pub enum Payload {
    /// The payload bytes themselves; used only below the inline threshold.
    Inline(Bytes),
    /// A URL the dispatcher streams the payload from.
    SourceUrl(String),
    /// Allocator coordinates of the payload in the local engine.
    Pointer {
        /// Byte offset within the backing store.
        offset: u64,
        /// Payload length in bytes.
        size: u64,
    },
}

/// One mutation queued for delivery to the remote peer.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique id: enqueue nanoseconds, bucket, and key.
    pub id: String,
    /// Mutation kind.
    pub kind: EventKind,
    /// Bucket the mutation applies to.
    pub bucket: String,
    /// Object key; empty for bucket-wide events.
    pub key: String,
    /// When the event was created.
    pub queued_at: DateTime<Utc>,
    /// Free-form metadata forwarded with the event (e.g. `content_type`).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Payload carrier; present only for PUT events.
    pub payload: Option<Payload>,
}

impl Event {
    fn new(kind: EventKind, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let key = key.into();
        let now = Utc::now();
        Self {
            id: format!(
                "{}-{}-{}",
                now.timestamp_nanos_opt().unwrap_or_default(),
                bucket,
                key
            ),
            kind,
            bucket,
            key,
            queued_at: now,
            metadata: HashMap::new(),
            payload: None,
        }
    }

    /// Event for a committed PUT.
    #[must_use]
    pub fn put_object(
        bucket: impl Into<String>,
        key: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
        payload: Payload,
    ) -> Self {
        let mut event = Self::new(EventKind::PutObject, bucket, key);
        event.metadata = metadata;
        event.payload = Some(payload);
        event
    }

    /// Event for a committed DELETE.
    #[must_use]
    pub fn delete_object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(EventKind::DeleteObject, bucket, key)
    }

    /// Event for a completed bucket purge.
    #[must_use]
    pub fn purge_bucket(bucket: impl Into<String>) -> Self {
        Self::new(EventKind::PurgeBucket, bucket, "")
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// The single capability the object service needs from the pipeline.
///
/// A sink never blocks and never fails from the caller's point of view;
/// overflow handling happens inside the implementation.
pub trait EventSink: Send + Sync {
    /// Offer an event for asynchronous delivery.
    fn enqueue(&self, event: Event);
}

/// Sink that discards everything; stands in when replication is disabled so
/// call sites need no conditionals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn enqueue(&self, _event: Event) {}
}
