//! Asynchronous replication pipeline for Strata.
//!
//! Every mutating operation (PUT, DELETE, PURGE) produces an [`Event`] that
//! is offered to a bounded in-memory queue and shipped to a configured
//! remote peer over HTTP by a small worker pool. The origin path is never
//! blocked: a full queue drops the event and counts the loss.
//!
//! # Data plane
//!
//! ```text
//! ObjectService --enqueue--> bounded channel (10k)
//!                                 |
//!                     five workers, shared receiver
//!                                 |
//!                  per-worker batch + interval timer
//!                                 |
//!                  HTTP PUT/DELETE against the peer
//! ```
//!
//! Delivery is at-most-once and unordered across workers; failed events are
//! counted and logged, never redriven from disk.

pub mod config;
pub mod error;
pub mod event;
pub mod replicator;

pub use config::ReplicationConfig;
pub use error::{ReplicationError, ReplicationResult};
pub use event::{Event, EventKind, EventSink, NullSink, Payload};
pub use replicator::{Replicator, ReplicationStats};
