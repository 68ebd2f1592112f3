//! Replication pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Configuration for the replication pipeline.
///
/// # Examples
///
/// ```
/// use strata_replication::ReplicationConfig;
///
/// let config = ReplicationConfig::default();
/// assert!(!config.enabled);
/// assert_eq!(config.batch_size, 100);
/// assert_eq!(config.retry_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct ReplicationConfig {
    /// Master switch; when off, enqueueing is a no-op.
    #[builder(default = false)]
    pub enabled: bool,

    /// Base URL of the remote peer, e.g. `http://replica:9000`.
    #[builder(default)]
    pub remote_url: String,

    /// Optional bearer token sent as `Authorization: Bearer <token>`.
    #[builder(default)]
    pub remote_token: Option<String>,

    /// Per-worker batch accumulator capacity.
    #[builder(default = 100)]
    pub batch_size: usize,

    /// Periodic flush interval for partially filled batches.
    #[builder(default = Duration::from_secs(1))]
    pub batch_interval: Duration,

    /// Extra delivery attempts beyond the first.
    #[builder(default = 3)]
    pub retry_attempts: u32,

    /// Fixed delay between delivery attempts.
    #[builder(default = Duration::from_secs(5))]
    pub retry_delay: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_url: String::new(),
            remote_token: None,
            batch_size: 100,
            batch_interval: Duration::from_secs(1),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}
