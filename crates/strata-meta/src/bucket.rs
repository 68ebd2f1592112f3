//! Bucket descriptors and their filesystem repository.
//!
//! One JSON file per bucket under `<root>/buckets/<sanitized-name>.json`.
//! A single reader/writer lock over the bucket namespace serializes
//! create/delete against list; individual writes are additionally protected
//! by temp-file + rename.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{MetaError, MetaResult};
use crate::util::{sanitize_component, write_atomic};

// ---------------------------------------------------------------------------
// Descriptor types
// ---------------------------------------------------------------------------

/// Bucket versioning status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been enabled on this bucket.
    #[default]
    Disabled,
    /// Versioning is currently enabled.
    Enabled,
    /// Versioning was previously enabled but is now suspended.
    Suspended,
}

/// A lifecycle policy rule. Opaque to the core; stored and returned as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    /// Rule identifier.
    pub id: String,
    /// Rule status (`Enabled` / `Disabled`).
    pub status: String,
}

/// Persisted metadata for one bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDescriptor {
    /// Globally unique bucket name.
    pub name: String,
    /// Identifier of the owning account.
    pub owner: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Versioning status, `Disabled` unless toggled.
    #[serde(default)]
    pub versioning: VersioningStatus,
    /// Optional lifecycle rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lifecycle: Vec<LifecycleRule>,
}

impl BucketDescriptor {
    /// Create a fresh descriptor with versioning disabled and the creation
    /// timestamp set to now.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            created_at: Utc::now(),
            versioning: VersioningStatus::default(),
            lifecycle: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// BucketRepository
// ---------------------------------------------------------------------------

/// Filesystem repository for bucket descriptors.
///
/// # Examples
///
/// ```no_run
/// use strata_meta::{BucketDescriptor, BucketRepository};
///
/// # async fn example() -> strata_meta::MetaResult<()> {
/// let repo = BucketRepository::new("/var/lib/strata/meta").await?;
/// repo.create(&BucketDescriptor::new("photos", "alice")).await?;
/// let bucket = repo.get("photos").await?;
/// assert_eq!(bucket.owner, "alice");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BucketRepository {
    buckets_dir: PathBuf,
    /// Serializes create/delete against list over the whole namespace.
    lock: RwLock<()>,
}

impl BucketRepository {
    /// Create a repository rooted at `metadata_root`, creating the
    /// `buckets/` directory if needed.
    pub async fn new(metadata_root: impl AsRef<Path>) -> MetaResult<Self> {
        let buckets_dir = metadata_root.as_ref().join("buckets");
        tokio::fs::create_dir_all(&buckets_dir).await?;
        Ok(Self {
            buckets_dir,
            lock: RwLock::new(()),
        })
    }

    fn descriptor_path(&self, name: &str) -> PathBuf {
        self.buckets_dir
            .join(format!("{}.json", sanitize_component(name)))
    }

    /// Persist a new bucket descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::BucketAlreadyExists`] if a descriptor for this
    /// name is already on disk.
    pub async fn create(&self, bucket: &BucketDescriptor) -> MetaResult<()> {
        let _guard = self.lock.write().await;

        let path = self.descriptor_path(&bucket.name);
        if tokio::fs::try_exists(&path).await? {
            return Err(MetaError::BucketAlreadyExists {
                name: bucket.name.clone(),
            });
        }

        let data = serde_json::to_vec_pretty(bucket)?;
        write_atomic(&path, &data).await?;
        debug!(bucket = %bucket.name, "created bucket descriptor");
        Ok(())
    }

    /// Load the descriptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::BucketNotFound`] if no descriptor exists.
    pub async fn get(&self, name: &str) -> MetaResult<BucketDescriptor> {
        let _guard = self.lock.read().await;
        self.read_descriptor(name).await
    }

    /// List all buckets, optionally filtered by owner.
    pub async fn list(&self, owner: Option<&str>) -> MetaResult<Vec<BucketDescriptor>> {
        let _guard = self.lock.read().await;

        let mut entries = match tokio::fs::read_dir(&self.buckets_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable bucket descriptor");
                    continue;
                }
            };
            let Ok(bucket) = serde_json::from_slice::<BucketDescriptor>(&data) else {
                warn!(path = %path.display(), "skipping invalid bucket descriptor");
                continue;
            };

            if owner.is_some_and(|o| bucket.owner != o) {
                continue;
            }
            buckets.push(bucket);
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Remove the descriptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::BucketNotFound`] if no descriptor exists.
    pub async fn delete(&self, name: &str) -> MetaResult<()> {
        let _guard = self.lock.write().await;

        let path = self.descriptor_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(bucket = %name, "deleted bucket descriptor");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MetaError::BucketNotFound {
                name: name.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically rewrite an existing descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::BucketNotFound`] if the bucket does not exist.
    pub async fn update(&self, bucket: &BucketDescriptor) -> MetaResult<()> {
        let _guard = self.lock.write().await;

        let path = self.descriptor_path(&bucket.name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(MetaError::BucketNotFound {
                name: bucket.name.clone(),
            });
        }

        let data = serde_json::to_vec_pretty(bucket)?;
        write_atomic(&path, &data).await?;
        debug!(bucket = %bucket.name, "updated bucket descriptor");
        Ok(())
    }

    async fn read_descriptor(&self, name: &str) -> MetaResult<BucketDescriptor> {
        let path = self.descriptor_path(name);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetaError::BucketNotFound {
                    name: name.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }
}
