//! Bucket service: create, fetch, list, delete, and versioning toggles.

use std::sync::Arc;

use tracing::debug;

use strata_meta::{BucketDescriptor, BucketRepository, ObjectRepository, VersioningStatus};

use crate::error::{ServiceError, ServiceResult};
use crate::validation::validate_bucket_name;

/// Orchestrates bucket operations over the bucket repository, consulting
/// the object repository to refuse deleting non-empty buckets.
pub struct BucketService {
    buckets: Arc<BucketRepository>,
    objects: Arc<ObjectRepository>,
}

impl std::fmt::Debug for BucketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketService").finish_non_exhaustive()
    }
}

impl BucketService {
    /// Create a service over the given repositories.
    #[must_use]
    pub fn new(buckets: Arc<BucketRepository>, objects: Arc<ObjectRepository>) -> Self {
        Self { buckets, objects }
    }

    /// Create a bucket owned by `owner`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidArgument`] when the name fails validation.
    /// - [`ServiceError::BucketAlreadyExists`] when the name is taken.
    pub async fn create_bucket(&self, name: &str, owner: &str) -> ServiceResult<BucketDescriptor> {
        validate_bucket_name(name)?;

        let descriptor = BucketDescriptor::new(name, owner);
        self.buckets.create(&descriptor).await?;
        debug!(bucket = name, owner, "created bucket");
        Ok(descriptor)
    }

    /// Fetch a bucket descriptor.
    ///
    /// # Errors
    ///
    /// [`ServiceError::BucketNotFound`] when no descriptor exists.
    pub async fn get_bucket(&self, name: &str) -> ServiceResult<BucketDescriptor> {
        Ok(self.buckets.get(name).await?)
    }

    /// List buckets, optionally filtered by owner.
    pub async fn list_buckets(&self, owner: Option<&str>) -> ServiceResult<Vec<BucketDescriptor>> {
        Ok(self.buckets.list(owner).await?)
    }

    /// Delete an empty bucket.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::BucketNotFound`] when no descriptor exists.
    /// - [`ServiceError::BucketNotEmpty`] when objects remain.
    pub async fn delete_bucket(&self, name: &str) -> ServiceResult<()> {
        // Surface not-found before the emptiness check.
        self.buckets.get(name).await?;

        let (count, _) = self.objects.count(name).await?;
        if count > 0 {
            return Err(ServiceError::BucketNotEmpty {
                name: name.to_owned(),
            });
        }

        self.buckets.delete(name).await?;
        debug!(bucket = name, "deleted bucket");
        Ok(())
    }

    /// Toggle the versioning status of a bucket.
    ///
    /// # Errors
    ///
    /// [`ServiceError::BucketNotFound`] when no descriptor exists.
    pub async fn set_versioning(
        &self,
        name: &str,
        status: VersioningStatus,
    ) -> ServiceResult<BucketDescriptor> {
        let mut descriptor = self.buckets.get(name).await?;
        descriptor.versioning = status;
        self.buckets.update(&descriptor).await?;
        debug!(bucket = name, ?status, "updated bucket versioning");
        Ok(descriptor)
    }
}
