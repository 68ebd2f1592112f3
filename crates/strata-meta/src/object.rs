//! Object descriptors and their filesystem repository.
//!
//! One JSON file per object under
//! `<root>/objects/<sanitized-bucket>/<sanitized-key>.meta`. Unlike the
//! bucket repository there is no global lock here: per-key consistency
//! comes from atomic rename alone, so concurrency across keys is unbounded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MetaError, MetaResult};
use crate::util::{sanitize_component, write_atomic};
use crate::{DEFAULT_MAX_KEYS, MAX_KEYS_LIMIT};

// ---------------------------------------------------------------------------
// Descriptor types
// ---------------------------------------------------------------------------

/// A recorded content checksum: algorithm name plus hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    /// Algorithm name, e.g. `SHA256`.
    pub algorithm: String,
    /// Hex-encoded digest.
    pub value: String,
}

impl ChecksumRecord {
    /// A SHA-256 record for the given hex digest.
    #[must_use]
    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            algorithm: "SHA256".to_owned(),
            value: value.into(),
        }
    }
}

/// Persisted metadata for one object.
///
/// The descriptor exists on stable storage iff the allocator holds
/// `(offset, size)` as live; the object service maintains that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key, unique within the bucket.
    pub key: String,
    /// Version identifier, generated on every PUT.
    pub version_id: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Declared content type.
    pub content_type: String,
    /// Hex MD5 of the payload, used as the identity tag.
    pub etag: String,
    /// Durable content checksum (SHA-256 in this store).
    pub checksum: ChecksumRecord,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
    /// Allocator coordinate of the payload within the backing store.
    pub offset: u64,
    /// Optional user metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_metadata: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Listing types
// ---------------------------------------------------------------------------

/// Options accepted by [`ObjectRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Group keys sharing a prefix segment up to this delimiter.
    pub delimiter: String,
    /// Only keys strictly greater than this are returned.
    pub start_after: String,
    /// Page size; defaults to [`DEFAULT_MAX_KEYS`], capped at
    /// [`MAX_KEYS_LIMIT`].
    pub max_keys: Option<usize>,
}

/// Result of a listing operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListResult {
    /// Matching descriptors, sorted ascending by key.
    pub objects: Vec<ObjectDescriptor>,
    /// Deduplicated, sorted common prefixes when a delimiter was given.
    pub common_prefixes: Vec<String>,
    /// Whether more keys remained beyond the page.
    pub is_truncated: bool,
    /// The last key of the page when truncated; feed back as `start_after`.
    pub next_marker: Option<String>,
}

// ---------------------------------------------------------------------------
// ObjectRepository
// ---------------------------------------------------------------------------

/// Filesystem repository for object descriptors.
#[derive(Debug)]
pub struct ObjectRepository {
    objects_dir: PathBuf,
}

impl ObjectRepository {
    /// Create a repository rooted at `metadata_root`, creating the
    /// `objects/` directory if needed.
    pub async fn new(metadata_root: impl AsRef<Path>) -> MetaResult<Self> {
        let objects_dir = metadata_root.as_ref().join("objects");
        tokio::fs::create_dir_all(&objects_dir).await?;
        Ok(Self { objects_dir })
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.objects_dir.join(sanitize_component(bucket))
    }

    fn descriptor_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join(format!("{}.meta", sanitize_component(key)))
    }

    /// Persist a descriptor, replacing any prior descriptor for the same
    /// `(bucket, key)`. Last write wins.
    pub async fn put(&self, descriptor: &ObjectDescriptor) -> MetaResult<()> {
        let path = self.descriptor_path(&descriptor.bucket, &descriptor.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(descriptor)?;
        write_atomic(&path, &data).await?;
        debug!(
            bucket = %descriptor.bucket,
            key = %descriptor.key,
            version_id = %descriptor.version_id,
            "wrote object descriptor"
        );
        Ok(())
    }

    /// Load the descriptor for `(bucket, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::ObjectNotFound`] if no descriptor exists.
    pub async fn get(&self, bucket: &str, key: &str) -> MetaResult<ObjectDescriptor> {
        let path = self.descriptor_path(bucket, key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetaError::ObjectNotFound {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// Descriptor-only lookup; identical to [`ObjectRepository::get`] for
    /// this backend.
    pub async fn head(&self, bucket: &str, key: &str) -> MetaResult<ObjectDescriptor> {
        self.get(bucket, key).await
    }

    /// Remove the descriptor for `(bucket, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::ObjectNotFound`] if no descriptor exists.
    pub async fn delete(&self, bucket: &str, key: &str) -> MetaResult<()> {
        let path = self.descriptor_path(bucket, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(bucket, key, "deleted object descriptor");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MetaError::ObjectNotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// List descriptors in a bucket.
    ///
    /// Semantics: filter by prefix, sort ascending by key, drop keys not
    /// strictly greater than `start_after`, truncate to the effective
    /// `max_keys` (setting `is_truncated` / `next_marker`), then group the
    /// retained page by delimiter into `common_prefixes`.
    pub async fn list(&self, bucket: &str, opts: &ListOptions) -> MetaResult<ListResult> {
        let mut all = self.load_bucket(bucket, Some(opts.prefix.as_str())).await?;
        all.sort_by(|a, b| a.key.cmp(&b.key));

        if !opts.start_after.is_empty() {
            all.retain(|o| o.key > opts.start_after);
        }

        let max_keys = opts
            .max_keys
            .unwrap_or(DEFAULT_MAX_KEYS)
            .min(MAX_KEYS_LIMIT);

        let is_truncated = all.len() > max_keys;
        if is_truncated {
            all.truncate(max_keys);
        }
        let next_marker = if is_truncated {
            all.last().map(|o| o.key.clone())
        } else {
            None
        };

        let mut objects = all;
        let mut common_prefixes = Vec::new();
        if !opts.delimiter.is_empty() {
            let mut grouped = Vec::with_capacity(objects.len());
            for object in objects {
                let remainder = object
                    .key
                    .strip_prefix(opts.prefix.as_str())
                    .unwrap_or(&object.key);
                if let Some(idx) = remainder.find(opts.delimiter.as_str()) {
                    let common = format!(
                        "{}{}",
                        opts.prefix,
                        &remainder[..idx + opts.delimiter.len()]
                    );
                    if !common_prefixes.contains(&common) {
                        common_prefixes.push(common);
                    }
                } else {
                    grouped.push(object);
                }
            }
            objects = grouped;
            common_prefixes.sort();
        }

        Ok(ListResult {
            objects,
            common_prefixes,
            is_truncated,
            next_marker,
        })
    }

    /// Count objects and their total payload size without materializing
    /// every descriptor at once.
    pub async fn count(&self, bucket: &str) -> MetaResult<(usize, u64)> {
        let dir = self.bucket_dir(bucket);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0usize;
        let mut total_size = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let Some(descriptor) = read_meta_file(&entry.path()).await else {
                continue;
            };
            count += 1;
            total_size += descriptor.size;
        }

        Ok((count, total_size))
    }

    /// Remove every descriptor in a bucket. Returns the number of deleted
    /// descriptors and their total payload size.
    pub async fn delete_all(&self, bucket: &str) -> MetaResult<(usize, u64)> {
        let descriptors = self.load_bucket(bucket, None).await?;

        let mut count = 0usize;
        let mut total_size = 0u64;
        for descriptor in &descriptors {
            let path = self.descriptor_path(bucket, &descriptor.key);
            if tokio::fs::remove_file(&path).await.is_ok() {
                count += 1;
                total_size += descriptor.size;
            }
        }

        debug!(bucket, count, total_size, "bulk-deleted object descriptors");
        Ok((count, total_size))
    }

    /// Load and parse every descriptor in a bucket, optionally filtered by
    /// key prefix. Unreadable or invalid files are skipped.
    async fn load_bucket(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> MetaResult<Vec<ObjectDescriptor>> {
        let dir = self.bucket_dir(bucket);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut descriptors = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(descriptor) = read_meta_file(&entry.path()).await else {
                continue;
            };
            if prefix.is_some_and(|p| !p.is_empty() && !descriptor.key.starts_with(p)) {
                continue;
            }
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }
}

/// Parse one `.meta` file; `None` for non-descriptor files (including
/// in-flight `.tmp` files) and anything unreadable or invalid.
async fn read_meta_file(path: &Path) -> Option<ObjectDescriptor> {
    if path.extension().is_none_or(|ext| ext != "meta") {
        return None;
    }
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable object descriptor");
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping invalid object descriptor");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(bucket: &str, key: &str, size: u64) -> ObjectDescriptor {
        ObjectDescriptor {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id: "v1".to_owned(),
            size,
            content_type: "application/octet-stream".to_owned(),
            etag: "d41d8cd98f00b204e9800998ecf8427e".to_owned(),
            checksum: ChecksumRecord::sha256("abc123"),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            offset: 0,
            user_metadata: HashMap::new(),
        }
    }

    async fn repo() -> (tempfile::TempDir, ObjectRepository) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let repo = ObjectRepository::new(dir.path())
            .await
            .unwrap_or_else(|e| panic!("repo init failed: {e}"));
        (dir, repo)
    }

    async fn put_keys(repo: &ObjectRepository, bucket: &str, keys: &[&str]) {
        for key in keys {
            repo.put(&descriptor(bucket, key, 10))
                .await
                .unwrap_or_else(|e| panic!("put {key} failed: {e}"));
        }
    }

    #[tokio::test]
    async fn test_should_put_get_and_delete_descriptor() {
        let (_dir, repo) = repo().await;
        repo.put(&descriptor("photos", "cat.jpg", 42))
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));

        let loaded = repo
            .get("photos", "cat.jpg")
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(loaded.size, 42);
        assert_eq!(loaded.checksum.algorithm, "SHA256");

        repo.delete("photos", "cat.jpg")
            .await
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        assert!(matches!(
            repo.get("photos", "cat.jpg").await,
            Err(MetaError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_replace_descriptor_on_second_put() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "photos", &["cat.jpg"]).await;

        let mut second = descriptor("photos", "cat.jpg", 99);
        second.version_id = "v2".to_owned();
        repo.put(&second)
            .await
            .unwrap_or_else(|e| panic!("second put failed: {e}"));

        let loaded = repo
            .get("photos", "cat.jpg")
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(loaded.size, 99);
        assert_eq!(loaded.version_id, "v2");
    }

    #[tokio::test]
    async fn test_should_list_sorted_by_key() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["zebra", "alpha", "mango"]).await;

        let result = repo
            .list("b", &ListOptions::default())
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["alpha", "mango", "zebra"]);
        assert!(!result.is_truncated);
        assert_eq!(result.next_marker, None);
    }

    #[tokio::test]
    async fn test_should_filter_by_prefix() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["logs-2024", "logs-2025", "data-1"]).await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    prefix: "logs-".to_owned(),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["logs-2024", "logs-2025"]);
    }

    #[tokio::test]
    async fn test_should_apply_start_after_strictly() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["a", "b", "c"]).await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    start_after: "b".to_owned(),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["c"]);
    }

    #[tokio::test]
    async fn test_should_not_truncate_at_exact_max_keys() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["k1", "k2", "k3"]).await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    max_keys: Some(3),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert_eq!(result.objects.len(), 3);
        assert!(!result.is_truncated);
        assert_eq!(result.next_marker, None);
    }

    #[tokio::test]
    async fn test_should_truncate_and_set_next_marker() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["k1", "k2", "k3", "k4"]).await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    max_keys: Some(3),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert_eq!(result.objects.len(), 3);
        assert!(result.is_truncated);
        assert_eq!(result.next_marker.as_deref(), Some("k3"));

        // Paging with the marker yields the remainder.
        let page2 = repo
            .list(
                "b",
                &ListOptions {
                    start_after: "k3".to_owned(),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        let keys: Vec<_> = page2.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["k4"]);
    }

    #[tokio::test]
    async fn test_should_group_common_prefixes_with_delimiter() {
        let (_dir, repo) = repo().await;
        // Keys use '+' as a stand-in separator: sanitization would fold '/'
        // into '_' on disk, but the listing logic works on the stored key.
        put_keys(
            &repo,
            "b",
            &["dir+one", "dir+two", "other+x", "plain", "dir+sub+deep"],
        )
        .await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    delimiter: "+".to_owned(),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));

        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["plain"]);
        assert_eq!(result.common_prefixes, ["dir+", "other+"]);
    }

    #[tokio::test]
    async fn test_should_combine_prefix_and_delimiter() {
        let (_dir, repo) = repo().await;
        put_keys(&repo, "b", &["photos+2024+a", "photos+2025+b", "photos+top"]).await;

        let result = repo
            .list(
                "b",
                &ListOptions {
                    prefix: "photos+".to_owned(),
                    delimiter: "+".to_owned(),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));

        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["photos+top"]);
        assert_eq!(result.common_prefixes, ["photos+2024+", "photos+2025+"]);
    }

    #[tokio::test]
    async fn test_should_return_empty_list_for_missing_bucket() {
        let (_dir, repo) = repo().await;
        let result = repo
            .list("ghost", &ListOptions::default())
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert!(result.objects.is_empty());
        assert!(!result.is_truncated);
    }

    #[tokio::test]
    async fn test_should_count_without_listing() {
        let (_dir, repo) = repo().await;
        repo.put(&descriptor("b", "x", 100))
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        repo.put(&descriptor("b", "y", 200))
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));

        let (count, total) = repo
            .count("b")
            .await
            .unwrap_or_else(|e| panic!("count failed: {e}"));
        assert_eq!(count, 2);
        assert_eq!(total, 300);

        let (count, total) = repo
            .count("ghost")
            .await
            .unwrap_or_else(|e| panic!("count failed: {e}"));
        assert_eq!((count, total), (0, 0));
    }

    #[tokio::test]
    async fn test_should_delete_all_and_report_totals() {
        let (_dir, repo) = repo().await;
        repo.put(&descriptor("b", "x", 100))
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        repo.put(&descriptor("b", "y", 200))
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));

        let (count, total) = repo
            .delete_all("b")
            .await
            .unwrap_or_else(|e| panic!("delete_all failed: {e}"));
        assert_eq!(count, 2);
        assert_eq!(total, 300);

        let result = repo
            .list("b", &ListOptions::default())
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert!(result.objects.is_empty());
    }

    #[tokio::test]
    async fn test_should_ignore_tmp_files_in_listing() {
        let (dir, repo) = repo().await;
        put_keys(&repo, "b", &["real"]).await;

        // Simulate a writer crash leaving a temp file behind.
        let leftover = dir.path().join("objects").join("b").join("half.meta.tmp");
        tokio::fs::write(&leftover, b"{")
            .await
            .unwrap_or_else(|e| panic!("write tmp failed: {e}"));

        let result = repo
            .list("b", &ListOptions::default())
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["real"]);
    }
}
