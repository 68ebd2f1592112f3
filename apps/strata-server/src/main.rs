//! Strata server - S3-compatible object store over a raw block device.
//!
//! Exposes bucket and object CRUD plus admin endpoints over HTTP and wires
//! together the storage engine, the metadata repositories, and the
//! replication pipeline.
//!
//! # Usage
//!
//! ```text
//! STORAGE_PATH=/var/lib/strata/storage.data LISTEN_ADDR=0.0.0.0:9000 strata-server
//! ```
//!
//! # Routes
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET` | `/health` | liveness probe |
//! | `GET` | `/` | list buckets |
//! | `PUT` | `/{bucket}` | create bucket |
//! | `GET` | `/{bucket}` | list objects |
//! | `DELETE` | `/{bucket}` | delete empty bucket |
//! | `PUT` | `/{bucket}/{key}` | put object |
//! | `GET` | `/{bucket}/{key}` | get object |
//! | `HEAD` | `/{bucket}/{key}` | object metadata |
//! | `DELETE` | `/{bucket}/{key}` | delete object |
//! | `DELETE` | `/admin/{bucket}/objects` | purge bucket |
//! | `GET` | `/admin/replication/status` | replication counters |

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, on, MethodFilter};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata_core::{BucketService, Config, ObjectService, ServiceError};
use strata_meta::{BucketRepository, ListOptions, ObjectRepository, VersioningStatus};
use strata_replication::{EventSink, NullSink, Replicator};
use strata_storage::{SlabEngine, StorageEngine};

/// Header prefix for user metadata on PUT.
const USER_METADATA_PREFIX: &str = "x-amz-meta-";

struct AppState {
    objects: ObjectService,
    buckets: BucketService,
    replicator: Option<Arc<Replicator>>,
}

type App = State<Arc<AppState>>;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wrapper that maps service error kinds onto HTTP status codes.
struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::BucketNotFound { .. } | ServiceError::ObjectNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ServiceError::BucketAlreadyExists { .. } | ServiceError::BucketNotEmpty { .. } => {
            StatusCode::CONFLICT
        }
        ServiceError::StorageFull { .. } => StatusCode::INSUFFICIENT_STORAGE,
        ServiceError::InvalidArgument { .. } | ServiceError::SizeMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::Io { .. } | ServiceError::Metadata { .. } | ServiceError::Cancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Bucket handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

async fn list_buckets(
    State(app): App,
    Query(query): Query<OwnerQuery>,
) -> Result<Response, ApiError> {
    let buckets = app.buckets.list_buckets(query.owner.as_deref()).await?;
    Ok(Json(serde_json::json!({ "buckets": buckets })).into_response())
}

#[derive(Debug, Deserialize)]
struct CreateBucketQuery {
    owner: Option<String>,
    versioning: Option<String>,
}

async fn put_bucket(
    State(app): App,
    Path(bucket): Path<String>,
    Query(query): Query<CreateBucketQuery>,
) -> Result<Response, ApiError> {
    // `PUT /{bucket}?versioning=` toggles versioning on an existing bucket;
    // without the parameter it creates the bucket.
    if let Some(versioning) = query.versioning {
        let status = match versioning.as_str() {
            "Enabled" => VersioningStatus::Enabled,
            "Suspended" => VersioningStatus::Suspended,
            "Disabled" => VersioningStatus::Disabled,
            other => {
                return Err(ServiceError::InvalidArgument {
                    message: format!("unknown versioning status: {other}"),
                }
                .into());
            }
        };
        let descriptor = app.buckets.set_versioning(&bucket, status).await?;
        return Ok(Json(descriptor).into_response());
    }

    let owner = query.owner.unwrap_or_else(|| "default".to_owned());
    let descriptor = app.buckets.create_bucket(&bucket, &owner).await?;
    Ok((StatusCode::CREATED, Json(descriptor)).into_response())
}

async fn delete_bucket(State(app): App, Path(bucket): Path<String>) -> Result<Response, ApiError> {
    app.buckets.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
struct ListObjectsQuery {
    prefix: Option<String>,
    delimiter: Option<String>,
    start_after: Option<String>,
    max_keys: Option<usize>,
}

async fn list_objects(
    State(app): App,
    Path(bucket): Path<String>,
    Query(query): Query<ListObjectsQuery>,
) -> Result<Response, ApiError> {
    let opts = ListOptions {
        prefix: query.prefix.unwrap_or_default(),
        delimiter: query.delimiter.unwrap_or_default(),
        start_after: query.start_after.unwrap_or_default(),
        max_keys: query.max_keys,
    };
    let result = app.objects.list_objects(&bucket, &opts).await?;
    Ok(Json(result).into_response())
}

// ---------------------------------------------------------------------------
// Object handlers
// ---------------------------------------------------------------------------

/// Collect `x-amz-meta-*` headers into the user metadata map.
fn extract_user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(USER_METADATA_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

async fn put_object(
    State(app): App,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();
    let user_metadata = extract_user_metadata(&headers);

    let size = body.len() as u64;
    let descriptor = app
        .objects
        .put_object(&bucket, &key, &body[..], size, &content_type, user_metadata)
        .await?;
    Ok(Json(descriptor).into_response())
}

#[derive(Debug, Deserialize)]
struct GetObjectQuery {
    version_id: Option<String>,
}

async fn get_object(
    State(app): App,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<GetObjectQuery>,
) -> Result<Response, ApiError> {
    let (descriptor, body) = app
        .objects
        .get_object(&bucket, &key, query.version_id.as_deref())
        .await?;

    Ok((
        [
            (header::ETAG, format!("\"{}\"", descriptor.etag)),
            (header::CONTENT_TYPE, descriptor.content_type.clone()),
        ],
        body,
    )
        .into_response())
}

async fn head_object(
    State(app): App,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let descriptor = app.objects.get_object_metadata(&bucket, &key).await?;

    Ok((
        [
            (header::ETAG, format!("\"{}\"", descriptor.etag)),
            (header::CONTENT_TYPE, descriptor.content_type.clone()),
            (header::CONTENT_LENGTH, descriptor.size.to_string()),
        ],
        StatusCode::OK,
    )
        .into_response())
}

async fn delete_object(
    State(app): App,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    app.objects.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

async fn purge_bucket(State(app): App, Path(bucket): Path<String>) -> Result<Response, ApiError> {
    let (deleted, total_size) = app.objects.delete_all_objects(&bucket).await?;
    Ok(Json(serde_json::json!({
        "deleted": deleted,
        "total_size": total_size,
    }))
    .into_response())
}

async fn replication_status(State(app): App) -> Response {
    match &app.replicator {
        Some(replicator) => {
            let stats = replicator.stats();
            Json(serde_json::json!({
                "enabled": true,
                "events_queued": stats.events_queued,
                "events_replicated": stats.events_replicated,
                "events_failed": stats.events_failed,
                "last_replication": stats.last_replication,
            }))
            .into_response()
        }
        None => Json(serde_json::json!({ "enabled": false })).into_response(),
    }
}

async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
        .into_response()
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/replication/status", get(replication_status))
        .route("/admin/{bucket}/objects", delete(purge_bucket))
        .route("/", get(list_buckets))
        .route(
            "/{bucket}",
            on(MethodFilter::PUT, put_bucket)
                .on(MethodFilter::GET, list_objects)
                .on(MethodFilter::DELETE, delete_bucket),
        )
        .route(
            "/{bucket}/{*key}",
            on(MethodFilter::PUT, put_object)
                .on(MethodFilter::GET, get_object)
                .on(MethodFilter::HEAD, head_object)
                .on(MethodFilter::DELETE, delete_object),
        )
        .with_state(state)
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the configured level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

/// Create and preallocate the backing file if it does not exist yet.
/// Block devices and already-provisioned files are left untouched.
fn ensure_backing_store(path: &str, size: u64) -> Result<()> {
    if std::path::Path::new(path).exists() {
        return Ok(());
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create backing store at {path}"))?;
    file.set_len(size)
        .with_context(|| format!("failed to preallocate {size} bytes at {path}"))?;
    info!(path, size, "preallocated backing store");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal, draining connections");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(&config.log_level)?;

    info!(
        storage_path = %config.storage.path,
        storage_size = config.storage.size,
        block_size = config.storage.block_size,
        metadata_root = %config.metadata_root,
        listen_addr = %config.listen_addr,
        replication_enabled = config.replication.enabled,
        "starting strata server",
    );

    ensure_backing_store(&config.storage.path, config.storage.size)?;

    let engine = Arc::new(SlabEngine::new(
        &config.storage.path,
        config.storage.size,
        config.storage.block_size,
    ));
    if let Err(e) = engine.open() {
        // The engine opens lazily on first use; a failure here is a
        // configuration warning, not a startup abort.
        warn!(error = %e, "backing store not yet opened");
    }

    let bucket_repo = Arc::new(BucketRepository::new(&config.metadata_root).await?);
    let object_repo = Arc::new(ObjectRepository::new(&config.metadata_root).await?);

    let (replicator, sink): (Option<Arc<Replicator>>, Arc<dyn EventSink>) =
        if config.replication.enabled {
            let replicator = Arc::new(Replicator::new(
                config.replication.clone(),
                Arc::clone(&engine) as Arc<dyn StorageEngine>,
            )?);
            replicator.start();
            (
                Some(Arc::clone(&replicator)),
                replicator as Arc<dyn EventSink>,
            )
        } else {
            (None, Arc::new(NullSink) as Arc<dyn EventSink>)
        };

    let state = Arc::new(AppState {
        objects: ObjectService::new(
            Arc::clone(&object_repo),
            Arc::clone(&engine) as Arc<dyn StorageEngine>,
            sink,
        ),
        buckets: BucketService::new(bucket_repo, object_repo),
        replicator: replicator.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening for connections");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Flush the pipeline and the device before exiting.
    if let Some(replicator) = replicator {
        replicator.stop().await;
    }
    if let Err(e) = engine.sync() {
        warn!(error = %e, "final sync failed");
    }
    engine.close().ok();
    info!("shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_error_kinds_to_status_codes() {
        let cases = [
            (
                ServiceError::ObjectNotFound {
                    bucket: "b".to_owned(),
                    key: "k".to_owned(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::BucketAlreadyExists {
                    name: "b".to_owned(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::StorageFull {
                    requested: 10,
                    available: 0,
                },
                StatusCode::INSUFFICIENT_STORAGE,
            ),
            (
                ServiceError::InvalidArgument {
                    message: "bad".to_owned(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::SizeMismatch {
                    declared: 10,
                    actual: 3,
                },
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(status_for(&error), expected, "wrong status for {error}");
        }
    }

    #[test]
    fn test_should_extract_user_metadata_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-purpose", "testing".parse().expect("value"));
        headers.insert("x-amz-meta-owner", "alice".parse().expect("value"));
        headers.insert("content-type", "text/plain".parse().expect("value"));

        let metadata = extract_user_metadata(&headers);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("purpose").map(String::as_str), Some("testing"));
        assert_eq!(metadata.get("owner").map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_should_preallocate_backing_store_once() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("backing.data");
        let path_str = path.to_str().expect("utf-8 path");

        ensure_backing_store(path_str, 1024 * 1024)
            .unwrap_or_else(|e| panic!("preallocate failed: {e}"));
        let len = std::fs::metadata(&path)
            .unwrap_or_else(|e| panic!("stat failed: {e}"))
            .len();
        assert_eq!(len, 1024 * 1024);

        // A second call must not touch the existing file.
        std::fs::write(&path, b"populated").unwrap_or_else(|e| panic!("write failed: {e}"));
        ensure_backing_store(path_str, 1024 * 1024)
            .unwrap_or_else(|e| panic!("second preallocate failed: {e}"));
        let content =
            std::fs::read(&path).unwrap_or_else(|e| panic!("read failed: {e}"));
        assert_eq!(content, b"populated");
    }
}
