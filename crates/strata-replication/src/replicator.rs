//! The replication pipeline: bounded queue, worker pool, batched dispatch.
//!
//! Five workers drain a shared bounded channel. Each worker accumulates
//! events into a local batch and flushes when the batch fills, when the
//! periodic timer fires, or on shutdown. "Batch" refers to accumulation
//! only: events are delivered to the peer one HTTP request at a time, each
//! with its own bounded retry budget.
//!
//! Backpressure is drop-on-overflow: `queue_event` never blocks the origin
//! path. Dropped and permanently failed events are counted in
//! [`ReplicationStats`] and logged; there is no dead-letter queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use strata_storage::StorageEngine;

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::event::{Event, EventKind, EventSink, Payload};

/// Capacity of the bounded event channel.
const QUEUE_CAPACITY: usize = 10_000;

/// Number of worker tasks draining the channel.
const NUM_WORKERS: usize = 5;

/// Overall timeout applied to every outbound HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline counters, readable at any time via [`Replicator::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplicationStats {
    /// Events accepted into the queue.
    pub events_queued: u64,
    /// Events delivered to the peer.
    pub events_replicated: u64,
    /// Events dropped at ingress or failed after all retries.
    pub events_failed: u64,
    /// Time of the most recent successful delivery.
    pub last_replication: Option<DateTime<Utc>>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Event>>>;

/// Asynchronous replicator shipping events to a remote peer.
///
/// Construct with [`Replicator::new`], call [`Replicator::start`] once to
/// spawn the workers, and [`Replicator::stop`] to flush and shut down.
/// When replication is disabled in the configuration, enqueueing is a no-op
/// and `start` spawns nothing.
pub struct Replicator {
    config: ReplicationConfig,
    client: reqwest::Client,
    engine: Arc<dyn StorageEngine>,
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    stats: RwLock<ReplicationStats>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("enabled", &self.config.enabled)
            .field("remote_url", &self.config.remote_url)
            .finish()
    }
}

impl Replicator {
    /// Create a replicator. The engine is used to resolve storage-pointer
    /// payloads at dispatch time.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Transport`] if the HTTP client cannot be
    /// initialized.
    pub fn new(
        config: ReplicationConfig,
        engine: Arc<dyn StorageEngine>,
    ) -> ReplicationResult<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        Ok(Self {
            config,
            client,
            engine,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            stats: RwLock::new(ReplicationStats::default()),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the worker pool. A no-op when replication is disabled or the
    /// pipeline has already been started.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("replication disabled");
            return;
        }

        let Some(rx) = self.rx.lock().take() else {
            return;
        };
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

        info!(remote_url = %self.config.remote_url, workers = NUM_WORKERS, "starting replicator");

        let mut workers = self.workers.lock();
        for id in 0..NUM_WORKERS {
            let this = Arc::clone(self);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                this.worker(id, rx).await;
            }));
        }
    }

    /// Shut the pipeline down: close the channel, cancel the workers, and
    /// wait for them to flush their remaining batches.
    pub async fn stop(&self) {
        info!("stopping replicator");
        self.tx.lock().take();
        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "replication worker aborted");
            }
        }
        info!("replicator stopped");
    }

    /// Offer an event to the queue without blocking.
    ///
    /// Disabled replication ignores the event entirely. A full queue drops
    /// the event, increments the failure counter, and logs a warning.
    pub fn queue_event(&self, event: Event) {
        if !self.config.enabled {
            return;
        }

        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            warn!(event_id = %event.id, "replication pipeline stopped, dropping event");
            self.stats.write().events_failed += 1;
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {
                self.stats.write().events_queued += 1;
            }
            Err(mpsc::error::TrySendError::Full(event))
            | Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(event_id = %event.id, "replication queue full, dropping event");
                self.stats.write().events_failed += 1;
            }
        }
    }

    /// Snapshot of the pipeline counters.
    #[must_use]
    pub fn stats(&self) -> ReplicationStats {
        self.stats.read().clone()
    }

    /// Whether the pipeline is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    // -----------------------------------------------------------------------
    // Worker loop
    // -----------------------------------------------------------------------

    async fn worker(self: Arc<Self>, id: usize, rx: SharedReceiver) {
        debug!(worker_id = id, "replication worker started");

        let mut batch: Vec<Event> = Vec::with_capacity(self.config.batch_size);
        let mut ticker = tokio::time::interval(self.config.batch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    // Drain whatever is still queued, then flush and exit.
                    {
                        let mut rx = rx.lock().await;
                        while let Ok(event) = rx.try_recv() {
                            batch.push(event);
                        }
                    }
                    self.send_batch(&mut batch).await;
                    break;
                }

                received = recv_shared(&rx) => {
                    match received {
                        Some(event) => {
                            batch.push(event);
                            if batch.len() >= self.config.batch_size {
                                self.send_batch(&mut batch).await;
                            }
                        }
                        // Channel closed and fully drained.
                        None => {
                            self.send_batch(&mut batch).await;
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.send_batch(&mut batch).await;
                    }
                }
            }
        }

        debug!(worker_id = id, "replication worker stopped");
    }

    /// Deliver every event in the batch, one request at a time.
    async fn send_batch(&self, batch: &mut Vec<Event>) {
        for event in batch.drain(..) {
            let event_id = event.id.clone();
            match self.send_event(event).await {
                Ok(()) => {
                    let mut stats = self.stats.write();
                    stats.events_replicated += 1;
                    stats.last_replication = Some(Utc::now());
                }
                Err(e) => {
                    error!(event_id = %event_id, error = %e, "failed to replicate event");
                    self.stats.write().events_failed += 1;
                }
            }
        }
    }

    /// Dispatch one event with the configured retry budget: one initial
    /// attempt plus `retry_attempts` retries, a fixed delay apart.
    async fn send_event(&self, event: Event) -> ReplicationResult<()> {
        let mut last: Option<ReplicationError> = None;

        for attempt in 0..=self.config.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
                debug!(event_id = %event.id, attempt, "retrying event replication");
            }

            let result = match event.kind {
                EventKind::PutObject => self.dispatch_put(&event).await,
                EventKind::DeleteObject => self.dispatch_delete(&event).await,
                EventKind::PurgeBucket => self.dispatch_purge(&event).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }

        Err(ReplicationError::RetriesExhausted {
            attempts: self.config.retry_attempts + 1,
            last: Box::new(last.unwrap_or(ReplicationError::MissingPayload {
                event_id: event.id.clone(),
            })),
        })
    }

    async fn dispatch_put(&self, event: &Event) -> ReplicationResult<()> {
        let url = format!("{}/{}/{}", self.config.remote_url, event.bucket, event.key);

        let body = match &event.payload {
            Some(Payload::Inline(bytes)) => reqwest::Body::from(bytes.clone()),
            Some(Payload::SourceUrl(source)) => {
                let response = self.client.get(source).send().await?;
                if !response.status().is_success() {
                    return Err(ReplicationError::RemoteStatus {
                        status: response.status().as_u16(),
                        event_id: event.id.clone(),
                    });
                }
                reqwest::Body::wrap_stream(response.bytes_stream())
            }
            Some(Payload::Pointer { offset, size }) => {
                let bytes = self.engine.read(*offset, *size)?;
                reqwest::Body::from(bytes)
            }
            None => {
                return Err(ReplicationError::MissingPayload {
                    event_id: event.id.clone(),
                });
            }
        };

        let mut request = self.client.put(&url).body(body);
        if let Some(content_type) = event.metadata.get("content_type").and_then(|v| v.as_str()) {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        request = self.authorize(request);

        let response = request.send().await?;
        expect_status(response.status(), &[StatusCode::OK], &event.id)
    }

    async fn dispatch_delete(&self, event: &Event) -> ReplicationResult<()> {
        let url = format!("{}/{}/{}", self.config.remote_url, event.bucket, event.key);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        expect_status(
            response.status(),
            &[StatusCode::OK, StatusCode::NO_CONTENT],
            &event.id,
        )
    }

    async fn dispatch_purge(&self, event: &Event) -> ReplicationResult<()> {
        let url = format!("{}/admin/{}/objects", self.config.remote_url, event.bucket);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        expect_status(response.status(), &[StatusCode::OK], &event.id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.remote_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl EventSink for Replicator {
    fn enqueue(&self, event: Event) {
        self.queue_event(event);
    }
}

/// Receive from the shared channel. Holding the lock only while waiting
/// keeps exactly one worker parked on the channel at a time; the rest are
/// either delivering or waiting their turn here.
async fn recv_shared(rx: &SharedReceiver) -> Option<Event> {
    rx.lock().await.recv().await
}

fn expect_status(
    status: StatusCode,
    accepted: &[StatusCode],
    event_id: &str,
) -> ReplicationResult<()> {
    if accepted.contains(&status) {
        Ok(())
    } else {
        Err(ReplicationError::RemoteStatus {
            status: status.as_u16(),
            event_id: event_id.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::routing::{delete, put};
    use axum::Router;
    use bytes::Bytes;

    use strata_storage::SlabEngine;

    #[derive(Default)]
    struct Recorded {
        puts: Mutex<Vec<(String, Vec<u8>)>>,
        deletes: Mutex<Vec<String>>,
        purges: Mutex<Vec<String>>,
        hits: AtomicUsize,
        fail_with: Option<StatusCode>,
    }

    async fn spawn_peer(recorded: Arc<Recorded>) -> String {
        async fn put_handler(
            State(state): State<Arc<Recorded>>,
            axum::extract::Path((bucket, key)): axum::extract::Path<(String, String)>,
            body: Bytes,
        ) -> StatusCode {
            state.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = state.fail_with {
                return status;
            }
            state
                .puts
                .lock()
                .push((format!("{bucket}/{key}"), body.to_vec()));
            StatusCode::OK
        }

        async fn delete_handler(
            State(state): State<Arc<Recorded>>,
            axum::extract::Path((bucket, key)): axum::extract::Path<(String, String)>,
        ) -> StatusCode {
            state.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = state.fail_with {
                return status;
            }
            state.deletes.lock().push(format!("{bucket}/{key}"));
            StatusCode::NO_CONTENT
        }

        async fn purge_handler(
            State(state): State<Arc<Recorded>>,
            axum::extract::Path(bucket): axum::extract::Path<String>,
        ) -> StatusCode {
            state.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = state.fail_with {
                return status;
            }
            state.purges.lock().push(bucket);
            StatusCode::OK
        }

        let app = Router::new()
            .route("/admin/{bucket}/objects", delete(purge_handler))
            .route("/{bucket}/{key}", put(put_handler).delete(delete_handler))
            .with_state(recorded);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind failed: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("local_addr failed: {e}"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn test_engine() -> (tempfile::TempDir, Arc<SlabEngine>) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("backing.data");
        let file = std::fs::File::create(&path).unwrap_or_else(|e| panic!("create failed: {e}"));
        file.set_len(16 * 1024 * 1024)
            .unwrap_or_else(|e| panic!("set_len failed: {e}"));
        (dir, Arc::new(SlabEngine::new(&path, 16 * 1024 * 1024, 4 * 1024 * 1024)))
    }

    fn replicator(config: ReplicationConfig, engine: Arc<SlabEngine>) -> Arc<Replicator> {
        Arc::new(
            Replicator::new(config, engine).unwrap_or_else(|e| panic!("replicator init failed: {e}")),
        )
    }

    fn fast_config(remote_url: String) -> ReplicationConfig {
        ReplicationConfig::builder()
            .enabled(true)
            .remote_url(remote_url)
            .batch_size(10)
            .batch_interval(Duration::from_millis(20))
            .retry_attempts(0)
            .retry_delay(Duration::from_millis(5))
            .build()
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn test_should_ignore_events_when_disabled() {
        let (_dir, engine) = test_engine();
        let replicator = replicator(ReplicationConfig::default(), engine);

        for _ in 0..100 {
            replicator.queue_event(Event::delete_object("b", "k"));
        }

        let stats = replicator.stats();
        assert_eq!(stats.events_queued, 0);
        assert_eq!(stats.events_failed, 0);
    }

    #[tokio::test]
    async fn test_should_drop_events_when_queue_is_full() {
        let (_dir, engine) = test_engine();
        let config = ReplicationConfig::builder()
            .enabled(true)
            .remote_url("http://127.0.0.1:1".to_owned())
            .build();
        // Workers are never started, so the queue only fills.
        let replicator = replicator(config, engine);

        for _ in 0..QUEUE_CAPACITY + 3 {
            replicator.queue_event(Event::delete_object("b", "k"));
        }

        let stats = replicator.stats();
        assert_eq!(stats.events_queued, QUEUE_CAPACITY as u64);
        assert_eq!(stats.events_failed, 3);
    }

    #[tokio::test]
    async fn test_should_replicate_inline_put_to_peer() {
        let recorded = Arc::new(Recorded::default());
        let url = spawn_peer(Arc::clone(&recorded)).await;
        let (_dir, engine) = test_engine();
        let replicator = replicator(fast_config(url), engine);
        replicator.start();

        let mut metadata = HashMap::new();
        metadata.insert(
            "content_type".to_owned(),
            serde_json::Value::from("application/octet-stream"),
        );
        replicator.queue_event(Event::put_object(
            "test",
            "file1",
            metadata,
            Payload::Inline(Bytes::from_static(b"test data")),
        ));

        wait_until(|| !recorded.puts.lock().is_empty()).await;

        let puts = recorded.puts.lock();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "test/file1");
        assert_eq!(puts[0].1, b"test data");
        drop(puts);

        wait_until(|| replicator.stats().events_replicated == 1).await;
        assert!(replicator.stats().last_replication.is_some());
        replicator.stop().await;
    }

    #[tokio::test]
    async fn test_should_resolve_pointer_payload_from_engine() {
        let recorded = Arc::new(Recorded::default());
        let url = spawn_peer(Arc::clone(&recorded)).await;
        let (_dir, engine) = test_engine();

        let offset = engine
            .allocate(11)
            .unwrap_or_else(|e| panic!("allocate failed: {e}"));
        engine
            .write(offset, b"pointer-pay")
            .unwrap_or_else(|e| panic!("write failed: {e}"));

        let replicator = replicator(fast_config(url), Arc::clone(&engine));
        replicator.start();

        replicator.queue_event(Event::put_object(
            "bkt",
            "obj",
            HashMap::new(),
            Payload::Pointer { offset, size: 11 },
        ));

        wait_until(|| !recorded.puts.lock().is_empty()).await;
        assert_eq!(recorded.puts.lock()[0].1, b"pointer-pay");
        replicator.stop().await;
    }

    #[tokio::test]
    async fn test_should_replicate_delete_and_purge() {
        let recorded = Arc::new(Recorded::default());
        let url = spawn_peer(Arc::clone(&recorded)).await;
        let (_dir, engine) = test_engine();
        let replicator = replicator(fast_config(url), engine);
        replicator.start();

        replicator.queue_event(Event::delete_object("bkt", "gone"));
        replicator.queue_event(Event::purge_bucket("bkt"));

        wait_until(|| replicator.stats().events_replicated == 2).await;
        assert_eq!(recorded.deletes.lock().as_slice(), ["bkt/gone"]);
        assert_eq!(recorded.purges.lock().as_slice(), ["bkt"]);
        replicator.stop().await;
    }

    #[tokio::test]
    async fn test_should_retry_and_record_failure_on_persistent_500() {
        let recorded = Arc::new(Recorded {
            fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR),
            ..Recorded::default()
        });
        let url = spawn_peer(Arc::clone(&recorded)).await;
        let (_dir, engine) = test_engine();

        let config = ReplicationConfig::builder()
            .enabled(true)
            .remote_url(url)
            .batch_size(10)
            .batch_interval(Duration::from_millis(10))
            .retry_attempts(3)
            .retry_delay(Duration::from_millis(10))
            .build();
        let replicator = replicator(config, engine);
        replicator.start();

        replicator.queue_event(Event::delete_object("bkt", "k"));

        wait_until(|| replicator.stats().events_failed == 1).await;
        // One initial attempt plus three retries.
        assert!(recorded.hits.load(Ordering::SeqCst) >= 4);
        assert_eq!(replicator.stats().events_replicated, 0);
        replicator.stop().await;
    }

    #[tokio::test]
    async fn test_should_flush_pending_batch_on_stop() {
        let recorded = Arc::new(Recorded::default());
        let url = spawn_peer(Arc::clone(&recorded)).await;
        let (_dir, engine) = test_engine();

        // Interval far in the future: only shutdown can flush.
        let config = ReplicationConfig::builder()
            .enabled(true)
            .remote_url(url)
            .batch_size(100)
            .batch_interval(Duration::from_secs(3600))
            .retry_attempts(0)
            .retry_delay(Duration::from_millis(5))
            .build();
        let replicator = replicator(config, engine);
        replicator.start();

        replicator.queue_event(Event::delete_object("bkt", "pending"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        replicator.stop().await;
        assert_eq!(recorded.deletes.lock().as_slice(), ["bkt/pending"]);
        assert_eq!(replicator.stats().events_replicated, 1);
    }

    #[tokio::test]
    async fn test_should_send_bearer_token_when_configured() {
        use axum::http::HeaderMap;

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_handler = Arc::clone(&seen);

        let app = Router::new().route(
            "/{bucket}/{key}",
            delete(move |headers: HeaderMap| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    if let Some(auth) = headers.get("authorization") {
                        seen.lock().push(auth.to_str().unwrap_or("").to_owned());
                    }
                    StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind failed: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("local_addr failed: {e}"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (_dir, engine) = test_engine();
        let config = ReplicationConfig::builder()
            .enabled(true)
            .remote_url(format!("http://{addr}"))
            .remote_token(Some("sekrit".to_owned()))
            .batch_size(1)
            .batch_interval(Duration::from_millis(10))
            .retry_attempts(0)
            .retry_delay(Duration::from_millis(5))
            .build();
        let replicator = replicator(config, engine);
        replicator.start();

        replicator.queue_event(Event::delete_object("b", "k"));
        wait_until(|| !seen.lock().is_empty()).await;
        assert_eq!(seen.lock().as_slice(), ["Bearer sekrit"]);
        replicator.stop().await;
    }
}
