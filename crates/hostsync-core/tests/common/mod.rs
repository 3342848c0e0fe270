//! Test doubles and common utilities for engine contract tests
//!
//! Timing tests run on a paused tokio clock (`start_paused = true`), so the
//! doubles record `tokio::time::Instant`s and the assertions compare them
//! against the configured delays exactly.

#![allow(dead_code)]

use hostsync_core::config::EngineConfig;
use hostsync_core::error::{Error, Result};
use hostsync_core::resource::{
    ClusterObject, Ingress, IngressRule, IngressSpec, ObjectMeta, ResourceEvent, Service,
    ServiceSpec, ServiceStatus, INGRESS_CLASS_ANNOTATION,
};
use hostsync_core::traits::{ResourceEventStream, ResourceSource, SnapshotSink};
use hostsync_core::{EngineEvent, Subscription, SyncEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A ResourceSource fed by the test through a channel
pub struct ControlledSource {
    kind: &'static str,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ResourceEvent>>>,
    subscribe_call_count: Arc<AtomicUsize>,
}

impl ControlledSource {
    /// Create a new controlled source
    ///
    /// The subscription stream ends when the returned sender is dropped.
    pub fn new(kind: &'static str) -> (Self, mpsc::UnboundedSender<ResourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            kind,
            rx: Mutex::new(Some(rx)),
            subscribe_call_count: Arc::new(AtomicUsize::new(0)),
        };
        (source, tx)
    }

    /// Get the number of times subscribe() was called
    pub fn subscribe_call_count(&self) -> usize {
        self.subscribe_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResourceSource for ControlledSource {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn subscribe(&self) -> Result<ResourceEventStream> {
        self.subscribe_call_count.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::subscription("already subscribed"))?;
        Ok(Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)))
    }
}

/// A ResourceSource whose subscription always fails
pub struct BrokenSource;

#[async_trait::async_trait]
impl ResourceSource for BrokenSource {
    fn kind(&self) -> &'static str {
        "ingress"
    }

    async fn subscribe(&self) -> Result<ResourceEventStream> {
        Err(Error::Other("connection refused".to_string()))
    }
}

/// One recorded snapshot write
#[derive(Debug, Clone)]
pub struct Flush {
    pub at: Instant,
    pub content: String,
}

/// A sink that records every snapshot it receives
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<Flush>>>,
    tx: mpsc::UnboundedSender<Flush>,
}

/// Test-side handle of a [`RecordingSink`]
pub struct FlushLog {
    writes: Arc<Mutex<Vec<Flush>>>,
    rx: mpsc::UnboundedReceiver<Flush>,
}

impl RecordingSink {
    pub fn new() -> (Self, FlushLog) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                writes: Arc::clone(&writes),
                tx,
            },
            FlushLog { writes, rx },
        )
    }
}

#[async_trait::async_trait]
impl SnapshotSink for RecordingSink {
    async fn write_snapshot(&self, content: &str) -> Result<()> {
        let flush = Flush {
            at: Instant::now(),
            content: content.to_string(),
        };
        self.writes.lock().unwrap().push(flush.clone());
        let _ = self.tx.send(flush);
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

impl FlushLog {
    /// Wait for the next snapshot write
    pub async fn next(&mut self) -> Flush {
        tokio::time::timeout(Duration::from_secs(600), self.rx.recv())
            .await
            .expect("a flush within 10 minutes")
            .expect("sink still alive")
    }

    /// Wait up to `window` for a snapshot write
    pub async fn next_within(&mut self, window: Duration) -> Option<Flush> {
        tokio::time::timeout(window, self.rx.recv()).await.ok().flatten()
    }

    /// Get the number of snapshot writes so far
    pub fn count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

/// A sink that fails a fixed number of times, then succeeds
pub struct FailingSink {
    failures_left: AtomicUsize,
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    /// Fail the first `failures` writes
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every write
    pub fn always() -> Self {
        Self::new(usize::MAX)
    }

    /// Shared counter of write attempts
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait::async_trait]
impl SnapshotSink for FailingSink {
    async fn write_snapshot(&self, _content: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::sink("pod exec failed: container not found"));
        }
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "failing"
    }
}

/// Ingress admitted by the default route projector
pub fn valid_ingress(namespace: &str, name: &str, hosts: &[&str]) -> ClusterObject {
    ingress_with_class(namespace, name, "nginx", hosts)
}

/// Ingress with the given class annotation
pub fn ingress_with_class(namespace: &str, name: &str, class: &str, hosts: &[&str]) -> ClusterObject {
    Ingress {
        metadata: ObjectMeta::new(namespace, name).with_annotation(INGRESS_CLASS_ANNOTATION, class),
        spec: IngressSpec {
            ingress_class_name: None,
            rules: hosts.iter().map(|h| IngressRule::host(*h)).collect(),
        },
    }
    .into()
}

/// Service of type LoadBalancer with a requested address
pub fn valid_service(namespace: &str, name: &str, address: &str) -> ClusterObject {
    Service {
        metadata: ObjectMeta::new(namespace, name),
        spec: ServiceSpec {
            type_: "LoadBalancer".to_string(),
            load_balancer_ip: Some(address.to_string()),
        },
        status: ServiceStatus::default(),
    }
    .into()
}

/// Engine settings for tests: production timings, no startup force, no retries
pub fn minimal_config() -> EngineConfig {
    EngineConfig {
        settle_delay_ms: 1000,
        max_staleness_secs: 60,
        startup_flush_delay_secs: 3600,
        signal_queue_capacity: 100,
        max_retries: 0,
        retry_delay_secs: 1,
        event_channel_capacity: 100,
    }
}

/// An engine running in the background
pub struct RunningEngine {
    pub handle: JoinHandle<Result<()>>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub store: hostsync_core::EntryStore,
    pub started_at: Instant,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RunningEngine {
    /// Build and spawn an engine with a controlled shutdown
    pub fn start(
        subscriptions: Vec<Subscription>,
        sink: Arc<dyn SnapshotSink>,
        config: EngineConfig,
    ) -> Self {
        let (engine, events) =
            SyncEngine::new(subscriptions, sink, config).expect("engine construction succeeds");
        let store = engine.store().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let started_at = Instant::now();
        let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

        Self {
            handle,
            events,
            store,
            started_at,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Send the shutdown signal and wait for the engine
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("engine task does not panic")
    }

    /// Send the shutdown signal, wait for the engine, and collect every
    /// event it emitted that was not read yet
    pub async fn stop_with_events(mut self) -> (Result<()>, Vec<EngineEvent>) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let result = self.handle.await.expect("engine task does not panic");

        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    /// Wait for the engine to exit on its own
    pub async fn join(self) -> Result<()> {
        self.handle.await.expect("engine task does not panic")
    }
}

/// Route subscription for `example.com` targeting 10.0.0.1
pub fn route_subscription() -> (Subscription, mpsc::UnboundedSender<ResourceEvent>) {
    let (source, tx) = ControlledSource::new("ingress");
    let projector = Arc::new(hostsync_core::RouteProjector::new(
        "10.0.0.1",
        "example.com",
        "nginx",
    ));
    (Subscription::new(Arc::new(source), projector), tx)
}

/// LoadBalancer subscription for `example.com`
pub fn service_subscription() -> (Subscription, mpsc::UnboundedSender<ResourceEvent>) {
    let (source, tx) = ControlledSource::new("service");
    let projector = Arc::new(hostsync_core::LoadBalancerProjector::new("example.com"));
    (Subscription::new(Arc::new(source), projector), tx)
}
