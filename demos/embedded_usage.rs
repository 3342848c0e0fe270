//! Minimal embedding example for hostsync-core
//!
//! Feeds a few ingress and service events from memory through the engine
//! and prints every snapshot it would hand to the DNS server. The settle
//! delay is shortened so the example finishes in a few seconds.

use hostsync_core::resource::{
    Ingress, IngressRule, IngressSpec, ObjectMeta, ResourceEvent, Service, ServiceSpec,
    ServiceStatus, INGRESS_CLASS_ANNOTATION,
};
use hostsync_core::traits::{ResourceEventStream, ResourceSource, SnapshotSink};
use hostsync_core::{
    EngineConfig, LoadBalancerProjector, Result, RouteProjector, Subscription, SyncEngine,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Resource source fed by the application
struct InMemorySource {
    kind: &'static str,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ResourceEvent>>>,
}

impl InMemorySource {
    fn new(kind: &'static str) -> (Self, mpsc::UnboundedSender<ResourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                kind,
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl ResourceSource for InMemorySource {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn subscribe(&self) -> Result<ResourceEventStream> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| hostsync_core::Error::subscription("already subscribed"))?;
        Ok(Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)))
    }
}

/// Sink that prints each snapshot
struct PrintSink;

#[async_trait::async_trait]
impl SnapshotSink for PrintSink {
    async fn write_snapshot(&self, content: &str) -> Result<()> {
        println!("[Snapshot]\n{}", content);
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "print"
    }
}

fn ingress(name: &str, host: &str) -> Ingress {
    Ingress {
        metadata: ObjectMeta::new("web", name).with_annotation(INGRESS_CLASS_ANNOTATION, "nginx"),
        spec: IngressSpec {
            ingress_class_name: None,
            rules: vec![IngressRule::host(host)],
        },
    }
}

fn load_balancer(name: &str, address: &str) -> Service {
    Service {
        metadata: ObjectMeta::new("dns", name),
        spec: ServiceSpec {
            type_: "LoadBalancer".to_string(),
            load_balancer_ip: None,
        },
        status: ServiceStatus {
            load_balancer_ips: vec![address.to_string()],
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded hostsync-core Example ===\n");

    let (ingresses, ingress_tx) = InMemorySource::new("ingress");
    let (services, service_tx) = InMemorySource::new("service");

    let subscriptions = vec![
        Subscription::new(
            Arc::new(ingresses),
            Arc::new(RouteProjector::new("192.168.1.10", "home.lan", "nginx")),
        ),
        Subscription::new(
            Arc::new(services),
            Arc::new(LoadBalancerProjector::new("home.lan")),
        ),
    ];

    let config = EngineConfig {
        settle_delay_ms: 200,
        startup_flush_delay_secs: 3600,
        event_channel_capacity: 100,
        ..EngineConfig::default()
    };

    let (engine, mut events) = SyncEngine::new(subscriptions, Arc::new(PrintSink), config)?;

    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let engine_handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    // A burst of discoveries coalesces into one snapshot
    let _ = ingress_tx.send(ResourceEvent::Added(ingress("blog", "blog.home.lan").into()));
    let _ = ingress_tx.send(ResourceEvent::Added(ingress("wiki", "wiki.home.lan").into()));
    let _ = service_tx.send(ResourceEvent::Added(load_balancer("pihole", "192.168.1.53").into()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Re-delivering an unchanged object writes nothing
    let _ = ingress_tx.send(ResourceEvent::Modified(ingress("blog", "blog.home.lan").into()));
    tokio::time::sleep(Duration::from_millis(500)).await;

    // A deletion produces a new snapshot without the entry
    let _ = ingress_tx.send(ResourceEvent::Deleted(ingress("wiki", "wiki.home.lan").into()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let _ = shutdown_tx.send(());
    match engine_handle.await {
        Ok(result) => result?,
        Err(e) => println!("Engine task failed: {}", e),
    }
    let _ = tokio::time::timeout(Duration::from_millis(100), listener).await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
