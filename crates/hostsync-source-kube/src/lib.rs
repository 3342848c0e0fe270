// # Kubernetes Resource Sources
//
// This crate provides the resource subscriptions for hostsync, backed by
// the Kubernetes API:
//
// - `ingress`: networking.k8s.io/v1 Ingress
// - `service`: core/v1 Service
//
// ## How It Works
//
// Each subscription spawns a task that drives a `kube::runtime::watcher`
// stream and, every resync period, re-lists the whole kind. Both feed one
// channel; the receiving end is the event stream handed to the engine.
//
// - Listed and applied objects are `Added` when unseen, `Modified` otherwise
// - Objects that vanished while the watch was re-initialising are delivered
//   as `Deleted` once the new listing completes
// - Every periodic re-list re-delivers each object as `Modified`
//
// Watch errors are logged and retried with the watcher's default backoff.
// The task stops when the engine drops the stream.
//
// ## Connecting
//
// [`connect`] builds the one `Client` the daemon shares between these
// sources and the pod exec sink. Outside a cluster it can target an API
// server by address with a bearer token.

use hostsync_core::PluginRegistry;
use hostsync_core::resource::{
    ClusterObject, Ingress, IngressRule, IngressSpec, ObjectMeta, ResourceEvent, Service,
    ServiceSpec, ServiceStatus,
};
use hostsync_core::traits::{ResourceEventStream, ResourceSource, ResourceSourceFactory};
use hostsync_core::{Error, Result};

use futures::StreamExt;
use k8s_openapi::api::core::v1 as core_v1;
use k8s_openapi::api::networking::v1 as networking_v1;
use kube::api::{Api, ListParams};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default interval between full re-lists
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(60);

/// Resource kinds this crate can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Ingress,
    Service,
}

impl Kind {
    /// Name the engine uses for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Service => "service",
        }
    }

    /// Parse a kind name
    pub fn parse(kind: &str) -> Result<Self> {
        match kind {
            "ingress" => Ok(Self::Ingress),
            "service" => Ok(Self::Service),
            other => Err(Error::config(format!(
                "Unsupported resource kind: {} (supported: ingress, service)",
                other
            ))),
        }
    }
}

/// An API object that converts into a hostsync [`ClusterObject`]
pub trait IntoClusterObject:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
    fn to_cluster_object(&self) -> ClusterObject;
}

fn convert_meta(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
    }
}

impl IntoClusterObject for networking_v1::Ingress {
    fn to_cluster_object(&self) -> ClusterObject {
        let spec = self.spec.as_ref();
        Ingress {
            metadata: convert_meta(&self.metadata),
            spec: IngressSpec {
                ingress_class_name: spec.and_then(|s| s.ingress_class_name.clone()),
                rules: spec
                    .and_then(|s| s.rules.as_ref())
                    .map(|rules| {
                        rules
                            .iter()
                            .map(|rule| IngressRule {
                                host: rule.host.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }
        .into()
    }
}

impl IntoClusterObject for core_v1::Service {
    fn to_cluster_object(&self) -> ClusterObject {
        let spec = self.spec.as_ref();
        let load_balancer_ips = self
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|ingress| ingress.iter().filter_map(|i| i.ip.clone()).collect())
            .unwrap_or_default();

        Service {
            metadata: convert_meta(&self.metadata),
            spec: ServiceSpec {
                type_: spec.and_then(|s| s.type_.clone()).unwrap_or_default(),
                load_balancer_ip: spec.and_then(|s| s.load_balancer_ip.clone()),
            },
            status: ServiceStatus { load_balancer_ips },
        }
        .into()
    }
}

fn object_key(object: &ClusterObject) -> String {
    let meta = object.metadata();
    format!("{}/{}", meta.namespace, meta.name)
}

/// Turns watcher events and re-lists into subscription events
///
/// Remembers the last version of every object so deletions missed during a
/// watch restart can still be delivered.
#[derive(Debug, Default)]
struct Tracker {
    known: HashMap<String, ClusterObject>,
    relisting: Option<HashSet<String>>,
}

impl Tracker {
    fn upsert(&mut self, object: ClusterObject) -> ResourceEvent {
        let key = object_key(&object);
        if let Some(seen) = self.relisting.as_mut() {
            seen.insert(key.clone());
        }
        match self.known.insert(key, object.clone()) {
            Some(_) => ResourceEvent::Modified(object),
            None => ResourceEvent::Added(object),
        }
    }

    fn apply<K: IntoClusterObject>(&mut self, event: watcher::Event<K>) -> Vec<ResourceEvent> {
        match event {
            watcher::Event::Init => {
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
                vec![self.upsert(obj.to_cluster_object())]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };
                let gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(ResourceEvent::Deleted)
                    .collect()
            }
            watcher::Event::Delete(obj) => {
                let object = obj.to_cluster_object();
                self.known.remove(&object_key(&object));
                vec![ResourceEvent::Deleted(object)]
            }
        }
    }

    fn resync<K: IntoClusterObject>(&mut self, objects: Vec<K>) -> Vec<ResourceEvent> {
        objects
            .iter()
            .map(|obj| {
                let object = obj.to_cluster_object();
                self.known.insert(object_key(&object), object.clone());
                ResourceEvent::Modified(object)
            })
            .collect()
    }
}

/// Watches one resource kind cluster-wide
pub struct KubeResourceSource {
    client: Client,
    kind: Kind,
    resync_period: Duration,
}

impl KubeResourceSource {
    /// Create a new source
    ///
    /// # Parameters
    ///
    /// - `client`: Kubernetes API client
    /// - `kind`: Resource kind to watch
    pub fn new(client: Client, kind: Kind) -> Self {
        Self {
            client,
            kind,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }

    /// Set the interval between full re-lists
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    fn spawn_watch<K: IntoClusterObject>(&self) -> ResourceEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let api: Api<K> = Api::all(self.client.clone());
        tokio::spawn(watch_loop(api, self.kind, self.resync_period, tx));
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

#[async_trait::async_trait]
impl ResourceSource for KubeResourceSource {
    fn kind(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn subscribe(&self) -> Result<ResourceEventStream> {
        info!("Starting {} watch", self.kind.as_str());
        Ok(match self.kind {
            Kind::Ingress => self.spawn_watch::<networking_v1::Ingress>(),
            Kind::Service => self.spawn_watch::<core_v1::Service>(),
        })
    }
}

/// Drive the watch and the periodic re-list until the receiver is dropped
async fn watch_loop<K: IntoClusterObject>(
    api: Api<K>,
    kind: Kind,
    resync_period: Duration,
    tx: mpsc::UnboundedSender<ResourceEvent>,
) {
    let mut watch = watcher(api.clone(), watcher::Config::default())
        .default_backoff()
        .boxed();
    let start = tokio::time::Instant::now() + resync_period;
    let mut resync = tokio::time::interval_at(start, resync_period);
    let mut tracker = Tracker::default();

    loop {
        let events = tokio::select! {
            _ = tx.closed() => {
                debug!("{} subscription dropped, stopping watch", kind.as_str());
                return;
            }
            item = watch.next() => match item {
                Some(Ok(event)) => tracker.apply(event),
                Some(Err(e)) => {
                    warn!("{} watch error: {}", kind.as_str(), e);
                    continue;
                }
                None => {
                    warn!("{} watch stream ended", kind.as_str());
                    return;
                }
            },
            _ = resync.tick() => match api.list(&ListParams::default()).await {
                Ok(list) => {
                    debug!("Resyncing {} {} object(s)", list.items.len(), kind.as_str());
                    tracker.resync(list.items)
                }
                Err(e) => {
                    warn!("{} re-list failed: {}", kind.as_str(), e);
                    continue;
                }
            },
        };

        for event in events {
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

/// Factory for creating Kubernetes resource sources
pub struct KubeSourceFactory {
    client: Client,
    resync_period: Duration,
}

impl KubeSourceFactory {
    /// Create a factory sharing `client` between all sources
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }

    /// Set the re-list interval of created sources
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }
}

impl ResourceSourceFactory for KubeSourceFactory {
    fn create(&self, kind: &str) -> Result<Arc<dyn ResourceSource>> {
        let kind = Kind::parse(kind)?;
        Ok(Arc::new(
            KubeResourceSource::new(self.client.clone(), kind).with_resync_period(self.resync_period),
        ))
    }
}

/// Register the `ingress` and `service` sources using an existing client
pub fn register_with_client(registry: &PluginRegistry, client: Client) {
    for kind in [Kind::Ingress, Kind::Service] {
        registry.register_source(kind.as_str(), Box::new(KubeSourceFactory::new(client.clone())));
    }
}

/// Client configuration for an API server reached by address
///
/// Used outside the cluster: `server` is a host (or URL) and `token` a
/// service account bearer token. The server certificate is not verified.
pub fn explicit_config(server: &str, token: Option<&str>) -> Result<kube::Config> {
    let url = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };
    let cluster_url = url
        .parse()
        .map_err(|e| Error::config(format!("invalid API server address {}: {}", server, e)))?;

    let mut config = kube::Config::new(cluster_url);
    config.accept_invalid_certs = true;
    config.auth_info.token = token.map(|t| t.to_string().into());
    Ok(config)
}

/// Create an API client
///
/// In order of preference:
/// 1. The in-cluster service account
/// 2. `server` and `token`, when a server is given
/// 3. The local kubeconfig
///
/// # Returns
///
/// - `Ok(client)`: Client to share between sources and sinks
/// - `Err(Error)`: No usable cluster configuration
pub async fn connect(server: Option<&str>, token: Option<&str>) -> Result<Client> {
    let config = match kube::Config::incluster() {
        Ok(config) => {
            info!("Using in-cluster service account");
            config
        }
        Err(in_cluster) => match server {
            Some(server) => {
                debug!("Not running in a cluster: {}", in_cluster);
                info!("Using API server {}", server);
                explicit_config(server, token)?
            }
            None => kube::Config::infer().await.map_err(|e| {
                Error::subscription(format!("no cluster configuration found: {}", e))
            })?,
        },
    };

    Client::try_from(config)
        .map_err(|e| Error::subscription(format!("failed to create cluster client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sMeta;
    use std::collections::BTreeMap;

    fn ingress(name: &str, class: Option<&str>, hosts: &[&str]) -> networking_v1::Ingress {
        networking_v1::Ingress {
            metadata: K8sMeta {
                namespace: Some("web".to_string()),
                name: Some(name.to_string()),
                annotations: Some(BTreeMap::from([(
                    "kubernetes.io/ingress.class".to_string(),
                    "nginx".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(networking_v1::IngressSpec {
                ingress_class_name: class.map(str::to_string),
                rules: Some(
                    hosts
                        .iter()
                        .map(|h| networking_v1::IngressRule {
                            host: Some(h.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service(name: &str, type_: &str, status_ip: Option<&str>) -> core_v1::Service {
        core_v1::Service {
            metadata: K8sMeta {
                namespace: Some("web".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(core_v1::ServiceSpec {
                type_: Some(type_.to_string()),
                ..Default::default()
            }),
            status: status_ip.map(|ip| core_v1::ServiceStatus {
                load_balancer: Some(core_v1::LoadBalancerStatus {
                    ingress: Some(vec![core_v1::LoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_ingress_conversion() {
        let ClusterObject::Ingress(converted) =
            ingress("site", Some("nginx"), &["a.example.com", "b.example.com"]).to_cluster_object()
        else {
            panic!("expected an ingress");
        };

        assert_eq!(converted.metadata.namespace, "web");
        assert_eq!(converted.metadata.name, "site");
        assert_eq!(converted.class(), Some("nginx"));
        assert_eq!(converted.spec.ingress_class_name.as_deref(), Some("nginx"));
        assert_eq!(converted.spec.rules.len(), 2);
        assert_eq!(converted.spec.rules[1].host.as_deref(), Some("b.example.com"));
    }

    #[test]
    fn test_ingress_without_spec() {
        let bare = networking_v1::Ingress::default();
        let ClusterObject::Ingress(converted) = bare.to_cluster_object() else {
            panic!("expected an ingress");
        };
        assert!(converted.spec.rules.is_empty());
        assert_eq!(converted.metadata.name, "");
    }

    #[test]
    fn test_service_conversion() {
        let ClusterObject::Service(converted) =
            service("dns", "LoadBalancer", Some("192.168.1.50")).to_cluster_object()
        else {
            panic!("expected a service");
        };

        assert_eq!(converted.spec.type_, "LoadBalancer");
        assert_eq!(converted.spec.load_balancer_ip, None);
        assert_eq!(converted.status.load_balancer_ips, vec!["192.168.1.50".to_string()]);
        assert_eq!(converted.assigned_address(), Some("192.168.1.50"));
    }

    #[test]
    fn test_initial_listing_is_discovery() {
        let mut tracker = Tracker::default();

        assert!(tracker.apply::<networking_v1::Ingress>(watcher::Event::Init).is_empty());
        let events = tracker.apply(watcher::Event::InitApply(ingress("a", None, &["a.example.com"])));
        assert!(matches!(events.as_slice(), [ResourceEvent::Added(_)]));
        let events = tracker.apply(watcher::Event::InitApply(ingress("b", None, &["b.example.com"])));
        assert!(matches!(events.as_slice(), [ResourceEvent::Added(_)]));
        assert!(tracker.apply::<networking_v1::Ingress>(watcher::Event::InitDone).is_empty());

        let events = tracker.apply(watcher::Event::Apply(ingress("a", None, &["c.example.com"])));
        assert!(matches!(events.as_slice(), [ResourceEvent::Modified(_)]));
        let events = tracker.apply(watcher::Event::Apply(ingress("d", None, &["d.example.com"])));
        assert!(matches!(events.as_slice(), [ResourceEvent::Added(_)]));
    }

    #[test]
    fn test_relist_delivers_missed_deletions() {
        let mut tracker = Tracker::default();
        tracker.apply::<networking_v1::Ingress>(watcher::Event::Init);
        tracker.apply(watcher::Event::InitApply(ingress("a", None, &["a.example.com"])));
        tracker.apply(watcher::Event::InitApply(ingress("b", None, &["b.example.com"])));
        tracker.apply::<networking_v1::Ingress>(watcher::Event::InitDone);

        // watch restarts; "b" was deleted while it was down
        tracker.apply::<networking_v1::Ingress>(watcher::Event::Init);
        tracker.apply(watcher::Event::InitApply(ingress("a", None, &["a.example.com"])));
        let events = tracker.apply::<networking_v1::Ingress>(watcher::Event::InitDone);

        assert_eq!(events.len(), 1);
        match &events[0] {
            ResourceEvent::Deleted(object) => assert_eq!(object.metadata().name, "b"),
            other => panic!("expected a deletion, got {:?}", other),
        }
        assert_eq!(tracker.known.len(), 1);
    }

    #[test]
    fn test_delete_and_resync() {
        let mut tracker = Tracker::default();
        tracker.apply(watcher::Event::Apply(service("dns", "LoadBalancer", None)));

        let events = tracker.apply(watcher::Event::Delete(service("dns", "LoadBalancer", None)));
        assert!(matches!(events.as_slice(), [ResourceEvent::Deleted(_)]));
        assert!(tracker.known.is_empty());

        let events = tracker.resync(vec![
            service("dns", "LoadBalancer", Some("192.168.1.50")),
            service("web", "ClusterIP", None),
        ]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ResourceEvent::Modified(_))));
        assert_eq!(tracker.known.len(), 2);
    }

    #[test]
    fn test_explicit_config() {
        let config = explicit_config("10.0.0.1:6443", Some("sa-token")).unwrap();
        assert_eq!(config.cluster_url.scheme_str(), Some("https"));
        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert!(config.accept_invalid_certs);
        assert!(config.auth_info.token.is_some());

        let config = explicit_config("http://127.0.0.1:8001", None).unwrap();
        assert_eq!(config.cluster_url.scheme_str(), Some("http"));
        assert!(config.auth_info.token.is_none());

        assert!(matches!(explicit_config("bad host", None), Err(Error::Config(_))));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(Kind::parse("ingress").unwrap(), Kind::Ingress);
        assert_eq!(Kind::parse("service").unwrap().as_str(), "service");
        assert!(matches!(Kind::parse("gateway"), Err(Error::Config(_))));
    }
}
