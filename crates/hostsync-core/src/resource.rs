//! Cluster object model
//!
//! These are the slices of cluster objects the projectors read. Subscription
//! implementations convert whatever their API client hands them into a
//! [`ClusterObject`] before it reaches the core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation carrying the legacy ingress class
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Object metadata shared by every kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Namespace the object lives in
    #[serde(default)]
    pub namespace: String,
    /// Object name, unique within its namespace and kind
    pub name: String,
    /// Free-form annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create metadata with no annotations
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// An HTTP routing rule set (networking/v1 Ingress)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Class name from the spec (used when the class annotation is absent)
    #[serde(default)]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: Option<String>,
}

impl IngressRule {
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
        }
    }
}

impl Ingress {
    /// The ingress class, preferring the legacy annotation over the spec field
    pub fn class(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(INGRESS_CLASS_ANNOTATION)
            .map(String::as_str)
            .or(self.spec.ingress_class_name.as_deref())
    }
}

/// A network service (core/v1 Service)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
    #[serde(default)]
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type, e.g. "ClusterIP" or "LoadBalancer"
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Address requested from the load balancer implementation
    #[serde(default, rename = "loadBalancerIP")]
    pub load_balancer_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// IPs assigned by the load balancer implementation
    #[serde(default)]
    pub load_balancer_ips: Vec<String>,
}

impl Service {
    /// The address the balancer answers on, if one has been assigned
    ///
    /// The explicitly requested IP wins over addresses reported in status.
    pub fn assigned_address(&self) -> Option<&str> {
        self.spec
            .load_balancer_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                self.status
                    .load_balancer_ips
                    .iter()
                    .map(String::as_str)
                    .find(|ip| !ip.is_empty())
            })
    }
}

/// Any object a subscription can deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClusterObject {
    Ingress(Ingress),
    Service(Service),
}

impl ClusterObject {
    /// The kind name, as used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterObject::Ingress(_) => "Ingress",
            ClusterObject::Service(_) => "Service",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::Ingress(ingress) => &ingress.metadata,
            ClusterObject::Service(service) => &service.metadata,
        }
    }
}

impl From<Ingress> for ClusterObject {
    fn from(ingress: Ingress) -> Self {
        ClusterObject::Ingress(ingress)
    }
}

impl From<Service> for ClusterObject {
    fn from(service: Service) -> Self {
        ClusterObject::Service(service)
    }
}

/// A single observation delivered by a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// Object seen for the first time (including initial replay)
    Added(ClusterObject),
    /// Object changed, or was re-delivered by a resync
    Modified(ClusterObject),
    /// Object is gone
    Deleted(ClusterObject),
}

impl ResourceEvent {
    pub fn object(&self) -> &ClusterObject {
        match self {
            ResourceEvent::Added(obj) | ResourceEvent::Modified(obj) | ResourceEvent::Deleted(obj) => {
                obj
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_class_prefers_annotation() {
        let mut ingress = Ingress {
            metadata: ObjectMeta::new("default", "web").with_annotation(INGRESS_CLASS_ANNOTATION, "nginx"),
            spec: IngressSpec {
                ingress_class_name: Some("traefik".to_string()),
                rules: vec![],
            },
        };
        assert_eq!(ingress.class(), Some("nginx"));

        ingress.metadata.annotations.clear();
        assert_eq!(ingress.class(), Some("traefik"));

        ingress.spec.ingress_class_name = None;
        assert_eq!(ingress.class(), None);
    }

    #[test]
    fn service_address_falls_back_to_status() {
        let mut service = Service {
            metadata: ObjectMeta::new("default", "db"),
            spec: ServiceSpec {
                type_: "LoadBalancer".to_string(),
                load_balancer_ip: Some(String::new()),
            },
            status: ServiceStatus {
                load_balancer_ips: vec!["10.0.0.7".to_string()],
            },
        };
        assert_eq!(service.assigned_address(), Some("10.0.0.7"));

        service.spec.load_balancer_ip = Some("10.0.0.5".to_string());
        assert_eq!(service.assigned_address(), Some("10.0.0.5"));

        service.spec.load_balancer_ip = None;
        service.status.load_balancer_ips.clear();
        assert_eq!(service.assigned_address(), None);
    }

    #[test]
    fn cluster_object_deserializes_by_kind() {
        let json = serde_json::json!({
            "kind": "Service",
            "metadata": { "namespace": "default", "name": "db" },
            "spec": { "type": "LoadBalancer", "loadBalancerIP": "10.0.0.5" }
        });

        let obj: ClusterObject = serde_json::from_value(json).unwrap();
        assert_eq!(obj.kind(), "Service");
        assert_eq!(obj.metadata().name, "db");
        match obj {
            ClusterObject::Service(service) => {
                assert_eq!(service.assigned_address(), Some("10.0.0.5"))
            }
            other => panic!("unexpected object: {:?}", other),
        }
    }
}
