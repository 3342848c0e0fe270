use crate::error::Rejection;
use crate::resource::{ClusterObject, Service};
use crate::store::DnsRecord;
use crate::traits::ResourceProjector;

/// Service type admitted by [`LoadBalancerProjector`]
pub const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Projects LoadBalancer services onto `<name>.<search domain>.`
#[derive(Debug, Clone)]
pub struct LoadBalancerProjector {
    search_domain: String,
}

impl LoadBalancerProjector {
    /// Projector name, also the identity prefix
    pub const NAME: &'static str = "service";

    /// Create a new load balancer projector
    pub fn new(search_domain: impl Into<String>) -> Self {
        Self {
            search_domain: search_domain.into(),
        }
    }

    fn service<'a>(&self, object: &'a ClusterObject) -> Result<&'a Service, Rejection> {
        match object {
            ClusterObject::Service(service) => Ok(service),
            _ => Err(Rejection::type_mismatch(
                "failed to get service from provided object",
            )),
        }
    }

    fn no_address(id: String) -> Rejection {
        let reason = format!(
            "skipping service ({}) because it has no assigned load balancer address",
            id
        );
        Rejection::of(id, reason)
    }
}

impl ResourceProjector for LoadBalancerProjector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, object: &ClusterObject) -> Result<String, Rejection> {
        let service = self.service(object)?;
        let id = super::identity(Self::NAME, &service.metadata);

        if service.spec.type_ != LOAD_BALANCER_TYPE {
            return Err(Rejection::of(
                id.clone(),
                format!("skipping service ({}) because it isn't of type LoadBalancer", id),
            ));
        }
        if service.assigned_address().is_none() {
            return Err(Self::no_address(id));
        }

        Ok(id)
    }

    fn project(&self, object: &ClusterObject) -> Result<DnsRecord, Rejection> {
        let service = self.service(object)?;
        let address = service.assigned_address().ok_or_else(|| {
            Self::no_address(super::identity(Self::NAME, &service.metadata))
        })?;

        Ok(DnsRecord {
            address: address.to_string(),
            hostnames: vec![format!(
                "{}.{}.",
                service.metadata.name, self.search_domain
            )],
        })
    }
}
