use crate::error::Rejection;
use crate::resource::{ClusterObject, Ingress};
use crate::store::DnsRecord;
use crate::traits::ResourceProjector;

/// Projects ingress routes of one ingress class onto the ingress address
///
/// Every admitted ingress resolves to the same `target_address`: the address
/// of the ingress controller fronting the cluster. Hosts inside the search
/// domain are marked fully qualified with a trailing dot.
#[derive(Debug, Clone)]
pub struct RouteProjector {
    target_address: String,
    search_domain: String,
    ingress_class: String,
}

impl RouteProjector {
    /// Projector name, also the identity prefix
    pub const NAME: &'static str = "ingress";

    /// Create a new route projector
    ///
    /// # Parameters
    ///
    /// - `target_address`: Address every admitted route resolves to
    /// - `search_domain`: Suffix that marks a host as fully qualified
    /// - `ingress_class`: The only ingress class admitted
    pub fn new(
        target_address: impl Into<String>,
        search_domain: impl Into<String>,
        ingress_class: impl Into<String>,
    ) -> Self {
        Self {
            target_address: target_address.into(),
            search_domain: search_domain.into(),
            ingress_class: ingress_class.into(),
        }
    }

    fn ingress<'a>(&self, object: &'a ClusterObject) -> Result<&'a Ingress, Rejection> {
        match object {
            ClusterObject::Ingress(ingress) => Ok(ingress),
            _ => Err(Rejection::type_mismatch(
                "failed to get ingress from provided object",
            )),
        }
    }

    fn normalize(&self, host: &str) -> String {
        if host.ends_with(&self.search_domain) {
            format!("{}.", host)
        } else {
            host.to_string()
        }
    }
}

impl ResourceProjector for RouteProjector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, object: &ClusterObject) -> Result<String, Rejection> {
        let ingress = self.ingress(object)?;
        let id = super::identity(Self::NAME, &ingress.metadata);

        match ingress.class() {
            None => Err(Rejection::of(
                id.clone(),
                format!("skipping ingress ({}) because it doesn't have an ingress class", id),
            )),
            Some(class) if class != self.ingress_class => Err(Rejection::of(
                id.clone(),
                format!(
                    "skipping ingress ({}) because it doesn't belong to ingress class {}",
                    id, self.ingress_class
                ),
            )),
            Some(_) => Ok(id),
        }
    }

    fn project(&self, object: &ClusterObject) -> Result<DnsRecord, Rejection> {
        let ingress = self.ingress(object)?;

        let hostnames = ingress
            .spec
            .rules
            .iter()
            .filter_map(|rule| rule.host.as_deref())
            .filter(|host| !host.is_empty())
            .map(|host| self.normalize(host))
            .collect::<Vec<_>>();

        Ok(DnsRecord {
            address: self.target_address.clone(),
            hostnames,
        })
    }
}
