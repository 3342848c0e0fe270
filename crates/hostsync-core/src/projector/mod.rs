//! Built-in resource projectors
//!
//! - [`RouteProjector`]: ingress routes of one ingress class
//! - [`LoadBalancerProjector`]: services of type LoadBalancer
//!
//! Identities are `<projector name>/<namespace>/<name>`, so objects of
//! different kinds never share an entry.

pub mod load_balancer;
pub mod route;

pub use load_balancer::LoadBalancerProjector;
pub use route::RouteProjector;

use crate::resource::ObjectMeta;

/// Build the store identity for an object seen by the named projector
pub fn identity(projector: &str, metadata: &ObjectMeta) -> String {
    format!("{}/{}/{}", projector, metadata.namespace, metadata.name)
}
