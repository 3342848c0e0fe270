// # Resource Projector Trait
//
// Per-kind admission and projection policy.
//
// ## Implementations
//
// - Ingress routes: `projector::RouteProjector`
// - LoadBalancer services: `projector::LoadBalancerProjector`
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::ResourceProjector;
//
// match projector.validate(&object) {
//     Ok(identity) => {
//         let record = projector.project(&object)?;
//         store.set_entry(identity, record).await;
//     }
//     Err(rejection) => {
//         if let Some(identity) = rejection.identity {
//             store.remove_entry(&identity).await;
//         }
//     }
// }
// ```

use crate::error::Rejection;
use crate::resource::ClusterObject;
use crate::store::DnsRecord;

/// Trait for resource projector implementations
///
/// A projector is pure: it never touches the store and never blocks. The
/// subscription adapter owns the validate → project → store pipeline.
pub trait ResourceProjector: Send + Sync {
    /// Get the projector name (for logging and identities)
    ///
    /// # Returns
    ///
    /// A static string identifying the projector (e.g., "ingress", "service")
    fn name(&self) -> &'static str;

    /// Type-check an object, compute its identity, and apply the admission filter
    ///
    /// # Parameters
    ///
    /// - `object`: The cluster object delivered by a subscription
    ///
    /// # Returns
    ///
    /// - `Ok(identity)`: The object is admissible
    /// - `Err(Rejection)`: The object is not admissible. The rejection carries
    ///   the identity whenever it could be computed, so stale entries can
    ///   still be removed.
    fn validate(&self, object: &ClusterObject) -> Result<String, Rejection>;

    /// Project an admitted object into its DNS record
    ///
    /// Only meaningful for objects that passed [`validate`](Self::validate).
    ///
    /// # Returns
    ///
    /// - `Ok(DnsRecord)`: The record for this object
    /// - `Err(Rejection)`: The object is of the wrong kind or lacks the
    ///   fields a record needs
    fn project(&self, object: &ClusterObject) -> Result<DnsRecord, Rejection>;
}

/// Helper trait for constructing projectors from configuration
pub trait ProjectorFactory: Send + Sync {
    /// Create a ResourceProjector instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this projector
    /// - `search_domain`: Search domain used for FQDN synthesis
    ///
    /// # Returns
    ///
    /// A shared ResourceProjector trait object
    fn create(
        &self,
        config: &crate::config::ProjectorConfig,
        search_domain: &str,
    ) -> Result<std::sync::Arc<dyn ResourceProjector>, crate::Error>;
}
