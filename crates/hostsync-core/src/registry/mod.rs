//! Plugin registry
//!
//! The registry lets projectors, sinks and resource sources be registered
//! at runtime under a name, so the daemon builds an engine from
//! configuration without hardcoding implementations.
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! // In hostsync-sink-exec
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_sink("file", Box::new(FileSinkFactory));
//! }
//! ```
//!
//! The built-in projectors are registered with
//! [`PluginRegistry::register_builtin_projectors`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ProjectorConfig, SinkConfig};
use crate::error::{Error, Result};
use crate::projector::{LoadBalancerProjector, RouteProjector};
use crate::traits::{
    ProjectorFactory, ResourceProjector, ResourceSource, ResourceSourceFactory, SinkFactory,
    SnapshotSink,
};

/// Registry of named plugin factories
///
/// ## Thread Safety
///
/// Each table sits behind an `RwLock`, allowing concurrent lookups and
/// exclusive registration.
#[derive(Default)]
pub struct PluginRegistry {
    projectors: RwLock<HashMap<String, Arc<dyn ProjectorFactory>>>,
    sinks: RwLock<HashMap<String, Arc<dyn SinkFactory>>>,
    sources: RwLock<HashMap<String, Arc<dyn ResourceSourceFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in projectors registered
    pub fn with_builtin_projectors() -> Self {
        let registry = Self::new();
        registry.register_builtin_projectors();
        registry
    }

    /// Register the route and load balancer projectors
    ///
    /// Each is registered under its config type name and under the resource
    /// kind it projects: `route`/`ingress` and `load_balancer`/`service`.
    pub fn register_builtin_projectors(&self) {
        let route: Arc<dyn ProjectorFactory> = Arc::new(RouteProjectorFactory);
        let load_balancer: Arc<dyn ProjectorFactory> = Arc::new(LoadBalancerProjectorFactory);

        let mut projectors = self.projectors.write().unwrap_or_else(PoisonError::into_inner);
        projectors.insert("route".to_string(), route.clone());
        projectors.insert(RouteProjector::NAME.to_string(), route);
        projectors.insert("load_balancer".to_string(), load_balancer.clone());
        projectors.insert(LoadBalancerProjector::NAME.to_string(), load_balancer);
    }

    /// Register a projector factory
    ///
    /// # Parameters
    ///
    /// - `name`: Projector type name (e.g., "route")
    /// - `factory`: Factory object for creating projector instances
    pub fn register_projector(&self, name: impl Into<String>, factory: Box<dyn ProjectorFactory>) {
        let mut projectors = self.projectors.write().unwrap_or_else(PoisonError::into_inner);
        projectors.insert(name.into(), Arc::from(factory));
    }

    /// Register a sink factory
    ///
    /// # Parameters
    ///
    /// - `name`: Sink type name (e.g., "pod_exec", "file")
    /// - `factory`: Factory object for creating sink instances
    pub fn register_sink(&self, name: impl Into<String>, factory: Box<dyn SinkFactory>) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        sinks.insert(name.into(), Arc::from(factory));
    }

    /// Register a resource source factory
    ///
    /// # Parameters
    ///
    /// - `kind`: Resource kind (e.g., "ingress", "service")
    /// - `factory`: Factory object for creating sources of that kind
    pub fn register_source(&self, kind: impl Into<String>, factory: Box<dyn ResourceSourceFactory>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(kind.into(), Arc::from(factory));
    }

    /// Create a projector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(projector)`: Created projector instance
    /// - `Err(Error)`: If the projector type is not registered or creation fails
    pub fn create_projector(
        &self,
        config: &ProjectorConfig,
        search_domain: &str,
    ) -> Result<Arc<dyn ResourceProjector>> {
        let name = config.type_name();
        let factory = {
            let projectors = self.projectors.read().unwrap_or_else(PoisonError::into_inner);
            projectors
                .get(name)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown projector type: {}", name)))?
        };

        factory.create(config, search_domain)
    }

    /// Create a sink from configuration
    pub fn create_sink(&self, config: &SinkConfig) -> Result<Arc<dyn SnapshotSink>> {
        let name = config.type_name();
        let factory = {
            let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
            sinks
                .get(name)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown sink type: {}", name)))?
        };

        factory.create(config)
    }

    /// Create a resource source for `kind`
    pub fn create_source(&self, kind: &str) -> Result<Arc<dyn ResourceSource>> {
        let factory = {
            let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
            sources
                .get(kind)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown resource kind: {}", kind)))?
        };

        factory.create(kind)
    }

    /// List all registered projector types
    pub fn list_projectors(&self) -> Vec<String> {
        let projectors = self.projectors.read().unwrap_or_else(PoisonError::into_inner);
        projectors.keys().cloned().collect()
    }

    /// List all registered sink types
    pub fn list_sinks(&self) -> Vec<String> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.keys().cloned().collect()
    }

    /// List all registered resource kinds
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a projector type is registered
    pub fn has_projector(&self, name: &str) -> bool {
        let projectors = self.projectors.read().unwrap_or_else(PoisonError::into_inner);
        projectors.contains_key(name)
    }

    /// Check if a sink type is registered
    pub fn has_sink(&self, name: &str) -> bool {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.contains_key(name)
    }

    /// Check if a resource kind is registered
    pub fn has_source(&self, kind: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(kind)
    }
}

struct RouteProjectorFactory;

impl ProjectorFactory for RouteProjectorFactory {
    fn create(
        &self,
        config: &ProjectorConfig,
        search_domain: &str,
    ) -> Result<Arc<dyn ResourceProjector>> {
        match config {
            ProjectorConfig::Route {
                target_address,
                ingress_class,
            } => Ok(Arc::new(RouteProjector::new(
                target_address.clone(),
                search_domain,
                ingress_class.clone(),
            ))),
            ProjectorConfig::Custom { config, .. } => {
                let target_address = config
                    .get("target_address")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::config("route projector requires target_address"))?;
                let ingress_class = config
                    .get("ingress_class")
                    .and_then(|v| v.as_str())
                    .unwrap_or("nginx");
                Ok(Arc::new(RouteProjector::new(
                    target_address,
                    search_domain,
                    ingress_class,
                )))
            }
            other => Err(Error::config(format!(
                "route projector cannot be built from {} config",
                other.type_name()
            ))),
        }
    }
}

struct LoadBalancerProjectorFactory;

impl ProjectorFactory for LoadBalancerProjectorFactory {
    fn create(
        &self,
        _config: &ProjectorConfig,
        search_domain: &str,
    ) -> Result<Arc<dyn ResourceProjector>> {
        Ok(Arc::new(LoadBalancerProjector::new(search_domain)))
    }
}
