// # Resource Source Trait
//
// Defines the watch-with-resync subscription for one resource kind.
//
// ## Implementations
//
// - Cluster watch: `hostsync-source-kube` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::ResourceSource;
// use tokio_stream::StreamExt;
//
// let mut events = source.subscribe().await?;
// while let Some(event) = events.next().await {
//     println!("{:?}", event);
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::resource::ResourceEvent;

/// Stream of events produced by a subscription
pub type ResourceEventStream = Pin<Box<dyn Stream<Item = ResourceEvent> + Send>>;

/// Trait for resource subscription implementations
///
/// # Guarantees
///
/// - Every object that exists when the subscription starts is delivered
///   (as `Added`) shortly after subscribing
/// - Objects are periodically re-delivered (as `Modified`) so that missed
///   events heal themselves
///
/// The stream is expected to run for the life of the process. A stream that
/// ends is treated by the engine as a subscription failure.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Get the resource kind this source watches (e.g., "ingress", "service")
    fn kind(&self) -> &'static str;

    /// Start the subscription
    ///
    /// # Returns
    ///
    /// - `Ok(stream)`: Events for this kind, starting with the initial replay
    /// - `Err(Error)`: The subscription could not be set up
    async fn subscribe(&self) -> Result<ResourceEventStream, crate::Error>;
}

/// Helper trait for constructing resource sources
pub trait ResourceSourceFactory: Send + Sync {
    /// Create a ResourceSource for the given kind
    ///
    /// # Parameters
    ///
    /// - `kind`: Resource kind name (e.g., "ingress")
    fn create(&self, kind: &str) -> Result<std::sync::Arc<dyn ResourceSource>, crate::Error>;
}
