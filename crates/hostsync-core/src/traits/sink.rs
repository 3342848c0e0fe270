// # Snapshot Sink Trait
//
// Defines the interface for delivering a rendered zone snapshot.
//
// ## Implementations
//
// - Pod exec, local file and stdout: `hostsync-sink-exec` crate

use async_trait::async_trait;

/// Trait for snapshot sink implementations
///
/// # Contract
///
/// `write_snapshot` atomically replaces the downstream artifact with
/// `content`, then triggers the downstream DNS service to reload it. Both
/// steps are one logical operation: if either fails, the call fails.
///
/// Sinks do not retry, sleep or spawn tasks. A failed call is returned to
/// the engine, which owns the retry policy.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Replace the downstream zone with `content` and reload it
    ///
    /// # Parameters
    ///
    /// - `content`: The full rendered zone, newline-terminated lines
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The snapshot is in place and the reload succeeded
    /// - `Err(Error)`: Either step failed
    async fn write_snapshot(&self, content: &str) -> Result<(), crate::Error>;

    /// Get the sink name (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}

/// Helper trait for constructing sinks from configuration
pub trait SinkFactory: Send + Sync {
    /// Create a SnapshotSink instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this sink
    ///
    /// # Returns
    ///
    /// A shared SnapshotSink trait object
    fn create(
        &self,
        config: &crate::config::SinkConfig,
    ) -> Result<std::sync::Arc<dyn SnapshotSink>, crate::Error>;
}
