// # hostsync-core
//
// Core library for keeping a hosts-format DNS zone in step with cluster
// ingress routes and load-balanced services.
//
// ## Architecture Overview
//
// - **EntryStore**: identity → DnsRecord map with change-detecting writes
// - **ResourceProjector**: per-kind admission and record projection
// - **SubscriptionAdapter**: applies subscription events to the store
// - **Coalescer**: turns change signals into throttled snapshot writes
// - **SnapshotSink**: delivers a rendered snapshot and reloads DNS
// - **SyncEngine**: wires the above together and owns their lifetimes
// - **PluginRegistry**: named factories for projectors, sinks and sources
//
// ## Design Principles
//
// 1. **Library-First**: the daemon is a thin layer over this crate
// 2. **Plugin-Based**: cluster access and sink transport live in plugin crates
// 3. **Idempotent writes**: re-delivered objects never cause a flush
// 4. **Bounded staleness**: every accepted change reaches the sink within
//    roughly one staleness period

pub mod adapter;
pub mod coalescer;
pub mod config;
pub mod engine;
pub mod error;
pub mod projector;
pub mod registry;
pub mod resource;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use adapter::SubscriptionAdapter;
pub use config::{EngineConfig, ProjectorConfig, SinkConfig, SyncConfig};
pub use engine::{EngineEvent, Subscription, SyncEngine};
pub use error::{Error, Rejection, Result};
pub use projector::{LoadBalancerProjector, RouteProjector};
pub use registry::PluginRegistry;
pub use resource::{ClusterObject, ResourceEvent};
pub use store::{DnsRecord, EntryStore};
pub use traits::{ResourceProjector, ResourceSource, SnapshotSink};
