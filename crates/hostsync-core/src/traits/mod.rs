//! Core traits for hostsync
//!
//! This module defines the abstract interfaces the engine is wired from.
//!
//! - [`ResourceProjector`]: Admit cluster objects and project them into records
//! - [`SnapshotSink`]: Deliver rendered zone snapshots downstream
//! - [`ResourceSource`]: Subscribe to add/modify/delete events for one kind

pub mod projector;
pub mod resource_source;
pub mod sink;

pub use projector::{ProjectorFactory, ResourceProjector};
pub use resource_source::{ResourceEventStream, ResourceSource, ResourceSourceFactory};
pub use sink::{SinkFactory, SnapshotSink};
