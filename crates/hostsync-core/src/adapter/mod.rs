//! Subscription adapter
//!
//! Drives the projector → store → coalescer pipeline from one resource
//! subscription.
//!
//! | Event | Admitted | Rejected with identity | Rejected without identity |
//! |-------|----------|------------------------|---------------------------|
//! | Added / Modified | `set_entry` | `remove_entry` | ignored |
//! | Deleted | `remove_entry` | `remove_entry` | ignored |
//!
//! Every call that changes the store posts exactly one signal.

use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coalescer::{Signal, SignalSender};
use crate::engine::{EngineEvent, EventEmitter};
use crate::error::{Error, Rejection, Result};
use crate::resource::{ClusterObject, ResourceEvent};
use crate::store::{DnsRecord, EntryStore};
use crate::traits::{ResourceProjector, ResourceSource};

/// How an upserted object reached the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Discovered,
    Updated,
}

impl Arrival {
    fn verb(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Updated => "updated",
        }
    }
}

/// Applies subscription events for one projector to the store
#[derive(Clone)]
pub struct SubscriptionAdapter {
    projector: Arc<dyn ResourceProjector>,
    store: EntryStore,
    signals: SignalSender,
    events: EventEmitter,
}

impl SubscriptionAdapter {
    /// Create a new adapter
    pub fn new(
        projector: Arc<dyn ResourceProjector>,
        store: EntryStore,
        signals: SignalSender,
        events: EventEmitter,
    ) -> Self {
        Self {
            projector,
            store,
            signals,
            events,
        }
    }

    /// Handle an object seen for the first time
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The store changed and a signal was posted
    /// - `Ok(false)`: Nothing changed
    /// - `Err(Error)`: The coalescer has stopped
    pub async fn on_added(&self, object: &ClusterObject) -> Result<bool> {
        self.upsert(object, Arrival::Discovered).await
    }

    /// Handle an updated (or re-delivered) object
    pub async fn on_modified(&self, object: &ClusterObject) -> Result<bool> {
        self.upsert(object, Arrival::Updated).await
    }

    /// Handle a deleted object
    ///
    /// The entry is removed even if the object would no longer be admitted.
    pub async fn on_deleted(&self, object: &ClusterObject) -> Result<bool> {
        let identity = match self.projector.validate(object) {
            Ok(identity) => identity,
            Err(Rejection {
                identity: Some(identity),
                ..
            }) => identity,
            Err(rejection) => {
                debug!("Ignoring deleted object: {}", rejection);
                return Ok(false);
            }
        };

        self.remove(&identity).await
    }

    /// Dispatch one subscription event
    pub async fn handle(&self, event: &ResourceEvent) -> Result<bool> {
        match event {
            ResourceEvent::Added(object) => self.on_added(object).await,
            ResourceEvent::Modified(object) => self.on_modified(object).await,
            ResourceEvent::Deleted(object) => self.on_deleted(object).await,
        }
    }

    /// Subscribe to `source` and apply its events until cancelled
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Cancelled
    /// - `Err(Error)`: The subscription could not be set up, its stream
    ///   ended, or the coalescer stopped
    pub async fn run(self, source: Arc<dyn ResourceSource>, cancel: CancellationToken) -> Result<()> {
        let subscription = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            subscription = source.subscribe() => subscription,
        };
        let mut stream = subscription.map_err(|e| {
            Error::subscription(format!("failed to subscribe to {}: {}", source.kind(), e))
        })?;

        info!(
            "Watching {} resources for {} entries",
            source.kind(),
            self.projector.name()
        );

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                event = stream.next() => event,
            };

            match event {
                Some(event) => {
                    self.handle(&event).await?;
                }
                None => {
                    return Err(Error::subscription(format!(
                        "{} subscription ended",
                        source.kind()
                    )));
                }
            }
        }
    }

    async fn upsert(&self, object: &ClusterObject, arrival: Arrival) -> Result<bool> {
        let admitted = self
            .projector
            .validate(object)
            .and_then(|identity| Ok((identity, self.projector.project(object)?)));

        match admitted {
            Ok((identity, record)) => self.set(identity, record, arrival).await,
            Err(rejection) => {
                match arrival {
                    Arrival::Discovered => info!("{}", rejection),
                    Arrival::Updated => debug!("{}", rejection),
                }
                self.events.emit(EngineEvent::EntryRejected {
                    source: self.projector.name().to_string(),
                    identity: rejection.identity.clone(),
                    reason: rejection.reason.clone(),
                });

                match rejection.identity {
                    Some(identity) => self.remove(&identity).await,
                    None => Ok(false),
                }
            }
        }
    }

    async fn set(&self, identity: String, record: DnsRecord, arrival: Arrival) -> Result<bool> {
        if !self.store.set_entry(identity.clone(), record).await {
            return Ok(false);
        }

        info!(
            "Updating hostsfile from {} {} {}",
            arrival.verb(),
            self.projector.name(),
            identity
        );
        self.changed(identity, false).await?;
        Ok(true)
    }

    async fn remove(&self, identity: &str) -> Result<bool> {
        if !self.store.remove_entry(identity).await {
            return Ok(false);
        }

        info!(
            "Updating hostsfile from removed {} {}",
            self.projector.name(),
            identity
        );
        self.changed(identity.to_string(), true).await?;
        Ok(true)
    }

    async fn changed(&self, identity: String, removed: bool) -> Result<()> {
        self.events.emit(EngineEvent::EntryChanged {
            source: self.projector.name().to_string(),
            identity,
            removed,
        });
        self.signals
            .post(Signal::Changed {
                source: self.projector.name(),
            })
            .await
    }
}
