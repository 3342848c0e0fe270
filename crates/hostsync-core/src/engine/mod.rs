//! Synchronization engine
//!
//! The SyncEngine wires the subscriptions, the Entry Store and the
//! coalescer together and owns their lifetimes.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐  ResourceEvent  ┌─────────────────────┐
//! │ ResourceSource │────────────────▶│ SubscriptionAdapter │──┐
//! └────────────────┘                 │  (one per kind)     │  │ set / remove
//!                                    └─────────────────────┘  ▼
//!                                              │        ┌────────────┐
//!                                       Signal │        │ EntryStore │
//!                                              ▼        └────────────┘
//! ┌──────────────┐   Forced    ┌──────────────┐  render       │
//! │ startup timer│────────────▶│  Coalescer   │◀──────────────┘
//! └──────────────┘             └──────────────┘
//!                                     │ write_snapshot
//!                                     ▼
//!                              ┌──────────────┐
//!                              │ SnapshotSink │
//!                              └──────────────┘
//! ```
//!
//! ## Shutdown
//!
//! Every worker shares one `CancellationToken`. On SIGINT/SIGTERM (or the
//! test shutdown channel) the token is cancelled; an in-flight flush is
//! abandoned. If a worker fails fatally the others are cancelled and its
//! error is returned.

mod event;

pub use event::{EngineEvent, EventEmitter};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::adapter::SubscriptionAdapter;
use crate::coalescer::{self, Coalescer};
use crate::config::{EngineConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::registry::PluginRegistry;
use crate::store::EntryStore;
use crate::traits::{ResourceProjector, ResourceSource, SnapshotSink};

/// One resource kind to watch, and the projector for its objects
#[derive(Clone)]
pub struct Subscription {
    /// Where events come from
    pub source: Arc<dyn ResourceSource>,
    /// How objects become records
    pub projector: Arc<dyn ResourceProjector>,
}

impl Subscription {
    /// Create a new subscription
    pub fn new(source: Arc<dyn ResourceSource>, projector: Arc<dyn ResourceProjector>) -> Self {
        Self { source, projector }
    }
}

/// Core synchronization engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`] (or [`SyncEngine::from_config()`])
/// 2. Start with [`SyncEngine::run()`]
/// 3. Engine runs until a shutdown signal is received or a worker fails
///
/// The Entry Store starts empty on every run; the subscriptions' initial
/// replay repopulates it.
pub struct SyncEngine {
    subscriptions: Vec<Subscription>,
    sink: Arc<dyn SnapshotSink>,
    store: EntryStore,
    config: EngineConfig,
    events: EventEmitter,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `subscriptions`: One per resource kind
    /// - `sink`: Where snapshots go
    /// - `config`: Engine settings
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        subscriptions: Vec<Subscription>,
        sink: Arc<dyn SnapshotSink>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        if subscriptions.is_empty() {
            return Err(Error::config("No subscriptions configured"));
        }

        let (events, rx) = EventEmitter::channel(config.event_channel_capacity);

        let engine = Self {
            subscriptions,
            sink,
            store: EntryStore::new(),
            config,
            events,
        };

        Ok((engine, rx))
    }

    /// Create an engine from configuration, resolving plugins in `registry`
    ///
    /// Each projector is paired with the resource source registered under
    /// the projector's name.
    pub fn from_config(
        config: &SyncConfig,
        registry: &PluginRegistry,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let mut subscriptions = Vec::with_capacity(config.projectors.len());
        for projector_config in &config.projectors {
            let projector = registry.create_projector(projector_config, &config.search_domain)?;
            let source = registry.create_source(projector.name())?;
            subscriptions.push(Subscription::new(source, projector));
        }
        let sink = registry.create_sink(&config.sink)?;

        Self::new(subscriptions, sink, config.engine.clone())
    }

    /// The store this engine maintains
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Run the engine until SIGINT/SIGTERM
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error (sink or subscription failure)
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.store.clear().await;
        self.events.emit(EngineEvent::Started {
            subscriptions: self.subscriptions.len(),
        });

        let cancel = CancellationToken::new();
        let (signals, signal_rx) = coalescer::signal::channel(self.config.signal_queue_capacity);

        let worker = Coalescer::new(
            self.store.clone(),
            self.sink.clone(),
            &self.config,
            self.events.clone(),
        );
        let mut coalescer_task = tokio::spawn(worker.run(signal_rx, cancel.clone()));

        let timer = tokio::spawn(coalescer::force_after(
            Duration::from_secs(self.config.startup_flush_delay_secs),
            signals.clone(),
            cancel.clone(),
        ));

        let mut adapters = JoinSet::new();
        for subscription in &self.subscriptions {
            let adapter = SubscriptionAdapter::new(
                subscription.projector.clone(),
                self.store.clone(),
                signals.clone(),
                self.events.clone(),
            );
            adapters.spawn(adapter.run(subscription.source.clone(), cancel.clone()));
        }
        drop(signals);

        info!(
            "Engine started with {} subscription(s)",
            self.subscriptions.len()
        );

        let mut coalescer_done = false;
        let outcome = tokio::select! {
            _ = wait_for_shutdown(shutdown_rx) => {
                info!("Shutdown signal received");
                Ok(())
            }
            result = &mut coalescer_task => {
                coalescer_done = true;
                flatten(result)
            }
            Some(result) = adapters.join_next() => flatten(result),
        };

        cancel.cancel();
        timer.abort();

        if !coalescer_done {
            if let Err(e) = finish(coalescer_task).await {
                debug!("Coalescer stopped with: {}", e);
            }
        }
        while let Some(result) = adapters.join_next().await {
            if let Err(e) = flatten(result) {
                debug!("Subscription stopped with: {}", e);
            }
        }

        let reason = match &outcome {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => {
                error!("Engine stopped: {}", e);
                e.to_string()
            }
        };
        self.events.emit(EngineEvent::Stopped { reason });

        outcome
    }

    /// Run the engine with a controlled shutdown signal
    ///
    /// With `None` this behaves like [`run()`](Self::run). With `Some(rx)`
    /// the engine stops when `rx` resolves instead of on OS signals; tests
    /// and embedders use this.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }
}

async fn finish(task: JoinHandle<Result<()>>) -> Result<()> {
    flatten(task.await)
}

fn flatten(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(Error::Other(format!("worker task failed: {}", e))),
    }
}

async fn wait_for_shutdown(shutdown_rx: Option<oneshot::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => os_shutdown_signal().await,
    }
}

#[cfg(unix)]
async fn os_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            debug!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn os_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
