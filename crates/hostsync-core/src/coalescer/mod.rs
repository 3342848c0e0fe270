//! Update coalescer
//!
//! Turns store-change signals into throttled sink writes.
//!
//! ## Flow per dequeued signal
//!
//! 1. More signals queued behind it → skip, the last one will flush
//! 2. Render the store
//! 3. Last flush at least `max_staleness` ago → flush now
//! 4. Otherwise settle for `settle_delay`; if a signal arrived meanwhile,
//!    drop the snapshot, else flush
//!
//! A single worker drains the queue, so flushes never overlap. A signal
//! posted during a flush is simply the next one dequeued.

pub mod debounce;
pub mod signal;

pub use debounce::{Action, Debouncer, Phase};
pub use signal::{Signal, SignalSender};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::{EngineEvent, EventEmitter};
use crate::error::{Error, Result};
use crate::store::EntryStore;
use crate::traits::SnapshotSink;

/// The flush worker
pub struct Coalescer {
    store: EntryStore,
    sink: Arc<dyn SnapshotSink>,
    debouncer: Debouncer,
    max_retries: usize,
    retry_delay: Duration,
    events: EventEmitter,
}

impl Coalescer {
    /// Create a coalescer; the staleness clock starts now
    ///
    /// # Parameters
    ///
    /// - `store`: Store to render
    /// - `sink`: Where snapshots go
    /// - `config`: Timing and retry settings
    /// - `events`: Monitoring channel
    pub fn new(
        store: EntryStore,
        sink: Arc<dyn SnapshotSink>,
        config: &EngineConfig,
        events: EventEmitter,
    ) -> Self {
        Self {
            store,
            sink,
            debouncer: Debouncer::new(
                Duration::from_millis(config.settle_delay_ms),
                Duration::from_secs(config.max_staleness_secs),
                Instant::now(),
            ),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            events,
        }
    }

    /// Drain the signal queue until cancelled
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Cancelled, or every sender is gone
    /// - `Err(Error)`: A snapshot could not be written after all retries
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<Signal>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => return Ok(()),
                },
            };

            let action = self.debouncer.on_signal(Instant::now(), signals.len());
            if action == Action::Defer {
                debug!("Skipping {:?}, newer signal is pending", signal);
                continue;
            }

            let snapshot = self.store.render().await;

            let action = match action {
                Action::SettleUntil(deadline) => {
                    info!(
                        "Waiting {:?} before attempting hostsfile update.",
                        self.debouncer.settle_delay()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                    self.debouncer.on_settled(!signals.is_empty())
                }
                other => {
                    info!(
                        "Last update was more than {:?} ago. Updating immediately.",
                        self.debouncer.max_staleness()
                    );
                    other
                }
            };

            match action {
                Action::FlushNow => {
                    if !self.flush(&snapshot, &cancel).await? {
                        return Ok(());
                    }
                }
                _ => {
                    info!("Aborting hostsfile update. Newer hostsfile is pending.");
                    self.events.emit(EngineEvent::FlushAborted);
                }
            }
        }
    }

    /// Write one snapshot, retrying per the engine policy
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Written
    /// - `Ok(false)`: Abandoned because the engine is shutting down
    /// - `Err(Error)`: Every attempt failed
    async fn flush(&mut self, snapshot: &str, cancel: &CancellationToken) -> Result<bool> {
        let entries = snapshot.lines().count();
        self.events.emit(EngineEvent::FlushStarted {
            bytes: snapshot.len(),
        });

        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.debouncer.on_flush_failed();
                    return Ok(false);
                }
                result = self.sink.write_snapshot(snapshot) => result,
            };

            match result {
                Ok(()) => {
                    self.debouncer.on_flushed(Instant::now());
                    info!(
                        "Hostsfile updated via {} ({} entries)",
                        self.sink.sink_name(),
                        entries
                    );
                    self.events.emit(EngineEvent::FlushSucceeded {
                        entries,
                        bytes: snapshot.len(),
                    });
                    return Ok(true);
                }
                Err(e) => {
                    warn!("Hostsfile update attempt {} failed: {}", attempt, e);
                    self.events.emit(EngineEvent::FlushFailed {
                        error: e.to_string(),
                        attempt,
                    });

                    if attempt > self.max_retries {
                        self.debouncer.on_flush_failed();
                        error!("Giving up on hostsfile update after {} attempt(s)", attempt);
                        return Err(Error::sink_failed(self.sink.sink_name(), e.to_string()));
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            self.debouncer.on_flush_failed();
                            return Ok(false);
                        }
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}

/// Post one forced signal after `delay`, unless cancelled first
///
/// This pushes the initial steady state once the subscriptions have
/// replayed, even if nothing changes afterwards.
pub async fn force_after(delay: Duration, signals: SignalSender, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {
            info!("Forcing update of hostsfile to ensure initial launch configurations persist");
            if let Err(e) = signals.post(Signal::Forced).await {
                debug!("Forced update not posted: {}", e);
            }
        }
    }
}
