use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::error::{Error, Result};

/// A request to bring the sink up to date with the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// An entry changed; `source` is the projector that changed it
    Changed {
        /// Projector name
        source: &'static str,
    },
    /// Periodic or startup push regardless of changes
    Forced,
}

/// Create the signal queue
///
/// # Parameters
///
/// - `capacity`: Queue capacity, see `EngineConfig::signal_queue_capacity`
pub fn channel(capacity: usize) -> (SignalSender, mpsc::Receiver<Signal>) {
    let (tx, rx) = mpsc::channel(capacity);
    (SignalSender { tx }, rx)
}

/// Producer handle for the signal queue
///
/// Posting never drops a signal. The fast path is a non-blocking send; only
/// a full queue makes the producer wait.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<Signal>,
}

impl SignalSender {
    /// Post a signal to the coalescer
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The signal is queued
    /// - `Err(Error)`: The coalescer has stopped
    pub async fn post(&self, signal: Signal) -> Result<()> {
        match self.tx.try_send(signal) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(signal)) => {
                warn!("Signal queue full, waiting for the coalescer. Consider increasing signal_queue_capacity.");
                self.tx
                    .send(signal)
                    .await
                    .map_err(|_| Error::Other("signal queue closed".to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(Error::Other("signal queue closed".to_string())),
        }
    }
}
