use tokio::sync::mpsc;
use tracing::warn;

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        subscriptions: usize,
    },

    /// An entry was inserted, replaced or removed
    EntryChanged {
        source: String,
        identity: String,
        removed: bool,
    },

    /// An object was not admitted
    EntryRejected {
        source: String,
        identity: Option<String>,
        reason: String,
    },

    /// A snapshot write started
    FlushStarted {
        bytes: usize,
    },

    /// A snapshot write succeeded
    FlushSucceeded {
        entries: usize,
        bytes: usize,
    },

    /// A settled snapshot was dropped in favor of a newer one
    FlushAborted,

    /// A snapshot write attempt failed
    FlushFailed {
        error: String,
        attempt: usize,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Non-blocking sender for [`EngineEvent`]s
///
/// Monitoring must never slow the engine down, so a full channel drops the
/// event with a warning. Coalescer signals do not go through here.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventEmitter {
    /// Create an emitter and the matching receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an engine event
    pub fn emit(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_drops_events() {
        let (emitter, mut rx) = EventEmitter::channel(1);
        emitter.emit(EngineEvent::FlushAborted);
        emitter.emit(EngineEvent::FlushStarted { bytes: 3 });

        assert_eq!(rx.try_recv().unwrap(), EngineEvent::FlushAborted);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (emitter, rx) = EventEmitter::channel(1);
        drop(rx);
        emitter.emit(EngineEvent::FlushAborted);
    }
}
