// # Debouncer
//
// The flush timing policy as a pure state machine. It never sleeps and never
// reads the clock itself: every transition takes `now` from the caller, so
// the policy is tested without real delays.
//
// ## States
//
// ```text
//   Idle ── signal, fresh ──▶ Collecting ── settled, quiet ──▶ Flushing
//    │                            │                               │
//    │                            └── settled, newer ──▶ Idle     │
//    └──── signal, stale ──────────────────────────────▶ Flushing │
//                                                                 ▼
//                                    Idle ◀── flushed / failed ───┘
// ```
//
// A signal with more signals queued behind it does nothing: the iteration
// that drains the last queued signal flushes for all of them.

use std::time::Duration;
use tokio::time::Instant;

/// Where the debouncer is in the flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a signal
    Idle,
    /// Waiting for a burst to settle before flushing
    Collecting {
        /// When the settle delay ends
        deadline: Instant,
    },
    /// A snapshot is being written
    Flushing,
}

/// What the worker should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// More signals are queued; leave the flush to the last one
    Defer,
    /// Write the snapshot now
    FlushNow,
    /// Wait until the deadline, then report whether anything arrived
    SettleUntil(Instant),
    /// A newer signal arrived while settling; drop this snapshot
    Abort,
}

/// Flush timing state machine
#[derive(Debug, Clone)]
pub struct Debouncer {
    settle_delay: Duration,
    max_staleness: Duration,
    last_flush: Instant,
    phase: Phase,
}

impl Debouncer {
    /// Create a debouncer that counts `now` as the last flush
    ///
    /// # Parameters
    ///
    /// - `settle_delay`: How long a non-urgent flush waits for a burst to end
    /// - `max_staleness`: Once this long has passed since the last flush,
    ///   flush without settling
    /// - `now`: Construction time
    pub fn new(settle_delay: Duration, max_staleness: Duration, now: Instant) -> Self {
        Self {
            settle_delay,
            max_staleness,
            last_flush: now,
            phase: Phase::Idle,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Time of the last successful flush (or construction)
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Configured settle delay
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Configured staleness bound
    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    /// A signal was dequeued
    ///
    /// # Parameters
    ///
    /// - `now`: Current time
    /// - `pending_behind`: Number of signals still queued behind this one
    pub fn on_signal(&mut self, now: Instant, pending_behind: usize) -> Action {
        if pending_behind > 0 {
            return Action::Defer;
        }

        if now.saturating_duration_since(self.last_flush) >= self.max_staleness {
            self.phase = Phase::Flushing;
            return Action::FlushNow;
        }

        match now.checked_add(self.settle_delay) {
            Some(deadline) => {
                self.phase = Phase::Collecting { deadline };
                Action::SettleUntil(deadline)
            }
            // a deadline past the clock's range would never fire
            None => {
                self.phase = Phase::Flushing;
                Action::FlushNow
            }
        }
    }

    /// The settle delay ended
    ///
    /// # Parameters
    ///
    /// - `arrived`: Whether any signal was queued during the delay
    ///
    /// # Returns
    ///
    /// [`Action::Abort`] or [`Action::FlushNow`]
    pub fn on_settled(&mut self, arrived: bool) -> Action {
        if arrived {
            self.phase = Phase::Idle;
            Action::Abort
        } else {
            self.phase = Phase::Flushing;
            Action::FlushNow
        }
    }

    /// The snapshot was written
    pub fn on_flushed(&mut self, now: Instant) {
        self.last_flush = now;
        self.phase = Phase::Idle;
    }

    /// The snapshot could not be written (or the write was abandoned)
    pub fn on_flush_failed(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_secs(1);
    const STALE: Duration = Duration::from_secs(60);

    fn start() -> (Debouncer, Instant) {
        let now = Instant::from_std(std::time::Instant::now());
        (Debouncer::new(SETTLE, STALE, now), now)
    }

    #[test]
    fn defers_while_signals_are_queued() {
        let (mut debouncer, t0) = start();

        assert_eq!(debouncer.on_signal(t0, 1), Action::Defer);
        assert_eq!(debouncer.on_signal(t0, 5), Action::Defer);
        assert_eq!(debouncer.phase(), Phase::Idle);

        // even a stale debouncer defers to the last queued signal
        let later = t0 + STALE * 2;
        assert_eq!(debouncer.on_signal(later, 1), Action::Defer);
    }

    #[test]
    fn settles_when_recently_flushed() {
        let (mut debouncer, t0) = start();
        let now = t0 + Duration::from_secs(10);

        assert_eq!(debouncer.on_signal(now, 0), Action::SettleUntil(now + SETTLE));
        assert_eq!(debouncer.phase(), Phase::Collecting { deadline: now + SETTLE });

        assert_eq!(debouncer.on_settled(false), Action::FlushNow);
        assert_eq!(debouncer.phase(), Phase::Flushing);

        debouncer.on_flushed(now + SETTLE);
        assert_eq!(debouncer.phase(), Phase::Idle);
        assert_eq!(debouncer.last_flush(), now + SETTLE);
    }

    #[test]
    fn aborts_when_a_newer_signal_arrives() {
        let (mut debouncer, t0) = start();

        assert!(matches!(debouncer.on_signal(t0, 0), Action::SettleUntil(_)));
        assert_eq!(debouncer.on_settled(true), Action::Abort);
        assert_eq!(debouncer.phase(), Phase::Idle);
        assert_eq!(debouncer.last_flush(), t0);
    }

    #[test]
    fn flushes_immediately_when_stale() {
        let (mut debouncer, t0) = start();

        let just_fresh = t0 + STALE - Duration::from_millis(1);
        assert!(matches!(debouncer.on_signal(just_fresh, 0), Action::SettleUntil(_)));
        debouncer.on_settled(true);

        let stale = t0 + STALE;
        assert_eq!(debouncer.on_signal(stale, 0), Action::FlushNow);
        assert_eq!(debouncer.phase(), Phase::Flushing);
    }

    #[test]
    fn staleness_counts_from_last_successful_flush() {
        let (mut debouncer, t0) = start();

        let first = t0 + Duration::from_secs(61);
        assert_eq!(debouncer.on_signal(first, 0), Action::FlushNow);
        debouncer.on_flushed(first);

        let second = first + Duration::from_secs(30);
        assert!(matches!(debouncer.on_signal(second, 0), Action::SettleUntil(_)));
        debouncer.on_settled(false);
        debouncer.on_flush_failed();

        // a failed flush does not reset the staleness clock
        assert_eq!(debouncer.last_flush(), first);
        let third = first + STALE;
        assert_eq!(debouncer.on_signal(third, 0), Action::FlushNow);
    }

    #[test]
    fn unrepresentable_settle_deadline_flushes() {
        let t0 = Instant::from_std(std::time::Instant::now());
        let mut debouncer = Debouncer::new(Duration::MAX, STALE, t0);

        assert_eq!(debouncer.on_signal(t0, 0), Action::FlushNow);
        assert_eq!(debouncer.phase(), Phase::Flushing);
    }
}
