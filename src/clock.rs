//! Cancellable one-second countdown for the opponent-waiting window.
//!
//! The session state machine arms a countdown when it enters the waiting
//! phase and cancels it the instant the phase changes. Ticks are not
//! delivered as callbacks — the clock emits [`ClockEvent`]s into the
//! session's serialized event queue so they interleave with transport
//! messages in wall-clock order and never race the state machine.
//!
//! Cancellation guarantee: every event carries the [`CountdownId`] of the
//! countdown that produced it, and the state machine applies events from the
//! live countdown only. A tick already queued when its countdown is cancelled
//! is discarded on arrival, never applied.

/// Token identifying one armed countdown.
///
/// Fake clocks in tests construct their own ids to script tick delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountdownId(pub u64);

/// A timing event produced by an armed countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEvent {
    /// The countdown that produced this event.
    pub id: CountdownId,
    /// Tick or expiry.
    pub kind: ClockEventKind,
}

/// The two kinds of countdown events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEventKind {
    /// One second passed; this many seconds remain.
    Tick(u32),
    /// The countdown reached zero without being cancelled. Fires once.
    Elapsed,
}

/// A cancellable countdown ticking once per second.
///
/// At most one countdown is live at a time: [`arm`](Clock::arm) cancels any
/// running countdown before starting the new one. [`cancel`](Clock::cancel)
/// after natural completion is a no-op.
pub trait Clock: Send + 'static {
    /// Start a countdown from `seconds`, cancelling any running one first.
    /// Returns the id that tags every event the new countdown emits.
    fn arm(&mut self, seconds: u32) -> CountdownId;

    /// Stop the running countdown, if any. Events from cancelled countdowns
    /// must never be applied by consumers.
    fn cancel(&mut self);
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_clock::TokioClock;

#[cfg(feature = "tokio-runtime")]
mod tokio_clock {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tracing::debug;

    use super::{Clock, ClockEvent, ClockEventKind, CountdownId};

    /// Tokio-backed [`Clock`] driving a spawned one-second tick task.
    ///
    /// Events are sent into the unbounded channel handed to [`TokioClock::new`];
    /// the session loop owns the receiving half. Cancelling aborts the tick
    /// task, and the id check on the consumer side discards any tick that was
    /// already in flight.
    #[derive(Debug)]
    pub struct TokioClock {
        events: mpsc::UnboundedSender<ClockEvent>,
        next_id: u64,
        task: Option<tokio::task::JoinHandle<()>>,
    }

    impl TokioClock {
        /// Create a clock emitting events into the given channel.
        pub fn new(events: mpsc::UnboundedSender<ClockEvent>) -> Self {
            Self {
                events,
                next_id: 0,
                task: None,
            }
        }
    }

    impl Clock for TokioClock {
        fn arm(&mut self, seconds: u32) -> CountdownId {
            self.cancel();
            self.next_id += 1;
            let id = CountdownId(self.next_id);
            let tx = self.events.clone();
            debug!(?id, seconds, "arming countdown");
            self.task = Some(tokio::spawn(async move {
                let mut remaining = seconds;
                while remaining > 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    remaining -= 1;
                    let tick = ClockEvent {
                        id,
                        kind: ClockEventKind::Tick(remaining),
                    };
                    if tx.send(tick).is_err() {
                        // Receiver gone — session loop exited.
                        return;
                    }
                }
                let _ = tx.send(ClockEvent {
                    id,
                    kind: ClockEventKind::Elapsed,
                });
            }));
            id
        }

        fn cancel(&mut self) {
            if let Some(task) = self.task.take() {
                debug!("cancelling countdown");
                task.abort();
            }
        }
    }

    impl Drop for TokioClock {
        fn drop(&mut self) {
            self.cancel();
        }
    }
}

#[cfg(all(test, feature = "tokio-runtime"))]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_down_to_zero_then_elapses() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioClock::new(tx);
        let id = clock.arm(3);

        for expected in (0..3).rev() {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.id, id);
            assert_eq!(event.kind, ClockEventKind::Tick(expected));
        }
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ClockEventKind::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioClock::new(tx);
        clock.arm(10);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ClockEventKind::Tick(9));

        clock.cancel();
        // Allow any in-flight task activity to settle, then verify silence.
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err(), "tick delivered after cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_the_previous_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioClock::new(tx);
        let first_id = clock.arm(10);
        let second_id = clock.arm(2);
        assert_ne!(first_id, second_id);

        // Only the second countdown's events arrive.
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.id, second_id);
            seen.push(event.kind);
            if event.kind == ClockEventKind::Elapsed {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                ClockEventKind::Tick(1),
                ClockEventKind::Tick(0),
                ClockEventKind::Elapsed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_second_countdown_elapses_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioClock::new(tx);
        let id = clock.arm(0);
        let event = rx.recv().await.unwrap();
        assert_eq!(event, ClockEvent {
            id,
            kind: ClockEventKind::Elapsed
        });
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_completion_is_a_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioClock::new(tx);
        clock.arm(1);
        let _ = rx.recv().await.unwrap(); // Tick(0)
        let _ = rx.recv().await.unwrap(); // Elapsed
        clock.cancel();
        clock.cancel();
    }
}
