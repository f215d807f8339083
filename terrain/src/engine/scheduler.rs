//! The batching state machine.
//!
//! [`BatchScheduler`] owns the pending queue and the in-flight ledger and
//! reacts to [`Event`]s by returning [`Effect`]s for the caller to carry out.
//! It never sleeps, spawns or performs I/O itself.
//!
//! ```text
//!            submit                  timer fires
//!   Idle ───────────────> Scheduled ─────────────> AwaitingResponse
//!    ^                        │                       │      ^
//!    │  queue emptied by      │                       │      │ response, queue
//!    └─ destruction ──────────┘                       │      │ not empty
//!    ^                                                │──────┘
//!    └──────────── response, queue empty ─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::ledger::InFlightLedger;
use super::queue::PendingQueue;
use super::{ConsumerId, Delivery, EngineCounters, Outcome};
use crate::coord::Coordinate;
use crate::error::TerrainError;

/// Engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing queued, nothing in flight.
    Idle,
    /// The coalescing window is counting down.
    Scheduled,
    /// Exactly one transport call is outstanding.
    AwaitingResponse,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum Event {
    /// A consumer asked for heights at `points`.
    Submit {
        consumer: ConsumerId,
        points: Vec<Coordinate>,
    },
    /// The coalescing timer armed with `epoch` elapsed.
    TimerFired { epoch: u64 },
    /// The outstanding transport call finished.
    TransportCompleted(Result<Vec<f64>, TerrainError>),
    /// A consumer no longer wants its result.
    ConsumerDestroyed(ConsumerId),
}

/// Work the driver must perform on behalf of the state machine.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Start a one-shot timer that reports back with `epoch`.
    ArmTimer { epoch: u64, delay: Duration },
    /// Cancel the armed timer.
    CancelTimer,
    /// Issue a single transport call for `points`.
    Dispatch(Vec<Coordinate>),
    /// Hand a result to a consumer.
    Deliver(Delivery),
}

/// Coalescing scheduler: single flight per window, ordered fan-out.
#[derive(Debug)]
pub struct BatchScheduler {
    state: BatchState,
    window: Duration,
    epoch: u64,
    queue: PendingQueue,
    ledger: InFlightLedger,
    counters: Arc<EngineCounters>,
}

impl BatchScheduler {
    /// Scheduler whose first dispatch after idleness waits `window`.
    pub fn new(window: Duration) -> Self {
        Self::with_counters(window, Arc::default())
    }

    pub(crate) fn with_counters(window: Duration, counters: Arc<EngineCounters>) -> Self {
        Self {
            state: BatchState::Idle,
            window,
            epoch: 0,
            queue: PendingQueue::new(),
            ledger: InFlightLedger::new(),
            counters,
        }
    }

    /// Current phase.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Number of submissions waiting for the next dispatch.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of consumers in the outstanding dispatch, destroyed included.
    pub fn in_flight_len(&self) -> usize {
        self.ledger.len()
    }

    /// Apply one event.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Submit { consumer, points } => self.on_submit(consumer, points),
            Event::TimerFired { epoch } => self.on_timer(epoch),
            Event::TransportCompleted(result) => self.on_transport_completed(result),
            Event::ConsumerDestroyed(consumer) => self.on_consumer_destroyed(consumer),
        }
    }

    fn on_submit(&mut self, consumer: ConsumerId, points: Vec<Coordinate>) -> Vec<Effect> {
        tracing::trace!(%consumer, points = points.len(), state = ?self.state, "Queued submission");
        self.queue.enqueue(consumer, points);

        if self.state != BatchState::Idle {
            return Vec::new();
        }

        self.epoch += 1;
        self.state = BatchState::Scheduled;
        vec![Effect::ArmTimer {
            epoch: self.epoch,
            delay: self.window,
        }]
    }

    fn on_timer(&mut self, epoch: u64) -> Vec<Effect> {
        if self.state != BatchState::Scheduled || epoch != self.epoch {
            tracing::trace!(epoch, current = self.epoch, "Ignoring stale batch timer");
            return Vec::new();
        }
        self.dispatch_next()
    }

    fn on_transport_completed(&mut self, result: Result<Vec<f64>, TerrainError>) -> Vec<Effect> {
        if self.state != BatchState::AwaitingResponse {
            tracing::warn!(state = ?self.state, "Transport completion with no dispatch outstanding");
            return Vec::new();
        }

        let discarded = self.ledger.destroyed_count() as u64;
        let deliveries = match result {
            Ok(heights) => self.ledger.deliver(heights),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    consumers = self.ledger.len(),
                    "Terrain dispatch failed"
                );
                self.ledger.deliver_failure()
            }
        };
        self.counters.record_discarded(discarded);

        let mut effects = self.deliveries(deliveries);
        if self.queue.is_empty() {
            self.state = BatchState::Idle;
        } else {
            // Back-to-back dispatch: the window only applies after idleness.
            effects.extend(self.dispatch_next());
        }
        effects
    }

    fn on_consumer_destroyed(&mut self, consumer: ConsumerId) -> Vec<Effect> {
        if self.queue.remove(consumer) {
            tracing::debug!(%consumer, "Dropped queued submission of destroyed consumer");
            if self.state == BatchState::Scheduled && self.queue.is_empty() {
                self.state = BatchState::Idle;
                return vec![Effect::CancelTimer];
            }
        } else if self.ledger.mark_destroyed(consumer) {
            tracing::debug!(%consumer, "Consumer destroyed while its dispatch is in flight");
        }
        Vec::new()
    }

    /// Move the whole queue into a new dispatch.
    fn dispatch_next(&mut self) -> Vec<Effect> {
        let pending = self.queue.take_all();
        if pending.is_empty() {
            self.state = BatchState::Idle;
            return Vec::new();
        }

        let consumers = pending.len();
        let points = self.ledger.begin_dispatch(pending);

        if points.is_empty() {
            // Only zero-point submissions: nothing to ask the transport.
            let deliveries = self.ledger.deliver(Vec::new());
            self.state = BatchState::Idle;
            return self.deliveries(deliveries);
        }

        tracing::debug!(consumers, points = points.len(), "Dispatching terrain batch");
        self.counters.record_dispatch(points.len() as u64);
        self.state = BatchState::AwaitingResponse;
        vec![Effect::Dispatch(points)]
    }

    fn deliveries(&self, deliveries: Vec<Delivery>) -> Vec<Effect> {
        deliveries
            .into_iter()
            .inspect(|d| match d.outcome {
                Outcome::Heights(_) => self.counters.record_delivered(),
                Outcome::Failed => self.counters.record_failed(),
            })
            .map(Effect::Deliver)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn p(lat: f64) -> Coordinate {
        Coordinate::new(lat, 0.0)
    }

    fn submit(id: u64, points: Vec<Coordinate>) -> Event {
        Event::Submit {
            consumer: ConsumerId(id),
            points,
        }
    }

    fn heights(id: u64, h: Vec<f64>) -> Effect {
        Effect::Deliver(Delivery {
            consumer: ConsumerId(id),
            outcome: Outcome::Heights(h),
        })
    }

    fn failed(id: u64) -> Effect {
        Effect::Deliver(Delivery {
            consumer: ConsumerId(id),
            outcome: Outcome::Failed,
        })
    }

    #[test]
    fn test_first_submit_arms_window() {
        let mut s = BatchScheduler::new(WINDOW);
        let effects = s.handle(submit(1, vec![p(1.0)]));

        assert_eq!(
            effects,
            vec![Effect::ArmTimer {
                epoch: 1,
                delay: WINDOW
            }]
        );
        assert_eq!(s.state(), BatchState::Scheduled);

        // Later submissions neither re-arm nor extend the window.
        assert!(s.handle(submit(2, vec![p(2.0)])).is_empty());
        assert_eq!(s.pending_len(), 2);
    }

    #[test]
    fn test_window_coalesces_into_one_dispatch() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0), p(2.0)]));
        s.handle(submit(2, vec![p(3.0)]));

        let effects = s.handle(Event::TimerFired { epoch: 1 });
        assert_eq!(effects, vec![Effect::Dispatch(vec![p(1.0), p(2.0), p(3.0)])]);
        assert_eq!(s.state(), BatchState::AwaitingResponse);

        let effects = s.handle(Event::TransportCompleted(Ok(vec![10.0, 12.0, 9.5])));
        assert_eq!(
            effects,
            vec![heights(1, vec![10.0, 12.0]), heights(2, vec![9.5])]
        );
        assert_eq!(s.state(), BatchState::Idle);
    }

    #[test]
    fn test_destroy_before_window_cancels_timer() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));

        let effects = s.handle(Event::ConsumerDestroyed(ConsumerId(1)));
        assert_eq!(effects, vec![Effect::CancelTimer]);
        assert_eq!(s.state(), BatchState::Idle);

        // A late timer from the cancelled window does nothing.
        assert!(s.handle(Event::TimerFired { epoch: 1 }).is_empty());
    }

    #[test]
    fn test_destroy_one_of_two_keeps_timer() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));
        s.handle(submit(2, vec![p(2.0)]));

        assert!(s.handle(Event::ConsumerDestroyed(ConsumerId(1))).is_empty());
        let effects = s.handle(Event::TimerFired { epoch: 1 });
        assert_eq!(effects, vec![Effect::Dispatch(vec![p(2.0)])]);
    }

    #[test]
    fn test_stale_epoch_ignored_after_rearm() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));
        s.handle(Event::ConsumerDestroyed(ConsumerId(1)));

        let effects = s.handle(submit(2, vec![p(2.0)]));
        assert_eq!(
            effects,
            vec![Effect::ArmTimer {
                epoch: 2,
                delay: WINDOW
            }]
        );
        assert!(s.handle(Event::TimerFired { epoch: 1 }).is_empty());
        assert_eq!(s.state(), BatchState::Scheduled);
        assert_eq!(
            s.handle(Event::TimerFired { epoch: 2 }),
            vec![Effect::Dispatch(vec![p(2.0)])]
        );
    }

    #[test]
    fn test_submit_while_awaiting_dispatches_immediately_after() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));
        s.handle(Event::TimerFired { epoch: 1 });

        // Accumulates without arming a timer.
        assert!(s.handle(submit(2, vec![p(2.0)])).is_empty());
        assert_eq!(s.state(), BatchState::AwaitingResponse);

        let effects = s.handle(Event::TransportCompleted(Ok(vec![5.0])));
        assert_eq!(
            effects,
            vec![heights(1, vec![5.0]), Effect::Dispatch(vec![p(2.0)])]
        );
        assert_eq!(s.state(), BatchState::AwaitingResponse);
    }

    #[test]
    fn test_destroyed_in_flight_is_skipped_on_success() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));
        s.handle(submit(2, vec![p(2.0), p(3.0)]));
        s.handle(submit(3, vec![p(4.0)]));
        s.handle(Event::TimerFired { epoch: 1 });

        assert!(s.handle(Event::ConsumerDestroyed(ConsumerId(2))).is_empty());
        let effects = s.handle(Event::TransportCompleted(Ok(vec![1.0, 2.0, 3.0, 4.0])));
        assert_eq!(effects, vec![heights(1, vec![1.0]), heights(3, vec![4.0])]);
        assert_eq!(s.counters.snapshot().results_discarded, 1);
    }

    #[test]
    fn test_failure_reaches_survivors_only() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0)]));
        s.handle(submit(2, vec![p(2.0)]));
        s.handle(Event::TimerFired { epoch: 1 });
        s.handle(Event::ConsumerDestroyed(ConsumerId(2)));

        let effects = s.handle(Event::TransportCompleted(Err(TerrainError::Transport {
            reason: "connection reset".to_string(),
        })));
        assert_eq!(effects, vec![failed(1)]);
        assert_eq!(s.state(), BatchState::Idle);
    }

    #[test]
    fn test_zero_point_submissions_resolve_without_transport() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![]));
        let effects = s.handle(Event::TimerFired { epoch: 1 });

        assert_eq!(effects, vec![heights(1, vec![])]);
        assert_eq!(s.state(), BatchState::Idle);
        assert_eq!(s.counters.snapshot().dispatches, 0);
    }

    #[test]
    fn test_zero_point_mixed_with_points() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![]));
        s.handle(submit(2, vec![p(2.0)]));
        assert_eq!(
            s.handle(Event::TimerFired { epoch: 1 }),
            vec![Effect::Dispatch(vec![p(2.0)])]
        );
        assert_eq!(
            s.handle(Event::TransportCompleted(Ok(vec![7.0]))),
            vec![heights(1, vec![]), heights(2, vec![7.0])]
        );
    }

    #[test]
    fn test_destroy_unknown_consumer_is_noop() {
        let mut s = BatchScheduler::new(WINDOW);
        assert!(s.handle(Event::ConsumerDestroyed(ConsumerId(42))).is_empty());
        assert_eq!(s.state(), BatchState::Idle);
    }

    #[test]
    fn test_mismatched_response_fails_dispatch() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(1, vec![p(1.0), p(2.0)]));
        s.handle(Event::TimerFired { epoch: 1 });

        let effects = s.handle(Event::TransportCompleted(Ok(vec![1.0, 2.0, 3.0])));
        assert_eq!(effects, vec![failed(1)]);
        assert_eq!(s.counters.snapshot().requests_failed, 1);
    }

    #[test]
    fn test_single_flight_under_many_submissions() {
        let mut s = BatchScheduler::new(WINDOW);
        s.handle(submit(0, vec![p(0.0)]));
        let first = s.handle(Event::TimerFired { epoch: 1 });
        assert_eq!(first.len(), 1);

        for id in 1..50 {
            let effects = s.handle(submit(id, vec![p(id as f64)]));
            assert!(effects
                .iter()
                .all(|e| !matches!(e, Effect::Dispatch(_) | Effect::ArmTimer { .. })));
        }
        assert_eq!(s.in_flight_len(), 1);
        assert_eq!(s.pending_len(), 49);

        let effects = s.handle(Event::TransportCompleted(Ok(vec![0.0])));
        let dispatches: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Dispatch(points) => Some(points.len()),
                _ => None,
            })
            .collect();
        assert_eq!(dispatches, vec![49]);
    }
}
