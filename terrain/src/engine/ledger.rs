//! Bookkeeping for the dispatch currently awaiting a response.
//!
//! The ledger remembers, in dispatch order, how many points each consumer
//! contributed to the flattened transport call. Responses are split back out
//! by walking it in the same order. Destroyed consumers keep their slot so
//! later consumers stay aligned; their slice is consumed and discarded.

use super::queue::PendingRequest;
use super::{ConsumerId, Delivery, Outcome};
use crate::coord::Coordinate;
use crate::error::TerrainError;

#[derive(Debug, Clone, PartialEq)]
struct InFlightRequest {
    consumer: ConsumerId,
    point_count: usize,
    destroyed: bool,
}

/// Consumers folded into the outstanding transport call.
#[derive(Debug, Default)]
pub struct InFlightLedger {
    entries: Vec<InFlightRequest>,
}

impl InFlightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pending` as dispatched and return their points flattened in
    /// order.
    pub fn begin_dispatch(&mut self, pending: Vec<PendingRequest>) -> Vec<Coordinate> {
        debug_assert!(self.entries.is_empty(), "previous dispatch not settled");
        self.entries.clear();

        let mut points = Vec::with_capacity(pending.iter().map(|r| r.points.len()).sum());
        for request in pending {
            self.entries.push(InFlightRequest {
                consumer: request.consumer,
                point_count: request.points.len(),
                destroyed: false,
            });
            points.extend(request.points);
        }
        points
    }

    /// Mark a dispatched consumer as gone. Returns whether it was in flight.
    pub fn mark_destroyed(&mut self, consumer: ConsumerId) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.consumer == consumer && !e.destroyed)
        {
            Some(entry) => {
                entry.destroyed = true;
                true
            }
            None => false,
        }
    }

    /// Split `heights` across the ledger and clear it.
    ///
    /// A height list that does not cover the ledger exactly is treated as a
    /// failed dispatch.
    pub fn deliver(&mut self, heights: Vec<f64>) -> Vec<Delivery> {
        let expected = self.total_points();
        if heights.len() != expected {
            let error = TerrainError::LengthMismatch {
                expected,
                actual: heights.len(),
            };
            tracing::warn!(error = %error, "Failing dispatch");
            return self.deliver_failure();
        }

        let mut remaining = heights.into_iter();
        self.entries
            .drain(..)
            .filter_map(|entry| {
                let slice: Vec<f64> = remaining.by_ref().take(entry.point_count).collect();
                (!entry.destroyed).then(|| Delivery {
                    consumer: entry.consumer,
                    outcome: Outcome::Heights(slice),
                })
            })
            .collect()
    }

    /// Fail every surviving consumer and clear the ledger.
    pub fn deliver_failure(&mut self) -> Vec<Delivery> {
        self.entries
            .drain(..)
            .filter(|entry| !entry.destroyed)
            .map(|entry| Delivery {
                consumer: entry.consumer,
                outcome: Outcome::Failed,
            })
            .collect()
    }

    /// Points covered by the outstanding dispatch.
    pub fn total_points(&self) -> usize {
        self.entries.iter().map(|e| e.point_count).sum()
    }

    /// Entries whose consumer was destroyed after dispatch.
    pub fn destroyed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.destroyed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64, n: usize) -> PendingRequest {
        PendingRequest {
            consumer: ConsumerId(id),
            points: (0..n)
                .map(|i| Coordinate::new(id as f64, i as f64))
                .collect(),
        }
    }

    #[test]
    fn test_begin_dispatch_flattens_in_order() {
        let mut ledger = InFlightLedger::new();
        let points = ledger.begin_dispatch(vec![request(1, 2), request(2, 1)]);

        assert_eq!(
            points,
            vec![
                Coordinate::new(1.0, 0.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(2.0, 0.0),
            ]
        );
        assert_eq!(ledger.total_points(), 3);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_deliver_splits_by_point_count() {
        let mut ledger = InFlightLedger::new();
        ledger.begin_dispatch(vec![request(1, 2), request(2, 0), request(3, 1)]);

        let deliveries = ledger.deliver(vec![10.0, 12.0, 9.5]);
        assert_eq!(
            deliveries,
            vec![
                Delivery {
                    consumer: ConsumerId(1),
                    outcome: Outcome::Heights(vec![10.0, 12.0]),
                },
                Delivery {
                    consumer: ConsumerId(2),
                    outcome: Outcome::Heights(vec![]),
                },
                Delivery {
                    consumer: ConsumerId(3),
                    outcome: Outcome::Heights(vec![9.5]),
                },
            ]
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_destroyed_slot_keeps_alignment() {
        let mut ledger = InFlightLedger::new();
        ledger.begin_dispatch(vec![request(1, 1), request(2, 2), request(3, 1)]);
        assert!(ledger.mark_destroyed(ConsumerId(2)));
        assert!(!ledger.mark_destroyed(ConsumerId(2)));
        assert_eq!(ledger.destroyed_count(), 1);

        let deliveries = ledger.deliver(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].outcome, Outcome::Heights(vec![1.0]));
        assert_eq!(deliveries[1].consumer, ConsumerId(3));
        assert_eq!(deliveries[1].outcome, Outcome::Heights(vec![4.0]));
    }

    #[test]
    fn test_length_mismatch_fails_survivors() {
        let mut ledger = InFlightLedger::new();
        ledger.begin_dispatch(vec![request(1, 2), request(2, 1)]);
        ledger.mark_destroyed(ConsumerId(1));

        let deliveries = ledger.deliver(vec![1.0]);
        assert_eq!(
            deliveries,
            vec![Delivery {
                consumer: ConsumerId(2),
                outcome: Outcome::Failed,
            }]
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_failure_skips_destroyed() {
        let mut ledger = InFlightLedger::new();
        ledger.begin_dispatch(vec![request(1, 1), request(2, 1)]);
        ledger.mark_destroyed(ConsumerId(2));

        let deliveries = ledger.deliver_failure();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].consumer, ConsumerId(1));
        assert_eq!(deliveries[0].outcome, Outcome::Failed);
    }
}
