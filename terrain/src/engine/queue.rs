//! Requests waiting for the next dispatch.

use std::collections::VecDeque;

use super::ConsumerId;
use crate::coord::Coordinate;

/// A submission that has not been sent to the transport yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub consumer: ConsumerId,
    pub points: Vec<Coordinate>,
}

/// Submissions in arrival order.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingRequest>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a submission. Empty point lists are kept; they resolve to an
    /// empty height list.
    pub fn enqueue(&mut self, consumer: ConsumerId, points: Vec<Coordinate>) {
        self.entries.push_back(PendingRequest { consumer, points });
    }

    /// Drop the consumer's submission. Returns whether one was queued.
    pub fn remove(&mut self, consumer: ConsumerId) -> bool {
        match self.entries.iter().position(|r| r.consumer == consumer) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take every queued submission, oldest first.
    pub fn take_all(&mut self) -> Vec<PendingRequest> {
        self.entries.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
