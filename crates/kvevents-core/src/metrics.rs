//! Per-client counters.
//!
//! Every condition the consume loop logs is also counted here so tests and
//! operators can assert on behavior instead of grepping logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of a client's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub gaps_detected: u64,
    pub events_missed: u64,
    pub out_of_order: u64,
    pub decode_failures: u64,
    pub batches_decoded: u64,
    pub events_dispatched: u64,
    pub handler_failures: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub replay_requests: u64,
    pub replay_failures: u64,
}

/// Live counters shared between a client and its consume loop.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    messages_received: AtomicU64,
    malformed_messages: AtomicU64,
    gaps_detected: AtomicU64,
    events_missed: AtomicU64,
    out_of_order: AtomicU64,
    decode_failures: AtomicU64,
    batches_decoded: AtomicU64,
    events_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    replay_requests: AtomicU64,
    replay_failures: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_received(&self) {
        bump(&self.messages_received, 1);
    }

    pub fn malformed_message(&self) {
        bump(&self.malformed_messages, 1);
    }

    /// A gap of `missed` sequence numbers was observed.
    pub fn gap(&self, missed: u64) {
        bump(&self.gaps_detected, 1);
        bump(&self.events_missed, missed);
    }

    pub fn out_of_order(&self) {
        bump(&self.out_of_order, 1);
    }

    pub fn decode_failure(&self) {
        bump(&self.decode_failures, 1);
    }

    pub fn batch_decoded(&self) {
        bump(&self.batches_decoded, 1);
    }

    pub fn event_dispatched(&self) {
        bump(&self.events_dispatched, 1);
    }

    pub fn handler_failure(&self) {
        bump(&self.handler_failures, 1);
    }

    pub fn connected(&self) {
        bump(&self.connects, 1);
    }

    pub fn connect_failure(&self) {
        bump(&self.connect_failures, 1);
    }

    pub fn replay_request(&self) {
        bump(&self.replay_requests, 1);
    }

    pub fn replay_failure(&self) {
        bump(&self.replay_failures, 1);
    }

    /// Returns a snapshot of current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            messages_received: load(&self.messages_received),
            malformed_messages: load(&self.malformed_messages),
            gaps_detected: load(&self.gaps_detected),
            events_missed: load(&self.events_missed),
            out_of_order: load(&self.out_of_order),
            decode_failures: load(&self.decode_failures),
            batches_decoded: load(&self.batches_decoded),
            events_dispatched: load(&self.events_dispatched),
            handler_failures: load(&self.handler_failures),
            connects: load(&self.connects),
            connect_failures: load(&self.connect_failures),
            replay_requests: load(&self.replay_requests),
            replay_failures: load(&self.replay_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_counts_events_missed() {
        let m = ClientMetrics::new();
        m.gap(2);
        m.gap(1);
        let snap = m.snapshot();
        assert_eq!(snap.gaps_detected, 2);
        assert_eq!(snap.events_missed, 3);
        assert_eq!(snap.decode_failures, 0);
    }
}
