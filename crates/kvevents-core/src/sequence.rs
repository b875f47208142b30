//! Per-endpoint sequence bookkeeping.
//!
//! The tracker only observes: a gap or a regression is reported back to the
//! caller, never corrected. The last-seen value is overwritten on every
//! observation, before the payload is decoded, so a batch that fails to
//! decode is still considered delivered.

/// What a single [`SequenceTracker::observe`] call saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceObservation {
    /// First message since the tracker was created.
    First,
    /// `seq == last + 1`.
    InOrder,
    /// `seq > last + 1`; `missed` sequence numbers were skipped.
    Gap { last: u64, missed: u64 },
    /// `seq <= last`. A duplicate or a publisher restart.
    OutOfOrder { last: u64 },
}

impl SequenceObservation {
    /// Number of messages skipped, zero unless this is a gap.
    pub fn missed(&self) -> u64 {
        match self {
            Self::Gap { missed, .. } => *missed,
            _ => 0,
        }
    }
}

/// Last-seen sequence number of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed sequence number, `None` until the first message.
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Record `seq` and classify it against the previous value.
    pub fn observe(&mut self, seq: u64) -> SequenceObservation {
        let observation = match self.last {
            None => SequenceObservation::First,
            Some(last) if seq <= last => SequenceObservation::OutOfOrder { last },
            Some(last) => match seq - last - 1 {
                0 => SequenceObservation::InOrder,
                missed => SequenceObservation::Gap { last, missed },
            },
        };
        self.last = Some(seq);
        observation
    }

    /// Sequence number a replay request should start from, if any.
    ///
    /// `None` when nothing has been seen yet, or when the last value is
    /// `u64::MAX` and there is nothing after it.
    pub fn replay_from(&self) -> Option<u64> {
        self.last.and_then(|last| last.checked_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_of_one_between_five_and_seven() {
        let mut t = SequenceTracker::new();
        t.observe(5);
        let obs = t.observe(7);
        assert_eq!(obs, SequenceObservation::Gap { last: 5, missed: 1 });
        assert_eq!(obs.missed(), 1);
        assert_eq!(t.last(), Some(7));
    }

    #[test]
    fn first_message_is_never_a_gap() {
        let mut t = SequenceTracker::new();
        assert_eq!(t.observe(0), SequenceObservation::First);
        assert_eq!(t.observe(1), SequenceObservation::InOrder);
        assert_eq!(t.observe(4).missed(), 2);
    }

    #[test]
    fn regression_is_reported_and_still_recorded() {
        let mut t = SequenceTracker::new();
        t.observe(10);
        assert_eq!(t.observe(10), SequenceObservation::OutOfOrder { last: 10 });
        assert_eq!(t.observe(3), SequenceObservation::OutOfOrder { last: 10 });
        assert_eq!(t.last(), Some(3));
    }

    #[test]
    fn replay_from_next_sequence() {
        let mut t = SequenceTracker::new();
        assert_eq!(t.replay_from(), None);
        t.observe(41);
        assert_eq!(t.replay_from(), Some(42));
        t.observe(u64::MAX);
        assert_eq!(t.replay_from(), None);
    }
}
