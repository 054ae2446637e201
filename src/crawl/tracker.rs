use crate::models::WorkUnit;
use std::collections::VecDeque;

/// Units that ran out of in-call retries, in the order they failed.
#[derive(Debug, Default)]
pub struct FailureTracker {
    pending: VecDeque<WorkUnit>,
    history: Vec<String>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, unit: WorkUnit) {
        self.history.push(unit.id.clone());
        self.pending.push_back(unit);
    }

    /// Hands out at most `limit` of the oldest failures for one more attempt.
    ///
    /// Units past the cap stay pending and are reported, not retried.
    pub fn drain_for_retry(&mut self, limit: usize) -> Vec<WorkUnit> {
        let take = limit.min(self.pending.len());
        self.pending.drain(..take).collect()
    }

    /// Failures not handed out for retry.
    pub fn remaining(&self) -> impl Iterator<Item = &WorkUnit> {
        self.pending.iter()
    }

    /// Every failure ever recorded, including ones later recovered.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(pages: &[u32]) -> FailureTracker {
        let mut tracker = FailureTracker::new();
        for &page in pages {
            tracker.record_failure(WorkUnit::page(page));
        }
        tracker
    }

    #[test]
    fn drain_respects_limit_and_order() {
        let mut tracker = tracker_with(&[4, 2, 9, 7]);

        let batch = tracker.drain_for_retry(3);

        let ids: Vec<_> = batch.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["page 4", "page 2", "page 9"]);
        let rest: Vec<_> = tracker.remaining().map(|u| u.id.as_str()).collect();
        assert_eq!(rest, ["page 7"]);
    }

    #[test]
    fn drain_with_fewer_failures_than_limit() {
        let mut tracker = tracker_with(&[1, 2]);
        assert_eq!(tracker.drain_for_retry(10).len(), 2);
        assert!(tracker.is_empty());
        assert!(tracker.drain_for_retry(10).is_empty());
    }

    #[test]
    fn history_survives_drain() {
        let mut tracker = tracker_with(&[3, 5]);
        tracker.drain_for_retry(10);
        assert_eq!(tracker.history(), ["page 3", "page 5"]);
    }
}
