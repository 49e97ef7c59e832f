use crate::types::{TraceEvent, TraceStatus};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;

/// Bounded, arrival-ordered history of trace events.
///
/// Holds at most `max_retained` records and, after a sweep, nothing older
/// than `max_age` measured from `received_at`. The store itself is not
/// synchronized; `TraceRelay` serializes every mutation.
#[derive(Debug, Clone)]
pub struct RetentionStore {
    records: VecDeque<TraceEvent>,
    max_retained: usize,
    max_age: TimeDelta,
}

impl RetentionStore {
    pub fn new(max_retained: usize, max_age: TimeDelta) -> Self {
        Self {
            records: VecDeque::with_capacity(max_retained.min(4096)),
            max_retained,
            max_age,
        }
    }

    /// Appends at the tail and drops the oldest records past the count bound.
    pub fn append(&mut self, record: TraceEvent) -> TraceEvent {
        let accepted = record.clone();
        self.records.push_back(record);
        while self.records.len() > self.max_retained {
            self.records.pop_front();
        }
        accepted
    }

    /// Empties the store, returning how many records were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        dropped
    }

    /// Oldest-first copy of everything currently retained.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.records.iter().cloned().collect()
    }

    /// Removes every record received more than `max_age` before `now`.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let max_age = self.max_age;
        self.records
            .retain(|record| now.signed_duration_since(record.received_at) <= max_age);
        before - self.records.len()
    }

    pub fn contains(&self, id: &str, status: TraceStatus) -> bool {
        self.records
            .iter()
            .any(|record| record.status == status && record.id == id)
    }

    pub fn last_received_at(&self) -> Option<DateTime<Utc>> {
        self.records.back().map(|record| record.received_at)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TraceEvent> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }
}
