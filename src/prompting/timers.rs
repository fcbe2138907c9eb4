//! Deadline-ordered timer queue.
//!
//! Every timer the engine owns (cadence, sweep, prompt timeouts, snoozes)
//! lives in one binary heap keyed by `(deadline, sequence)`. Cancellation is
//! lazy: the live table is the source of truth and stale heap entries are
//! skipped when they surface.

use crate::events::PromptId;
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// What an engine timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Repeating cadence tick.
    Cadence,
    /// Repeating cooldown sweep.
    Sweep,
    /// Response window of a pending prompt closed.
    PromptTimeout(PromptId),
    /// Snoozed task is due for another prompt.
    Snooze(String),
}

/// Handle to an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    deadline: DateTime<Utc>,
    id: TimerId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            // equal deadlines fire in arming order
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A fired timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub deadline: DateTime<Utc>,
    pub payload: T,
}

/// Single time-ordered structure for all engine timers.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    live: HashMap<TimerId, (DateTime<Utc>, T)>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a single-shot timer.
    pub fn arm(&mut self, deadline: DateTime<Utc>, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse(HeapEntry { deadline, id }));
        self.live.insert(id, (deadline, payload));
        id
    }

    /// Cancel a timer. Returns the payload if it was still armed.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let removed = self.live.remove(&id).map(|(_, payload)| payload);
        if removed.is_some() {
            self.maybe_compact();
        }
        removed
    }

    /// Whether `id` is still armed.
    #[must_use]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.live.contains_key(&id)
    }

    /// Deadline of an armed timer.
    #[must_use]
    pub fn deadline(&self, id: TimerId) -> Option<DateTime<Utc>> {
        self.live.get(&id).map(|(deadline, _)| *deadline)
    }

    /// Earliest deadline among armed timers.
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        self.discard_stale_head();
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Fired<T>> {
        self.discard_stale_head();
        let Reverse(head) = *self.heap.peek()?;
        if head.deadline > now {
            return None;
        }
        self.heap.pop();
        let (deadline, payload) = self.live.remove(&head.id)?;
        Some(Fired {
            id: head.id,
            deadline,
            payload,
        })
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no timers are armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Cancel every timer.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    fn discard_stale_head(&mut self) {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.live.contains_key(&head.id) {
                break;
            }
            self.heap.pop();
        }
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() > 64 && self.heap.len() > self.live.len() * 2 {
            let live = &self.live;
            self.heap.retain(|Reverse(entry)| live.contains_key(&entry.id));
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.arm(t0() + Duration::seconds(30), "late");
        queue.arm(t0() + Duration::seconds(10), "early");
        queue.arm(t0() + Duration::seconds(20), "middle");

        let now = t0() + Duration::minutes(1);
        let order: Vec<&str> = std::iter::from_fn(|| queue.pop_due(now))
            .map(|f| f.payload)
            .collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nothing_pops_before_deadline() {
        let mut queue = TimerQueue::new();
        queue.arm(t0() + Duration::seconds(30), ());

        assert!(queue.pop_due(t0() + Duration::seconds(29)).is_none());
        assert!(queue.pop_due(t0() + Duration::seconds(30)).is_some());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut queue = TimerQueue::new();
        let first = queue.arm(t0() + Duration::seconds(5), "first");
        queue.arm(t0() + Duration::seconds(10), "second");

        assert_eq!(queue.cancel(first), Some("first"));
        assert_eq!(queue.cancel(first), None);
        assert!(!queue.is_armed(first));
        assert_eq!(queue.next_deadline(), Some(t0() + Duration::seconds(10)));

        let fired = queue.pop_due(t0() + Duration::hours(1)).unwrap();
        assert_eq!(fired.payload, "second");
        assert!(queue.pop_due(t0() + Duration::hours(1)).is_none());
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let mut queue = TimerQueue::new();
        let deadline = t0() + Duration::seconds(1);
        queue.arm(deadline, 1);
        queue.arm(deadline, 2);

        assert_eq!(queue.pop_due(deadline).unwrap().payload, 1);
        assert_eq!(queue.pop_due(deadline).unwrap().payload, 2);
    }

    #[test]
    fn heavy_cancellation_compacts_heap() {
        let mut queue = TimerQueue::new();
        let ids: Vec<TimerId> = (0..200)
            .map(|i| queue.arm(t0() + Duration::seconds(i), i))
            .collect();
        for id in &ids[..190] {
            queue.cancel(*id);
        }

        assert_eq!(queue.len(), 10);
        assert!(queue.heap.len() <= 64 || queue.heap.len() <= queue.len() * 2);
        assert_eq!(queue.next_deadline(), Some(t0() + Duration::seconds(190)));
    }

    #[test]
    fn clear_disarms_everything() {
        let mut queue = TimerQueue::new();
        queue.arm(t0(), 1);
        queue.arm(t0(), 2);
        queue.clear();

        assert_eq!(queue.len(), 0);
        assert!(queue.next_deadline().is_none());
        assert!(queue.pop_due(t0() + Duration::days(7)).is_none());
    }
}
