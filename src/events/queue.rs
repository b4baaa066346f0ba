//! Time-ordered event queue merging clock ticks and the end of a run

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::plug::ClockId;

/// Origin of a queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Clock(ClockId),
    /// End-of-run sentinel
    End,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    t: f64,
    seq: u64,
    source: EventSource,
}

// Min-heap on (t, seq): reverse both comparisons.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// Queue of `(time, source)` pairs, popped in time order. Entries with equal
/// times pop in insertion order.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: f64, source: EventSource) {
        self.heap.push(Entry {
            t,
            seq: self.seq,
            source,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Time of the earliest event
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.t)
    }

    /// Pop the earliest event together with every event due within `window`
    /// of it. Returns the earliest time and the sources in time order.
    pub fn pop(&mut self, window: f64) -> Option<(f64, Vec<EventSource>)> {
        let first = self.heap.pop()?;
        let mut sources = vec![first.source];
        while let Some(next) = self.heap.peek() {
            if next.t - first.t > window {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                sources.push(entry.source);
            }
        }
        Some((first.t, sources))
    }

    /// Pop every event with time `<= t`
    pub fn pop_until(&mut self, t: f64) -> Vec<(f64, EventSource)> {
        let mut out = Vec::new();
        while self.heap.peek().is_some_and(|e| e.t <= t) {
            if let Some(e) = self.heap.pop() {
                out.push((e.t, e.source));
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push(3.0, EventSource::End);
        q.push(1.0, EventSource::Clock(ClockId(0)));
        q.push(2.0, EventSource::Clock(ClockId(1)));

        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(1e-6), Some((1.0, vec![EventSource::Clock(ClockId(0))])));
        assert_eq!(q.pop(1e-6), Some((2.0, vec![EventSource::Clock(ClockId(1))])));
        assert_eq!(q.pop(1e-6), Some((3.0, vec![EventSource::End])));
        assert!(q.pop(1e-6).is_none());
    }

    #[test]
    fn test_ties_within_window() {
        let mut q = EventQueue::new();
        q.push(1.0, EventSource::Clock(ClockId(0)));
        q.push(1.0 + 1e-9, EventSource::Clock(ClockId(1)));
        q.push(1.1, EventSource::End);

        let (t, sources) = q.pop(1e-6).unwrap();
        assert_eq!(t, 1.0);
        assert_eq!(
            sources,
            vec![EventSource::Clock(ClockId(0)), EventSource::Clock(ClockId(1))]
        );
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        let mut q = EventQueue::new();
        q.push(5.0, EventSource::End);
        q.push(5.0, EventSource::Clock(ClockId(2)));
        let (_, sources) = q.pop(0.0).unwrap();
        assert_eq!(sources, vec![EventSource::End, EventSource::Clock(ClockId(2))]);
    }

    #[test]
    fn test_pop_until() {
        let mut q = EventQueue::new();
        q.push(0.0, EventSource::Clock(ClockId(0)));
        q.push(0.0, EventSource::Clock(ClockId(1)));
        q.push(0.5, EventSource::End);

        let popped = q.pop_until(0.0);
        assert_eq!(popped.len(), 2);
        assert_eq!(q.peek_time(), Some(0.5));
    }
}
