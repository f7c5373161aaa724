//! Bounded in-memory event queue.
//!
//! FIFO with respect to admission order. Pure data structure: the debounce
//! timer and flush triggers that drive it live in the pipeline, so this
//! module stays trivially unit-testable.
//!
//! Restoration policy: after a retryable delivery failure the failed batch
//! goes back to the **head** of the queue, ahead of anything enqueued while
//! the send was in flight, preserving temporal priority of the oldest
//! unacknowledged work. Restoration is capped by a hard buffer limit; when
//! the full batch does not fit, the **earliest** records of the batch are
//! kept and the remainder permanently dropped. Under sustained pressure this
//! means the oldest pending work can be lost before newer work — a
//! deliberate policy, kept from the reference behavior.

use std::collections::VecDeque;

use crate::record::EventRecord;

/// Ordered buffer of pending event records.
#[derive(Debug, Default)]
pub struct EventQueue {
    records: VecDeque<EventRecord>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the tail.
    pub fn enqueue(&mut self, record: EventRecord) {
        self.records.push_back(record);
    }

    /// Remove and return up to `max` oldest records, preserving order.
    pub fn extract_batch(&mut self, max: usize) -> Vec<EventRecord> {
        let take = max.min(self.records.len());
        self.records.drain(..take).collect()
    }

    /// Put a failed batch back at the head of the queue, bounded by `cap`.
    ///
    /// Only as many of the batch's earliest records as fit within
    /// `cap - len()` are restored; the rest are dropped. Returns the number
    /// of dropped records.
    pub fn restore_to_front(&mut self, batch: Vec<EventRecord>, cap: usize) -> usize {
        let room = cap.saturating_sub(self.records.len());
        let keep = batch.len().min(room);
        let dropped = batch.len() - keep;

        for record in batch.into_iter().take(keep).rev() {
            self.records.push_front(record);
        }
        dropped
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all buffered records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
