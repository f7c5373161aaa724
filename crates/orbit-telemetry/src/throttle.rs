//! Sliding-window admission throttle.
//!
//! Bounds how many events may enter the queue within a trailing time window
//! (default 200 per 60 s). Expired timestamps are skipped with a start-index
//! pointer instead of being popped one by one, which keeps each admission
//! check amortized O(1); the backing vector is compacted once enough dead
//! entries accumulate so memory stays bounded.
//!
//! Denied admission is a silent, deliberate drop: the event never enters the
//! queue and no retry applies. Callers log it on the debug channel.

use std::time::{Duration, Instant};

/// Dead entries tolerated before the backing vector is compacted.
const COMPACT_THRESHOLD: usize = 1000;

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    capacity: usize,
    timestamps: Vec<Instant>,
    /// Index of the first non-expired timestamp.
    start: usize,
}

impl RateLimiter {
    /// Create a limiter admitting up to `capacity` events per `window`.
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            timestamps: Vec::new(),
            start: 0,
        }
    }

    /// Attempt to admit an event at `now`.
    ///
    /// Returns false when the window is at capacity; the timestamp is only
    /// recorded when the event is actually admitted.
    pub fn admit(&mut self, now: Instant) -> bool {
        // Advance past expired entries. checked_sub covers instants too close
        // to process start for the window to reach back past them.
        if let Some(window_start) = now.checked_sub(self.window) {
            while self.start < self.timestamps.len() && self.timestamps[self.start] < window_start
            {
                self.start += 1;
            }
        }

        // Compact once the dead prefix grows past the threshold.
        if self.start > COMPACT_THRESHOLD {
            drop(self.timestamps.drain(..self.start));
            self.start = 0;
        }

        if self.active_count() >= self.capacity {
            return false;
        }

        self.timestamps.push(now);
        true
    }

    /// Number of admissions still counted against the window.
    pub fn active_count(&self) -> usize {
        self.timestamps.len() - self.start
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);
    const CAPACITY: usize = 200;

    fn limiter() -> RateLimiter {
        RateLimiter::new(WINDOW, CAPACITY)
    }

    #[test]
    fn admits_up_to_capacity() {
        let mut limiter = limiter();
        let base = Instant::now();
        for i in 0..CAPACITY {
            assert!(limiter.admit(base + Duration::from_millis(i as u64)));
        }
        assert_eq!(limiter.active_count(), CAPACITY);
    }

    #[test]
    fn denies_the_201st_within_the_window() {
        let mut limiter = limiter();
        let base = Instant::now();
        for _ in 0..CAPACITY {
            assert!(limiter.admit(base));
        }
        assert!(!limiter.admit(base + Duration::from_secs(1)));
        // Denied attempts are not counted.
        assert_eq!(limiter.active_count(), CAPACITY);
    }

    #[test]
    fn capacity_restores_as_entries_expire() {
        let mut limiter = limiter();
        let base = Instant::now();
        for i in 0..CAPACITY {
            assert!(limiter.admit(base + Duration::from_millis(i as u64)));
        }
        assert!(!limiter.admit(base + Duration::from_secs(30)));

        // Just past the oldest entry's window: exactly one slot frees up.
        let later = base + WINDOW + Duration::from_millis(1);
        assert!(limiter.admit(later));
        assert!(
            !limiter.admit(later),
            "only the expired slot should have freed"
        );
    }

    #[test]
    fn full_window_expiry_restores_all_capacity() {
        let mut limiter = limiter();
        let base = Instant::now();
        for _ in 0..CAPACITY {
            assert!(limiter.admit(base));
        }
        let later = base + WINDOW * 2;
        for i in 0..CAPACITY {
            assert!(limiter.admit(later + Duration::from_millis(i as u64)));
        }
    }

    #[test]
    fn compaction_bounds_backing_storage() {
        let mut limiter = RateLimiter::new(Duration::from_millis(10), 10);
        let base = Instant::now();
        // Admit in bursts spaced beyond the window so everything expires,
        // forcing the dead prefix past the compaction threshold.
        let mut now = base;
        for _ in 0..(COMPACT_THRESHOLD / 10 + 2) {
            for i in 0..10u64 {
                assert!(limiter.admit(now + Duration::from_micros(i)));
            }
            now += Duration::from_millis(20);
        }
        assert!(
            limiter.timestamps.len() <= COMPACT_THRESHOLD + 10 + 1,
            "backing vec grew unboundedly: {}",
            limiter.timestamps.len()
        );
    }

    #[test]
    fn early_instant_does_not_underflow() {
        // A window longer than the instant's age exercises checked_sub.
        let mut limiter = RateLimiter::new(Duration::from_secs(u32::MAX.into()), 2);
        assert!(limiter.admit(Instant::now()));
        assert!(limiter.admit(Instant::now()));
        assert!(!limiter.admit(Instant::now()));
    }
}
