//! Monotonic millisecond clock used to stamp lease deadlines.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Source of steady (monotonic) time in milliseconds. Readings are only
/// comparable within one process; never persist them.
pub trait SteadyClock: Send + Sync {
    /// Milliseconds elapsed since this clock's origin.
    fn now_ms(&self) -> u64;
}

/// Default clock backed by `tokio::time::Instant`, whose origin is the
/// moment of construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SteadyClock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to. Useful for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Sets the current reading.
    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Moves the current reading forward.
    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl SteadyClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod clock_tests {
    use super::*;
    use tokio::time::{self, Duration};

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn monotonic_advances() {
        let clock = MonotonicClock::new();
        let t0 = clock.now_ms();
        time::sleep(Duration::from_millis(20)).await;
        let t1 = clock.now_ms();
        assert!(t1 >= t0 + 20);
    }

    #[test]
    fn manual_moves_on_demand() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance_ms(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set_ms(7);
        assert_eq!(clock.now_ms(), 7);
    }
}
