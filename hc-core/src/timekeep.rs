//! Monotonic tick counter with millisecond-class resolution.
//!
//! Every time-dependent decision and every sensor/log timestamp uses this
//! clock, never wall time. A single ticker task owns the write side; every
//! other reader only loads the atomic.

use std::sync::atomic::{AtomicU64, Ordering};

use hc_error::{Error, Result};

/// An unsigned tick count with monotonic `a >= b` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn saturating_sub(self, other: Tick) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

/// Ticks per second of the underlying clock; resolution is >= 1 tick/second.
pub const TICKS_PER_SECOND: u64 = 1000;

/// The plant's monotonic clock. Advanced only by the timekeep thread.
#[derive(Debug, Default)]
pub struct Timekeep {
    ticks: AtomicU64,
}

impl Timekeep {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Current tick value.
    pub fn now(&self) -> Tick {
        Tick(self.ticks.load(Ordering::Acquire))
    }

    /// Advances the clock by `delta_ticks`. Called only by the timekeep
    /// thread. A wraparound (the new value going backwards) is a fatal
    /// invariant violation.
    pub fn advance(&self, delta_ticks: u64) -> Result<Tick> {
        let prev = self.ticks.load(Ordering::Acquire);
        let next = prev.checked_add(delta_ticks).ok_or_else(|| {
            Error::Safety("monotonic clock would wrap around".into())
        })?;
        if next < prev {
            return Err(Error::Safety("monotonic clock regressed".into()));
        }
        self.ticks.store(next, Ordering::Release);
        Ok(Tick(next))
    }

    pub fn sec_to_tick(&self, seconds: u64) -> Tick {
        Tick(seconds.saturating_mul(TICKS_PER_SECOND))
    }

    pub fn tick_to_sec(&self, tick: Tick) -> u64 {
        tick.0 / TICKS_PER_SECOND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_forward_only() {
        let tk = Timekeep::new();
        assert_eq!(tk.now(), Tick::ZERO);
        tk.advance(100).unwrap();
        assert_eq!(tk.now(), Tick(100));
    }

    #[test]
    fn sec_to_tick_and_back() {
        let tk = Timekeep::new();
        let t = tk.sec_to_tick(5);
        assert_eq!(tk.tick_to_sec(t), 5);
    }

    #[test]
    fn overflow_is_fatal() {
        let tk = Timekeep::new();
        tk.advance(u64::MAX).unwrap();
        assert!(tk.advance(1).is_err());
    }
}
