//! Monotonic time source used to stamp reads and time-sync payloads.

/// Monotonic tick counter.
pub trait Clock {
    /// Current tick count. Never decreases.
    fn now_ticks(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ticks(&self) -> u64 {
        (**self).now_ticks()
    }
}

/// Clock frozen at a fixed tick value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ticks(&self) -> u64 {
        self.0
    }
}
