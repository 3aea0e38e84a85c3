use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the timestamps stamped on nodes, in nanoseconds since the Unix epoch.
///
/// Every engine instance owns its own clock, so a test can freeze time for one
/// file system without touching any other.
pub trait Clock {
    fn now(&self) -> u64;
}

// Wall clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

// Always reports the same instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    fn now(&self) -> u64 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = FixedClock(42);

        assert_eq!(clock.now(), 42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn closures_are_clocks() {
        let ticks = Cell::new(0u64);
        let clock = || {
            ticks.set(ticks.get() + 1);
            ticks.get()
        };

        assert_eq!(Clock::now(&clock), 1);
        assert_eq!(Clock::now(&clock), 2);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > 0);
    }
}
