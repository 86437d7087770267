//! Timer access as the kernel exposes it: a monotonic tick counter at a
//! fixed frequency. Sleeps are the executor's suspension points, so the
//! whole thing is a trait and tests substitute a virtual clock.

use std::cell::Cell;
use std::rc::Rc;

pub trait Clock {
    /// Ticks per second of the platform timer.
    fn frequency(&self) -> u64;

    fn tick_count(&self) -> u64;

    /// Suspend for at least this many milliseconds.
    fn sleep_ms(&self, ms: u64);

    /// Busy-wait roughly this many timer cycles.
    fn delay_cycles(&self, cycles: u64);
}

/// Virtual clock: sleeping advances time instead of consuming it.
#[derive(Clone)]
pub struct MockClock {
    inner: Rc<MockClockInner>,
}

struct MockClockInner {
    frequency: u64,
    ticks: Cell<u64>,
    slept_ms: Cell<u64>,
    delayed_cycles: Cell<u64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MockClockInner {
                frequency: 1_000_000,
                ticks: Cell::new(0),
                slept_ms: Cell::new(0),
                delayed_cycles: Cell::new(0),
            }),
        }
    }

    /// Total virtual milliseconds spent sleeping.
    pub fn slept_ms(&self) -> u64 {
        self.inner.slept_ms.get()
    }

    pub fn delayed_cycles(&self) -> u64 {
        self.inner.delayed_cycles.get()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn frequency(&self) -> u64 {
        self.inner.frequency
    }

    fn tick_count(&self) -> u64 {
        // reading the counter nudges it forward so bounded tick polls
        // always terminate
        let now = self.inner.ticks.get();
        self.inner.ticks.set(now + 1);
        now
    }

    fn sleep_ms(&self, ms: u64) {
        self.inner.slept_ms.set(self.inner.slept_ms.get() + ms);
        let ticks = ms.saturating_mul(self.inner.frequency / 1_000);
        self.inner.ticks.set(self.inner.ticks.get() + ticks);
    }

    fn delay_cycles(&self, cycles: u64) {
        self.inner
            .delayed_cycles
            .set(self.inner.delayed_cycles.get() + cycles);
        self.inner.ticks.set(self.inner.ticks.get() + cycles);
    }
}
