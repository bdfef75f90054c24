//! A small seam for making timer-driven code (the repeater family, §4.3)
//! deterministic under test, in the same spirit as the teacher's split
//! between `Instant`-based durations and `SystemTime`-based wall time.

use std::cell::RefCell;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Anything that can tell the time. Production code uses [`SystemClock`];
/// tests use [`FakeClock`] so delays can be advanced deterministically
/// instead of actually sleeping.
pub trait Clock: Clone {
    fn now(&self) -> Instant;
}

/// The real clock, backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose `now()` only advances when [`FakeClock::advance`] is
/// called, so tests can assert exact scheduling without real delays.
///
/// Starts at an arbitrary fixed instant (`Instant::now()` captured once at
/// construction) purely so elapsed-time arithmetic has something to work
/// from; tests should never depend on its absolute value.
#[derive(Clone)]
pub struct FakeClock {
    inner: Rc<RefCell<Instant>>,
}

impl FakeClock {
    pub fn new() -> FakeClock {
        FakeClock {
            inner: Rc::new(RefCell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut t = self.inner.borrow_mut();
        *t += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.borrow()
    }
}

/// Orders pending timer entries by fire time, soonest first -- used by
/// [`crate::handler::EventHandler`] to pick the next scheduled task.
pub(crate) struct TimerEntry<T> {
    pub fire_at: Instant,
    pub seq: u64,
    pub payload: T,
}

impl<T> PartialEq for TimerEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}
impl<T> Eq for TimerEntry<T> {}

impl<T> PartialOrd for TimerEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TimerEntry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so a max-heap (BinaryHeap's default) pops the earliest
        // fire time first; ties broken by insertion order.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) type TimerQueue<T> = BinaryHeap<TimerEntry<T>>;
