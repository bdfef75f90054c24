//! The cooperative single-threaded task queue (§5) that every state
//! transition in C2-C8 runs on. Replaces the source's platform-specific
//! message-loop binding: this is deliberately just "a queue of 0-argument
//! tasks, executed in order, with a post-delayed variant," driven by
//! whatever owns the actual thread (the socket facade's poll loop, or a
//! test's explicit `advance_to`).

use crate::clock::{Clock, TimerEntry, TimerQueue};
use std::collections::VecDeque;
use std::time::Duration;

type Task = Box<dyn FnOnce() + 'static>;

/// A single-threaded, message-queue-style task executor.
///
/// Not itself a thread: something external (the socket facade's read loop,
/// or a test driver) must call [`EventHandler::run_ready`] repeatedly to
/// make progress. This mirrors the source's "postSync" test fixtures: all
/// scheduling is explicit and observable, nothing runs on a hidden timer.
pub struct EventHandler<C: Clock> {
    clock: C,
    immediate: VecDeque<Task>,
    delayed: TimerQueue<Task>,
    next_seq: u64,
}

impl<C: Clock> EventHandler<C> {
    pub fn new(clock: C) -> EventHandler<C> {
        EventHandler {
            clock,
            immediate: VecDeque::new(),
            delayed: TimerQueue::new(),
            next_seq: 0,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Enqueues `task` to run on the next [`EventHandler::run_ready`] call.
    pub fn post(&mut self, task: impl FnOnce() + 'static) {
        self.immediate.push_back(Box::new(task));
    }

    /// Enqueues `task` to run once at least `delay` has elapsed.
    pub fn post_delayed(&mut self, task: impl FnOnce() + 'static, delay: Duration) {
        let fire_at = self.clock.now() + delay;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.delayed.push(TimerEntry {
            fire_at,
            seq,
            payload: Box::new(task),
        });
    }

    /// Moves any delayed tasks whose time has come into the immediate
    /// queue, then runs every task currently queued (including ones just
    /// promoted), in FIFO order. Returns the number of tasks run.
    ///
    /// A task that itself posts more work will have that work picked up by
    /// the *next* call, not this one -- this keeps a single `run_ready`
    /// call's duration bounded by what was queued when it started.
    pub fn run_ready(&mut self) -> usize {
        let now = self.clock.now();
        while let Some(next) = self.delayed.peek() {
            if next.fire_at > now {
                break;
            }
            let entry = self.delayed.pop().unwrap();
            self.immediate.push_back(entry.payload);
        }

        let pending: Vec<Task> = self.immediate.drain(..).collect();
        let count = pending.len();
        for task in pending {
            task();
        }
        count
    }

    /// True if there is nothing left to run, ever (no immediate tasks and
    /// no pending timers). Delayed tasks still waiting for their fire time
    /// make this `false` even though `run_ready` would do nothing yet.
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.delayed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn immediate_tasks_run_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handler = EventHandler::new(FakeClock::new());

        for i in 0..3 {
            let log = log.clone();
            handler.post(move || log.borrow_mut().push(i));
        }
        handler.run_ready();

        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn delayed_task_waits_for_clock_to_advance() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let clock = FakeClock::new();
        let mut handler = EventHandler::new(clock.clone());

        let log2 = log.clone();
        handler.post_delayed(move || log2.borrow_mut().push("fired"), Duration::from_millis(250));

        assert_eq!(handler.run_ready(), 0);
        assert!(log.borrow().is_empty());

        clock.advance(Duration::from_millis(250));
        assert_eq!(handler.run_ready(), 1);
        assert_eq!(*log.borrow(), vec!["fired"]);
    }

    #[test]
    fn task_posted_during_run_waits_for_next_call() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handler = EventHandler::new(FakeClock::new());

        // Can't capture `handler` inside its own task, so use a channel-like
        // Rc<RefCell<Option<Task>>> to stage the follow-up post instead.
        let log2 = log.clone();
        handler.post(move || log2.borrow_mut().push("first"));
        assert_eq!(handler.run_ready(), 1);

        let log3 = log.clone();
        handler.post(move || log3.borrow_mut().push("second"));
        assert_eq!(handler.run_ready(), 1);

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }
}
