//! The packet repeater (C3): schedules N transmissions of some payload at
//! per-index delays, cancelable by id.
//!
//! Modeled as the "base repeater" the design notes call for: a function
//! over a sequence of delays plus a sink, rather than a class hierarchy.
//! [`crate::prober`] and [`crate::announcer`] each supply a [`SendSchedule`]
//! and otherwise reuse this verbatim. The repeater itself is pure and
//! clock-driven via [`Repeater::tick`]; nothing here touches a socket --
//! the interface advertiser turns the returned [`RepeaterEvent`]s into
//! actual sends.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How many times to send, and the delay before each send after the first.
#[derive(Copy, Clone)]
pub struct SendSchedule {
    pub num_sends: u32,
    /// Delay, in ms, before sending `next_index` (1-based into the second
    /// and later sends; `delay_ms(0)` is never consulted -- the first send
    /// uses the caller-supplied `initial_delay_ms` instead).
    pub delay_ms: fn(u32) -> u64,
}

struct PendingSend<P> {
    payload: P,
    schedule: SendSchedule,
    next_index: u32,
    next_fire: Instant,
}

/// What happened to a scheduled id as of a [`Repeater::tick`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepeaterEvent<P> {
    /// Send number `index` (0-based) for `id` is due now.
    Sent { id: u64, index: u32, payload: P },
    /// `id` has completed all its scheduled sends.
    Finished { id: u64, payload: P },
}

/// Tracks pending scheduled sends across however many ids are active at
/// once (one per service id being probed/announced).
pub struct Repeater<P> {
    pending: HashMap<u64, PendingSend<P>>,
}

impl<P: Clone> Repeater<P> {
    pub fn new() -> Repeater<P> {
        Repeater {
            pending: HashMap::new(),
        }
    }

    /// Schedules `payload` to be sent under `id`, first at `now +
    /// initial_delay_ms`, then following `schedule`. Replaces any existing
    /// schedule for the same id.
    pub fn start_sending(
        &mut self,
        id: u64,
        payload: P,
        schedule: SendSchedule,
        initial_delay_ms: u64,
        now: Instant,
    ) {
        self.pending.insert(
            id,
            PendingSend {
                payload,
                schedule,
                next_index: 0,
                next_fire: now + Duration::from_millis(initial_delay_ms),
            },
        );
    }

    /// Cancels any pending sends for `id`. Returns `true` iff something was
    /// actually cancelled (i.e. `id` hadn't already finished or never
    /// existed). Idempotent: calling twice is safe, the second call simply
    /// returns `false`.
    pub fn stop(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// The earliest instant at which a send is due, across every pending
    /// id, or `None` if nothing is scheduled. The owner uses this to decide
    /// how long it can safely wait before calling `tick` again.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.next_fire).min()
    }

    /// Advances every pending id whose next send is due at or before `now`,
    /// returning a `Sent` event per send and a `Finished` event for any id
    /// that has just completed its schedule.
    pub fn tick(&mut self, now: Instant) -> Vec<RepeaterEvent<P>> {
        let mut events = Vec::new();
        let mut finished = Vec::new();

        for (&id, pending) in self.pending.iter_mut() {
            while pending.next_fire <= now {
                events.push(RepeaterEvent::Sent {
                    id,
                    index: pending.next_index,
                    payload: pending.payload.clone(),
                });

                pending.next_index += 1;
                if pending.next_index >= pending.schedule.num_sends {
                    finished.push(id);
                    break;
                }

                let delay = (pending.schedule.delay_ms)(pending.next_index);
                pending.next_fire += Duration::from_millis(delay);
            }
        }

        for id in finished {
            if let Some(p) = self.pending.remove(&id) {
                events.push(RepeaterEvent::Finished {
                    id,
                    payload: p.payload,
                });
            }
        }

        events
    }
}

impl<P: Clone> Default for Repeater<P> {
    fn default() -> Self {
        Repeater::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_schedule(num_sends: u32) -> SendSchedule {
        SendSchedule {
            num_sends,
            delay_ms: |_| 250,
        }
    }

    #[test]
    fn sends_fire_at_expected_offsets() {
        let mut repeater: Repeater<&str> = Repeater::new();
        let t0 = Instant::now();
        repeater.start_sending(1, "payload", fixed_schedule(3), 0, t0);

        assert!(!repeater.tick(t0).is_empty());

        let events = repeater.tick(t0 + Duration::from_millis(250));
        assert_eq!(events, vec![RepeaterEvent::Sent { id: 1, index: 1, payload: "payload" }]);

        let events = repeater.tick(t0 + Duration::from_millis(500));
        assert_eq!(
            events,
            vec![
                RepeaterEvent::Sent { id: 1, index: 2, payload: "payload" },
                RepeaterEvent::Finished { id: 1, payload: "payload" },
            ]
        );
        assert!(!repeater.is_pending(1));
    }

    #[test]
    fn stop_cancels_pending_schedule() {
        let mut repeater: Repeater<&str> = Repeater::new();
        let t0 = Instant::now();
        repeater.start_sending(1, "payload", fixed_schedule(3), 0, t0);

        assert!(repeater.stop(1));
        assert!(!repeater.stop(1)); // idempotent
        assert!(repeater.tick(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn independent_ids_do_not_interfere() {
        let mut repeater: Repeater<u32> = Repeater::new();
        let t0 = Instant::now();
        repeater.start_sending(1, 100, fixed_schedule(1), 0, t0);
        repeater.start_sending(2, 200, fixed_schedule(1), 500, t0);

        let events = repeater.tick(t0);
        assert_eq!(
            events,
            vec![
                RepeaterEvent::Sent { id: 1, index: 0, payload: 100 },
                RepeaterEvent::Finished { id: 1, payload: 100 },
            ]
        );

        let events = repeater.tick(t0 + Duration::from_millis(500));
        assert_eq!(
            events,
            vec![
                RepeaterEvent::Sent { id: 2, index: 0, payload: 200 },
                RepeaterEvent::Finished { id: 2, payload: 200 },
            ]
        );
    }
}
