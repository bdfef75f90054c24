//! The announcer (C5): a [`crate::repeater::Repeater`] specialization
//! covering both gratuitous "I now own these records" announcements and
//! goodbye (exit) announcements.

use crate::message::Message;
use crate::repeater::SendSchedule;
use crate::repository::AnnouncementInfo;
use crate::types::QR;

pub const ANNOUNCE_COUNT: u32 = 3;

/// Exit announcements are sent exactly once, after a delay that lets
/// several near-simultaneous `remove_service` calls coalesce.
pub const EXIT_ANNOUNCE_COUNT: u32 = 1;
pub const EXIT_ANNOUNCE_DELAY_MS: u64 = 500;

/// Doubling delay schedule for gratuitous announcements: 1s, then 2s
/// (RFC 6762 §8.3).
pub fn announce_schedule() -> SendSchedule {
    SendSchedule {
        num_sends: ANNOUNCE_COUNT,
        delay_ms: |next_index| match next_index {
            1 => 1_000,
            _ => 2_000,
        },
    }
}

/// A single send with no follow-up; the delay before it is
/// [`EXIT_ANNOUNCE_DELAY_MS`], supplied by the caller as `initial_delay_ms`
/// rather than baked into the schedule (there is no "next" send to delay).
pub fn exit_schedule() -> SendSchedule {
    SendSchedule {
        num_sends: EXIT_ANNOUNCE_COUNT,
        delay_ms: |_| 0,
    }
}

/// Builds an announcement (or, if `info.answers` already carry TTL=0, a
/// goodbye) response packet: authoritative, with the owned records as
/// answers and NSEC assertions as additionals.
pub fn build_announcement(info: &AnnouncementInfo) -> Message {
    let mut m = Message::default();
    m.id = Message::random_id();
    m.qr = QR::Response;
    m.aa = true;
    m.answers = info.answers.clone();
    m.additionals = info.additionals.clone();
    m
}
