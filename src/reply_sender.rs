//! The reply sender (C6): serializes outbound packets, coalesces queued
//! replies destined for the same place, and applies known-answer
//! suppression as later packets reveal more of what the querier already
//! knows.

use crate::clock::Clock;
use crate::message::{Message, DEFAULT_MAX_PACKET_LEN};
use crate::record::Record;
use crate::repository::{Destination, ReplyInfo};
use crate::socket::{AddressFamily, Socket, MULTICAST_V4, MULTICAST_V6};
use crate::types::QR;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum DestKey {
    V4,
    V6,
    Unicast(SocketAddr),
}

impl From<&Destination> for DestKey {
    fn from(d: &Destination) -> Self {
        match d {
            Destination::MulticastV4 => DestKey::V4,
            Destination::MulticastV6 => DestKey::V6,
            Destination::Unicast(addr) => DestKey::Unicast(*addr),
        }
    }
}

struct PendingReply {
    destination: Destination,
    answers: Vec<Record>,
    additionals: Vec<Record>,
    fire_at: Instant,
}

/// Serializes and sends responses, coalescing replies queued for the same
/// destination within their delay windows.
pub struct ReplySender<C: Clock> {
    clock: C,
    max_packet_len: usize,
    pending: HashMap<DestKey, PendingReply>,
}

impl<C: Clock> ReplySender<C> {
    pub fn new(clock: C) -> ReplySender<C> {
        ReplySender {
            clock,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            pending: HashMap::new(),
        }
    }

    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Serializes `message` and sends it immediately, splitting across
    /// multiple packets (TC set on all but the last) if it would overflow
    /// the configured max packet length.
    pub fn send_now(
        &self,
        socket: &mut impl Socket,
        message: &Message,
        destination: SocketAddr,
    ) -> std::io::Result<()> {
        match message.to_vec(self.max_packet_len) {
            Ok(bytes) => socket.send_to(&bytes, destination),
            Err(_) => self.send_split(socket, message, destination),
        }
    }

    fn send_split(
        &self,
        socket: &mut impl Socket,
        message: &Message,
        destination: SocketAddr,
    ) -> std::io::Result<()> {
        let chunks = split_answers(message, self.max_packet_len);
        let last = chunks.len().saturating_sub(1);

        for (i, mut chunk) in chunks.into_iter().enumerate() {
            chunk.tc = i != last;
            let bytes = chunk.to_vec_unbounded();
            socket.send_to(&bytes, destination)?;
        }

        Ok(())
    }

    /// Schedules `reply` to be sent after `reply.send_delay_ms`. If another
    /// reply is already pending for the same destination, the two are
    /// merged: any answer the pending reply had queued but the new reply
    /// no longer reports (because a follow-up query packet revealed the
    /// querier already knows it) is dropped; genuinely new answers are
    /// added. If nothing is left to send, the pending entry is cancelled.
    pub fn queue_reply(&mut self, reply: ReplyInfo) {
        let key = DestKey::from(&reply.destination);
        let now = self.clock.now();
        let fire_at = now + std::time::Duration::from_millis(reply.send_delay_ms);

        if let Some(existing) = self.pending.get_mut(&key) {
            existing
                .answers
                .retain(|a| reply.answers.iter().any(|new| records_equal(a, new)));

            for new in &reply.answers {
                if !existing.answers.iter().any(|a| records_equal(a, new)) {
                    existing.answers.push(new.clone());
                }
            }

            for additional in &reply.additionals {
                if !existing.additionals.iter().any(|a| records_equal(a, additional)) {
                    existing.additionals.push(additional.clone());
                }
            }

            existing.fire_at = existing.fire_at.min(fire_at);

            if existing.answers.is_empty() {
                self.pending.remove(&key);
            }
        } else {
            self.pending.insert(
                key,
                PendingReply {
                    destination: reply.destination,
                    answers: reply.answers,
                    additionals: reply.additionals,
                    fire_at,
                },
            );
        }
    }

    /// Cancels a pending reply for `destination`, if any learns every
    /// answer was suppressed by some means outside `queue_reply` (e.g. the
    /// service being withdrawn before the delay elapsed).
    pub fn cancel(&mut self, destination: &Destination) {
        self.pending.remove(&DestKey::from(destination));
    }

    /// Sends every pending reply whose delay has elapsed, via `socket`.
    pub fn flush_due(&mut self, socket: &mut impl Socket) -> std::io::Result<usize> {
        let now = self.clock.now();
        let due: Vec<DestKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.fire_at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let mut sent = 0;
        for key in due {
            let pending = self.pending.remove(&key).unwrap();
            let mut m = Message::default();
            m.qr = QR::Response;
            m.aa = true;
            m.answers = pending.answers;
            m.additionals = pending.additionals;

            let destination_addr = resolve_destination(socket, &pending.destination);
            self.send_now(socket, &m, destination_addr)?;
            sent += 1;
        }

        Ok(sent)
    }
}

fn records_equal(a: &Record, b: &Record) -> bool {
    a.name.eq_ignore_ascii_case(&b.name) && a.r#type() == b.r#type() && a.data == b.data
}

/// Resolves a [`Destination`] to a concrete [`SocketAddr`]. `socket` is
/// unused for anything but matching this function's signature to the
/// other sender entry points -- the destination already encodes the right
/// multicast group, chosen by the repository from the query's source family.
fn resolve_destination(_socket: &impl Socket, destination: &Destination) -> SocketAddr {
    match destination {
        Destination::Unicast(addr) => *addr,
        Destination::MulticastV4 => MULTICAST_V4.parse().unwrap(),
        Destination::MulticastV6 => MULTICAST_V6.parse().unwrap(),
    }
}

/// Greedily packs `message`'s answers into as few packets as fit within
/// `max_len`, each a full standalone [`Message`] (header + the same
/// questions + its slice of answers). Additionals travel with the last
/// packet only, matching the common case where they're small and the
/// answers section is what overflows.
fn split_answers(message: &Message, max_len: usize) -> Vec<Message> {
    let mut chunks = Vec::new();
    let mut current = Message {
        questions: message.questions.clone(),
        qr: message.qr,
        aa: message.aa,
        id: message.id,
        rd: message.rd,
        tc: false,
        answers: Vec::new(),
        authorities: Vec::new(),
        additionals: Vec::new(),
    };

    for answer in &message.answers {
        let mut candidate = current.clone();
        candidate.answers.push(answer.clone());

        if candidate.to_vec(max_len).is_err() && !current.answers.is_empty() {
            chunks.push(current);
            current = Message {
                questions: message.questions.clone(),
                qr: message.qr,
                aa: message.aa,
                id: message.id,
                rd: message.rd,
                tc: false,
                answers: vec![answer.clone()],
                authorities: Vec::new(),
                additionals: Vec::new(),
            };
        } else {
            current = candidate;
        }
    }

    current.additionals = message.additionals.clone();
    chunks.push(current);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::record::RecordData;
    use crate::types::Class;
    use std::net::Ipv4Addr;

    struct FakeSocket {
        sent: Vec<(Vec<u8>, SocketAddr)>,
    }

    impl Socket for FakeSocket {
        fn send_to(&mut self, bytes: &[u8], destination: SocketAddr) -> std::io::Result<()> {
            self.sent.push((bytes.to_vec(), destination));
            Ok(())
        }
        fn family(&self) -> AddressFamily {
            AddressFamily::V4
        }
        fn interface_id(&self) -> u64 {
            0
        }
    }

    fn a_reply(name: &str) -> ReplyInfo {
        ReplyInfo {
            answers: vec![Record {
                name: name.to_string(),
                class: Class::Internet,
                cache_flush: true,
                ttl_ms: 120_000,
                data: RecordData::A(Ipv4Addr::new(10, 0, 0, 1)),
            }],
            additionals: Vec::new(),
            destination: Destination::MulticastV4,
            send_delay_ms: 0,
        }
    }

    #[test]
    fn queued_reply_flushes_once_due() {
        let clock = FakeClock::new();
        let mut sender = ReplySender::new(clock.clone());
        let mut socket = FakeSocket { sent: Vec::new() };

        sender.queue_reply(a_reply("host.local."));
        assert_eq!(sender.flush_due(&mut socket).unwrap(), 1);
        assert_eq!(socket.sent.len(), 1);
    }

    #[test]
    fn second_queue_reply_without_that_answer_suppresses_it() {
        let clock = FakeClock::new();
        let mut sender = ReplySender::new(clock.clone());
        let mut socket = FakeSocket { sent: Vec::new() };

        sender.queue_reply(a_reply("a.local."));
        // Follow-up reply (e.g. recomputed after a known-answer packet)
        // no longer mentions "a.local.".
        let mut empty = a_reply("a.local.");
        empty.answers.clear();
        sender.queue_reply(empty);

        assert_eq!(sender.flush_due(&mut socket).unwrap(), 0);
    }

    #[test]
    fn overflowing_message_splits_with_tc_on_all_but_last() {
        let mut m = Message::default();
        m.qr = QR::Response;
        for i in 0..200 {
            m.answers.push(Record {
                name: format!("host{}.local.", i),
                class: Class::Internet,
                cache_flush: true,
                ttl_ms: 120_000,
                data: RecordData::A(Ipv4Addr::new(10, 0, 0, 1)),
            });
        }

        let chunks = split_answers(&m, DEFAULT_MAX_PACKET_LEN);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.to_vec(DEFAULT_MAX_PACKET_LEN).is_ok());
        }
        assert!(!chunks.last().unwrap().answers.is_empty());
    }
}
