//! The prober (C4): a [`crate::repeater::Repeater`] specialization that
//! sends three probe queries 250ms apart, each naming the candidate records
//! with the QU bit set and carrying the proposed rdata in the authority
//! section so peers can tie-break (RFC 6762 §8.1).

use crate::message::{Message, Question};
use crate::repeater::SendSchedule;
use crate::repository::ProbingInfo;
use crate::types::{Class, Type, QR};
use rand::Rng;

pub const PROBE_COUNT: u32 = 3;
pub const PROBE_INTERVAL_MS: u64 = 250;

pub fn schedule() -> SendSchedule {
    SendSchedule {
        num_sends: PROBE_COUNT,
        delay_ms: |_| PROBE_INTERVAL_MS,
    }
}

/// RFC 6762 §8.1: the first probe is sent after a random delay in
/// [0, 250] ms, to desynchronize devices that power on simultaneously.
pub fn initial_delay_ms() -> u64 {
    rand::thread_rng().gen_range(0..=PROBE_INTERVAL_MS)
}

/// Builds the probe query packet for one send: a question naming the
/// candidate with the unicast-response (QU) bit set, and the proposed
/// records as the authority section.
pub fn build_probe(info: &ProbingInfo) -> Message {
    let mut m = Message::default();
    m.id = Message::random_id();
    m.qr = QR::Query;

    m.questions.push(Question {
        name: info.question_name.clone(),
        r#type: Type::ANY,
        class: Class::Internet,
        unicast_response: true,
    });

    m.authorities = info.proposed.clone();
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ProbingInfo;

    #[test]
    fn probe_packet_has_qu_bit_and_authority_records() {
        let info = ProbingInfo {
            service_id: 1,
            question_name: "TestService._test._tcp.local.".to_string(),
            proposed: Vec::new(),
        };

        let m = build_probe(&info);
        assert_eq!(m.questions.len(), 1);
        assert!(m.questions[0].unicast_response);
        assert_eq!(m.qr, QR::Query);
    }

    #[test]
    fn schedule_sends_three_times_250ms_apart() {
        let s = schedule();
        assert_eq!(s.num_sends, 3);
        assert_eq!((s.delay_ms)(1), 250);
        assert_eq!((s.delay_ms)(2), 250);
    }
}
