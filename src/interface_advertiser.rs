//! The per-interface advertiser (C7): owns one [`Repository`], one prober
//! and one announcer [`Repeater`], and one [`ReplySender`], all bound to a
//! single [`Socket`]. The multi-interface advertiser (C8) owns one of these
//! per network interface and drives it with inbound packets and lifecycle
//! calls; this module never talks to a second interface or to any other C7.

use crate::announcer::{self, ANNOUNCE_COUNT};
use crate::clock::Clock;
use crate::config::{AdvertiserConfig, KNOWN_ANSWER_ACCUMULATION_WINDOW};
use crate::errors::AdvertiserError;
use crate::message::Message;
use crate::prober::{self, PROBE_COUNT};
use crate::repeater::{Repeater, RepeaterEvent};
use crate::reply_sender::ReplySender;
use crate::repository::{AnnouncementInfo, ConflictKind, Hostname, ProbingInfo, Repository};
use crate::service::ServiceRegistration;
use crate::socket::Socket;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// What happened to a service as a result of driving this advertiser,
/// surfaced so the multi-interface advertiser can fire the matching
/// user-facing callback (§4.5/§4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvertiserEvent {
    /// Probing finished with no conflict; the service is now announcing.
    ProbingSucceeded { service_id: u64 },

    /// A peer's record beat ours in the RFC 6762 §8.2 tie-break. `restarted`
    /// is `true` if this advertiser already took corrective action (renamed
    /// during probing, or re-asserted while active); C8 only needs to act
    /// itself when renaming crosses the per-registration attempt limit.
    ServiceConflict {
        service_id: u64,
        kind: ConflictKind,
        restarted: bool,
    },

    /// `service_id` exceeded its rename attempts and has been abandoned.
    RenameAttemptsExceeded { service_id: u64 },

    /// The gratuitous (or exit) announcement schedule for `service_id` has
    /// fully completed its sends.
    AnnouncementFinished { service_id: u64, was_exit: bool },
}

/// Per-service bookkeeping this advertiser needs beyond what [`Repository`]
/// tracks, keyed the same way.
struct ServiceState {
    exiting: bool,
}

/// A TC=1 query's questions and known-answers accumulated so far from one
/// source, awaiting either a non-truncated follow-up or the accumulation
/// window's expiry (§4.2 rule 5) before the responder finalizes a reply.
struct PendingQuery {
    merged: Message,
    deadline: Instant,
}

/// Drives one interface's worth of probing, announcing and query
/// responding. Not `Send`/`Sync` by design -- like the rest of this crate,
/// it's meant to be driven from a single cooperative thread.
pub struct InterfaceAdvertiser<C: Clock, S: Socket> {
    repository: Repository,
    prober: Repeater<ProbingInfo>,
    announcer: Repeater<AnnouncementInfo>,
    reply_sender: ReplySender<C>,
    socket: S,
    clock: C,
    config: AdvertiserConfig,
    states: std::collections::HashMap<u64, ServiceState>,
    pending_queries: HashMap<SocketAddr, PendingQuery>,
}

impl<C: Clock, S: Socket> InterfaceAdvertiser<C, S> {
    pub fn new(socket: S, hostname: Hostname, config: AdvertiserConfig, clock: C) -> Self {
        InterfaceAdvertiser {
            repository: Repository::new(hostname),
            prober: Repeater::new(),
            announcer: Repeater::new(),
            reply_sender: ReplySender::new(clock.clone()).with_max_packet_len(config.max_packet_len),
            socket,
            clock,
            config,
            states: std::collections::HashMap::new(),
            pending_queries: HashMap::new(),
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn hostname(&self) -> &Hostname {
        self.repository.hostname()
    }

    pub fn set_hostname(&mut self, hostname: Hostname) {
        self.repository.set_hostname(hostname);
    }

    pub fn is_probing(&self, service_id: u64) -> bool {
        self.prober.is_pending(service_id)
    }

    /// The current registration for `service_id` on this interface, if any
    /// -- used by the multi-interface advertiser to read back a name that
    /// changed underneath it (e.g. after a local tie-break rename).
    pub fn registration(&self, service_id: u64) -> Option<&ServiceRegistration> {
        self.repository.registration(service_id)
    }

    /// Registers a new service and starts probing it. Fails without
    /// touching anything if `registration` collides with an existing id or
    /// active name (§4.2).
    pub fn add_service(&mut self, registration: ServiceRegistration) -> Result<(), AdvertiserError> {
        let service_id = registration.service_id;
        self.repository.add_service(registration)?;
        self.states.insert(service_id, ServiceState { exiting: false });
        self.start_probing(service_id)
    }

    fn start_probing(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        let info = self.repository.set_service_probing(service_id)?;
        self.prober.start_sending(
            service_id,
            info,
            prober::schedule(),
            prober::initial_delay_ms(),
            self.clock.now(),
        );
        Ok(())
    }

    /// Updates `service_id`'s subtypes in place and re-announces, without
    /// re-probing (subtypes aren't part of what a probe defends).
    pub fn update_service(
        &mut self,
        service_id: u64,
        subtypes: BTreeSet<String>,
    ) -> Result<(), AdvertiserError> {
        let info = self.repository.update_subtypes(service_id, subtypes)?;
        self.start_announcing(service_id, info, false);
        Ok(())
    }

    fn start_announcing(&mut self, service_id: u64, info: AnnouncementInfo, is_exit: bool) {
        let (schedule, initial_delay) = if is_exit {
            (announcer::exit_schedule(), crate::announcer::EXIT_ANNOUNCE_DELAY_MS)
        } else {
            (announcer::announce_schedule(), 0)
        };
        self.announcer
            .start_sending(service_id, info, schedule, initial_delay, self.clock.now());
    }

    /// Withdraws `service_id`: stops any in-flight probing/announcing and
    /// begins the (single, delayed) exit announcement. The entry is fully
    /// removed once [`InterfaceAdvertiser::tick`] reports its
    /// `AnnouncementFinished { was_exit: true }`.
    pub fn remove_service(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        self.prober.stop(service_id);
        self.announcer.stop(service_id);

        if let Some(state) = self.states.get_mut(&service_id) {
            state.exiting = true;
        }

        let info = self.repository.exit_service(service_id)?;
        self.start_announcing(service_id, info, true);
        Ok(())
    }

    /// Re-asserts `service_id`'s current records via a fresh probe sequence
    /// at the same name, used to defend an active record against a
    /// conflicting peer rather than abandon the name outright.
    fn restart_probing_for_conflict(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        self.announcer.stop(service_id);
        self.start_probing(service_id)
    }

    /// Picks a fresh, currently-untaken instance name for `service_id` and
    /// restarts probing under it after the RFC 6762 §8.2 backoff, so the
    /// loser of a probe tie-break doesn't immediately re-collide with the
    /// same peer. Fails with `MaxRenameAttempts` once the per-registration
    /// attempt budget is exhausted (§4.2, §4.6).
    fn rename_service_for_conflict(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        let (new_name, _attempt) = self
            .repository
            .next_rename(service_id)
            .ok_or(AdvertiserError::MaxRenameAttempts(service_id, crate::config::MAX_RENAME_ATTEMPTS))?;

        self.prober.stop(service_id);
        self.announcer.stop(service_id);

        let info = self.repository.rename_service_for_conflict(service_id, new_name)?;
        self.prober.start_sending(
            service_id,
            info,
            prober::schedule(),
            crate::config::PROBE_CONFLICT_BACKOFF_MS,
            self.clock.now(),
        );
        Ok(())
    }

    /// Forces `service_id` onto `new_name` and restarts probing immediately
    /// (no RFC 6762 §8.2 backoff -- there's no local peer to avoid
    /// re-colliding with, just a sibling interface to keep in sync). Used by
    /// the multi-interface advertiser to carry one interface's tie-break
    /// rename over to every other interface advertising the same service.
    pub fn force_rename(&mut self, service_id: u64, new_name: String) -> Result<(), AdvertiserError> {
        self.prober.stop(service_id);
        self.announcer.stop(service_id);

        let info = self.repository.rename_service_for_conflict(service_id, new_name)?;
        self.prober
            .start_sending(service_id, info, prober::schedule(), 0, self.clock.now());
        Ok(())
    }

    /// Destroys every service on this interface immediately, with no exit
    /// announcement -- used when the underlying socket itself is going
    /// away (§4.6's socket-lifecycle teardown), where there's no longer
    /// anyone to announce to.
    pub fn destroy_now(&mut self) -> Vec<u64> {
        let ids = self.repository.clear_services();
        for &id in &ids {
            self.prober.stop(id);
            self.announcer.stop(id);
        }
        self.states.clear();
        self.pending_queries.clear();
        ids
    }

    /// Feeds one inbound packet through conflict detection and the query
    /// responder. Malformed packets are silently dropped, matching real
    /// mDNS peers rather than failing the whole advertiser over a single
    /// bad datagram.
    pub fn on_packet(&mut self, bytes: &[u8], source: std::net::SocketAddr) -> Vec<AdvertiserEvent> {
        let message = match Message::from_slice_with_label_limit(bytes, self.config.max_label_count()) {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };

        let mut events = Vec::new();

        for (service_id, kind) in self.repository.get_conflicting_services(&message) {
            let restarted = if self.prober.is_pending(service_id) {
                self.rename_service_for_conflict(service_id).is_ok()
            } else {
                self.restart_probing_for_conflict(service_id).is_ok()
            };

            if !restarted {
                events.push(AdvertiserEvent::RenameAttemptsExceeded { service_id });
            }
            events.push(AdvertiserEvent::ServiceConflict {
                service_id,
                kind,
                restarted,
            });
        }

        if let Some(merged) = self.accumulate_query(source, message) {
            if let Some(reply) = self.repository.get_reply(&self.config, &merged, source) {
                self.reply_sender.queue_reply(reply);
            }
        }

        events
    }

    /// Feeds `message` into the per-source known-answer accumulator (§4.2
    /// rule 5). Returns the merged message ready for [`Repository::get_reply`]
    /// once it's safe to finalize: immediately, when suppression is off or
    /// the packet isn't truncated; otherwise `None`, with the merge held
    /// until a non-truncated follow-up arrives or [`InterfaceAdvertiser::tick`]
    /// notices the accumulation window has expired.
    fn accumulate_query(&mut self, source: SocketAddr, message: Message) -> Option<Message> {
        if !self.config.enable_known_answer_suppression {
            return Some(message);
        }

        let tc = message.tc;
        let merged = match self.pending_queries.remove(&source) {
            Some(pending) => merge_messages(pending.merged, message),
            None => message,
        };

        if tc {
            let deadline = self.clock.now() + KNOWN_ANSWER_ACCUMULATION_WINDOW;
            self.pending_queries.insert(source, PendingQuery { merged, deadline });
            None
        } else {
            Some(merged)
        }
    }

    /// Finalizes any pending accumulation whose window has elapsed without a
    /// non-truncated follow-up arriving, answering with whatever known
    /// answers were seen so far.
    fn flush_expired_queries(&mut self, now: std::time::Instant) {
        let expired: Vec<SocketAddr> = self
            .pending_queries
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(source, _)| *source)
            .collect();

        for source in expired {
            if let Some(pending) = self.pending_queries.remove(&source) {
                if let Some(reply) = self.repository.get_reply(&self.config, &pending.merged, source) {
                    self.reply_sender.queue_reply(reply);
                }
            }
        }
    }

    /// Advances every repeater and the reply sender, sending whatever is
    /// now due and returning the lifecycle events that resulted. The owner
    /// schedules this via an [`crate::handler::EventHandler`]; there is no
    /// internal timer.
    pub fn tick(&mut self, now: std::time::Instant) -> Vec<AdvertiserEvent> {
        let mut events = Vec::new();

        self.flush_expired_queries(now);

        let multicast = self.multicast_destination();

        for event in self.prober.tick(now) {
            match event {
                RepeaterEvent::Sent { payload, .. } => {
                    let packet = prober::build_probe(&payload);
                    let _ = self.reply_sender.send_now(&mut self.socket, &packet, multicast);
                }
                RepeaterEvent::Finished { id, .. } => {
                    if let Ok(info) = self.repository.on_probing_succeeded(id) {
                        self.start_announcing(id, info, false);
                        let _ = self.repository.set_service_announcing(id);
                        events.push(AdvertiserEvent::ProbingSucceeded { service_id: id });
                    }
                }
            }
        }

        for event in self.announcer.tick(now) {
            match event {
                RepeaterEvent::Sent { payload, .. } => {
                    let packet = announcer::build_announcement(&payload);
                    let _ = self.reply_sender.send_now(&mut self.socket, &packet, multicast);
                }
                RepeaterEvent::Finished { id, .. } => {
                    let is_exit = self.states.get(&id).map(|s| s.exiting).unwrap_or(false);
                    if is_exit {
                        self.repository.remove_service(id);
                        self.states.remove(&id);
                    } else {
                        // Errors here mean the id vanished mid-announce
                        // (e.g. removed); nothing left to mark active.
                        let _ = self.repository.mark_active(id);
                    }
                    events.push(AdvertiserEvent::AnnouncementFinished { service_id: id, was_exit: is_exit });
                }
            }
        }

        let _ = self.reply_sender.flush_due(&mut self.socket);
        events
    }

    fn multicast_destination(&self) -> std::net::SocketAddr {
        match self.socket.family() {
            crate::socket::AddressFamily::V4 => crate::socket::MULTICAST_V4,
            crate::socket::AddressFamily::V6 => crate::socket::MULTICAST_V6,
        }
        .parse()
        .unwrap()
    }

    /// The earliest instant at which this advertiser has something to do,
    /// across probing, announcing, and queued replies -- the owner's hint
    /// for how long it may sleep before the next [`InterfaceAdvertiser::tick`].
    pub fn next_due(&self) -> Option<std::time::Instant> {
        let next_accumulation_deadline = self.pending_queries.values().map(|p| p.deadline).min();
        [self.prober.next_due(), self.announcer.next_due(), next_accumulation_deadline]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Concatenates `other`'s questions and answers onto `base`, for accumulating
/// a fragmented (TC=1) query's follow-up packets into one message before
/// matching it against owned records. Duplicate questions or answers are
/// harmless here: [`Repository::get_reply`] dedupes its answer set, and
/// matching the same question twice just produces the same answers twice.
fn merge_messages(mut base: Message, other: Message) -> Message {
    base.qr = other.qr;
    base.questions.extend(other.questions);
    base.answers.extend(other.answers);
    base
}

/// How many probe sends and how many announce sends a fresh registration
/// goes through before becoming active, absent any conflict -- exposed for
/// callers (mainly tests) that want to budget a worst-case settle time.
pub fn worst_case_settle_time() -> Duration {
    Duration::from_millis(250 * (PROBE_COUNT as u64) + 1_000 + 2_000 * (ANNOUNCE_COUNT as u64 - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::service::{RequestedNetwork, TxtEntry};
    use std::collections::BTreeSet;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    struct FakeSocket {
        sent: Vec<Vec<u8>>,
    }

    impl Socket for FakeSocket {
        fn send_to(&mut self, bytes: &[u8], _destination: SocketAddr) -> std::io::Result<()> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }
        fn family(&self) -> crate::socket::AddressFamily {
            crate::socket::AddressFamily::V4
        }
        fn interface_id(&self) -> u64 {
            1
        }
    }

    fn hostname() -> Hostname {
        Hostname {
            name: "Host.local.".to_string(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))],
        }
    }

    fn registration(id: u64, name: &str) -> ServiceRegistration {
        ServiceRegistration {
            service_id: id,
            instance_name: name.to_string(),
            service_type: "_test._tcp".to_string(),
            subtypes: BTreeSet::new(),
            port: 1234,
            host_addresses: Vec::new(),
            txt_entries: vec![TxtEntry::new("k", None)],
            requested_network: Some(RequestedNetwork::All),
            ttl_override: None,
        }
    }

    fn advance_through_probing_and_announcing(
        adv: &mut InterfaceAdvertiser<FakeClock, FakeSocket>,
        clock: &FakeClock,
    ) -> Vec<AdvertiserEvent> {
        let mut all = Vec::new();
        for _ in 0..PROBE_COUNT {
            clock.advance(Duration::from_millis(250));
            all.extend(adv.tick(clock.now()));
        }
        for _ in 0..ANNOUNCE_COUNT {
            clock.advance(Duration::from_secs(2));
            all.extend(adv.tick(clock.now()));
        }
        all
    }

    #[test]
    fn service_probes_then_announces_then_becomes_active() {
        let clock = FakeClock::new();
        let socket = FakeSocket { sent: Vec::new() };
        let mut adv = InterfaceAdvertiser::new(socket, hostname(), AdvertiserConfig::default(), clock.clone());

        adv.add_service(registration(1, "TestService")).unwrap();
        assert!(adv.is_probing(1));

        let events = advance_through_probing_and_announcing(&mut adv, &clock);
        assert!(events.contains(&AdvertiserEvent::ProbingSucceeded { service_id: 1 }));
        assert!(events.iter().any(|e| matches!(
            e,
            AdvertiserEvent::AnnouncementFinished { service_id: 1, was_exit: false }
        )));
        assert!(!adv.socket().sent.is_empty());
    }

    #[test]
    fn remove_service_sends_goodbye_then_forgets_it() {
        let clock = FakeClock::new();
        let socket = FakeSocket { sent: Vec::new() };
        let mut adv = InterfaceAdvertiser::new(socket, hostname(), AdvertiserConfig::default(), clock.clone());

        adv.add_service(registration(1, "TestService")).unwrap();
        advance_through_probing_and_announcing(&mut adv, &clock);

        adv.remove_service(1).unwrap();
        clock.advance(Duration::from_millis(500));
        let events = adv.tick(clock.now());

        assert!(events.contains(&AdvertiserEvent::AnnouncementFinished { service_id: 1, was_exit: true }));
        assert!(adv.repository.registration(1).is_none());
    }

    #[test]
    fn losing_tie_break_during_probe_renames_rather_than_reports_failure() {
        let clock = FakeClock::new();
        let socket = FakeSocket { sent: Vec::new() };
        let mut adv = InterfaceAdvertiser::new(socket, hostname(), AdvertiserConfig::default(), clock.clone());

        adv.add_service(registration(1, "TestService")).unwrap();

        let mut conflicting = Message::default();
        conflicting.qr = crate::types::QR::Response;
        conflicting.answers.push(crate::record::Record {
            name: "TestService._test._tcp.local.".to_string(),
            class: crate::types::Class::Internet,
            cache_flush: true,
            ttl_ms: 120_000,
            data: crate::record::RecordData::SRV(crate::record::Srv {
                priority: 0,
                weight: 0,
                port: 65535,
                target: "Host.local.".to_string(),
            }),
        });

        let events = adv.on_packet(&conflicting.to_vec_unbounded(), "10.0.0.9:5353".parse().unwrap());
        assert!(events.iter().any(|e| matches!(
            e,
            AdvertiserEvent::ServiceConflict { service_id: 1, restarted: true, .. }
        )));
        assert_eq!(
            adv.repository.registration(1).unwrap().instance_name,
            "TestService (2)"
        );
    }

    fn ptr_query(tc: bool) -> Message {
        let mut query = Message::default();
        query.qr = crate::types::QR::Query;
        query.tc = tc;
        query.questions.push(crate::message::Question {
            name: "_test._tcp.local.".to_string(),
            r#type: crate::types::Type::PTR,
            class: crate::types::Class::Internet,
            unicast_response: false,
        });
        query
    }

    #[test]
    fn truncated_query_is_held_back_until_followup_arrives() {
        let clock = FakeClock::new();
        let socket = FakeSocket { sent: Vec::new() };
        let mut adv = InterfaceAdvertiser::new(socket, hostname(), AdvertiserConfig::default(), clock.clone());

        adv.add_service(registration(1, "TestService")).unwrap();
        advance_through_probing_and_announcing(&mut adv, &clock);
        adv.socket_mut().sent.clear();

        let source: SocketAddr = "10.0.0.9:5353".parse().unwrap();

        adv.on_packet(&ptr_query(true).to_vec_unbounded(), source);
        adv.tick(clock.now());
        assert!(
            adv.socket().sent.is_empty(),
            "a truncated query must not be answered before its follow-up or the accumulation window"
        );

        clock.advance(Duration::from_millis(50));
        adv.tick(clock.now());
        assert!(adv.socket().sent.is_empty(), "well within the 400ms window, still nothing to send");

        adv.on_packet(&ptr_query(false).to_vec_unbounded(), source);
        adv.tick(clock.now());
        assert!(
            !adv.socket().sent.is_empty(),
            "the non-truncated follow-up should finalize and send the reply"
        );
    }

    #[test]
    fn truncated_query_without_followup_finalizes_after_accumulation_window() {
        let clock = FakeClock::new();
        let socket = FakeSocket { sent: Vec::new() };
        let mut adv = InterfaceAdvertiser::new(socket, hostname(), AdvertiserConfig::default(), clock.clone());

        adv.add_service(registration(1, "TestService")).unwrap();
        advance_through_probing_and_announcing(&mut adv, &clock);
        adv.socket_mut().sent.clear();

        let source: SocketAddr = "10.0.0.9:5353".parse().unwrap();
        adv.on_packet(&ptr_query(true).to_vec_unbounded(), source);

        clock.advance(Duration::from_millis(399));
        adv.tick(clock.now());
        assert!(adv.socket().sent.is_empty(), "window hasn't elapsed yet");

        clock.advance(Duration::from_millis(2));
        adv.tick(clock.now());
        assert!(
            !adv.socket().sent.is_empty(),
            "once the window elapses with no follow-up, the responder answers with what it accumulated"
        );
    }
}
