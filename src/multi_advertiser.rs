//! The multi-interface advertiser (C8): the crate's public surface. Owns one
//! [`InterfaceAdvertiser`] per network interface, fans a registration out to
//! every interface its `requested_network` matches, and folds each
//! interface's independent probing/announcing/conflict events into a single
//! set of user-facing callbacks (§4.5, §4.6).
//!
//! Interface lifecycle comes from an [`InterfaceProvider`]; nothing in this
//! module touches a real socket or the OS network-change APIs directly.

use crate::clock::Clock;
use crate::config::AdvertiserConfig;
use crate::errors::AdvertiserError;
use crate::interface_advertiser::{AdvertiserEvent, InterfaceAdvertiser};
use crate::labels::next_free_name;
use crate::repository::Hostname;
use crate::service::{RequestedNetwork, ServiceRegistration};
use crate::socket::{InterfaceEvent, InterfaceProvider, Socket};
use byteorder::{WriteBytesExt, BE};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// User-facing outcomes of a [`MultiInterfaceAdvertiser::poll`] call (§4.5,
/// §4.6). A real caller typically implements this directly rather than
/// matching on an event enum, so renaming/retrying stays out of application
/// code: by the time `on_register_service_failed` fires, this crate has
/// already exhausted every rename attempt it's willing to make on its own.
pub trait AdvertiserCallbacks {
    /// Fires once, the first time every interface currently advertising
    /// `service_id` has finished probing and announcing without a surviving
    /// conflict.
    fn on_register_service_succeeded(&mut self, service_id: u64) {
        let _ = service_id;
    }

    /// Fires when `service_id` could not be kept registered -- most often
    /// [`AdvertiserError::MaxRenameAttempts`] after repeated tie-break losses.
    fn on_register_service_failed(&mut self, service_id: u64, error: AdvertiserError) {
        let _ = (service_id, error);
    }

    /// Fires after `update_service` successfully applies (subtypes changed,
    /// no re-probe needed).
    fn on_service_updated(&mut self, service_id: u64) {
        let _ = service_id;
    }

    /// Fires with a fresh payload whenever an offloadable service starts
    /// advertising or its advertised records change, so a NIC/firmware
    /// offload target can take over responding on this host's behalf.
    /// Only invoked when [`AdvertiserConfig::enable_offload`] is set.
    fn on_offload_start_or_update(&mut self, service_id: u64, payload: Vec<u8>) {
        let _ = (service_id, payload);
    }

    /// Fires once a previously-offloaded service is fully withdrawn.
    fn on_offload_stop(&mut self, service_id: u64) {
        let _ = service_id;
    }
}

/// Options for [`MultiInterfaceAdvertiser::add_or_update_service`] (§4.6, §6.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistrationOptions {
    /// Reject the call with [`AdvertiserError::UpdateOnlyMissing`] rather
    /// than creating a new registration if `service_id` isn't already
    /// registered.
    pub is_update_only: bool,
}

/// Per-registration bookkeeping the multi-interface advertiser needs beyond
/// what any single [`InterfaceAdvertiser`] tracks.
struct Bookkeeping {
    registration: ServiceRegistration,
    network: RequestedNetwork,
    /// Interfaces this service is on that haven't yet reported
    /// `ProbingSucceeded`; success fires once this drains to empty.
    awaiting_success: HashSet<u64>,
    succeeded: bool,
    offloaded: bool,
}

/// Drives every [`InterfaceAdvertiser`] this process needs, one per network
/// interface, keeping each in sync with the registrations that apply to it.
///
/// Not `Send`/`Sync`, like the rest of this crate -- own it on whichever
/// thread is pumping [`MultiInterfaceAdvertiser::poll`].
pub struct MultiInterfaceAdvertiser<C: Clock, P: InterfaceProvider> {
    hostname_prefix: String,
    clock: C,
    config: AdvertiserConfig,
    provider: P,
    interfaces: HashMap<u64, InterfaceAdvertiser<C, P::Socket>>,
    registrations: HashMap<u64, Bookkeeping>,
    network_refcounts: HashMap<RequestedNetwork, usize>,
}

impl<C: Clock, P: InterfaceProvider> MultiInterfaceAdvertiser<C, P> {
    pub fn new(
        provider: P,
        config: AdvertiserConfig,
        clock: C,
        hostname_prefix: impl Into<String>,
    ) -> Self {
        MultiInterfaceAdvertiser {
            hostname_prefix: hostname_prefix.into(),
            clock,
            config,
            provider,
            interfaces: HashMap::new(),
            registrations: HashMap::new(),
            network_refcounts: HashMap::new(),
        }
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_registered(&self, service_id: u64) -> bool {
        self.registrations.contains_key(&service_id)
    }

    /// Registers `registration` and starts probing on every interface whose
    /// network selector it matches, requesting any not yet available from
    /// the [`InterfaceProvider`] (§3, §4.6).
    ///
    /// A name+type collision against any other registration this advertiser
    /// already knows about -- regardless of whether that one has finished
    /// probing yet -- is resolved here, before any probe is sent (§4.6,
    /// S2/S3): the first-registered name wins, and this (later) registration
    /// is renamed `"<name> (n)"`. Checking against every bookkept
    /// registration rather than only `Active` ones is what keeps two
    /// same-named registrations that race each other (both still pre-probe)
    /// from ever reaching the same interface under one name (§8 property 3).
    pub fn register_service(&mut self, mut registration: ServiceRegistration) -> Result<(), AdvertiserError> {
        let service_id = registration.service_id;
        if self.registrations.contains_key(&service_id) {
            return Err(AdvertiserError::DuplicateId(service_id));
        }

        if self.name_collides(&registration.instance_name, &registration.service_type) {
            let service_type = registration.service_type.clone();
            match next_free_name(&registration.instance_name, |candidate| {
                self.name_collides(candidate, &service_type)
            }) {
                Some((renamed, _)) => registration.instance_name = renamed,
                None => {
                    return Err(AdvertiserError::MaxRenameAttempts(
                        service_id,
                        crate::config::MAX_RENAME_ATTEMPTS,
                    ))
                }
            }
        }

        let network = registration.requested_network.clone().unwrap_or(RequestedNetwork::All);
        self.bump_network_refcount(network);

        let mut awaiting = HashSet::new();
        for (&interface_id, interface) in self.interfaces.iter_mut() {
            if !network_matches(&network, interface_id) {
                continue;
            }
            interface.add_service(registration.clone())?;
            awaiting.insert(interface_id);
        }

        self.registrations.insert(
            service_id,
            Bookkeeping {
                registration,
                network,
                awaiting_success: awaiting,
                succeeded: false,
                offloaded: false,
            },
        );
        Ok(())
    }

    /// Applies an in-place update (subtypes only; §4.6) to every interface
    /// currently advertising `service_id`. Fails with `MaterialChange` if
    /// anything besides subtypes/TTL differs from the existing registration.
    pub fn update_service(&mut self, registration: ServiceRegistration) -> Result<(), AdvertiserError> {
        let service_id = registration.service_id;
        let existing = self
            .registrations
            .get(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;

        if !existing.registration.equivalent_for_update(&registration) {
            return Err(AdvertiserError::MaterialChange(service_id));
        }

        for interface in self.interfaces.values_mut() {
            if interface.registration(service_id).is_some() {
                interface.update_service(service_id, registration.subtypes.clone())?;
            }
        }

        if let Some(bookkeeping) = self.registrations.get_mut(&service_id) {
            bookkeeping.registration = registration;
        }
        Ok(())
    }

    /// Single entry point covering both registration and update (§4.6):
    /// registers `registration` if `service_id` isn't already tracked, or
    /// applies it as an update otherwise. With `options.is_update_only` set,
    /// a `service_id` that isn't already registered is rejected with
    /// [`AdvertiserError::UpdateOnlyMissing`] instead of being registered as
    /// new (§6.3).
    pub fn add_or_update_service(
        &mut self,
        registration: ServiceRegistration,
        options: RegistrationOptions,
    ) -> Result<(), AdvertiserError> {
        let service_id = registration.service_id;
        let exists = self.registrations.contains_key(&service_id);

        if options.is_update_only && !exists {
            return Err(AdvertiserError::UpdateOnlyMissing(service_id));
        }

        if exists {
            self.update_service(registration)
        } else {
            self.register_service(registration)
        }
    }

    /// Withdraws `service_id` from every interface that has it, releases
    /// its network request once nothing else needs it, and forgets it.
    pub fn remove_service(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        let bookkeeping = self
            .registrations
            .remove(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;

        for interface in self.interfaces.values_mut() {
            if interface.registration(service_id).is_some() {
                let _ = interface.remove_service(service_id);
            }
        }

        self.release_network_refcount(bookkeeping.network);
        Ok(())
    }

    /// True if some other registration already tracked by this advertiser
    /// has the same `(instance_name, service_type)`, case-insensitively.
    fn name_collides(&self, instance_name: &str, service_type: &str) -> bool {
        self.registrations.values().any(|b| {
            b.registration.service_type == service_type
                && b.registration.instance_name.eq_ignore_ascii_case(instance_name)
        })
    }

    fn bump_network_refcount(&mut self, network: RequestedNetwork) {
        let count = self.network_refcounts.entry(network.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.provider.request(network);
        }
    }

    fn release_network_refcount(&mut self, network: RequestedNetwork) {
        if let Some(count) = self.network_refcounts.get_mut(&network) {
            *count -= 1;
            if *count == 0 {
                self.network_refcounts.remove(&network);
                self.provider.unrequest(network);
            }
        }
    }

    /// Drains interface-lifecycle events, ticks every interface advertiser,
    /// and turns the results into [`AdvertiserCallbacks`] calls. This is the
    /// crate's single external entry point; callers drive it from whatever
    /// loop owns the actual sockets (a `mio`/`tokio` reactor, a test's
    /// explicit clock advance, etc).
    pub fn poll(&mut self, now: Instant, callbacks: &mut impl AdvertiserCallbacks) {
        self.drain_interface_events();

        let interface_ids: Vec<u64> = self.interfaces.keys().copied().collect();
        for interface_id in interface_ids {
            let events = {
                let interface = match self.interfaces.get_mut(&interface_id) {
                    Some(i) => i,
                    None => continue,
                };
                interface.tick(now)
            };

            for event in events {
                self.handle_event(interface_id, event, callbacks);
            }
        }
    }

    /// Delivers one inbound packet to the interface it arrived on.
    pub fn on_packet(&mut self, interface_id: u64, bytes: &[u8], source: std::net::SocketAddr, callbacks: &mut impl AdvertiserCallbacks) {
        let events = match self.interfaces.get_mut(&interface_id) {
            Some(interface) => interface.on_packet(bytes, source),
            None => return,
        };
        for event in events {
            self.handle_event(interface_id, event, callbacks);
        }
    }

    fn drain_interface_events(&mut self) {
        for event in self.provider.poll_events() {
            match event {
                InterfaceEvent::SocketCreated(socket) => self.add_interface(socket),
                InterfaceEvent::AddressesChanged(_interface_id) => {
                    // Address enumeration lives behind the socket/provider
                    // boundary (§1); callers that need new host addresses
                    // reflected call `set_interface_addresses` themselves.
                }
                InterfaceEvent::InterfaceDestroyed(interface_id) => {
                    self.remove_interface(interface_id);
                }
            }
        }
    }

    fn add_interface(&mut self, socket: P::Socket) {
        let interface_id = socket.interface_id();
        let hostname = Hostname::generate(&self.hostname_prefix, Vec::new());
        let mut interface = InterfaceAdvertiser::new(socket, hostname, self.config.clone(), self.clock.clone());

        for bookkeeping in self.registrations.values_mut() {
            if !network_matches(&bookkeeping.network, interface_id) {
                continue;
            }
            if interface.add_service(bookkeeping.registration.clone()).is_ok() {
                bookkeeping.awaiting_success.insert(interface_id);
                bookkeeping.succeeded = false;
            }
        }

        self.interfaces.insert(interface_id, interface);
    }

    fn remove_interface(&mut self, interface_id: u64) {
        if let Some(mut interface) = self.interfaces.remove(&interface_id) {
            interface.destroy_now();
        }
        for bookkeeping in self.registrations.values_mut() {
            bookkeeping.awaiting_success.remove(&interface_id);
        }
    }

    /// Sets (or replaces) the host addresses this interface resolves to,
    /// regenerating its hostname. Left as an explicit call because address
    /// enumeration is out of this crate's scope (§1); a real caller wires
    /// this to whatever OS API reports interface addresses.
    pub fn set_interface_addresses(&mut self, interface_id: u64, addresses: Vec<std::net::IpAddr>) {
        if let Some(interface) = self.interfaces.get_mut(&interface_id) {
            let prefix = self.hostname_prefix.clone();
            interface.set_hostname(Hostname::generate(&prefix, addresses));
        }
    }

    fn handle_event(&mut self, interface_id: u64, event: AdvertiserEvent, callbacks: &mut impl AdvertiserCallbacks) {
        match event {
            AdvertiserEvent::ProbingSucceeded { service_id } => {
                let fully_succeeded = match self.registrations.get_mut(&service_id) {
                    Some(bookkeeping) => {
                        bookkeeping.awaiting_success.remove(&interface_id);
                        !bookkeeping.succeeded && bookkeeping.awaiting_success.is_empty()
                    }
                    None => false,
                };

                if fully_succeeded {
                    if let Some(bookkeeping) = self.registrations.get_mut(&service_id) {
                        bookkeeping.succeeded = true;
                    }
                    callbacks.on_register_service_succeeded(service_id);
                    self.maybe_start_offload(service_id, interface_id, callbacks);
                }
            }

            AdvertiserEvent::ServiceConflict {
                service_id,
                kind: _,
                restarted,
            } => {
                if restarted {
                    self.propagate_rename(service_id, interface_id);
                }
            }

            AdvertiserEvent::RenameAttemptsExceeded { service_id } => {
                for (&other_id, interface) in self.interfaces.iter_mut() {
                    if other_id != interface_id && interface.registration(service_id).is_some() {
                        let _ = interface.remove_service(service_id);
                    }
                }
                if let Some(bookkeeping) = self.registrations.remove(&service_id) {
                    self.release_network_refcount(bookkeeping.network);
                }
                callbacks.on_register_service_failed(
                    service_id,
                    AdvertiserError::MaxRenameAttempts(service_id, crate::config::MAX_RENAME_ATTEMPTS),
                );
            }

            AdvertiserEvent::AnnouncementFinished { service_id, was_exit } => {
                if was_exit {
                    if let Some(bookkeeping) = self.registrations.get_mut(&service_id) {
                        if bookkeeping.offloaded {
                            bookkeeping.offloaded = false;
                            callbacks.on_offload_stop(service_id);
                        }
                    }
                }
            }
        }
    }

    /// After a local tie-break rename, re-point every sibling interface
    /// still advertising `service_id` at the same new name, so the instance
    /// doesn't end up under divergent names per interface.
    fn propagate_rename(&mut self, service_id: u64, origin_interface_id: u64) {
        let new_name = match self
            .interfaces
            .get(&origin_interface_id)
            .and_then(|i| i.registration(service_id))
        {
            Some(reg) => reg.instance_name.clone(),
            None => return,
        };

        if let Some(bookkeeping) = self.registrations.get_mut(&service_id) {
            if bookkeeping.registration.instance_name == new_name {
                return;
            }
            bookkeeping.registration.instance_name = new_name.clone();
            bookkeeping.succeeded = false;
            bookkeeping.awaiting_success = self
                .interfaces
                .iter()
                .filter(|(&iid, i)| iid == origin_interface_id || i.registration(service_id).is_some())
                .map(|(&iid, _)| iid)
                .collect();
        } else {
            return;
        }

        for (&interface_id, interface) in self.interfaces.iter_mut() {
            if interface_id == origin_interface_id {
                continue;
            }
            if interface.registration(service_id).is_none() {
                continue;
            }
            let _ = interface.force_rename(service_id, new_name.clone());
        }
    }

    fn maybe_start_offload(&mut self, service_id: u64, interface_id: u64, callbacks: &mut impl AdvertiserCallbacks) {
        if !self.config.enable_offload {
            return;
        }

        let payload = match self.interfaces.get(&interface_id).and_then(|i| i.registration(service_id)) {
            Some(registration) => {
                let priority = self.config.service_priority_list.priority_for(&registration.service_type);
                build_offload_payload(registration, priority)
            }
            None => return,
        };

        if let Some(bookkeeping) = self.registrations.get_mut(&service_id) {
            bookkeeping.offloaded = true;
        }
        callbacks.on_offload_start_or_update(service_id, payload);
    }
}

fn network_matches(network: &RequestedNetwork, interface_id: u64) -> bool {
    match network {
        RequestedNetwork::All => true,
        RequestedNetwork::Specific(id) => *id == interface_id,
    }
}

/// A compact, crate-private wire form for a NIC/firmware offload target:
/// priority, port, the fully qualified instance name, then each TXT entry
/// length-prefixed. Not an RFC format -- offload hardware contracts are
/// vendor-specific -- just something concrete and decodable.
fn build_offload_payload(registration: &ServiceRegistration, priority: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BE>(priority).unwrap();
    out.write_u16::<BE>(registration.port).unwrap();

    let name = registration.instance_fqdn();
    out.write_u16::<BE>(name.len() as u16).unwrap();
    out.extend_from_slice(name.as_bytes());

    out.write_u8(registration.txt_entries.len() as u8).unwrap();
    for entry in &registration.txt_entries {
        let encoded = entry.encode();
        out.write_u8(encoded.len() as u8).unwrap();
        out.extend_from_slice(&encoded);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::prober::PROBE_COUNT;
    use crate::service::TxtEntry;
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::net::SocketAddr;
    use std::rc::Rc;
    use std::time::Duration;

    struct FakeSocket {
        interface_id: u64,
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl Socket for FakeSocket {
        fn send_to(&mut self, bytes: &[u8], _destination: SocketAddr) -> std::io::Result<()> {
            self.sent.borrow_mut().push(bytes.to_vec());
            Ok(())
        }
        fn family(&self) -> crate::socket::AddressFamily {
            crate::socket::AddressFamily::V4
        }
        fn interface_id(&self) -> u64 {
            self.interface_id
        }
    }

    struct FakeProvider {
        pending: Vec<InterfaceEvent<FakeSocket>>,
    }

    impl InterfaceProvider for FakeProvider {
        type Socket = FakeSocket;

        fn request(&mut self, _network: RequestedNetwork) {}
        fn unrequest(&mut self, _network: RequestedNetwork) {}

        fn poll_events(&mut self) -> Vec<InterfaceEvent<Self::Socket>> {
            std::mem::take(&mut self.pending)
        }
    }

    struct RecordingCallbacks {
        succeeded: Vec<u64>,
        failed: Vec<u64>,
    }

    impl AdvertiserCallbacks for RecordingCallbacks {
        fn on_register_service_succeeded(&mut self, service_id: u64) {
            self.succeeded.push(service_id);
        }
        fn on_register_service_failed(&mut self, service_id: u64, _error: AdvertiserError) {
            self.failed.push(service_id);
        }
    }

    fn registration(id: u64, name: &str, network: Option<RequestedNetwork>) -> ServiceRegistration {
        ServiceRegistration {
            service_id: id,
            instance_name: name.to_string(),
            service_type: "_test._tcp".to_string(),
            subtypes: BTreeSet::new(),
            port: 4321,
            host_addresses: Vec::new(),
            txt_entries: vec![TxtEntry::new("k", None)],
            requested_network: network,
            ttl_override: None,
        }
    }

    fn settle(adv: &mut MultiInterfaceAdvertiser<FakeClock, FakeProvider>, clock: &FakeClock, cb: &mut RecordingCallbacks) {
        for _ in 0..PROBE_COUNT {
            clock.advance(Duration::from_millis(250));
            adv.poll(clock.now(), cb);
        }
        for _ in 0..3 {
            clock.advance(Duration::from_secs(2));
            adv.poll(clock.now(), cb);
        }
    }

    #[test]
    fn succeeds_once_every_matching_interface_finishes_probing() {
        let clock = FakeClock::new();
        let provider = FakeProvider {
            pending: vec![
                InterfaceEvent::SocketCreated(FakeSocket { interface_id: 1, sent: Rc::new(RefCell::new(Vec::new())) }),
                InterfaceEvent::SocketCreated(FakeSocket { interface_id: 2, sent: Rc::new(RefCell::new(Vec::new())) }),
            ],
        };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock.clone(), "Host");
        let mut cb = RecordingCallbacks { succeeded: Vec::new(), failed: Vec::new() };

        adv.poll(clock.now(), &mut cb);
        assert_eq!(adv.interface_count(), 2);

        adv.register_service(registration(1, "TestService", Some(RequestedNetwork::All))).unwrap();

        settle(&mut adv, &clock, &mut cb);
        assert_eq!(cb.succeeded, vec![1]);
    }

    #[test]
    fn specific_network_only_lands_on_the_matching_interface() {
        let clock = FakeClock::new();
        let provider = FakeProvider {
            pending: vec![
                InterfaceEvent::SocketCreated(FakeSocket { interface_id: 1, sent: Rc::new(RefCell::new(Vec::new())) }),
                InterfaceEvent::SocketCreated(FakeSocket { interface_id: 2, sent: Rc::new(RefCell::new(Vec::new())) }),
            ],
        };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock.clone(), "Host");
        let mut cb = RecordingCallbacks { succeeded: Vec::new(), failed: Vec::new() };
        adv.poll(clock.now(), &mut cb);

        adv.register_service(registration(1, "TestService", Some(RequestedNetwork::Specific(1)))).unwrap();
        settle(&mut adv, &clock, &mut cb);

        assert_eq!(cb.succeeded, vec![1]);
        assert!(adv.interfaces.get(&2).unwrap().registration(1).is_none());
    }

    #[test]
    fn remove_service_withdraws_from_every_interface() {
        let clock = FakeClock::new();
        let provider = FakeProvider {
            pending: vec![InterfaceEvent::SocketCreated(FakeSocket { interface_id: 1, sent: Rc::new(RefCell::new(Vec::new())) })],
        };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock.clone(), "Host");
        let mut cb = RecordingCallbacks { succeeded: Vec::new(), failed: Vec::new() };
        adv.poll(clock.now(), &mut cb);

        adv.register_service(registration(1, "TestService", None)).unwrap();
        settle(&mut adv, &clock, &mut cb);

        adv.remove_service(1).unwrap();
        assert!(!adv.is_registered(1));

        clock.advance(Duration::from_millis(500));
        adv.poll(clock.now(), &mut cb);
        assert!(adv.interfaces.get(&1).unwrap().registration(1).is_none());
    }

    #[test]
    fn second_registration_with_colliding_name_is_renamed_before_any_probe() {
        let clock = FakeClock::new();
        let provider = FakeProvider {
            pending: vec![InterfaceEvent::SocketCreated(FakeSocket {
                interface_id: 1,
                sent: Rc::new(RefCell::new(Vec::new())),
            })],
        };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock.clone(), "Host");
        let mut cb = RecordingCallbacks { succeeded: Vec::new(), failed: Vec::new() };
        adv.poll(clock.now(), &mut cb);

        adv.register_service(registration(1, "TestService", Some(RequestedNetwork::Specific(1))))
            .unwrap();
        adv.register_service(registration(2, "TestService", Some(RequestedNetwork::All)))
            .unwrap();

        assert_eq!(
            adv.registrations.get(&2).unwrap().registration.instance_name,
            "TestService (2)"
        );
        // Never reached an interface under the colliding name.
        assert!(adv
            .interfaces
            .get(&1)
            .unwrap()
            .registration(2)
            .map(|r| r.instance_name == "TestService (2)")
            .unwrap_or(false));
    }

    #[test]
    fn add_or_update_service_registers_when_absent_and_not_update_only() {
        let clock = FakeClock::new();
        let provider = FakeProvider { pending: Vec::new() };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock, "Host");

        adv.add_or_update_service(registration(1, "TestService", None), RegistrationOptions::default())
            .unwrap();
        assert!(adv.is_registered(1));
    }

    #[test]
    fn add_or_update_service_update_only_rejects_unknown_id() {
        let clock = FakeClock::new();
        let provider = FakeProvider { pending: Vec::new() };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock, "Host");

        let err = adv
            .add_or_update_service(
                registration(1, "TestService", None),
                RegistrationOptions { is_update_only: true },
            )
            .unwrap_err();
        assert_eq!(err, AdvertiserError::UpdateOnlyMissing(1));
        assert!(!adv.is_registered(1));
    }

    #[test]
    fn add_or_update_service_update_only_updates_existing_registration() {
        let clock = FakeClock::new();
        let provider = FakeProvider {
            pending: vec![InterfaceEvent::SocketCreated(FakeSocket {
                interface_id: 1,
                sent: Rc::new(RefCell::new(Vec::new())),
            })],
        };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock.clone(), "Host");
        let mut cb = RecordingCallbacks { succeeded: Vec::new(), failed: Vec::new() };
        adv.poll(clock.now(), &mut cb);

        adv.register_service(registration(1, "TestService", None)).unwrap();
        settle(&mut adv, &clock, &mut cb);

        let mut updated = registration(1, "TestService", None);
        updated.subtypes.insert("_sub".to_string());

        adv.add_or_update_service(updated, RegistrationOptions { is_update_only: true })
            .unwrap();
        assert_eq!(
            adv.registrations.get(&1).unwrap().registration.subtypes,
            BTreeSet::from(["_sub".to_string()])
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let clock = FakeClock::new();
        let provider = FakeProvider { pending: Vec::new() };
        let mut adv = MultiInterfaceAdvertiser::new(provider, AdvertiserConfig::default(), clock, "Host");

        adv.register_service(registration(1, "TestService", None)).unwrap();
        let err = adv.register_service(registration(1, "TestService", None)).unwrap_err();
        assert_eq!(err, AdvertiserError::DuplicateId(1));
    }
}
