//! The record repository and query responder (C2): the in-memory model of
//! every record one interface advertiser owns, matching questions against
//! it, composing reply bundles, and detecting probe/defensive conflicts.

use crate::config::{AdvertiserConfig, DEFAULT_HOST_TTL, DEFAULT_PTR_TXT_TTL};
use crate::errors::AdvertiserError;
use crate::labels::next_free_name;
use crate::message::{Message, Question};
use crate::record::{Nsec, Record, RecordData, Srv};
use crate::service::{ResourceRecordSet, ServiceRegistration, ServiceStatus};
use crate::types::{Class, Type};
use crate::util::{reverse_name_v4, reverse_name_v6};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

pub const SERVICES_META_QUERY: &str = "_services._dns-sd._udp.local.";

/// The advertiser's own hostname and the addresses it resolves to, e.g.
/// `Android_1a2b3c....local.` -> `[192.168.1.5]`. Owned by the
/// multi-interface advertiser and shared (by value, since it's Clone) with
/// every per-interface repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hostname {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

impl Hostname {
    /// Generates a fresh random hostname, `<prefix>_<32 hex chars>.local.`
    /// (§3's "deterministic random label with a fixed prefix").
    pub fn generate(prefix: &str, addresses: Vec<IpAddr>) -> Hostname {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..32)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect();

        Hostname {
            name: format!("{}_{}.local.", prefix, suffix),
            addresses,
        }
    }
}

/// Where a composed reply should be sent (§6.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    MulticastV4,
    MulticastV6,
    Unicast(SocketAddr),
}

/// The records to place in a probe query's authority section, plus the
/// question section naming the candidate (§4.2).
#[derive(Clone, Debug)]
pub struct ProbingInfo {
    pub service_id: u64,
    pub question_name: String,
    pub proposed: Vec<Record>,
}

/// The records to announce (or, with TTL already zeroed by the caller,
/// withdraw) plus NSEC additionals (§4.2/§6.1).
#[derive(Clone, Debug)]
pub struct AnnouncementInfo {
    pub service_id: u64,
    pub answers: Vec<Record>,
    pub additionals: Vec<Record>,
}

/// A composed response to an inbound query (§4.2's `get_reply`).
#[derive(Clone, Debug)]
pub struct ReplyInfo {
    pub answers: Vec<Record>,
    pub additionals: Vec<Record>,
    pub destination: Destination,
    pub send_delay_ms: u64,
}

/// Which kind of ownership conflict a peer's record collided with
/// (§4.5's `on_service_conflict`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    ServiceConflict,
    HostnameConflict,
}

/// Outcome of comparing an inbound record against a record this repository
/// owns of the same name/type/class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Comparison {
    Duplicate,
    WeWin,
    TheyWin,
}

/// Per-interface record repository (§4.2). Each interface advertiser owns
/// one, populated with the same registrations as every sibling, but with
/// entirely separate state -- records are never shared across interfaces.
pub struct Repository {
    entries: HashMap<u64, ResourceRecordSet>,
    hostname: Hostname,
}

impl Repository {
    pub fn new(hostname: Hostname) -> Repository {
        Repository {
            entries: HashMap::new(),
            hostname,
        }
    }

    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    pub fn set_hostname(&mut self, hostname: Hostname) {
        self.hostname = hostname;
    }

    pub fn has_active_service(&self, service_id: u64) -> bool {
        matches!(
            self.entries.get(&service_id).map(|e| e.status),
            Some(ServiceStatus::Active)
        )
    }

    /// True once a service's records are safe to hand out in replies: right
    /// after probing succeeds (the name is ours, even while the gratuitous
    /// announcement is still being sent out) through full `Active` status.
    /// RFC 6762 §8.3: "Immediately after the last probe... the host may
    /// begin responding" -- waiting for `mark_active` (which only happens
    /// once the announcer finishes its send schedule, seconds later) would
    /// leave a freshly-probed service unable to answer queries about itself.
    fn is_answerable(status: ServiceStatus) -> bool {
        matches!(
            status,
            ServiceStatus::Probed | ServiceStatus::Announcing | ServiceStatus::Active
        )
    }

    pub fn registration(&self, service_id: u64) -> Option<&ServiceRegistration> {
        self.entries.get(&service_id).map(|e| &e.registration)
    }

    /// Registers a new service (§4.2). Fails with `DuplicateId` if already
    /// present; fails with `ConflictingName` if an existing *active* entry
    /// has a case-insensitively equal instance name and type.
    pub fn add_service(
        &mut self,
        registration: ServiceRegistration,
    ) -> Result<(), AdvertiserError> {
        let service_id = registration.service_id;

        if self.entries.contains_key(&service_id) {
            return Err(AdvertiserError::DuplicateId(service_id));
        }

        if self.name_is_active(&registration.instance_name, &registration.service_type, None) {
            return Err(AdvertiserError::ConflictingName(
                registration.instance_fqdn(),
            ));
        }

        self.entries
            .insert(service_id, ResourceRecordSet::new(registration));
        Ok(())
    }

    fn name_is_active(
        &self,
        instance_name: &str,
        service_type: &str,
        exclude: Option<u64>,
    ) -> bool {
        self.entries.values().any(|e| {
            Some(e.registration.service_id) != exclude
                && e.status == ServiceStatus::Active
                && e.registration.service_type == service_type
                && e.registration
                    .instance_name
                    .eq_ignore_ascii_case(instance_name)
        })
    }

    /// Marks `service_id` as probing and returns the records to place in
    /// the probe query's authority section.
    pub fn set_service_probing(
        &mut self,
        service_id: u64,
    ) -> Result<ProbingInfo, AdvertiserError> {
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;
        entry.status = ServiceStatus::Probing;

        let registration = entry.registration.clone();
        let mut proposed = Vec::new();

        proposed.push(srv_record(&registration, &self.hostname));
        proposed.push(txt_record(&registration));

        if !registration.has_own_addresses() {
            proposed.extend(host_address_records(&self.hostname));
        } else {
            proposed.extend(address_records(&registration.instance_fqdn(), &registration.host_addresses));
        }

        // Stored immediately (not just returned) so a probe response that
        // conflicts with the candidate SRV/TXT/address records is visible
        // to `get_conflicting_services` during the probing window itself,
        // not only once probing has already succeeded.
        entry.records = proposed.clone();

        Ok(ProbingInfo {
            service_id,
            question_name: registration.instance_fqdn(),
            proposed,
        })
    }

    /// Builds the full set of owned records for `service_id` and stores
    /// them, marking the entry `Probed`. Returns the announcement bundle
    /// (answers plus NSEC additionals).
    pub fn on_probing_succeeded(
        &mut self,
        service_id: u64,
    ) -> Result<AnnouncementInfo, AdvertiserError> {
        let hostname = self.hostname.clone();
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;
        entry.status = ServiceStatus::Probed;

        let records = build_record_set(&entry.registration, &hostname);
        entry.records = records.clone();

        Ok(AnnouncementInfo {
            service_id,
            additionals: nsec_additionals(&records),
            answers: records,
        })
    }

    /// Replaces `service_id`'s subtypes and rebuilds its owned record set
    /// in place, without touching probing status -- subtype PTRs aren't
    /// part of the uniqueness check a probe defends, so this never needs a
    /// re-probe (§4.6's "subtypes only" update path). Returns a fresh
    /// announcement bundle reflecting the changed subtype PTRs.
    pub fn update_subtypes(
        &mut self,
        service_id: u64,
        subtypes: std::collections::BTreeSet<String>,
    ) -> Result<AnnouncementInfo, AdvertiserError> {
        let hostname = self.hostname.clone();
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;

        entry.registration.subtypes = subtypes;
        let records = build_record_set(&entry.registration, &hostname);
        entry.records = records.clone();

        Ok(AnnouncementInfo {
            service_id,
            additionals: nsec_additionals(&records),
            answers: records,
        })
    }

    /// Moves a just-probed entry into the `Announcing` state once its
    /// announce schedule has actually started sending.
    pub fn set_service_announcing(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;
        entry.status = ServiceStatus::Announcing;
        Ok(())
    }

    pub fn mark_active(&mut self, service_id: u64) -> Result<(), AdvertiserError> {
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;
        entry.status = ServiceStatus::Active;
        Ok(())
    }

    /// Returns the owned record set with TTL zeroed, for a goodbye
    /// announcement, and marks the entry `Exiting`.
    pub fn exit_service(&mut self, service_id: u64) -> Result<AnnouncementInfo, AdvertiserError> {
        let entry = self
            .entries
            .get_mut(&service_id)
            .ok_or(AdvertiserError::NotFound(service_id))?;
        entry.status = ServiceStatus::Exiting;

        let answers: Vec<Record> = entry
            .records
            .iter()
            .cloned()
            .map(|mut r| {
                r.ttl_ms = 0;
                r
            })
            .collect();

        Ok(AnnouncementInfo {
            service_id,
            additionals: Vec::new(),
            answers,
        })
    }

    /// Deletes the entry. Legal at any time; the caller (C7) is responsible
    /// for only calling this once the exit announcement has finished.
    pub fn remove_service(&mut self, service_id: u64) {
        self.entries.remove(&service_id);
    }

    /// Ids of every entry currently tracked, regardless of status; used at
    /// socket teardown to drive exit handling for everything still present.
    pub fn clear_services(&mut self) -> Vec<u64> {
        let ids: Vec<u64> = self.entries.keys().copied().collect();
        self.entries.clear();
        ids
    }

    /// Changes `service_id`'s instance name and resets it to `Probing`
    /// (§4.2's `rename_service_for_conflict`).
    pub fn rename_service_for_conflict(
        &mut self,
        service_id: u64,
        new_name: String,
    ) -> Result<ProbingInfo, AdvertiserError> {
        {
            let entry = self
                .entries
                .get_mut(&service_id)
                .ok_or(AdvertiserError::NotFound(service_id))?;
            entry.registration.instance_name = new_name;
            entry.rename_attempts += 1;
        }
        self.set_service_probing(service_id)
    }

    /// Picks the next untaken `<name> (n)` for `service_id`'s current
    /// instance name, against every other *active* registration of the
    /// same type on this interface.
    pub fn next_rename(&self, service_id: u64) -> Option<(String, u32)> {
        let entry = self.entries.get(&service_id)?;
        let base = &entry.registration.instance_name;
        let service_type = entry.registration.service_type.clone();

        next_free_name(base, |candidate| {
            self.name_is_active(candidate, &service_type, Some(service_id))
        })
    }

    /// Returns ids whose owned unique records conflict (non-identical
    /// rdata for the same name/type/class) with an answer in `incoming`.
    ///
    /// While `Probing`, this is where RFC 6762 §8.2 tie-break happens: the
    /// return value only includes services where *we* lost, since a probe
    /// is exactly the situation where a tie is still legitimate to lose.
    /// Past probing (`Probed`/`Announcing`/`Active`) we already own the
    /// name -- there's no tie left to win, so any differing rdata, whichever
    /// way it sorts, is a defensive conflict that must restart probing
    /// (§4.2: "After probing, any conflict restarts probing immediately").
    pub fn get_conflicting_services(&self, incoming: &Message) -> HashSet<(u64, ConflictKind)> {
        let mut conflicts = HashSet::new();

        for (service_id, entry) in &self.entries {
            if entry.status == ServiceStatus::Removed {
                continue;
            }

            for owned in &entry.records {
                for answer in &incoming.answers {
                    if !owned.name.eq_ignore_ascii_case(&answer.name) {
                        continue;
                    }
                    if owned.r#type() != answer.r#type() || owned.class != answer.class {
                        continue;
                    }

                    let is_conflict = match compare(owned, answer) {
                        Comparison::Duplicate => false,
                        Comparison::TheyWin => true,
                        Comparison::WeWin => entry.status != ServiceStatus::Probing,
                    };

                    if is_conflict {
                        let kind = if is_hostname_record(owned, &self.hostname.name) {
                            ConflictKind::HostnameConflict
                        } else {
                            ConflictKind::ServiceConflict
                        };
                        conflicts.insert((*service_id, kind));
                    }
                }
            }
        }

        conflicts
    }

    /// The core responder: matches `incoming`'s questions against owned
    /// records and composes a reply, or `None` if nothing matches.
    pub fn get_reply(
        &self,
        config: &AdvertiserConfig,
        incoming: &Message,
        source: SocketAddr,
    ) -> Option<ReplyInfo> {
        if incoming.qr != crate::types::QR::Query {
            return None;
        }

        let mut answers: Vec<Record> = Vec::new();
        let mut unicast_requested = false;

        for question in &incoming.questions {
            unicast_requested |= question.unicast_response;

            if question.name.eq_ignore_ascii_case(SERVICES_META_QUERY)
                && (question.r#type == Type::PTR || question.r#type == Type::ANY)
            {
                for service_type in self.active_service_types() {
                    answers.push(Record {
                        name: SERVICES_META_QUERY.to_string(),
                        class: Class::Internet,
                        cache_flush: false,
                        ttl_ms: DEFAULT_PTR_TXT_TTL.as_millis() as u64,
                        data: RecordData::PTR(format!("{}.local.", service_type)),
                    });
                }
                continue;
            }

            for (_, entry) in &self.entries {
                if !Self::is_answerable(entry.status) {
                    continue;
                }
                for record in &entry.records {
                    if matches_question(record, question) {
                        answers.push(record.clone());
                    }
                }
            }
        }

        if answers.is_empty() {
            return None;
        }

        dedup_records(&mut answers);

        if config.enable_known_answer_suppression {
            suppress_known_answers(&mut answers, incoming);
            if answers.is_empty() {
                return None;
            }
        }

        let additionals = self.mandated_additionals(&answers);

        let send_delay_ms = if unicast_requested || source.port() != 5353 {
            rand::thread_rng().gen_range(20..=120)
        } else {
            0
        };

        let destination = if unicast_requested || source.port() != 5353 {
            Destination::Unicast(source)
        } else if source.is_ipv4() {
            Destination::MulticastV4
        } else {
            Destination::MulticastV6
        };

        Some(ReplyInfo {
            answers,
            additionals,
            destination,
            send_delay_ms,
        })
    }

    fn active_service_types(&self) -> HashSet<String> {
        self.entries
            .values()
            .filter(|e| Self::is_answerable(e.status))
            .map(|e| e.registration.service_type.clone())
            .collect()
    }

    /// SRV/TXT for each PTR answer; A/AAAA for each SRV target; NSEC
    /// assertions for owned names appearing in the answer set (§4.2 rule 3).
    fn mandated_additionals(&self, answers: &[Record]) -> Vec<Record> {
        let mut additionals = Vec::new();
        let mut seen: HashSet<(String, Type)> = HashSet::new();

        for answer in answers {
            seen.insert((answer.name.to_ascii_lowercase(), answer.r#type()));
        }

        for answer in answers {
            if let RecordData::PTR(target) = &answer.data {
                for entry in self.entries.values() {
                    if !Self::is_answerable(entry.status) {
                        continue;
                    }
                    for record in &entry.records {
                        if !record.name.eq_ignore_ascii_case(target) {
                            continue;
                        }
                        if matches!(record.data, RecordData::SRV(_) | RecordData::TXT(_)) {
                            let key = (record.name.to_ascii_lowercase(), record.r#type());
                            if seen.insert(key) {
                                additionals.push(record.clone());
                            }
                        }
                    }
                }
            }
        }

        for record in additionals.clone() {
            if let RecordData::SRV(srv) = &record.data {
                for entry in self.entries.values() {
                    if !Self::is_answerable(entry.status) {
                        continue;
                    }
                    for addr_record in &entry.records {
                        if !addr_record.name.eq_ignore_ascii_case(&srv.target) {
                            continue;
                        }
                        if matches!(addr_record.data, RecordData::A(_) | RecordData::AAAA(_)) {
                            let key = (addr_record.name.to_ascii_lowercase(), addr_record.r#type());
                            if seen.insert(key) {
                                additionals.push(addr_record.clone());
                            }
                        }
                    }
                }
            }
        }

        for (name, nsec) in self.nsec_by_name() {
            let key = (name.to_ascii_lowercase(), Type::NSEC);
            if seen.contains(&(name.to_ascii_lowercase(), Type::A))
                || seen.contains(&(name.to_ascii_lowercase(), Type::SRV))
                || seen.contains(&(name.to_ascii_lowercase(), Type::TXT))
            {
                if seen.insert(key) {
                    additionals.push(nsec);
                }
            }
        }

        additionals
    }

    fn nsec_by_name(&self) -> Vec<(String, Record)> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            if !Self::is_answerable(entry.status) {
                continue;
            }
            for record in &entry.records {
                if let RecordData::NSEC(_) = &record.data {
                    out.push((record.name.clone(), record.clone()));
                }
            }
        }
        out
    }
}

fn matches_question(record: &Record, question: &Question) -> bool {
    record.name.eq_ignore_ascii_case(&question.name)
        && (question.r#type == Type::ANY || question.r#type == record.r#type())
}

/// Strips answers already known to the querier at half or more of the TTL
/// we'd advertise (§4.2 rule 4).
fn suppress_known_answers(answers: &mut Vec<Record>, incoming: &Message) {
    answers.retain(|candidate| {
        !incoming.answers.iter().any(|known| {
            known.name.eq_ignore_ascii_case(&candidate.name)
                && known.r#type() == candidate.r#type()
                && known.class == candidate.class
                && known.data == candidate.data
                && known.ttl_secs() as u64 * 2 >= candidate.ttl_secs() as u64
        })
    });
}

fn dedup_records(records: &mut Vec<Record>) {
    let mut seen = HashSet::new();
    records.retain(|r| {
        seen.insert((
            r.name.to_ascii_lowercase(),
            r.r#type(),
            r.class,
            format!("{}", r.data),
        ))
    });
}

fn is_hostname_record(record: &Record, hostname: &str) -> bool {
    record.name.eq_ignore_ascii_case(hostname)
        && matches!(record.data, RecordData::A(_) | RecordData::AAAA(_))
}

/// Lexicographic rdata tie-break per RFC 6762 §8.2.
fn compare(ours: &Record, theirs: &Record) -> Comparison {
    let ours_bytes = encode_rdata(ours);
    let theirs_bytes = encode_rdata(theirs);

    if ours_bytes == theirs_bytes {
        Comparison::Duplicate
    } else if ours_bytes > theirs_bytes {
        Comparison::WeWin
    } else {
        Comparison::TheyWin
    }
}

fn encode_rdata(record: &Record) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut names = crate::message::NameDict::new();
    record.write_rdata(&mut buf, &mut names);
    buf
}

fn srv_record(registration: &ServiceRegistration, hostname: &Hostname) -> Record {
    let target = if registration.has_own_addresses() {
        registration.instance_fqdn()
    } else {
        hostname.name.clone()
    };

    Record {
        name: registration.instance_fqdn(),
        class: Class::Internet,
        cache_flush: true,
        ttl_ms: ttl_or(registration, DEFAULT_HOST_TTL),
        data: RecordData::SRV(Srv {
            priority: 0,
            weight: 0,
            port: registration.port,
            target,
        }),
    }
}

fn txt_record(registration: &ServiceRegistration) -> Record {
    let entries: Vec<Vec<u8>> = registration.txt_entries.iter().map(|e| e.encode()).collect();
    Record {
        name: registration.instance_fqdn(),
        class: Class::Internet,
        cache_flush: true,
        ttl_ms: ttl_or(registration, DEFAULT_PTR_TXT_TTL),
        data: RecordData::TXT(entries),
    }
}

fn host_address_records(hostname: &Hostname) -> Vec<Record> {
    address_records(&hostname.name, &hostname.addresses)
}

fn address_records(name: &str, addresses: &[IpAddr]) -> Vec<Record> {
    addresses
        .iter()
        .map(|addr| Record {
            name: name.to_string(),
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: DEFAULT_HOST_TTL.as_millis() as u64,
            data: match addr {
                IpAddr::V4(v4) => RecordData::A(*v4),
                IpAddr::V6(v6) => RecordData::AAAA(*v6),
            },
        })
        .collect()
}

fn ttl_or(registration: &ServiceRegistration, default: std::time::Duration) -> u64 {
    registration
        .ttl_override
        .unwrap_or(default)
        .as_millis() as u64
}

/// Builds the full owned record set for a registration (§6.2): PTR, SRV,
/// TXT, host A/AAAA, subtype PTRs, reverse-mapping PTRs, and NSEC
/// assertions.
fn build_record_set(registration: &ServiceRegistration, hostname: &Hostname) -> Vec<Record> {
    let mut records = Vec::new();
    let instance_fqdn = registration.instance_fqdn();

    records.push(Record {
        name: registration.service_type_fqdn(),
        class: Class::Internet,
        cache_flush: false,
        ttl_ms: ttl_or(registration, DEFAULT_PTR_TXT_TTL),
        data: RecordData::PTR(instance_fqdn.clone()),
    });

    records.push(srv_record(registration, hostname));
    records.push(txt_record(registration));

    let addresses: Vec<IpAddr> = if registration.has_own_addresses() {
        registration.host_addresses.clone()
    } else {
        hostname.addresses.clone()
    };
    let address_owner = if registration.has_own_addresses() {
        instance_fqdn.clone()
    } else {
        hostname.name.clone()
    };
    records.extend(address_records(&address_owner, &addresses));

    for subtype in &registration.subtypes {
        records.push(Record {
            name: format!("{}._sub.{}", subtype, registration.service_type_fqdn()),
            class: Class::Internet,
            cache_flush: false,
            ttl_ms: ttl_or(registration, DEFAULT_PTR_TXT_TTL),
            data: RecordData::PTR(instance_fqdn.clone()),
        });
    }

    for addr in &addresses {
        let reverse_name = match addr {
            IpAddr::V4(v4) => reverse_name_v4(*v4),
            IpAddr::V6(v6) => reverse_name_v6(*v6),
        };
        records.push(Record {
            name: reverse_name,
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: DEFAULT_HOST_TTL.as_millis() as u64,
            data: RecordData::PTR(address_owner.clone()),
        });
    }

    records.extend(nsec_additionals(&records));

    records
}

/// Builds one NSEC record per distinct owned name, asserting the subset of
/// types that name actually serves (RFC 6762 §6.1).
fn nsec_additionals(records: &[Record]) -> Vec<Record> {
    let mut by_name: HashMap<String, (Class, bool, Vec<Type>)> = HashMap::new();

    for record in records {
        if record.r#type() == Type::NSEC {
            continue;
        }
        let entry = by_name
            .entry(record.name.clone())
            .or_insert((record.class, record.cache_flush, Vec::new()));
        if !entry.2.contains(&record.r#type()) {
            entry.2.push(record.r#type());
        }
    }

    by_name
        .into_iter()
        .map(|(name, (class, cache_flush, mut types))| {
            types.sort_by_key(|t| *t as u16);
            Record {
                name: name.clone(),
                class,
                cache_flush,
                ttl_ms: DEFAULT_HOST_TTL.as_millis() as u64,
                data: RecordData::NSEC(Nsec {
                    next_domain: name,
                    types,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    fn registration(id: u64, name: &str) -> ServiceRegistration {
        ServiceRegistration {
            service_id: id,
            instance_name: name.to_string(),
            service_type: "_test._tcp".to_string(),
            subtypes: BTreeSet::new(),
            port: 12345,
            host_addresses: Vec::new(),
            txt_entries: Vec::new(),
            requested_network: None,
            ttl_override: None,
        }
    }

    fn hostname() -> Hostname {
        Hostname {
            name: "Host.local.".to_string(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))],
        }
    }

    #[test]
    fn add_then_duplicate_fails() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "A")).unwrap();
        assert_eq!(
            repo.add_service(registration(1, "A2")),
            Err(AdvertiserError::DuplicateId(1))
        );
    }

    #[test]
    fn probing_then_active_serves_srv_question() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "TestService")).unwrap();
        repo.set_service_probing(1).unwrap();
        repo.on_probing_succeeded(1).unwrap();
        repo.mark_active(1).unwrap();

        let mut m = Message::default();
        m.qr = crate::types::QR::Query;
        m.add_question("TestService._test._tcp.local.", Type::SRV, Class::Internet);

        let reply = repo
            .get_reply(
                &AdvertiserConfig::default(),
                &m,
                "224.0.0.251:5353".parse().unwrap(),
            )
            .unwrap();

        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].r#type(), Type::SRV);
    }

    #[test]
    fn known_answer_suppression_drops_matching_reply() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "TestService")).unwrap();
        repo.set_service_probing(1).unwrap();
        let announce = repo.on_probing_succeeded(1).unwrap();
        repo.mark_active(1).unwrap();

        let ptr = announce
            .answers
            .iter()
            .find(|r| r.r#type() == Type::PTR)
            .unwrap()
            .clone();

        let mut m = Message::default();
        m.qr = crate::types::QR::Query;
        m.add_question("_test._tcp.local.", Type::PTR, Class::Internet);
        m.answers.push(ptr);

        let reply = repo.get_reply(
            &AdvertiserConfig::default(),
            &m,
            "224.0.0.251:5353".parse().unwrap(),
        );
        assert!(reply.is_none());
    }

    #[test]
    fn conflicting_rdata_reports_conflict_for_loser() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "TestService")).unwrap();
        repo.set_service_probing(1).unwrap();
        repo.on_probing_succeeded(1).unwrap();

        let owned_srv = repo
            .registration(1)
            .map(|r| r.instance_fqdn())
            .unwrap();

        // An inbound SRV for the same owned name with a higher port number
        // sorts greater byte-wise, so the peer wins the tie-break.
        let mut m = Message::default();
        m.qr = crate::types::QR::Response;
        m.answers.push(Record {
            name: owned_srv,
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: 120_000,
            data: RecordData::SRV(Srv {
                priority: 0,
                weight: 0,
                port: 65535,
                target: hostname().name,
            }),
        });

        let conflicts = repo.get_conflicting_services(&m);
        assert!(conflicts.contains(&(1, ConflictKind::ServiceConflict)));
    }

    #[test]
    fn post_probe_conflict_is_defended_even_if_we_would_win_tie_break() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "TestService")).unwrap();
        repo.set_service_probing(1).unwrap();
        repo.on_probing_succeeded(1).unwrap();
        repo.mark_active(1).unwrap();

        let owned_srv = repo.registration(1).map(|r| r.instance_fqdn()).unwrap();

        // Port 0 sorts lower than whatever port 12345's registration
        // produces, so by raw rdata comparison *we* win this tie-break --
        // but the service is already active, so there's no tie to win:
        // any differing rdata here is a peer trying to claim a name we
        // already hold, and must be defended.
        let mut m = Message::default();
        m.qr = crate::types::QR::Response;
        m.answers.push(Record {
            name: owned_srv,
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: 120_000,
            data: RecordData::SRV(Srv {
                priority: 0,
                weight: 0,
                port: 0,
                target: hostname().name,
            }),
        });

        let conflicts = repo.get_conflicting_services(&m);
        assert!(conflicts.contains(&(1, ConflictKind::ServiceConflict)));
    }

    #[test]
    fn identical_rdata_is_a_duplicate_not_a_conflict() {
        let mut repo = Repository::new(hostname());
        repo.add_service(registration(1, "TestService")).unwrap();
        repo.set_service_probing(1).unwrap();
        let announce = repo.on_probing_succeeded(1).unwrap();

        let owned_srv = announce
            .answers
            .iter()
            .find(|r| r.r#type() == Type::SRV)
            .unwrap()
            .clone();

        let mut m = Message::default();
        m.qr = crate::types::QR::Response;
        m.answers.push(owned_srv);

        assert!(repo.get_conflicting_services(&m).is_empty());
    }
}
