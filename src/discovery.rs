//! Complementary discovery path (§1, §9 supplement): feeds inbound DNS
//! responses into a per-interface table keyed by service type, grouping
//! PTR/SRV/TXT/A/AAAA records by instance name the way a DNS-SD browser
//! does (RFC 6763 §4).
//!
//! Grounded on the owner/instance grouping in
//! `other_examples/9082ce76_gbasin-scriptum…relay-mdns.rs`'s `MdnsRecords`,
//! adapted to consume the already-decoded [`crate::message::Message`] this
//! crate's own codec produces rather than re-parsing raw bytes, and to track
//! expiry per RFC 6762 §10.1 instead of a single discovery-window timeout.

use crate::message::Message;
use crate::record::RecordData;
use crate::repository::SERVICES_META_QUERY;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// A snapshot of one discovered service instance, assembled from whatever
/// PTR/SRV/TXT/A/AAAA records have been seen for it so far. Fields are
/// `None`/empty until the corresponding record arrives -- callers that need
/// a fully resolved instance should wait for `srv` and at least one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredService {
    pub instance_name: String,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub addresses: Vec<IpAddr>,
    pub txt: Vec<Vec<u8>>,
}

impl DiscoveredService {
    fn empty(instance_name: String) -> DiscoveredService {
        DiscoveredService {
            instance_name,
            hostname: None,
            port: None,
            addresses: Vec::new(),
            txt: Vec::new(),
        }
    }

    /// True once there's enough to actually connect: a target host/port and
    /// at least one resolved address.
    pub fn is_resolved(&self) -> bool {
        self.port.is_some() && !self.addresses.is_empty()
    }
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

/// Per-interface table of discovered instances, keyed by `(service_type,
/// interface_id)` as §1 describes ("groups records by service instance per
/// interface"). Feed it every inbound response [`Message`] the socket
/// facade delivers; [`ServiceBrowser::expire`] should be called periodically
/// (e.g. alongside the advertiser's own tick) to drop stale entries.
pub struct ServiceBrowser {
    known_types: HashMap<u64, BTreeSet<String>>,
    instances: HashMap<(u64, String), Expiring<DiscoveredService>>,
    hosts: HashMap<(u64, String), Expiring<Vec<IpAddr>>>,
}

impl ServiceBrowser {
    pub fn new() -> ServiceBrowser {
        ServiceBrowser {
            known_types: HashMap::new(),
            instances: HashMap::new(),
            hosts: HashMap::new(),
        }
    }

    /// Builds the RFC 6763 §9 service-type enumeration query
    /// (`_services._dns-sd._udp.local`), so a fresh browser can discover
    /// what types are present before it knows what to ask for directly.
    pub fn build_type_enumeration_query() -> Message {
        let mut m = Message::default();
        m.qr = crate::types::QR::Query;
        m.add_question(
            SERVICES_META_QUERY,
            crate::types::Type::PTR,
            crate::types::Class::Internet,
        );
        m
    }

    /// Builds a browse query for one service type, e.g. `_http._tcp.local.`.
    pub fn build_browse_query(service_type_fqdn: &str) -> Message {
        let mut m = Message::default();
        m.qr = crate::types::QR::Query;
        m.add_question(
            service_type_fqdn,
            crate::types::Type::PTR,
            crate::types::Class::Internet,
        );
        m
    }

    /// Every service type discovered so far on `interface_id`, via either
    /// the meta-query or an instance's own PTR answer.
    pub fn known_service_types(&self, interface_id: u64) -> BTreeSet<String> {
        self.known_types.get(&interface_id).cloned().unwrap_or_default()
    }

    /// Current snapshot of every instance discovered so far on
    /// `interface_id`, resolved or not.
    pub fn instances(&self, interface_id: u64) -> Vec<DiscoveredService> {
        self.instances
            .iter()
            .filter(|((iface, _), _)| *iface == interface_id)
            .map(|(_, e)| e.value.clone())
            .collect()
    }

    /// Folds one inbound response packet's answers (and additionals, which
    /// routinely carry the SRV/TXT/A/AAAA a bare PTR answer implies) into
    /// the table for `interface_id`. Ignores queries -- this path only
    /// learns from what peers say they own.
    pub fn ingest(&mut self, interface_id: u64, message: &Message, now: Instant) {
        if message.qr != crate::types::QR::Response {
            return;
        }

        for record in message.answers.iter().chain(message.additionals.iter()) {
            self.ingest_record(interface_id, record, now);
        }
    }

    fn ingest_record(&mut self, interface_id: u64, record: &crate::record::Record, now: Instant) {
        let expires_at = now + Duration::from_millis(record.ttl_ms.max(1));

        match &record.data {
            RecordData::PTR(target) => {
                if record.name.eq_ignore_ascii_case(SERVICES_META_QUERY) {
                    self.known_types
                        .entry(interface_id)
                        .or_default()
                        .insert(strip_local_suffix(target));
                    return;
                }

                self.known_types
                    .entry(interface_id)
                    .or_default()
                    .insert(strip_local_suffix(&record.name));

                let key = (interface_id, target.to_ascii_lowercase());
                let entry = self.instances.entry(key).or_insert_with(|| Expiring {
                    value: DiscoveredService::empty(target.clone()),
                    expires_at,
                });
                entry.expires_at = expires_at;
            }

            RecordData::SRV(srv) => {
                let key = (interface_id, record.name.to_ascii_lowercase());
                let entry = self.instances.entry(key).or_insert_with(|| Expiring {
                    value: DiscoveredService::empty(record.name.clone()),
                    expires_at,
                });
                entry.value.hostname = Some(srv.target.clone());
                entry.value.port = Some(srv.port);
                entry.expires_at = entry.expires_at.max(expires_at);

                if let Some(addrs) = self.hosts.get(&(interface_id, srv.target.to_ascii_lowercase()))
                {
                    entry.value.addresses = addrs.value.clone();
                }
            }

            RecordData::TXT(entries) => {
                let key = (interface_id, record.name.to_ascii_lowercase());
                let entry = self.instances.entry(key).or_insert_with(|| Expiring {
                    value: DiscoveredService::empty(record.name.clone()),
                    expires_at,
                });
                entry.value.txt = entries.clone();
                entry.expires_at = entry.expires_at.max(expires_at);
            }

            RecordData::A(addr) => self.ingest_address(interface_id, &record.name, IpAddr::V4(*addr), expires_at),
            RecordData::AAAA(addr) => {
                self.ingest_address(interface_id, &record.name, IpAddr::V6(*addr), expires_at)
            }

            RecordData::NSEC(_) | RecordData::Unknown { .. } => {}
        }
    }

    fn ingest_address(&mut self, interface_id: u64, hostname: &str, addr: IpAddr, expires_at: Instant) {
        let host_key = (interface_id, hostname.to_ascii_lowercase());
        let entry = self.hosts.entry(host_key.clone()).or_insert_with(|| Expiring {
            value: Vec::new(),
            expires_at,
        });
        if !entry.value.contains(&addr) {
            entry.value.push(addr);
        }
        entry.expires_at = expires_at;

        let addrs = entry.value.clone();
        for ((iface, _), instance) in self.instances.iter_mut() {
            if *iface != interface_id {
                continue;
            }
            if instance
                .value
                .hostname
                .as_deref()
                .map(|h| h.eq_ignore_ascii_case(hostname))
                .unwrap_or(false)
            {
                instance.value.addresses = addrs.clone();
            }
        }
    }

    /// Drops any instance or address record whose TTL has elapsed as of
    /// `now` (RFC 6762 §10.1). Call this periodically; it performs no I/O.
    pub fn expire(&mut self, now: Instant) {
        self.instances.retain(|_, e| e.expires_at > now);
        self.hosts.retain(|_, e| e.expires_at > now);
    }
}

impl Default for ServiceBrowser {
    fn default() -> Self {
        ServiceBrowser::new()
    }
}

fn strip_local_suffix(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, Srv};
    use crate::types::{Class, QR};
    use std::net::Ipv4Addr;

    fn response() -> Message {
        let mut m = Message::default();
        m.qr = QR::Response;
        m
    }

    #[test]
    fn ptr_srv_txt_a_group_into_one_resolved_instance() {
        let mut browser = ServiceBrowser::new();
        let now = Instant::now();

        let mut m = response();
        m.answers.push(Record {
            name: "_http._tcp.local.".to_string(),
            class: Class::Internet,
            cache_flush: false,
            ttl_ms: 4_500_000,
            data: RecordData::PTR("Printer._http._tcp.local.".to_string()),
        });
        m.additionals.push(Record {
            name: "Printer._http._tcp.local.".to_string(),
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: 120_000,
            data: RecordData::SRV(Srv {
                priority: 0,
                weight: 0,
                port: 631,
                target: "printer.local.".to_string(),
            }),
        });
        m.additionals.push(Record {
            name: "Printer._http._tcp.local.".to_string(),
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: 4_500_000,
            data: RecordData::TXT(vec![b"txtvers=1".to_vec()]),
        });
        m.additionals.push(Record {
            name: "printer.local.".to_string(),
            class: Class::Internet,
            cache_flush: true,
            ttl_ms: 120_000,
            data: RecordData::A(Ipv4Addr::new(192, 168, 1, 50)),
        });

        browser.ingest(1, &m, now);

        let instances = browser.instances(1);
        assert_eq!(instances.len(), 1);
        let instance = &instances[0];
        assert_eq!(instance.instance_name, "Printer._http._tcp.local.");
        assert_eq!(instance.port, Some(631));
        assert_eq!(instance.addresses, vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))]);
        assert!(instance.is_resolved());
        assert!(browser.known_service_types(1).contains("_http._tcp.local"));
    }

    #[test]
    fn separate_interfaces_do_not_share_instances() {
        let mut browser = ServiceBrowser::new();
        let now = Instant::now();

        let mut m = response();
        m.answers.push(Record {
            name: "_http._tcp.local.".to_string(),
            class: Class::Internet,
            cache_flush: false,
            ttl_ms: 4_500_000,
            data: RecordData::PTR("A._http._tcp.local.".to_string()),
        });

        browser.ingest(1, &m, now);
        assert_eq!(browser.instances(1).len(), 1);
        assert_eq!(browser.instances(2).len(), 0);
    }

    #[test]
    fn expired_instance_is_dropped() {
        let mut browser = ServiceBrowser::new();
        let now = Instant::now();

        let mut m = response();
        m.answers.push(Record {
            name: "_http._tcp.local.".to_string(),
            class: Class::Internet,
            cache_flush: false,
            ttl_ms: 1_000,
            data: RecordData::PTR("A._http._tcp.local.".to_string()),
        });

        browser.ingest(1, &m, now);
        assert_eq!(browser.instances(1).len(), 1);

        browser.expire(now + Duration::from_secs(2));
        assert_eq!(browser.instances(1).len(), 0);
    }

    #[test]
    fn meta_query_answer_records_service_type_without_an_instance() {
        let mut browser = ServiceBrowser::new();
        let now = Instant::now();

        let mut m = response();
        m.answers.push(Record {
            name: SERVICES_META_QUERY.to_string(),
            class: Class::Internet,
            cache_flush: false,
            ttl_ms: 4_500_000,
            data: RecordData::PTR("_http._tcp.local.".to_string()),
        });

        browser.ingest(1, &m, now);
        assert!(browser.known_service_types(1).contains("_http._tcp.local"));
        assert!(browser.instances(1).is_empty());
    }
}
