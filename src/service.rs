//! The service data model (§3): what a user registers, and the repository's
//! view of its lifecycle.

use crate::record::Record;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

/// Either "this specific network" or "all networks", as selected at
/// registration time (§3's `requested_network`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestedNetwork {
    Specific(u64),
    All,
}

/// One key/value TXT entry. `value` is `None` for a boolean-style key with
/// no `=`, and may be arbitrary bytes (RFC 6763 §6.4 allows binary values).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxtEntry {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl TxtEntry {
    pub fn new(key: impl Into<String>, value: Option<Vec<u8>>) -> TxtEntry {
        TxtEntry {
            key: key.into(),
            value,
        }
    }

    /// Encodes as the wire form of a single TXT string: `key`, or
    /// `key=value` when a value is present.
    pub fn encode(&self) -> Vec<u8> {
        match &self.value {
            None => self.key.as_bytes().to_vec(),
            Some(v) => {
                let mut out = self.key.as_bytes().to_vec();
                out.push(b'=');
                out.extend_from_slice(v);
                out
            }
        }
    }
}

/// The user-supplied description of one service instance (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub service_id: u64,
    pub instance_name: String,

    /// Two-to-three label sequence ending in `_udp` or `_tcp`, e.g.
    /// `_http._tcp`. `local` is implicit and not included here.
    pub service_type: String,

    pub subtypes: BTreeSet<String>,
    pub port: u16,

    /// Empty means "use the advertiser-owned default hostname and its
    /// advertiser-owned addresses" rather than this registration's own.
    pub host_addresses: Vec<IpAddr>,

    pub txt_entries: Vec<TxtEntry>,
    pub requested_network: Option<RequestedNetwork>,
    pub ttl_override: Option<Duration>,
}

impl ServiceRegistration {
    /// The fully qualified service type, e.g. `_http._tcp.local.`.
    pub fn service_type_fqdn(&self) -> String {
        format!("{}.local.", self.service_type)
    }

    /// The fully qualified instance name, e.g. `Bedroom._http._tcp.local.`.
    pub fn instance_fqdn(&self) -> String {
        format!("{}.{}", self.instance_name, self.service_type_fqdn())
    }

    /// True if this registration uses its own addresses rather than the
    /// advertiser-owned hostname.
    pub fn has_own_addresses(&self) -> bool {
        !self.host_addresses.is_empty()
    }

    /// Registrations are considered equivalent for update purposes (§4.6)
    /// when everything except subtypes and TTL matches.
    pub fn equivalent_for_update(&self, other: &ServiceRegistration) -> bool {
        self.service_id == other.service_id
            && self.instance_name.eq_ignore_ascii_case(&other.instance_name)
            && self.service_type == other.service_type
            && self.port == other.port
            && self.host_addresses == other.host_addresses
            && self.txt_entries == other.txt_entries
            && self.requested_network == other.requested_network
    }
}

/// Status of a registration's per-interface lifecycle (§3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    Adding,
    Probing,
    Probed,
    Announcing,
    Active,
    Exiting,
    Removed,
}

/// The full set of resource records a registration currently owns on one
/// interface, plus bookkeeping the repository needs to answer questions
/// about it and to detect conflicts.
#[derive(Clone, Debug)]
pub struct ResourceRecordSet {
    pub registration: ServiceRegistration,
    pub status: ServiceStatus,

    /// Incremented on each conflict-triggered rename; starts at 0 (no
    /// rename yet attempted), surfaces `MaxRenameAttempts` once it would
    /// exceed [`crate::config::MAX_RENAME_ATTEMPTS`].
    pub rename_attempts: u32,

    pub records: Vec<Record>,
}

impl ResourceRecordSet {
    pub fn new(registration: ServiceRegistration) -> ResourceRecordSet {
        ResourceRecordSet {
            registration,
            status: ServiceStatus::Adding,
            rename_attempts: 0,
            records: Vec::new(),
        }
    }
}
