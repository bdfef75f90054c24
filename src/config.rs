//! Explicit, per-instance configuration (§6.3), passed by reference into the
//! multi-interface advertiser's constructor rather than read from a
//! process-wide singleton.

use std::collections::HashMap;
use std::time::Duration;

/// Priority assigned to an offloaded service type when none is configured
/// explicitly for it.
pub const DEFAULT_OFFLOAD_PRIORITY: u32 = u32::MAX;

/// Ordered service-type to priority mapping used when constructing offload
/// payloads (§4.6's `on_offload_start_or_update`). Lower numbers are higher
/// priority; unrecognized types fall back to [`DEFAULT_OFFLOAD_PRIORITY`].
#[derive(Clone, Debug, Default)]
pub struct ServicePriorityList {
    priorities: HashMap<String, u32>,
}

impl ServicePriorityList {
    pub fn new() -> ServicePriorityList {
        ServicePriorityList {
            priorities: HashMap::new(),
        }
    }

    /// Registers `service_type` (e.g. `_airplay._tcp`) at `priority`.
    pub fn set(&mut self, service_type: impl Into<String>, priority: u32) {
        self.priorities.insert(service_type.into(), priority);
    }

    pub fn priority_for(&self, service_type: &str) -> u32 {
        self.priorities
            .get(service_type)
            .copied()
            .unwrap_or(DEFAULT_OFFLOAD_PRIORITY)
    }
}

/// Default TTLs per RFC 6762 §10: 4500s for PTR/TXT, 120s for SRV/A/AAAA/NSEC.
pub const DEFAULT_PTR_TXT_TTL: Duration = Duration::from_secs(4500);
pub const DEFAULT_HOST_TTL: Duration = Duration::from_secs(120);

/// Delay before sending the (single) exit announcement, to allow several
/// near-simultaneous `remove_service` calls to coalesce into one packet.
pub const EXIT_ANNOUNCEMENT_DELAY: Duration = Duration::from_millis(500);

/// Window, from the first packet of a fragmented (TC=1) query, during which
/// known-answer accumulation continues before the responder finalizes and
/// sends its reply.
pub const KNOWN_ANSWER_ACCUMULATION_WINDOW: Duration = Duration::from_millis(400);

/// Number of rename attempts a service may go through while probing before
/// registration is abandoned with `MaxRenameAttempts`.
pub const MAX_RENAME_ATTEMPTS: u32 = 15;

/// RFC 6762 §8.2: on losing a probe tie-break, wait this long before
/// restarting probing under the new name, so the defeated side doesn't
/// immediately re-collide with the same peer.
pub const PROBE_CONFLICT_BACKOFF_MS: u64 = 1_000;

/// Process-wide options for one [`crate::multi_advertiser::MultiInterfaceAdvertiser`].
#[derive(Clone, Debug)]
pub struct AdvertiserConfig {
    /// Emit offload packet payloads to the user callback.
    pub enable_offload: bool,

    /// Apply known-answer suppression (§4.2 rule 4) and its multi-packet
    /// accumulation window.
    pub enable_known_answer_suppression: bool,

    /// Enforce the 128-label decode cap. Left configurable only because new
    /// implementations are expected to always turn it on; existing
    /// deployments that haven't yet audited their peers can opt out.
    pub enable_label_count_limit: bool,

    /// Maximum encoded packet length before the sender must split and set
    /// TC on all but the last fragment.
    pub max_packet_len: usize,

    pub service_priority_list: ServicePriorityList,
}

impl AdvertiserConfig {
    /// The label cap to pass into [`crate::message::Message::from_slice_with_label_limit`]:
    /// [`crate::io::MAX_LABELS`] when [`Self::enable_label_count_limit`] is
    /// set, or `usize::MAX` (no cap) when it's turned off.
    pub fn max_label_count(&self) -> usize {
        if self.enable_label_count_limit {
            crate::io::MAX_LABELS
        } else {
            usize::MAX
        }
    }
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        AdvertiserConfig {
            enable_offload: false,
            enable_known_answer_suppression: true,
            enable_label_count_limit: true,
            max_packet_len: crate::message::DEFAULT_MAX_PACKET_LEN,
            service_priority_list: ServicePriorityList::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_service_type_gets_default_priority() {
        let list = ServicePriorityList::new();
        assert_eq!(list.priority_for("_unknown._tcp"), DEFAULT_OFFLOAD_PRIORITY);
    }

    #[test]
    fn configured_service_type_overrides_default() {
        let mut list = ServicePriorityList::new();
        list.set("_airplay._tcp", 10);
        assert_eq!(list.priority_for("_airplay._tcp"), 10);
        assert_eq!(list.priority_for("_http._tcp"), DEFAULT_OFFLOAD_PRIORITY);
    }
}
