//! External collaborators (C9): multicast send/receive is explicitly out of
//! scope for this crate (§1), so it is modeled only at its interface. A real
//! deployment supplies a concrete `Socket`/`InterfaceProvider` bound to the
//! OS; tests supply an in-memory fake.

use std::net::SocketAddr;

/// Destination address family, used to pick the right multicast group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// IPv4 and IPv6 mDNS multicast destinations (§6.1).
pub const MULTICAST_V4: &str = "224.0.0.251:5353";
pub const MULTICAST_V6: &str = "[ff02::fb]:5353";

/// One raw inbound packet, as delivered by a [`Socket`] to whatever
/// registered as its handler.
#[derive(Clone, Debug)]
pub struct InboundPacket {
    pub bytes: Vec<u8>,
    pub source: SocketAddr,
}

/// Abstracts a single interface's bound multicast UDP socket. Send/receive
/// and multicast group membership are managed entirely outside this crate;
/// this trait is the seam the interface advertiser (C7) and reply sender
/// (C6) hold onto.
pub trait Socket {
    /// Sends `bytes` to `destination` on this socket. Errors are the
    /// caller's concern to log; this crate never retries a failed send.
    fn send_to(&mut self, bytes: &[u8], destination: SocketAddr) -> std::io::Result<()>;

    /// The address family this socket is bound on, used to pick the
    /// correct multicast destination for non-unicast replies.
    fn family(&self) -> AddressFamily;

    /// A stable identifier for the network interface this socket is bound
    /// to (e.g. an OS interface index), used as the socket-lifecycle key
    /// in [`InterfaceProvider`] events.
    fn interface_id(&self) -> u64;
}

/// Per-registration network selector events driving C7 instance lifecycle
/// (§4.6): a registration for "all networks" subscribes to every interface
/// that currently exists and every one that subsequently appears; a
/// registration for a specific network subscribes to just that one.
pub enum InterfaceEvent<S: Socket> {
    SocketCreated(S),
    AddressesChanged(u64),
    InterfaceDestroyed(u64),
}

/// Supplies interface lifecycle events to the multi-interface advertiser.
/// Binding sockets, joining multicast groups, and watching for OS
/// connectivity changes all happen behind this trait -- this crate only
/// reacts to the events it emits.
pub trait InterfaceProvider {
    type Socket: Socket;

    /// Requests a socket (or future socket) for `network`. The provider is
    /// expected to deliver `InterfaceEvent::SocketCreated` for every
    /// currently-available interface matching `network`, and further events
    /// as connectivity changes, until [`InterfaceProvider::unrequest`] is
    /// called for the same key.
    fn request(&mut self, network: crate::service::RequestedNetwork);

    /// Releases a previously requested network selector once no C7 still
    /// needs it (after it reports `on_destroyed` for its last service).
    fn unrequest(&mut self, network: crate::service::RequestedNetwork);

    /// Drains any interface events produced since the last call. A real
    /// implementation pushes these from OS callbacks into a queue; this
    /// method is the pull side the cooperative handler drives.
    fn poll_events(&mut self) -> Vec<InterfaceEvent<Self::Socket>>;
}
