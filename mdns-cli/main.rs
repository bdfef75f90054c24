//! A small dig-style demo binary: advertises one service, or browses for a
//! service type, from the command line. This is the concrete `Socket` /
//! `InterfaceProvider` pair `mdns-core` itself deliberately doesn't provide
//! (C9, real multicast I/O is out of scope for the library) -- everything
//! below is just enough plumbing to drive the library end to end on a
//! single local interface.

use mdns_core::clock::SystemClock;
use mdns_core::config::AdvertiserConfig;
use mdns_core::discovery::ServiceBrowser;
use mdns_core::multi_advertiser::{AdvertiserCallbacks, MultiInterfaceAdvertiser};
use mdns_core::service::{RequestedNetwork, ServiceRegistration, TxtEntry};
use mdns_core::socket::{AddressFamily, InterfaceEvent, InterfaceProvider, Socket, MULTICAST_V4};
use mdns_core::{AdvertiserError, Message};
use socket2::{Domain, Protocol, SockAddr, Socket as Socket2, Type};
use std::collections::BTreeSet;
use std::env;
use std::error::Error;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::process;
use std::time::{Duration, Instant};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

const MDNS_PORT: u16 = 5353;

/// One IPv4 UDP socket bound to the mDNS multicast group, used both as the
/// advertiser's send path and (via a cloned fd) as the recv path `main`'s
/// poll loop reads from.
struct MulticastSocket {
    udp: UdpSocket,
}

impl MulticastSocket {
    fn bind() -> io::Result<MulticastSocket> {
        let socket = Socket2::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT)))?;
        socket.join_multicast_v4(&Ipv4Addr::new(224, 0, 0, 251), &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;
        Ok(MulticastSocket { udp: socket.into() })
    }
}

impl Socket for MulticastSocket {
    fn send_to(&mut self, bytes: &[u8], destination: SocketAddr) -> io::Result<()> {
        self.udp.send_to(bytes, destination).map(|_| ())
    }

    fn family(&self) -> AddressFamily {
        AddressFamily::V4
    }

    fn interface_id(&self) -> u64 {
        0
    }
}

/// The simplest possible `InterfaceProvider`: one always-present local
/// socket, handed over the first time it's polled. Real per-NIC discovery
/// and hotplug handling is exactly the part `mdns-core` leaves to the
/// embedder; this demo only ever has one interface.
struct SingleInterfaceProvider {
    pending: Vec<InterfaceEvent<MulticastSocket>>,
}

impl SingleInterfaceProvider {
    fn new(socket: MulticastSocket) -> SingleInterfaceProvider {
        SingleInterfaceProvider {
            pending: vec![InterfaceEvent::SocketCreated(socket)],
        }
    }
}

impl InterfaceProvider for SingleInterfaceProvider {
    type Socket = MulticastSocket;

    fn request(&mut self, _network: RequestedNetwork) {}
    fn unrequest(&mut self, _network: RequestedNetwork) {}

    fn poll_events(&mut self) -> Vec<InterfaceEvent<Self::Socket>> {
        std::mem::take(&mut self.pending)
    }
}

struct LoggingCallbacks;

impl AdvertiserCallbacks for LoggingCallbacks {
    fn on_register_service_succeeded(&mut self, service_id: u64) {
        println!("service {} is now live", service_id);
    }

    fn on_register_service_failed(&mut self, service_id: u64, error: AdvertiserError) {
        eprintln!("service {} failed to register: {}", service_id, error);
    }
}

enum Command {
    Advertise {
        instance_name: String,
        service_type: String,
        port: u16,
        txt: Vec<TxtEntry>,
    },
    Browse {
        service_type: String,
        seconds: u64,
    },
}

fn usage() -> ! {
    eprintln!(
        "usage:\n  \
         mdns-cli advertise <instance-name> <service-type> <port> [key=value ...]\n  \
         mdns-cli browse <service-type> [seconds]"
    );
    process::exit(1);
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Command {
    match args.next().as_deref() {
        Some("advertise") => {
            let instance_name = args.next().unwrap_or_else(|| usage());
            let service_type = args.next().unwrap_or_else(|| usage());
            let port: u16 = args
                .next()
                .unwrap_or_else(|| usage())
                .parse()
                .unwrap_or_else(|_| usage());
            let txt = args
                .map(|kv| match kv.split_once('=') {
                    Some((k, v)) => TxtEntry::new(k, Some(v.as_bytes().to_vec())),
                    None => TxtEntry::new(kv, None),
                })
                .collect();
            Command::Advertise { instance_name, service_type, port, txt }
        }
        Some("browse") => {
            let service_type = args.next().unwrap_or_else(|| usage());
            let seconds = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);
            Command::Browse { service_type, seconds }
        }
        _ => usage(),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    match parse_args(env::args().skip(1)) {
        Command::Advertise { instance_name, service_type, port, txt } => {
            run_advertise(instance_name, service_type, port, txt)
        }
        Command::Browse { service_type, seconds } => run_browse(service_type, seconds),
    }
}

fn run_advertise(
    instance_name: String,
    service_type: String,
    port: u16,
    txt: Vec<TxtEntry>,
) -> Result<()> {
    let socket = MulticastSocket::bind()?;
    let recv_socket = socket.udp.try_clone()?;
    recv_socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut advertiser = MultiInterfaceAdvertiser::new(
        SingleInterfaceProvider::new(socket),
        AdvertiserConfig::default(),
        SystemClock,
        "mdns-cli",
    );

    advertiser.register_service(ServiceRegistration {
        service_id: 1,
        instance_name,
        service_type,
        subtypes: BTreeSet::new(),
        port,
        host_addresses: Vec::new(),
        txt_entries: txt,
        requested_network: None,
        ttl_override: None,
    })?;

    println!("advertising, press Ctrl-C to exit");
    let mut callbacks = LoggingCallbacks;
    let mut buf = [0u8; 9000];
    loop {
        advertiser.poll(Instant::now(), &mut callbacks);

        match recv_socket.recv_from(&mut buf) {
            Ok((len, source)) => advertiser.on_packet(0, &buf[..len], source, &mut callbacks),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn run_browse(service_type: String, seconds: u64) -> Result<()> {
    let mut socket = MulticastSocket::bind()?;
    let recv_socket = socket.udp.try_clone()?;
    recv_socket.set_read_timeout(Some(Duration::from_millis(200)))?;

    let type_fqdn = format!("{}.local.", service_type.trim_end_matches('.'));
    let query = ServiceBrowser::build_browse_query(&type_fqdn);
    let destination: SocketAddr = MULTICAST_V4.parse().expect("MULTICAST_V4 is a valid socket address");
    socket.send_to(&query.to_vec_unbounded(), destination)?;

    let mut browser = ServiceBrowser::new();
    let deadline = Instant::now() + Duration::from_secs(seconds);

    println!("browsing for {} ...", type_fqdn);
    let mut buf = [0u8; 9000];
    while Instant::now() < deadline {
        match recv_socket.recv_from(&mut buf) {
            Ok((len, _source)) => {
                if let Ok(message) = Message::from_slice(&buf[..len]) {
                    browser.ingest(0, &message, Instant::now());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
    }

    for instance in browser.instances(0) {
        println!(
            "{}  host={:?} port={:?} addrs={:?}",
            instance.instance_name, instance.hostname, instance.port, instance.addresses
        );
    }

    Ok(())
}
