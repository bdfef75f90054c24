//! mdns-core is a multicast DNS (mDNS, [RFC 6762]) and DNS-SD ([RFC 6763])
//! service advertiser and discovery engine, built as a cooperative,
//! single-threaded state machine rather than a client wrapping an async
//! runtime: every module here is pure logic over an explicit [`Clock`] and
//! an explicit [`Socket`]/[`InterfaceProvider`] pair, so it can be driven
//! from whatever event loop (or test harness) the embedder already owns.
//!
//! # Usage
//!
//! ```no_run
//! use mdns_core::clock::SystemClock;
//! use mdns_core::config::AdvertiserConfig;
//! use mdns_core::multi_advertiser::{AdvertiserCallbacks, MultiInterfaceAdvertiser};
//! use mdns_core::service::{ServiceRegistration, TxtEntry};
//! use std::collections::BTreeSet;
//!
//! # use mdns_core::socket::{InterfaceProvider, InterfaceEvent, Socket, AddressFamily};
//! # struct NullSocket;
//! # impl Socket for NullSocket {
//! #     fn send_to(&mut self, _: &[u8], _: std::net::SocketAddr) -> std::io::Result<()> { Ok(()) }
//! #     fn family(&self) -> AddressFamily { AddressFamily::V4 }
//! #     fn interface_id(&self) -> u64 { 0 }
//! # }
//! # struct NullProvider;
//! # impl InterfaceProvider for NullProvider {
//! #     type Socket = NullSocket;
//! #     fn request(&mut self, _: mdns_core::service::RequestedNetwork) {}
//! #     fn unrequest(&mut self, _: mdns_core::service::RequestedNetwork) {}
//! #     fn poll_events(&mut self) -> Vec<InterfaceEvent<Self::Socket>> { Vec::new() }
//! # }
//!
//! struct Logger;
//! impl AdvertiserCallbacks for Logger {
//!     fn on_register_service_succeeded(&mut self, service_id: u64) {
//!         println!("service {} is now live", service_id);
//!     }
//! }
//!
//! // `NullProvider`/`NullSocket` above stand in for whatever binds real
//! // multicast UDP sockets in an embedder (see the `mdns-cli` demo binary).
//! let mut advertiser = MultiInterfaceAdvertiser::new(
//!     NullProvider,
//!     AdvertiserConfig::default(),
//!     SystemClock,
//!     "MyDevice",
//! );
//!
//! advertiser.register_service(ServiceRegistration {
//!     service_id: 1,
//!     instance_name: "Office Printer".to_string(),
//!     service_type: "_http._tcp".to_string(),
//!     subtypes: BTreeSet::new(),
//!     port: 8080,
//!     host_addresses: Vec::new(),
//!     txt_entries: vec![TxtEntry::new("path", Some(b"/".to_vec()))],
//!     requested_network: None,
//!     ttl_override: None,
//! }).unwrap();
//!
//! advertiser.poll(std::time::Instant::now(), &mut Logger);
//! ```
//!
//! # Module map
//!
//! * [`errors`] -- the public `AdvertiserError` type, and the `bail!` macro
//!   wire-decode failures use internally.
//! * [`types`], [`record`], [`message`] -- the wire codec: enumerations,
//!   resource records, and whole messages, with name compression and
//!   pointer-loop-safe decoding.
//! * [`labels`] -- RFC 6763 §6.6 instance-name rename/truncation rules.
//! * [`service`] -- what a caller registers ([`service::ServiceRegistration`])
//!   and its lifecycle status.
//! * [`repository`] -- the per-interface record store and query responder.
//! * [`clock`], [`handler`] -- the deterministic-time and cooperative-task
//!   primitives every state machine in this crate is built on.
//! * [`repeater`], [`prober`], [`announcer`] -- the repeated-send machinery
//!   behind RFC 6762 §8 probing and §8.3 announcing.
//! * [`reply_sender`] -- known-answer suppression and TC-bit packet
//!   splitting for query responses.
//! * [`socket`] -- the `Socket`/`InterfaceProvider` traits an embedder
//!   implements to supply real multicast I/O.
//! * [`interface_advertiser`] -- one interface's worth of probing,
//!   announcing, and responding, wired together.
//! * [`multi_advertiser`] -- the public entry point: fans registrations out
//!   across every matching interface and exposes [`multi_advertiser::AdvertiserCallbacks`].
//! * [`discovery`] -- the complementary browse path: turns inbound
//!   responses into [`discovery::DiscoveredService`] snapshots.
//! * [`config`] -- explicit, per-instance configuration.
//! * [`util`] -- small standalone helpers (hex dump, reverse-DNS names).
//!
//! [RFC 6762]: https://datatracker.ietf.org/doc/html/rfc6762
//! [RFC 6763]: https://datatracker.ietf.org/doc/html/rfc6763

#[macro_use]
extern crate num_derive;

pub mod announcer;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod handler;
mod io;
pub mod labels;
pub mod message;
pub mod multi_advertiser;
pub mod prober;
pub mod record;
pub mod repeater;
pub mod reply_sender;
pub mod repository;
pub mod interface_advertiser;
pub mod service;
pub mod socket;
pub mod types;
pub mod util;

#[doc(inline)]
pub use crate::errors::AdvertiserError;
#[doc(inline)]
pub use crate::message::Message;
#[doc(inline)]
pub use crate::multi_advertiser::{AdvertiserCallbacks, MultiInterfaceAdvertiser, RegistrationOptions};
#[doc(inline)]
pub use crate::service::{ServiceRegistration, TxtEntry};
