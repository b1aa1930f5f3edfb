//! A small IPv4 host stack in Rust
//!
//! This library provides a single-interface host stack including:
//! - Ethernet framing over a TAP or in-memory device
//! - ARP resolution with a pending-datagram queue
//! - IPv4 send with fragmentation and validated receive
//! - ICMP echo reply and destination-unreachable errors
//! - UDP sockets

pub mod buf;
pub mod config;
pub mod error;
pub mod iface;
pub mod network;
pub mod transport;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use buf::PacketBuf;
pub use config::StackConfig;
pub use error::{DropReason, Result, StackError};
pub use iface::{MacAddr, MemoryDevice, NetDevice, NetStack, TapDevice};
pub use network::ipv4::Ipv4Header;
pub use network::icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use transport::{UdpDatagram, UdpHeader};
