//! Error and drop-reason types for the stack.
//!
//! Malformed or unwanted input never reaches the wire as an error: it is
//! discarded. Internally every discard still carries a typed reason so the
//! poll loop can log it and tests can assert on it.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Result type alias for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;

/// Errors surfaced by stack operations.
#[derive(Debug, Error)]
pub enum StackError {
    /// The packet was discarded. Not fatal; the poll loop keeps going.
    #[error("packet dropped: {0}")]
    Dropped(#[from] DropReason),

    /// Packet buffer headroom or capacity violated.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufError),

    /// Device I/O error.
    #[error("device error: {0}")]
    Io(#[from] io::Error),

    /// Payload does not fit in a single IPv4 datagram.
    #[error("datagram payload of {0} bytes exceeds the IPv4 limit")]
    DatagramTooLarge(usize),

    /// A UDP port was opened twice.
    #[error("UDP port {0} is already open")]
    PortInUse(u16),

    /// Operation on a UDP port that is not open.
    #[error("UDP port {0} is not open")]
    PortNotOpen(u16),
}

impl StackError {
    /// Returns the drop reason if this error is a discarded packet.
    #[must_use]
    pub fn drop_reason(&self) -> Option<&DropReason> {
        match self {
            Self::Dropped(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Why an inbound packet was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("ethernet: {0}")]
    Ethernet(#[from] EthernetDrop),
    #[error("arp: {0}")]
    Arp(#[from] ArpDrop),
    #[error("ipv4: {0}")]
    Ip(#[from] IpDrop),
    #[error("icmp: {0}")]
    Icmp(#[from] IcmpDrop),
    #[error("udp: {0}")]
    Udp(#[from] UdpDrop),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EthernetDrop {
    #[error("frame of {0} bytes is shorter than the ethernet header")]
    Truncated(usize),
    #[error("unhandled ethertype {0:#06x}")]
    UnknownEtherType(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArpDrop {
    #[error("packet of {0} bytes is shorter than an ARP packet")]
    Truncated(usize),
    #[error("hardware type {0} is not ethernet")]
    HardwareType(u16),
    #[error("protocol type {0:#06x} is not IPv4")]
    ProtocolType(u16),
    #[error("hardware address length {0}")]
    HardwareLen(u8),
    #[error("protocol address length {0}")]
    ProtocolLen(u8),
    #[error("opcode {0} is neither request nor reply")]
    Opcode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IpDrop {
    #[error("datagram of {0} bytes is shorter than the IPv4 header")]
    Truncated(usize),
    #[error("version {0} is not 4")]
    Version(u8),
    #[error("header length {0} is invalid")]
    HeaderLength(usize),
    #[error("total length {declared} does not fit the {actual} bytes received")]
    TotalLength { declared: usize, actual: usize },
    #[error("header checksum {received:#06x} does not match {computed:#06x}")]
    Checksum { received: u16, computed: u16 },
    #[error("destination {0} is not this host")]
    NotForUs(Ipv4Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IcmpDrop {
    #[error("message of {0} bytes is shorter than the ICMP header")]
    Truncated(usize),
    #[error("unhandled message type {0}")]
    Unhandled(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UdpDrop {
    #[error("datagram of {0} bytes is shorter than the UDP header")]
    Truncated(usize),
    #[error("length field {declared} exceeds the {actual} bytes received")]
    Length { declared: usize, actual: usize },
    #[error("checksum {received:#06x} does not match {computed:#06x}")]
    Checksum { received: u16, computed: u16 },
    #[error("receive queue of port {0} is full")]
    QueueFull(u16),
}

macro_rules! impl_from_drop {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StackError {
                fn from(reason: $ty) -> Self {
                    StackError::Dropped(reason.into())
                }
            }
        )*
    };
}

impl_from_drop!(EthernetDrop, ArpDrop, IpDrop, IcmpDrop, UdpDrop);

/// Packet buffer misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufError {
    #[error("{requested} bytes of headroom requested, {available} available")]
    Headroom { requested: usize, available: usize },
    #[error("growing to {requested} bytes exceeds the {max} byte capacity")]
    Capacity { requested: usize, max: usize },
    #[error("cannot remove {requested} bytes from a {len} byte buffer")]
    Underflow { requested: usize, len: usize },
}
