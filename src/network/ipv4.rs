//! IPv4 protocol implementation
//!
//! This module provides IPv4 header parsing and serialization, and the
//! transmit/receive engine of the host:
//!
//! - outbound datagrams get an identifier and are fragmented to the MTU,
//!   each fragment is resolved and sent through ARP
//! - inbound datagrams are validated, trimmed and stripped before dispatch
//!
//! Received fragments are not reassembled; each one is delivered on its own.

use std::net::Ipv4Addr;
use std::time::Instant;

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::buf::PacketBuf;
use crate::config::StackConfig;
use crate::error::{IpDrop, Result, StackError};
use crate::iface::ethernet::Link;
use crate::network::arp::{Arp, Resolution};
use crate::network::checksum16;

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
/// Largest payload a single datagram can carry.
pub const IPV4_MAX_PAYLOAD: usize = u16::MAX as usize - IPV4_HEADER_LEN;

/// IPv4 packet header structure
///
/// Represents the standard IPv4 header as defined in RFC 791. Options are
/// neither generated nor interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16, // Flags and Fragment Offset
    pub ttl: u8,                // Time to Live
    pub protocol: u8,           // Next Protocol
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse IPv4 header from byte slice
    ///
    /// Fails if the data is too short or if the version field is not 4.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, IpDrop> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(IpDrop::Truncated(data.len()));
        }

        let version = (data[0] & 0xF0) >> 4;
        if version != IPV4_VERSION {
            return Err(IpDrop::Version(version));
        }

        Ok(Ipv4Header {
            version,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst_addr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// Serializes the 20-byte header into the front of `out`.
    pub fn write_to(&self, out: &mut [u8]) {
        out[0] = (self.version << 4) | self.ihl;
        out[1] = self.tos;
        BigEndian::write_u16(&mut out[2..4], self.total_len);
        BigEndian::write_u16(&mut out[4..6], self.id);
        BigEndian::write_u16(&mut out[6..8], self.flags_frag_offset);
        out[8] = self.ttl;
        out[9] = self.protocol;
        BigEndian::write_u16(&mut out[10..12], self.checksum);
        out[12..16].copy_from_slice(&self.src_addr.octets());
        out[16..20].copy_from_slice(&self.dst_addr.octets());
    }

    /// Convert IPv4 header to bytes
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        self.write_to(&mut bytes);
        bytes
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Fragment offset in 8-byte units.
    pub fn fragment_offset(&self) -> u16 {
        self.flags_frag_offset & flags::FRAGMENT_OFFSET_MASK
    }

    pub fn more_fragments(&self) -> bool {
        self.flags_frag_offset & flags::MORE_FRAGMENTS != 0
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const UDP: u8 = 17;
}

/// IPv4 flags constants
pub mod flags {
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}

/// A validated inbound datagram with its header stripped.
#[derive(Debug)]
pub struct Datagram {
    pub header: Ipv4Header,
    /// Bytes stripped from the front of `payload`; `add_header` with this
    /// length re-attaches the original header.
    pub header_len: usize,
    pub payload: PacketBuf,
}

/// IPv4 transmit/receive engine.
#[derive(Debug)]
pub struct Ip {
    local_ip: Ipv4Addr,
    mtu: usize,
    ttl: u8,
    next_id: u16,
}

impl Ip {
    pub fn new(config: &StackConfig) -> Self {
        Ip {
            local_ip: config.local_ip,
            mtu: config.mtu,
            ttl: config.ttl,
            next_id: 0,
        }
    }

    /// Largest payload carried by one fragment, a multiple of 8.
    pub fn max_fragment_payload(&self) -> usize {
        self.mtu.saturating_sub(IPV4_HEADER_LEN) & !7
    }

    /// Sends `buf` to `dst_ip` as one datagram, fragmenting it when it does
    /// not fit the MTU. All fragments share one identifier.
    pub fn send<L: Link>(
        &mut self,
        arp: &mut Arp,
        link: &mut L,
        buf: PacketBuf,
        dst_ip: Ipv4Addr,
        protocol: u8,
        now: Instant,
    ) -> Result<()> {
        if buf.len() > IPV4_MAX_PAYLOAD {
            return Err(StackError::DatagramTooLarge(buf.len()));
        }

        let max_payload = self.max_fragment_payload();
        if max_payload == 0 {
            return Err(StackError::DatagramTooLarge(buf.len()));
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if buf.len() <= max_payload {
            self.emit_fragment(arp, link, buf, dst_ip, protocol, id, 0, false, now)?;
            return Ok(());
        }

        let total = buf.len();
        let mut sent = 0;
        for chunk in buf.data().chunks(max_payload) {
            let fragment = PacketBuf::from_slice(chunk)?;
            let more = sent + chunk.len() < total;
            let offset = (sent / 8) as u16;
            self.emit_fragment(arp, link, fragment, dst_ip, protocol, id, offset, more, now)?;
            sent += chunk.len();
        }
        Ok(())
    }

    /// Prepends the IPv4 header and hands the fragment to ARP.
    ///
    /// `offset` is in 8-byte units.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_fragment<L: Link>(
        &self,
        arp: &mut Arp,
        link: &mut L,
        mut buf: PacketBuf,
        dst_ip: Ipv4Addr,
        protocol: u8,
        id: u16,
        offset: u16,
        more_fragments: bool,
        now: Instant,
    ) -> Result<Resolution> {
        buf.add_header(IPV4_HEADER_LEN)?;

        let mut flags_frag_offset = offset & flags::FRAGMENT_OFFSET_MASK;
        if more_fragments {
            flags_frag_offset |= flags::MORE_FRAGMENTS;
        }
        let mut header = Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: buf.len() as u16,
            id,
            flags_frag_offset,
            ttl: self.ttl,
            protocol,
            checksum: 0,
            src_addr: self.local_ip,
            dst_addr: dst_ip,
        };
        header.write_to(buf.data_mut());
        header.checksum = checksum16(&buf.data()[..IPV4_HEADER_LEN]);
        BigEndian::write_u16(&mut buf.data_mut()[10..12], header.checksum);

        trace!(%dst_ip, protocol, id, offset, more_fragments, len = buf.len(), "ipv4 out");
        arp.resolve_and_send(link, buf, dst_ip, now)
    }

    /// Validates a received datagram and strips its header.
    ///
    /// The header bytes are left exactly as received, checksum field
    /// included, so they can be re-attached for an ICMP error.
    pub fn receive(&self, mut buf: PacketBuf) -> Result<Datagram> {
        let len = buf.len();
        let header = Ipv4Header::from_bytes(buf.data())?;

        let header_len = header.header_len();
        if header_len < IPV4_HEADER_LEN || header_len > len {
            return Err(IpDrop::HeaderLength(header_len).into());
        }

        let total_len = header.total_len as usize;
        if total_len > len || total_len < header_len {
            return Err(IpDrop::TotalLength {
                declared: total_len,
                actual: len,
            }
            .into());
        }

        let received = header.checksum;
        let computed = {
            let data = buf.data_mut();
            BigEndian::write_u16(&mut data[10..12], 0);
            let computed = checksum16(&data[..header_len]);
            BigEndian::write_u16(&mut data[10..12], received);
            computed
        };
        if computed != received {
            return Err(IpDrop::Checksum { received, computed }.into());
        }

        if header.dst_addr != self.local_ip {
            return Err(IpDrop::NotForUs(header.dst_addr).into());
        }

        if len > total_len {
            buf.remove_padding(len - total_len)?;
        }
        buf.remove_header(header_len)?;

        trace!(src = %header.src_addr, protocol = header.protocol, len = buf.len(), "ipv4 in");
        Ok(Datagram {
            header,
            header_len,
            payload: buf,
        })
    }
}
