//! ARP (Address Resolution Protocol) implementation
//!
//! Maps IPv4 addresses to MAC addresses for the local subnet (RFC 826).
//!
//! Two independent tables are kept:
//! - the address table, learned from every valid ARP packet received
//! - the pending table, holding at most one datagram per unresolved address
//!
//! Both expire lazily: an expired entry is removed when it is looked up and
//! is never returned. [`Arp::purge_expired`] sweeps the rest.

use std::collections::HashMap;
use std::fmt::Write;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace};

use crate::buf::PacketBuf;
use crate::config::StackConfig;
use crate::error::{ArpDrop, Result};
use crate::iface::ethernet::{EtherType, Link, MacAddr};

/// ARP packet length for Ethernet/IPv4.
pub const ARP_PACKET_LEN: usize = 28;
pub const ARP_HW_ETHER: u16 = 1;
pub const ARP_PROTO_IPV4: u16 = 0x0800;
pub const ARP_HW_LEN: u8 = 6;
pub const ARP_PROTO_LEN: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parses and validates a received packet.
    ///
    /// Checks run in wire order and the first failure is reported.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, ArpDrop> {
        if data.len() < ARP_PACKET_LEN {
            return Err(ArpDrop::Truncated(data.len()));
        }

        let hw_type = BigEndian::read_u16(&data[0..2]);
        if hw_type != ARP_HW_ETHER {
            return Err(ArpDrop::HardwareType(hw_type));
        }
        let proto_type = BigEndian::read_u16(&data[2..4]);
        if proto_type != ARP_PROTO_IPV4 {
            return Err(ArpDrop::ProtocolType(proto_type));
        }
        if data[4] != ARP_HW_LEN {
            return Err(ArpDrop::HardwareLen(data[4]));
        }
        if data[5] != ARP_PROTO_LEN {
            return Err(ArpDrop::ProtocolLen(data[5]));
        }
        let opcode = BigEndian::read_u16(&data[6..8]);
        let op = ArpOp::from_raw(opcode).ok_or(ArpDrop::Opcode(opcode))?;

        Ok(ArpPacket {
            op,
            sender_mac: MacAddr::read_at(data, 8),
            sender_ip: ipv4_at(data, 14),
            target_mac: MacAddr::read_at(data, 18),
            target_ip: ipv4_at(data, 24),
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut bytes = [0u8; ARP_PACKET_LEN];
        BigEndian::write_u16(&mut bytes[0..2], ARP_HW_ETHER);
        BigEndian::write_u16(&mut bytes[2..4], ARP_PROTO_IPV4);
        bytes[4] = ARP_HW_LEN;
        bytes[5] = ARP_PROTO_LEN;
        BigEndian::write_u16(&mut bytes[6..8], self.op as u16);
        bytes[8..14].copy_from_slice(&self.sender_mac.0);
        bytes[14..18].copy_from_slice(&self.sender_ip.octets());
        bytes[18..24].copy_from_slice(&self.target_mac.0);
        bytes[24..28].copy_from_slice(&self.target_ip.octets());
        bytes
    }
}

fn ipv4_at(data: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(data[at], data[at + 1], data[at + 2], data[at + 3])
}

#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    mac: MacAddr,
    updated: Instant,
}

/// IP to MAC cache with a fixed entry lifetime.
#[derive(Debug)]
pub struct ArpTable {
    entries: HashMap<Ipv4Addr, ArpEntry>,
    timeout: Duration,
}

impl ArpTable {
    pub fn new(timeout: Duration) -> Self {
        ArpTable {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Inserts or refreshes a mapping.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) {
        self.entries.insert(ip, ArpEntry { mac, updated: now });
    }

    /// Returns the MAC for `ip` unless the entry is missing or expired.
    /// An expired entry is removed.
    pub fn lookup(&mut self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        let entry = *self.entries.get(&ip)?;
        if self.is_expired(&entry, now) {
            self.entries.remove(&ip);
            return None;
        }
        Some(entry.mac)
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let timeout = self.timeout;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.updated) <= timeout);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text dump of the table, one `ip | mac | last update` line per entry.
    pub fn render(&self, now: Instant) -> String {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(ip, _)| **ip);

        let mut out = String::from("===ARP TABLE BEGIN===\n");
        for (ip, entry) in entries {
            let age = now.saturating_duration_since(entry.updated).as_secs();
            let _ = writeln!(out, "{} | {} | last update {}s ago", ip, entry.mac, age);
        }
        out.push_str("===ARP TABLE  END ===\n");
        out
    }

    fn is_expired(&self, entry: &ArpEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.updated) > self.timeout
    }
}

#[derive(Debug)]
struct PendingEntry {
    buf: PacketBuf,
    queued: Instant,
}

/// What happened to an outbound datagram handed to ARP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Address was cached; the datagram went to the link.
    Sent(MacAddr),
    /// Datagram is held while a request is outstanding.
    Queued,
    /// A datagram for this address is already held; this one was dropped.
    Discarded,
}

/// ARP resolution engine.
#[derive(Debug)]
pub struct Arp {
    local_ip: Ipv4Addr,
    local_mac: MacAddr,
    table: ArpTable,
    pending: HashMap<Ipv4Addr, PendingEntry>,
    min_interval: Duration,
}

impl Arp {
    pub fn new(config: &StackConfig) -> Self {
        Arp {
            local_ip: config.local_ip,
            local_mac: config.local_mac,
            table: ArpTable::new(config.arp_timeout),
            pending: HashMap::new(),
            min_interval: config.arp_min_interval,
        }
    }

    pub fn table(&self) -> &ArpTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ArpTable {
        &mut self.table
    }

    /// True while a datagram for `ip` is held and not expired.
    pub fn is_pending(&self, ip: Ipv4Addr, now: Instant) -> bool {
        self.pending
            .get(&ip)
            .map_or(false, |p| !self.pending_expired(p, now))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Gratuitous request for our own address, sent at start-up.
    pub fn probe<L: Link>(&self, link: &mut L) -> Result<()> {
        self.send_request(link, self.local_ip)
    }

    /// Broadcasts a request for `target_ip`.
    pub fn send_request<L: Link>(&self, link: &mut L, target_ip: Ipv4Addr) -> Result<()> {
        let packet = ArpPacket {
            op: ArpOp::Request,
            sender_mac: self.local_mac,
            sender_ip: self.local_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        };
        trace!(%target_ip, "arp request");
        link.send(
            PacketBuf::from_slice(&packet.to_bytes())?,
            MacAddr::BROADCAST,
            EtherType::Arp,
        )
    }

    /// Unicasts a reply announcing our address to the requester.
    pub fn send_reply<L: Link>(
        &self,
        link: &mut L,
        target_ip: Ipv4Addr,
        target_mac: MacAddr,
    ) -> Result<()> {
        let packet = ArpPacket {
            op: ArpOp::Reply,
            sender_mac: self.local_mac,
            sender_ip: self.local_ip,
            target_mac,
            target_ip,
        };
        trace!(%target_ip, %target_mac, "arp reply");
        link.send(
            PacketBuf::from_slice(&packet.to_bytes())?,
            target_mac,
            EtherType::Arp,
        )
    }

    /// Sends an IP datagram to `dst_ip`, resolving its MAC first.
    ///
    /// On a miss the datagram is held until a reply arrives. Only one
    /// datagram is held per address: while one is waiting, later ones are
    /// dropped and no further request is sent.
    pub fn resolve_and_send<L: Link>(
        &mut self,
        link: &mut L,
        buf: PacketBuf,
        dst_ip: Ipv4Addr,
        now: Instant,
    ) -> Result<Resolution> {
        if let Some(mac) = self.table.lookup(dst_ip, now) {
            link.send(buf, mac, EtherType::Ipv4)?;
            return Ok(Resolution::Sent(mac));
        }

        if self.take_expired_pending(dst_ip, now) {
            debug!(%dst_ip, "arp: pending datagram expired unresolved");
        }
        if self.pending.contains_key(&dst_ip) {
            debug!(%dst_ip, "arp: resolution in progress, datagram discarded");
            return Ok(Resolution::Discarded);
        }

        self.pending
            .insert(dst_ip, PendingEntry { buf, queued: now });
        self.send_request(link, dst_ip)?;
        Ok(Resolution::Queued)
    }

    /// Processes a received ARP packet.
    ///
    /// The sender mapping is learned from every valid packet, requests and
    /// unsolicited announcements included.
    pub fn handle_inbound<L: Link>(
        &mut self,
        link: &mut L,
        data: &[u8],
        src_mac: MacAddr,
        now: Instant,
    ) -> Result<()> {
        let packet = ArpPacket::parse(data)?;
        trace!(op = ?packet.op, sender = %packet.sender_ip, %src_mac, "arp in");

        self.table.insert(packet.sender_ip, packet.sender_mac, now);

        if let Some(pending) = self.pending.remove(&packet.sender_ip) {
            if !self.pending_expired(&pending, now) {
                return link.send(pending.buf, packet.sender_mac, EtherType::Ipv4);
            }
            debug!(ip = %packet.sender_ip, "arp: pending datagram expired unresolved");
        }

        if packet.op == ArpOp::Request && packet.target_ip == self.local_ip {
            self.send_reply(link, packet.sender_ip, packet.sender_mac)?;
        }
        Ok(())
    }

    /// Sweeps expired cache and pending entries.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let min_interval = self.min_interval;
        self.pending
            .retain(|_, p| now.saturating_duration_since(p.queued) <= min_interval);
        let purged = before - self.pending.len() + self.table.purge_expired(now);
        if purged > 0 {
            trace!(purged, "arp: expired entries removed");
        }
        purged
    }

    fn pending_expired(&self, entry: &PendingEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.queued) > self.min_interval
    }

    fn take_expired_pending(&mut self, ip: Ipv4Addr, now: Instant) -> bool {
        let expired = self
            .pending
            .get(&ip)
            .map_or(false, |p| self.pending_expired(p, now));
        if expired {
            self.pending.remove(&ip);
        }
        expired
    }
}
