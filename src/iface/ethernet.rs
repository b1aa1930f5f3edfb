//! Ethernet framing.
//!
//! Adds and strips the 14-byte link header and defines the [`Link`] seam the
//! ARP and IP engines transmit through.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::buf::PacketBuf;
use crate::error::{EthernetDrop, Result};
use crate::iface::device::NetDevice;

/// Ethernet header size in bytes.
pub const ETH_HEADER_LEN: usize = 14;
/// Payloads shorter than this are zero-padded on transmit.
pub const ETHERNET_MIN_TRANSPORT_UNIT: usize = 46;

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Reads the address stored at `data[at..at + 6]`.
    ///
    /// Callers check the packet length first; a short slice panics.
    pub fn read_at(data: &[u8], at: usize) -> Self {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&data[at..at + 6]);
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl std::str::FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| format!("invalid MAC address: {s}"))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| format!("invalid MAC address: {s}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("invalid MAC address: {s}"));
        }
        Ok(MacAddr(octets))
    }
}

/// EtherType values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    Ipv4,
    Arp,
    Unknown(u16),
}

impl EtherType {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x0800 => Self::Ipv4,
            0x0806 => Self::Arp,
            other => Self::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Arp => 0x0806,
            Self::Unknown(v) => v,
        }
    }
}

/// Transmit side of the link layer.
pub trait Link {
    /// Frames `buf` for `dst` and hands it to the device.
    fn send(&mut self, buf: PacketBuf, dst: MacAddr, ethertype: EtherType) -> Result<()>;
}

/// Parsed inbound frame.
#[derive(Debug)]
pub struct Frame {
    pub src_mac: MacAddr,
    pub ethertype: EtherType,
    pub payload: PacketBuf,
}

impl Frame {
    /// Strips the Ethernet header from a received frame.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < ETH_HEADER_LEN {
            return Err(EthernetDrop::Truncated(frame.len()).into());
        }
        let mut payload = PacketBuf::from_slice(frame)?;
        payload.remove_header(ETH_HEADER_LEN)?;

        Ok(Frame {
            src_mac: MacAddr::read_at(frame, 6),
            ethertype: EtherType::from_raw(BigEndian::read_u16(&frame[12..14])),
            payload,
        })
    }
}

/// Ethernet layer bound to a device.
pub struct Ethernet<D> {
    device: D,
    mac: MacAddr,
}

impl<D: NetDevice> Ethernet<D> {
    pub fn new(device: D, mac: MacAddr) -> Self {
        Ethernet { device, mac }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Reads one frame into `frame`. Returns 0 when nothing is pending.
    pub fn recv(&mut self, frame: &mut [u8]) -> Result<usize> {
        Ok(self.device.recv(frame)?)
    }
}

impl<D: NetDevice> Link for Ethernet<D> {
    fn send(&mut self, mut buf: PacketBuf, dst: MacAddr, ethertype: EtherType) -> Result<()> {
        if buf.len() < ETHERNET_MIN_TRANSPORT_UNIT {
            buf.add_padding(ETHERNET_MIN_TRANSPORT_UNIT - buf.len())?;
        }

        buf.add_header(ETH_HEADER_LEN)?;
        let header = &mut buf.data_mut()[..ETH_HEADER_LEN];
        header[0..6].copy_from_slice(&dst.0);
        header[6..12].copy_from_slice(&self.mac.0);
        BigEndian::write_u16(&mut header[12..14], ethertype.to_raw());

        trace!(%dst, ?ethertype, len = buf.len(), "ethernet out");
        self.device.send(buf.data())?;
        Ok(())
    }
}
