//! Shared helpers for unit tests.

use crate::buf::PacketBuf;
use crate::error::Result;
use crate::iface::ethernet::{EtherType, Link, MacAddr};

/// Link that records what would have been framed.
#[derive(Debug, Default)]
pub struct RecordingLink {
    pub sent: Vec<(Vec<u8>, MacAddr, EtherType)>,
}

impl RecordingLink {
    /// IPv4 payloads sent so far with their destination MAC.
    pub fn ipv4_frames(&self) -> Vec<(Vec<u8>, MacAddr)> {
        self.sent
            .iter()
            .filter(|(_, _, ethertype)| *ethertype == EtherType::Ipv4)
            .map(|(data, mac, _)| (data.clone(), *mac))
            .collect()
    }
}

impl Link for RecordingLink {
    fn send(&mut self, buf: PacketBuf, dst: MacAddr, ethertype: EtherType) -> Result<()> {
        self.sent.push((buf.data().to_vec(), dst, ethertype));
        Ok(())
    }
}
