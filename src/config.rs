//! Stack configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::iface::ethernet::MacAddr;

/// Ethernet payload limit.
pub const DEFAULT_MTU: usize = 1500;
pub const DEFAULT_TTL: u8 = 64;
/// Lifetime of a learned ARP mapping.
pub const ARP_TIMEOUT_SEC: u64 = 60 * 5;
/// Lifetime of a pending ARP entry, and so the minimum gap between two
/// requests for the same address.
pub const ARP_MIN_INTERVAL: u64 = 1;
pub const UDP_RX_QUEUE_LEN: usize = 64;

/// Parameters of a single-interface host stack.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub local_ip: Ipv4Addr,
    pub local_mac: MacAddr,
    pub mtu: usize,
    pub ttl: u8,
    pub arp_timeout: Duration,
    pub arp_min_interval: Duration,
    pub udp_rx_queue_len: usize,
}

impl StackConfig {
    pub fn new(local_ip: Ipv4Addr, local_mac: MacAddr) -> Self {
        StackConfig {
            local_ip,
            local_mac,
            ..Self::default()
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_arp_timeout(mut self, timeout: Duration) -> Self {
        self.arp_timeout = timeout;
        self
    }

    pub fn with_arp_min_interval(mut self, interval: Duration) -> Self {
        self.arp_min_interval = interval;
        self
    }

    pub fn with_udp_rx_queue_len(mut self, len: usize) -> Self {
        self.udp_rx_queue_len = len;
        self
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            local_ip: Ipv4Addr::new(10, 0, 0, 1),
            local_mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            mtu: DEFAULT_MTU,
            ttl: DEFAULT_TTL,
            arp_timeout: Duration::from_secs(ARP_TIMEOUT_SEC),
            arp_min_interval: Duration::from_secs(ARP_MIN_INTERVAL),
            udp_rx_queue_len: UDP_RX_QUEUE_LEN,
        }
    }
}
