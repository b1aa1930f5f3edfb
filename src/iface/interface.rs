//! Network interface abstraction and packet processing
//!
//! [`NetStack`] owns one device and all protocol state of the host: the
//! Ethernet layer, the ARP tables, the IPv4 engine, the upper-protocol
//! registry and the UDP port table. It is driven by [`NetStack::poll`], which
//! takes at most one frame from the device and processes it to completion.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{StackConfig, DEFAULT_MTU};
use crate::error::{EthernetDrop, Result, StackError};
use crate::iface::device::NetDevice;
use crate::iface::ethernet::{EtherType, Ethernet, Frame, ETH_HEADER_LEN};
use crate::network::{protocol, Arp, Ip};
use crate::transport::UdpSocket;

/// Callback for an upper protocol: receives the IP payload and the source.
pub type ProtocolHandlerFn = Box<dyn FnMut(&[u8], Ipv4Addr)>;

pub(crate) enum ProtocolHandler {
    Icmp,
    Udp,
    Custom(ProtocolHandlerFn),
}

/// Single-interface IPv4 host stack.
pub struct NetStack<D> {
    pub(crate) config: StackConfig,
    pub(crate) ethernet: Ethernet<D>,
    pub(crate) arp: Arp,
    pub(crate) ip: Ip,
    pub(crate) protocols: HashMap<u8, ProtocolHandler>,
    pub(crate) udp_sockets: HashMap<u16, UdpSocket>,
}

impl<D: NetDevice> NetStack<D> {
    /// Brings the stack up on `device`.
    ///
    /// ICMP and UDP are registered and a gratuitous ARP request for the
    /// local address is broadcast.
    pub fn new(config: StackConfig, device: D) -> Result<Self> {
        let mut protocols = HashMap::new();
        protocols.insert(protocol::ICMP, ProtocolHandler::Icmp);
        protocols.insert(protocol::UDP, ProtocolHandler::Udp);

        let mut stack = NetStack {
            ethernet: Ethernet::new(device, config.local_mac),
            arp: Arp::new(&config),
            ip: Ip::new(&config),
            protocols,
            udp_sockets: HashMap::new(),
            config,
        };
        stack.arp_probe()?;

        info!(
            ip = %stack.config.local_ip,
            mac = %stack.config.local_mac,
            mtu = stack.config.mtu,
            "network stack up"
        );
        Ok(stack)
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn arp(&self) -> &Arp {
        &self.arp
    }

    pub fn arp_mut(&mut self) -> &mut Arp {
        &mut self.arp
    }

    pub fn device(&self) -> &D {
        self.ethernet.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.ethernet.device_mut()
    }

    /// Broadcasts an ARP request for our own address.
    pub fn arp_probe(&mut self) -> Result<()> {
        self.arp.probe(&mut self.ethernet)
    }

    /// Text dump of the ARP cache.
    pub fn dump_arp_table(&self) -> String {
        self.arp.table().render(Instant::now())
    }

    /// Registers `handler` for IP protocol `protocol`, replacing any
    /// previous handler (built-in ICMP/UDP included).
    pub fn register_protocol<F>(&mut self, protocol: u8, handler: F)
    where
        F: FnMut(&[u8], Ipv4Addr) + 'static,
    {
        self.protocols
            .insert(protocol, ProtocolHandler::Custom(Box::new(handler)));
    }

    /// Removes the handler for `protocol`. Datagrams for it then trigger
    /// protocol unreachable.
    pub fn unregister_protocol(&mut self, protocol: u8) -> bool {
        self.protocols.remove(&protocol).is_some()
    }

    /// Processes at most one frame from the device, then sweeps expired ARP
    /// state. Returns whether a frame was read.
    ///
    /// Dropped frames are logged and do not fail the poll.
    pub fn poll(&mut self) -> Result<bool> {
        // Peers may send full-size frames even when our own MTU is smaller.
        let mut frame = vec![0u8; ETH_HEADER_LEN + self.config.mtu.max(DEFAULT_MTU)];
        let len = self.ethernet.recv(&mut frame)?;

        if len > 0 {
            match self.process_frame(&frame[..len]) {
                Ok(()) => {}
                Err(StackError::Dropped(reason)) => debug!(%reason, "frame dropped"),
                Err(e) => return Err(e),
            }
        }

        self.arp.purge_expired(Instant::now());
        Ok(len > 0)
    }

    /// Runs one received frame through the stack.
    pub fn process_frame(&mut self, frame: &[u8]) -> Result<()> {
        let now = Instant::now();
        let frame = Frame::parse(frame)?;

        match frame.ethertype {
            EtherType::Arp => {
                self.arp
                    .handle_inbound(&mut self.ethernet, frame.payload.data(), frame.src_mac, now)
            }
            EtherType::Ipv4 => self.ip_in(frame.payload, frame.src_mac, now),
            EtherType::Unknown(raw) => Err(EthernetDrop::UnknownEtherType(raw).into()),
        }
    }
}
