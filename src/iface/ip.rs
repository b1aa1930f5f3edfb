//! Outbound IPv4 and the UDP socket API of the stack.

use std::net::Ipv4Addr;
use std::time::Instant;

use tracing::info;

use crate::buf::PacketBuf;
use crate::error::{Result, StackError};
use crate::iface::device::NetDevice;
use crate::iface::interface::NetStack;
use crate::network::protocol;
use crate::transport::udp;
use crate::transport::{UdpDatagram, UdpSocket};

impl<D: NetDevice> NetStack<D> {
    /// Sends `buf` as the payload of an IPv4 datagram to `dst_ip`.
    ///
    /// When the next hop is not yet resolved the datagram waits in the ARP
    /// pending table; this still counts as success.
    pub fn ip_send(&mut self, buf: PacketBuf, dst_ip: Ipv4Addr, protocol: u8) -> Result<()> {
        self.ip_send_at(buf, dst_ip, protocol, Instant::now())
    }

    pub(crate) fn ip_send_at(
        &mut self,
        buf: PacketBuf,
        dst_ip: Ipv4Addr,
        protocol: u8,
        now: Instant,
    ) -> Result<()> {
        self.ip
            .send(&mut self.arp, &mut self.ethernet, buf, dst_ip, protocol, now)
    }

    /// Binds a receive queue to `port`.
    pub fn udp_open(&mut self, port: u16) -> Result<()> {
        if self.udp_sockets.contains_key(&port) {
            return Err(StackError::PortInUse(port));
        }
        let socket = UdpSocket::new(port, self.config.udp_rx_queue_len);
        self.udp_sockets.insert(port, socket);
        info!(port, "udp port opened");
        Ok(())
    }

    /// Unbinds `port`, discarding anything still queued.
    pub fn udp_close(&mut self, port: u16) -> bool {
        let closed = self.udp_sockets.remove(&port).is_some();
        if closed {
            info!(port, "udp port closed");
        }
        closed
    }

    /// Takes the oldest datagram received on `port`.
    pub fn udp_recv(&mut self, port: u16) -> Result<Option<UdpDatagram>> {
        let socket = self
            .udp_sockets
            .get_mut(&port)
            .ok_or(StackError::PortNotOpen(port))?;
        Ok(socket.recv())
    }

    pub fn udp_send(
        &mut self,
        data: &[u8],
        src_port: u16,
        dst_ip: Ipv4Addr,
        dst_port: u16,
    ) -> Result<()> {
        let segment = udp::build_segment(data, src_port, self.config.local_ip, dst_ip, dst_port)?;
        self.ip_send(segment, dst_ip, protocol::UDP)
    }
}
