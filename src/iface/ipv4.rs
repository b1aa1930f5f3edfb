//! Inbound IPv4 processing: validation, protocol dispatch, ICMP and UDP
//! input, and the unreachable errors sent back for undeliverable datagrams.

use std::net::Ipv4Addr;
use std::time::Instant;

use tracing::debug;

use crate::buf::PacketBuf;
use crate::error::{IcmpDrop, Result};
use crate::iface::device::NetDevice;
use crate::iface::ethernet::MacAddr;
use crate::iface::interface::{NetStack, ProtocolHandler};
use crate::network::icmp::{self, IcmpHeader, UnreachableCode};
use crate::network::{protocol, Datagram};
use crate::transport::udp::{self, UdpDatagram, UDP_HEADER_LEN};

impl<D: NetDevice> NetStack<D> {
    pub(crate) fn ip_in(&mut self, buf: PacketBuf, src_mac: MacAddr, now: Instant) -> Result<()> {
        let datagram = self.ip.receive(buf)?;
        debug!(
            src = %datagram.header.src_addr,
            %src_mac,
            protocol = datagram.header.protocol,
            "ipv4 datagram accepted"
        );
        self.deliver(datagram, now)
    }

    /// Hands the payload to the registered protocol handler.
    fn deliver(&mut self, datagram: Datagram, now: Instant) -> Result<()> {
        let Datagram {
            header,
            header_len,
            payload,
        } = datagram;
        let src_ip = header.src_addr;

        match self.protocols.get_mut(&header.protocol) {
            Some(ProtocolHandler::Custom(handler)) => {
                handler(payload.data(), src_ip);
                Ok(())
            }
            Some(ProtocolHandler::Icmp) => self.icmp_in(payload, src_ip, now),
            Some(ProtocolHandler::Udp) => self.udp_in(payload, header_len, src_ip, now),
            None => {
                debug!(protocol = header.protocol, %src_ip, "protocol unreachable");
                self.send_unreachable(payload, header_len, src_ip, UnreachableCode::Protocol, now)
            }
        }
    }

    fn icmp_in(&mut self, payload: PacketBuf, src_ip: Ipv4Addr, now: Instant) -> Result<()> {
        let header = IcmpHeader::from_bytes(payload.data())?;
        if !header.is_echo_request() {
            return Err(IcmpDrop::Unhandled(header.msg_type).into());
        }

        debug!(
            %src_ip,
            id = header.identifier(),
            seq = header.sequence(),
            "echo request"
        );
        let reply = icmp::echo_reply(payload.data())?;
        self.ip_send_at(reply, src_ip, protocol::ICMP, now)
    }

    fn udp_in(
        &mut self,
        mut payload: PacketBuf,
        header_len: usize,
        src_ip: Ipv4Addr,
        now: Instant,
    ) -> Result<()> {
        let header = udp::check_segment(&mut payload, src_ip, self.config.local_ip)?;

        match self.udp_sockets.get_mut(&header.dst_port) {
            Some(socket) => {
                payload.remove_header(UDP_HEADER_LEN)?;
                socket.enqueue(UdpDatagram {
                    src_addr: src_ip,
                    src_port: header.src_port,
                    data: payload.data().to_vec(),
                })?;
                Ok(())
            }
            None => {
                debug!(port = header.dst_port, %src_ip, "port unreachable");
                self.send_unreachable(payload, header_len, src_ip, UnreachableCode::Port, now)
            }
        }
    }

    /// Re-attaches the stripped IP header and reports the datagram back to
    /// its sender.
    fn send_unreachable(
        &mut self,
        mut payload: PacketBuf,
        header_len: usize,
        dst_ip: Ipv4Addr,
        code: UnreachableCode,
        now: Instant,
    ) -> Result<()> {
        payload.add_header(header_len)?;
        let message = icmp::unreachable(payload.data(), header_len, code)?;
        self.ip_send_at(message, dst_ip, protocol::ICMP, now)
    }
}
