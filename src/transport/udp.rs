//! UDP (User Datagram Protocol) implementation
//!
//! This module provides UDP header parsing, segment construction with the
//! pseudo-header checksum, and the per-port sockets the stack delivers to.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use crate::buf::PacketBuf;
use crate::error::{Result, UdpDrop};
use crate::network::{protocol, transport_checksum};

/// UDP header length in bytes
pub const UDP_HEADER_LEN: usize = 8;

/// UDP packet header structure
///
/// Represents the standard 8-byte UDP header as defined in RFC 768
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16, // Length of UDP header and data
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse UDP header from byte slice
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, UdpDrop> {
        if data.len() < UDP_HEADER_LEN {
            return Err(UdpDrop::Truncated(data.len()));
        }

        Ok(UdpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            length: BigEndian::read_u16(&data[4..6]),
            checksum: BigEndian::read_u16(&data[6..8]),
        })
    }

    /// Convert UDP header to bytes
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_LEN] {
        let mut bytes = [0u8; UDP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u16(&mut bytes[4..6], self.length);
        BigEndian::write_u16(&mut bytes[6..8], self.checksum);
        bytes
    }
}

/// A received UDP payload, waiting in a socket's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_addr: Ipv4Addr,
    pub src_port: u16,
    pub data: Vec<u8>,
}

/// Receive side of a bound UDP port.
#[derive(Debug)]
pub struct UdpSocket {
    pub bind_port: u16,
    rx_queue: VecDeque<UdpDatagram>,
    capacity: usize,
}

impl UdpSocket {
    pub fn new(port: u16, capacity: usize) -> Self {
        UdpSocket {
            bind_port: port,
            rx_queue: VecDeque::new(),
            capacity,
        }
    }

    /// Enqueues a datagram that has arrived for this socket.
    /// This is called by the stack.
    pub(crate) fn enqueue(&mut self, datagram: UdpDatagram) -> std::result::Result<(), UdpDrop> {
        if self.rx_queue.len() >= self.capacity {
            return Err(UdpDrop::QueueFull(self.bind_port));
        }
        self.rx_queue.push_back(datagram);
        Ok(())
    }

    /// Dequeues a datagram for the application to process.
    pub fn recv(&mut self) -> Option<UdpDatagram> {
        self.rx_queue.pop_front()
    }

    pub fn has_packet(&self) -> bool {
        !self.rx_queue.is_empty()
    }
}

/// Builds a UDP segment with its checksum filled in.
pub fn build_segment(
    payload: &[u8],
    src_port: u16,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    dst_port: u16,
) -> Result<PacketBuf> {
    let mut buf = PacketBuf::from_slice(payload)?;
    buf.add_header(UDP_HEADER_LEN)?;

    let header = UdpHeader {
        src_port,
        dst_port,
        length: buf.len() as u16,
        checksum: 0,
    };
    buf.data_mut()[..UDP_HEADER_LEN].copy_from_slice(&header.to_bytes());

    let checksum = match transport_checksum(protocol::UDP, &mut buf, src_ip, dst_ip)? {
        // An all-zero checksum means "not computed" on the wire.
        0 => 0xFFFF,
        checksum => checksum,
    };
    BigEndian::write_u16(&mut buf.data_mut()[6..8], checksum);
    Ok(buf)
}

/// Validates a received segment (the IP payload) and returns its header.
///
/// The buffer is trimmed to the UDP length field. The checksum field is
/// restored after verification so the segment stays as received.
pub fn check_segment(buf: &mut PacketBuf, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Result<UdpHeader> {
    let header = UdpHeader::from_bytes(buf.data())?;

    let declared = header.length as usize;
    if declared < UDP_HEADER_LEN || declared > buf.len() {
        return Err(UdpDrop::Length {
            declared,
            actual: buf.len(),
        }
        .into());
    }
    if buf.len() > declared {
        buf.remove_padding(buf.len() - declared)?;
    }

    if header.checksum != 0 {
        BigEndian::write_u16(&mut buf.data_mut()[6..8], 0);
        let computed = transport_checksum(protocol::UDP, buf, src_ip, dst_ip);
        BigEndian::write_u16(&mut buf.data_mut()[6..8], header.checksum);
        let computed = match computed? {
            0 => 0xFFFF,
            computed => computed,
        };
        if computed != header.checksum {
            return Err(UdpDrop::Checksum {
                received: header.checksum,
                computed,
            }
            .into());
        }
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DropReason, StackError};

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn udp_drop(err: StackError) -> UdpDrop {
        match err {
            StackError::Dropped(DropReason::Udp(reason)) => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_and_check_segment() {
        let segment = build_segment(b"hello", 5000, SRC, DST, 7).unwrap();
        let header = UdpHeader::from_bytes(segment.data()).unwrap();
        assert_eq!(header.src_port, 5000);
        assert_eq!(header.dst_port, 7);
        assert_eq!(header.length, 13);
        assert_ne!(header.checksum, 0);
        assert_eq!(&segment.data()[8..], b"hello");

        let mut received = PacketBuf::from_slice(segment.data()).unwrap();
        let checked = check_segment(&mut received, SRC, DST).unwrap();
        assert_eq!(checked, header);
        assert_eq!(received.data(), segment.data());
    }

    #[test]
    fn test_check_rejects_wrong_pseudo_header() {
        let segment = build_segment(b"hello", 5000, SRC, DST, 7).unwrap();
        let mut received = PacketBuf::from_slice(segment.data()).unwrap();

        let err = check_segment(&mut received, Ipv4Addr::new(10, 0, 0, 9), DST).unwrap_err();
        assert!(matches!(udp_drop(err), UdpDrop::Checksum { .. }));
        // Field restored after the failed check.
        assert_eq!(received.data(), segment.data());
    }

    #[test]
    fn test_zero_checksum_is_not_verified() {
        let mut raw = UdpHeader { src_port: 1, dst_port: 2, length: 10, checksum: 0 }.to_bytes().to_vec();
        raw.extend_from_slice(&[0xAB, 0xCD]);
        let mut received = PacketBuf::from_slice(&raw).unwrap();
        assert!(check_segment(&mut received, SRC, DST).is_ok());
    }

    #[test]
    fn test_length_checks() {
        let mut short = PacketBuf::from_slice(&[0; 7]).unwrap();
        assert_eq!(udp_drop(check_segment(&mut short, SRC, DST).unwrap_err()), UdpDrop::Truncated(7));

        let raw = UdpHeader { src_port: 1, dst_port: 2, length: 30, checksum: 0 }.to_bytes();
        let mut buf = PacketBuf::from_slice(&raw).unwrap();
        assert_eq!(
            udp_drop(check_segment(&mut buf, SRC, DST).unwrap_err()),
            UdpDrop::Length { declared: 30, actual: 8 }
        );
    }

    #[test]
    fn test_trailing_bytes_are_trimmed() {
        let segment = build_segment(b"abc", 1, SRC, DST, 2).unwrap();
        let mut raw = segment.data().to_vec();
        raw.extend_from_slice(&[0; 5]);
        let mut received = PacketBuf::from_slice(&raw).unwrap();

        check_segment(&mut received, SRC, DST).unwrap();
        assert_eq!(received.data(), segment.data());
    }

    #[test]
    fn test_socket_queue_is_bounded() {
        let mut socket = UdpSocket::new(7, 1);
        let datagram = UdpDatagram { src_addr: SRC, src_port: 9, data: vec![1] };
        socket.enqueue(datagram.clone()).unwrap();
        assert_eq!(socket.enqueue(datagram.clone()), Err(UdpDrop::QueueFull(7)));
        assert!(socket.has_packet());
        assert_eq!(socket.recv(), Some(datagram));
        assert_eq!(socket.recv(), None);
    }
}
