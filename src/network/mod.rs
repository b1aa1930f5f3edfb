//! Network layer protocols implementation
//!
//! This module contains implementations for network layer protocols:
//! - ARP: address resolution with a pending-packet buffer
//! - IPv4: Internet Protocol version 4, fragmentation on send
//! - ICMP: echo reply and destination unreachable

pub mod arp;
pub mod icmp;
pub mod ipv4;

// Re-export commonly used items
pub use arp::{Arp, ArpOp, ArpPacket, ArpTable, Resolution};
pub use icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST, ICMP_TYPE_UNREACH};
pub use ipv4::{flags, protocol, Datagram, Ip, Ipv4Header};

use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use crate::buf::PacketBuf;
use crate::error::BufError;

/// Size of the IPv4 pseudo-header used by transport checksums.
pub const PSEUDO_HEADER_LEN: usize = 12;

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// An odd trailing byte is the high byte of a zero-padded word (RFC 1071).
/// The result is meant to be written back big-endian.
pub fn checksum16(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    // Process data in 2-byte chunks
    for chunk in data.chunks_exact(2) {
        sum += BigEndian::read_u16(chunk) as u32;
    }

    // Handle odd-length data by padding with zero
    if data.len() % 2 != 0 {
        if let Some(&last_byte) = data.last() {
            sum += (last_byte as u32) << 8;
        }
    }

    // Add carry bits
    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    // Return one's complement
    !sum as u16
}

/// Checksum of a transport segment (UDP) with its IPv4 pseudo-header.
///
/// The pseudo-header is written into the 12 bytes of headroom directly in
/// front of the segment. Whatever those bytes held (normally the tail of the
/// IP header that was stripped on receive) is saved first and put back
/// afterwards, and the buffer ends up with its original length.
///
/// The segment's checksum field must already be zero.
pub fn transport_checksum(
    protocol: u8,
    buf: &mut PacketBuf,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) -> Result<u16, BufError> {
    let transport_len = buf.len();
    buf.add_header(PSEUDO_HEADER_LEN)?;

    let mut saved = [0u8; PSEUDO_HEADER_LEN];
    saved.copy_from_slice(&buf.data()[..PSEUDO_HEADER_LEN]);

    {
        let pseudo = &mut buf.data_mut()[..PSEUDO_HEADER_LEN];
        pseudo[0..4].copy_from_slice(&src_ip.octets());
        pseudo[4..8].copy_from_slice(&dst_ip.octets());
        pseudo[8] = 0;
        pseudo[9] = protocol;
        BigEndian::write_u16(&mut pseudo[10..12], transport_len as u16);
    }

    let checksum = if buf.len() % 2 == 0 {
        checksum16(buf.data())
    } else {
        buf.add_padding(1)?;
        let checksum = checksum16(buf.data());
        buf.remove_padding(1)?;
        checksum
    };

    buf.data_mut()[..PSEUDO_HEADER_LEN].copy_from_slice(&saved);
    buf.remove_header(PSEUDO_HEADER_LEN)?;

    Ok(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 1071 section 3 example.
    #[test]
    fn test_checksum_rfc1071_vector() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        // Sum is 0xddf2, complement 0x220d.
        assert_eq!(checksum16(&data), 0x220d);
    }

    #[test]
    fn test_checksum_known_ipv4_header() {
        let mut header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(checksum16(&header), 0xb861);

        BigEndian::write_u16(&mut header[10..12], 0xb861);
        assert_eq!(checksum16(&header), 0);
    }

    #[test]
    fn test_checksum_odd_length() {
        // Trailing byte counts as the high byte of a padded word.
        assert_eq!(checksum16(&[0x12, 0x34, 0x56]), checksum16(&[0x12, 0x34, 0x56, 0x00]));
        assert_eq!(checksum16(&[0xff]), !0xff00u16);
    }

    #[test]
    fn test_checksum_self_verifies() {
        for len in [2usize, 10, 31, 64, 101] {
            let mut data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            data[0] = 0;
            data[1] = 0;
            let sum = checksum16(&data);
            BigEndian::write_u16(&mut data[0..2], sum);
            assert_eq!(checksum16(&data), 0, "length {}", len);
        }
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum16(&[]), 0xFFFF);
    }

    fn segment_behind_header(segment: &[u8]) -> PacketBuf {
        // 20 bytes standing in for an already stripped IP header.
        let mut wire: Vec<u8> = (100..120).collect();
        wire.extend_from_slice(segment);
        let mut buf = PacketBuf::from_slice(&wire).unwrap();
        buf.remove_header(20).unwrap();
        buf
    }

    #[test]
    fn test_transport_checksum_preserves_surroundings() {
        let src = Ipv4Addr::new(10, 0, 0, 2);
        let dst = Ipv4Addr::new(10, 0, 0, 1);

        for segment in [&[1u8, 2, 3, 4, 0, 0, 7, 8][..], &[1u8, 2, 3, 4, 0, 0, 7, 8, 9][..]] {
            let mut buf = segment_behind_header(segment);
            buf.add_header(20).unwrap();
            let before = buf.data().to_vec();
            buf.remove_header(20).unwrap();

            transport_checksum(17, &mut buf, src, dst).unwrap();

            assert_eq!(buf.len(), segment.len());
            assert_eq!(buf.data(), segment);
            buf.add_header(20).unwrap();
            assert_eq!(buf.data(), &before[..]);
        }
    }

    #[test]
    fn test_transport_checksum_matches_explicit_pseudo_header() {
        let src = Ipv4Addr::new(192, 168, 0, 1);
        let dst = Ipv4Addr::new(192, 168, 0, 199);
        let segment = [0x04, 0xd2, 0x16, 0x2e, 0x00, 0x0b, 0x00, 0x00, b'a', b'b', b'c'];

        let mut explicit = Vec::new();
        explicit.extend_from_slice(&src.octets());
        explicit.extend_from_slice(&dst.octets());
        explicit.extend_from_slice(&[0, 17, 0, segment.len() as u8]);
        explicit.extend_from_slice(&segment);

        let mut buf = segment_behind_header(&segment);
        let checksum = transport_checksum(17, &mut buf, src, dst).unwrap();
        assert_eq!(checksum, checksum16(&explicit));

        // Filling the field in makes the segment verify to zero.
        buf.data_mut()[6..8].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(transport_checksum(17, &mut buf, src, dst).unwrap(), 0);
    }
}
