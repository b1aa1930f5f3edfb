//! ICMP (Internet Control Message Protocol) implementation
//!
//! This module provides ICMP message parsing and the two messages the host
//! originates: echo replies and destination-unreachable errors (RFC 792).

use byteorder::{BigEndian, ByteOrder};

use crate::buf::PacketBuf;
use crate::error::{IcmpDrop, Result};
use crate::network::checksum16;

/// ICMP header length in bytes
pub const ICMP_HEADER_LEN: usize = 8;
/// Bytes of the offending datagram's payload quoted in an error message.
pub const ICMP_ERROR_QUOTE_LEN: usize = 8;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_UNREACH: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// Destination unreachable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableCode {
    Protocol = 2,
    Port = 3,
}

/// ICMP packet header structure
///
/// Represents the standard 8-byte ICMP header as defined in RFC 792
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub msg_type: u8,  // ICMP message type
    pub msg_code: u8,  // ICMP message code
    pub checksum: u16, // ICMP checksum
    pub rest: [u8; 4], // Type-specific data (e.g., identifier and sequence for echo)
}

impl IcmpHeader {
    /// Parse ICMP header from byte slice
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, IcmpDrop> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(IcmpDrop::Truncated(data.len()));
        }

        let mut rest = [0u8; 4];
        rest.copy_from_slice(&data[4..8]);
        Ok(IcmpHeader {
            msg_type: data[0],
            msg_code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            rest,
        })
    }

    /// Convert ICMP header to bytes
    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.msg_type;
        bytes[1] = self.msg_code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        bytes[4..8].copy_from_slice(&self.rest);
        bytes
    }

    /// Check if this is an Echo Request message
    pub fn is_echo_request(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REQUEST
    }

    /// Get the identifier field for Echo Request/Reply messages
    pub fn identifier(&self) -> u16 {
        BigEndian::read_u16(&self.rest[0..2])
    }

    /// Get the sequence number field for Echo Request/Reply messages
    pub fn sequence(&self) -> u16 {
        BigEndian::read_u16(&self.rest[2..4])
    }
}

/// Builds the echo reply for a received echo request message.
///
/// Identifier, sequence number and data are copied; the checksum covers the
/// whole reply.
pub fn echo_reply(request: &[u8]) -> Result<PacketBuf> {
    let request_header = IcmpHeader::from_bytes(request)?;

    let mut reply = PacketBuf::from_slice(request)?;
    let header = IcmpHeader {
        msg_type: ICMP_TYPE_ECHO_REPLY,
        msg_code: 0,
        checksum: 0,
        rest: request_header.rest,
    };
    finish(&mut reply, header);
    Ok(reply)
}

/// Builds a destination-unreachable message quoting `datagram`.
///
/// `datagram` is the offending datagram with its IP header attached; the
/// header plus the first 8 payload bytes (fewer if the payload is shorter)
/// are quoted.
pub fn unreachable(datagram: &[u8], header_len: usize, code: UnreachableCode) -> Result<PacketBuf> {
    let quote_len = datagram.len().min(header_len + ICMP_ERROR_QUOTE_LEN);

    let mut message = PacketBuf::new(ICMP_HEADER_LEN + quote_len)?;
    message.data_mut()[ICMP_HEADER_LEN..].copy_from_slice(&datagram[..quote_len]);
    let header = IcmpHeader {
        msg_type: ICMP_TYPE_UNREACH,
        msg_code: code as u8,
        checksum: 0,
        rest: [0; 4],
    };
    finish(&mut message, header);
    Ok(message)
}

fn finish(message: &mut PacketBuf, mut header: IcmpHeader) {
    message.data_mut()[..ICMP_HEADER_LEN].copy_from_slice(&header.to_bytes());
    header.checksum = checksum16(message.data());
    BigEndian::write_u16(&mut message.data_mut()[2..4], header.checksum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DropReason, StackError};

    #[test]
    fn test_echo_reply() {
        let mut request = vec![ICMP_TYPE_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0x00, 0x07];
        request.extend_from_slice(b"ping!");
        let sum = checksum16(&request);
        BigEndian::write_u16(&mut request[2..4], sum);

        let reply = echo_reply(&request).unwrap();
        let header = IcmpHeader::from_bytes(reply.data()).unwrap();

        assert_eq!(header.msg_type, ICMP_TYPE_ECHO_REPLY);
        assert_eq!(header.msg_code, 0);
        assert_eq!(header.identifier(), 0x1234);
        assert_eq!(header.sequence(), 7);
        assert_eq!(&reply.data()[8..], b"ping!");
        assert_eq!(checksum16(reply.data()), 0);
    }

    #[test]
    fn test_unreachable_quotes_header_and_eight_bytes() {
        let datagram: Vec<u8> = (0..40).collect();

        let message = unreachable(&datagram, 20, UnreachableCode::Protocol).unwrap();

        assert_eq!(message.len(), 8 + 28);
        let header = IcmpHeader::from_bytes(message.data()).unwrap();
        assert_eq!(header.msg_type, ICMP_TYPE_UNREACH);
        assert_eq!(header.msg_code, 2);
        assert_eq!(header.rest, [0; 4]);
        assert_eq!(&message.data()[8..], &datagram[..28]);
        assert_eq!(checksum16(message.data()), 0);
    }

    #[test]
    fn test_unreachable_short_payload() {
        let datagram: Vec<u8> = (0..23).collect();
        let message = unreachable(&datagram, 20, UnreachableCode::Port).unwrap();
        assert_eq!(message.len(), 8 + 23);
        assert_eq!(message.data()[1], 3);
    }

    #[test]
    fn test_truncated_message() {
        let err = echo_reply(&[8, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            StackError::Dropped(DropReason::Icmp(IcmpDrop::Truncated(3)))
        ));
    }
}
