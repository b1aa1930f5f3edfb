//! Owned packet buffer with headroom for prepending headers.
//!
//! Each layer grows the buffer at the front on the way down and shrinks it on
//! the way up. Removing a header only moves the start marker, so the bytes
//! stay in place and a later `add_header` of the same size re-attaches the
//! original header unchanged.

use crate::error::BufError;

/// Bytes reserved in front of the payload for headers.
pub const BUF_HEADROOM: usize = 128;

/// Largest payload a buffer can hold.
pub const BUF_MAX_LEN: usize = 65535 + BUF_HEADROOM;

/// A packet under construction or being parsed.
///
/// Invariant: `start <= storage.len()`, and the visible data is
/// `storage[start..]`.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketBuf {
    storage: Vec<u8>,
    start: usize,
}

impl PacketBuf {
    /// Creates a zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Result<Self, BufError> {
        Self::check_capacity(len)?;
        Ok(PacketBuf {
            storage: vec![0; BUF_HEADROOM + len],
            start: BUF_HEADROOM,
        })
    }

    /// Creates a buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self, BufError> {
        Self::check_capacity(data.len())?;
        let mut storage = Vec::with_capacity(BUF_HEADROOM + data.len());
        storage.resize(BUF_HEADROOM, 0);
        storage.extend_from_slice(data);
        Ok(PacketBuf {
            storage,
            start: BUF_HEADROOM,
        })
    }

    pub fn len(&self) -> usize {
        self.storage.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.storage[self.start..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.start..]
    }

    /// Extends the visible data by `len` bytes at the front.
    ///
    /// The new bytes are whatever the headroom held: zero for a fresh
    /// buffer, or a previously removed header.
    pub fn add_header(&mut self, len: usize) -> Result<(), BufError> {
        if len > self.start {
            return Err(BufError::Headroom {
                requested: len,
                available: self.start,
            });
        }
        Self::check_capacity(self.len() + len)?;
        self.start -= len;
        Ok(())
    }

    /// Hides `len` bytes at the front. The bytes are kept in the headroom.
    pub fn remove_header(&mut self, len: usize) -> Result<(), BufError> {
        self.check_underflow(len)?;
        self.start += len;
        Ok(())
    }

    /// Appends `len` zero bytes.
    pub fn add_padding(&mut self, len: usize) -> Result<(), BufError> {
        Self::check_capacity(self.len() + len)?;
        let end = self.storage.len();
        self.storage.resize(end + len, 0);
        Ok(())
    }

    /// Drops `len` bytes from the back.
    pub fn remove_padding(&mut self, len: usize) -> Result<(), BufError> {
        self.check_underflow(len)?;
        let end = self.storage.len();
        self.storage.truncate(end - len);
        Ok(())
    }

    fn check_capacity(requested: usize) -> Result<(), BufError> {
        if requested > BUF_MAX_LEN {
            return Err(BufError::Capacity {
                requested,
                max: BUF_MAX_LEN,
            });
        }
        Ok(())
    }

    fn check_underflow(&self, requested: usize) -> Result<(), BufError> {
        if requested > self.len() {
            return Err(BufError::Underflow {
                requested,
                len: self.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuf")
            .field("len", &self.len())
            .field("headroom", &self.start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_keeps_bytes() {
        let mut buf = PacketBuf::from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        buf.remove_header(2).unwrap();
        assert_eq!(buf.data(), &[3, 4, 5, 6]);

        buf.add_header(2).unwrap();
        assert_eq!(buf.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_fresh_headroom_is_zeroed() {
        let mut buf = PacketBuf::from_slice(&[0xAA]).unwrap();
        buf.add_header(3).unwrap();
        assert_eq!(buf.data(), &[0, 0, 0, 0xAA]);
    }

    #[test]
    fn test_padding() {
        let mut buf = PacketBuf::from_slice(&[7, 7]).unwrap();
        buf.add_padding(3).unwrap();
        assert_eq!(buf.data(), &[7, 7, 0, 0, 0]);
        buf.remove_padding(4).unwrap();
        assert_eq!(buf.data(), &[7]);
    }

    #[test]
    fn test_limits() {
        let mut buf = PacketBuf::new(4).unwrap();
        assert_eq!(
            buf.add_header(BUF_HEADROOM + 1),
            Err(BufError::Headroom {
                requested: BUF_HEADROOM + 1,
                available: BUF_HEADROOM
            })
        );
        assert!(matches!(
            buf.remove_header(5),
            Err(BufError::Underflow { requested: 5, len: 4 })
        ));
        assert!(matches!(
            buf.add_padding(BUF_MAX_LEN),
            Err(BufError::Capacity { .. })
        ));
        assert!(PacketBuf::new(BUF_MAX_LEN + 1).is_err());
    }
}
