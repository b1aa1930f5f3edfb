//! Network devices the stack can be bound to.

use std::collections::VecDeque;
use std::io;

use tun_tap::{Iface, Mode};

/// Raw frame I/O.
pub trait NetDevice {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Copies one pending frame into `buf` and returns its length, or 0 when
    /// no frame is waiting. Must not block.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Linux TAP interface carrying full Ethernet frames.
pub struct TapDevice {
    iface: Iface,
}

impl TapDevice {
    /// Opens (or creates) the TAP interface `name` in non-blocking mode.
    pub fn open(name: &str) -> io::Result<Self> {
        let iface = Iface::without_packet_info(name, Mode::Tap)?;
        iface.set_non_blocking()?;
        Ok(TapDevice { iface })
    }

    pub fn name(&self) -> &str {
        self.iface.name()
    }
}

impl NetDevice for TapDevice {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.iface.send(frame)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.iface.recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// In-memory device: frames to receive are injected, sent frames are kept.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    inbound: VecDeque<Vec<u8>>,
    outbound: VecDeque<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame for the next `recv`.
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Oldest frame sent through the device.
    pub fn pop_sent(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    /// All frames sent so far, oldest first.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain(..).collect()
    }
}

impl NetDevice for MemoryDevice {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.outbound.push_back(frame.to_vec());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(frame) = self.inbound.pop_front() else {
            return Ok(0);
        };
        if frame.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds the {} byte receive buffer", frame.len(), buf.len()),
            ));
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_queues() {
        let mut dev = MemoryDevice::new();
        let mut buf = [0u8; 8];
        assert_eq!(dev.recv(&mut buf).unwrap(), 0);

        dev.inject(vec![1, 2, 3]);
        assert_eq!(dev.pending_inbound(), 1);
        assert_eq!(dev.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        dev.send(&[4, 5]).unwrap();
        dev.send(&[6]).unwrap();
        assert_eq!(dev.pop_sent(), Some(vec![4, 5]));
        assert_eq!(dev.take_sent(), vec![vec![6]]);
    }

    #[test]
    fn test_memory_device_oversized_frame() {
        let mut dev = MemoryDevice::new();
        dev.inject(vec![0; 16]);
        let mut buf = [0u8; 8];
        assert!(dev.recv(&mut buf).is_err());
    }
}
