//! Network interface abstraction layer
//!
//! This module provides the link side of the stack and the stack itself:
//! - Devices (TAP and in-memory)
//! - Ethernet framing
//! - Protocol dispatch and the UDP socket table

pub mod device;
pub mod ethernet;
pub mod interface;
mod ip;
mod ipv4;

// Re-export commonly used items
pub use device::{MemoryDevice, NetDevice, TapDevice};
pub use ethernet::{EtherType, Ethernet, Frame, Link, MacAddr};
pub use interface::{NetStack, ProtocolHandlerFn};
