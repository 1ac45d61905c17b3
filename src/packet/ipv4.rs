//! IPv4 header parsing
//!
//! A decoded, read-only view over the first IHL×4 bytes of a captured
//! packet. Header rewrites (address swaps, checksum patching) are done
//! in-place on a packet copy by the synthesizer and the relay, never
//! through this struct.

use std::net::Ipv4Addr;

/// Minimum IPv4 header length in bytes (IHL = 5)
pub const MIN_HEADER_LEN: usize = 20;

/// Decoded IPv4 header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (IHL × 4)
    pub ihl: usize,
    /// Total packet length as declared by the header
    pub total_len: u16,
    /// IP protocol number (17 = UDP)
    pub protocol: u8,
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Header checksum as captured
    pub checksum: u16,
}

impl Ipv4Header {
    /// Parse the IPv4 header at the start of `packet`
    ///
    /// Returns `None` if the buffer is shorter than a minimal header, the
    /// version nibble is not 4, or the declared IHL runs past the captured
    /// length. Malformed packets are dropped by the caller; there is no
    /// error detail to surface.
    #[must_use]
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < MIN_HEADER_LEN {
            return None;
        }

        let version = packet[0] >> 4;
        if version != 4 {
            return None;
        }

        let ihl = usize::from(packet[0] & 0x0F) * 4;
        if ihl < MIN_HEADER_LEN || ihl > packet.len() {
            return None;
        }

        Some(Self {
            ihl,
            total_len: u16::from_be_bytes([packet[2], packet[3]]),
            protocol: packet[9],
            src: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
            dst: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
            checksum: u16::from_be_bytes([packet[10], packet[11]]),
        })
    }
}
