//! UDP header parsing
//!
//! A derived view over the 8 bytes immediately following the IP header.

use super::ipv4::Ipv4Header;
use super::IPPROTO_UDP;
use crate::config::DNS_PORT;

/// UDP header length in bytes
pub const UDP_HEADER_LEN: usize = 8;

/// Decoded UDP header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// UDP length field (header + payload)
    pub length: u16,
    /// UDP checksum as captured (may legitimately be zero under IPv4)
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse the UDP header following the IP header described by `ip`
    ///
    /// Returns `None` if the IP protocol is not UDP or fewer than 8 bytes
    /// remain after the IP header.
    #[must_use]
    pub fn parse(packet: &[u8], ip: &Ipv4Header) -> Option<Self> {
        if ip.protocol != IPPROTO_UDP {
            return None;
        }
        let rest = packet.get(ip.ihl..)?;
        if rest.len() < UDP_HEADER_LEN {
            return None;
        }

        Some(Self {
            src_port: u16::from_be_bytes([rest[0], rest[1]]),
            dst_port: u16::from_be_bytes([rest[2], rest[3]]),
            length: u16::from_be_bytes([rest[4], rest[5]]),
            checksum: u16::from_be_bytes([rest[6], rest[7]]),
        })
    }

    /// True iff this datagram is addressed to the DNS port
    #[must_use]
    pub fn is_dns_query(&self) -> bool {
        self.dst_port == DNS_PORT
    }
}
