//! Spoofed NXDOMAIN response synthesis
//!
//! Builds a byte-exact negative response from a captured query packet.
//! The response reuses the query buffer wholesale: endpoints are swapped,
//! the DNS flags are patched, and the IP checksum is recomputed. Echoing
//! the original question section unchanged is valid response framing when
//! the RCODE indicates failure, so the output length always equals the
//! input length.

use super::checksum::ip_checksum;
use super::udp::UDP_HEADER_LEN;
use super::{IP_CHECKSUM_OFFSET, IP_DST_OFFSET, IP_SRC_OFFSET};

/// QR bit in the first DNS flags byte
const FLAGS_QR_RESPONSE: u8 = 0x80;

/// NXDOMAIN (RCODE 3) in the second DNS flags byte
const FLAGS_RCODE_NXDOMAIN: u8 = 0x03;

/// Build a spoofed NXDOMAIN response for a validated DNS query packet
///
/// `query` must already have passed IPv4, UDP and DNS parsing; this
/// function has no error path of its own. The flag bytes are OR-patched
/// rather than rebuilt, so the captured opcode and recursion bits ride
/// along unchanged.
#[must_use]
pub fn build_nxdomain(query: &[u8], ihl: usize) -> Vec<u8> {
    let mut response = query.to_vec();

    // Return direction: swap IP addresses and UDP ports
    swap_ip_addresses(&mut response);
    swap_udp_ports(&mut response, ihl);

    // QR=1, RCODE=3; other query flags preserved as captured
    let flags = ihl + UDP_HEADER_LEN + 2;
    response[flags] |= FLAGS_QR_RESPONSE;
    response[flags + 1] |= FLAGS_RCODE_NXDOMAIN;

    // UDP checksum stays zero (optional under IPv4)
    response[ihl + 6] = 0;
    response[ihl + 7] = 0;

    patch_ip_checksum(&mut response, ihl);

    response
}

/// Swap the IPv4 source and destination address fields in-place
pub(crate) fn swap_ip_addresses(packet: &mut [u8]) {
    for i in 0..4 {
        packet.swap(IP_SRC_OFFSET + i, IP_DST_OFFSET + i);
    }
}

/// Swap the UDP source and destination port fields in-place
pub(crate) fn swap_udp_ports(packet: &mut [u8], ihl: usize) {
    packet.swap(ihl, ihl + 2);
    packet.swap(ihl + 1, ihl + 3);
}

/// Zero and recompute the IPv4 header checksum in-place
pub(crate) fn patch_ip_checksum(packet: &mut [u8], ihl: usize) {
    packet[IP_CHECKSUM_OFFSET] = 0;
    packet[IP_CHECKSUM_OFFSET + 1] = 0;
    let sum = ip_checksum(&packet[..ihl]);
    packet[IP_CHECKSUM_OFFSET..IP_CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
}
