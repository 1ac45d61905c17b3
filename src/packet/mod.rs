//! Wire-format handling for captured IP packets
//!
//! Everything in this module operates on untrusted byte slices read from
//! the virtual interface. The parsers are pure functions that return
//! `Option`: any malformed input yields `None` at the first point of
//! failure and the caller drops the whole packet. Nothing here panics on
//! any input.
//!
//! Layout of a captured DNS query:
//!
//! ```text
//! 0        ihl        ihl+8      ihl+20
//! ├─ IPv4 ─┼─ UDP ────┼─ DNS hdr ─┼─ question ─ ...
//! ```
//!
//! - [`checksum`]: IPv4 header checksum (RFC 1071)
//! - [`ipv4`]: IPv4 header view
//! - [`udp`]: UDP header view
//! - [`dns`]: DNS question-name decoding
//! - [`nxdomain`]: spoofed NXDOMAIN response synthesis

pub mod checksum;
pub mod dns;
pub mod ipv4;
pub mod nxdomain;
pub mod udp;

pub use checksum::ip_checksum;
pub use dns::{parse_question_name, DnsQuestion, DNS_HEADER_LEN};
pub use ipv4::Ipv4Header;
pub use nxdomain::build_nxdomain;
pub use udp::{UdpHeader, UDP_HEADER_LEN};

/// IP protocol number for UDP
pub const IPPROTO_UDP: u8 = 17;

/// Byte offset of the source address within the IPv4 header
pub(crate) const IP_SRC_OFFSET: usize = 12;

/// Byte offset of the destination address within the IPv4 header
pub(crate) const IP_DST_OFFSET: usize = 16;

/// Byte offset of the header checksum within the IPv4 header
pub(crate) const IP_CHECKSUM_OFFSET: usize = 10;

/// Byte offset of the total-length field within the IPv4 header
pub(crate) const IP_TOTAL_LEN_OFFSET: usize = 2;
