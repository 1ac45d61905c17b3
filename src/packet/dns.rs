//! DNS question-name decoding
//!
//! Decodes the label sequence of the first question in a captured DNS
//! query. The decoder is deliberately narrow: queries captured at this
//! point never use compression, so a pointer byte (top two bits of the
//! label length set) is treated as malformed rather than followed. The
//! decoded name is ASCII-lower-cased so matching is case-insensitive.

/// Fixed DNS message header length
pub const DNS_HEADER_LEN: usize = 12;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: u8 = 63;

/// Mask for the compression-pointer bits in a label length byte
const POINTER_MASK: u8 = 0xC0;

/// The decoded question of one captured DNS query
///
/// Transient: exists only while one packet is being processed. `name_end`
/// is the offset one past the terminating zero label, kept so responses
/// can echo the question section verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Queried domain, labels joined with '.', lower-cased
    pub name: String,
    /// Offset within the packet just past the name's terminating zero byte
    pub name_end: usize,
}

impl DnsQuestion {
    /// Parse the question of the DNS message starting at `dns_start`
    ///
    /// Returns `None` if no full DNS header is present or the question
    /// name is malformed.
    #[must_use]
    pub fn parse(packet: &[u8], dns_start: usize) -> Option<Self> {
        if packet.len() < dns_start.checked_add(DNS_HEADER_LEN)? {
            return None;
        }
        let (name, name_end) = parse_question_name(packet, dns_start + DNS_HEADER_LEN)?;
        Some(Self { name, name_end })
    }
}

/// Decode a DNS label sequence starting at `offset`
///
/// Each label is a length byte (1 to 63) followed by that many bytes; the
/// sequence terminates at a zero-length label. Returns the dot-joined,
/// lower-cased name and the offset one past the terminator. The root name
/// decodes to an empty string.
///
/// Returns `None` on a label longer than 63 bytes, on a compression
/// pointer, or on running past the packet boundary. Never panics.
#[must_use]
pub fn parse_question_name(packet: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut pos = offset;

    loop {
        let len = *packet.get(pos)?;
        pos += 1;

        if len == 0 {
            return Some((name, pos));
        }
        if len & POINTER_MASK != 0 || len > MAX_LABEL_LEN {
            return None;
        }

        let label = packet.get(pos..pos + usize::from(len))?;
        if !name.is_empty() {
            name.push('.');
        }
        for &byte in label {
            name.push(byte.to_ascii_lowercase() as char);
        }
        pos += usize::from(len);
    }
}
