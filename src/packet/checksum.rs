//! IPv4 header checksum (RFC 1071)
//!
//! The one's-complement checksum used by IPv4: sum the header as 16-bit
//! big-endian words, fold the carries back into the low 16 bits, and
//! complement the result.
//!
//! The UDP checksum is intentionally left at zero everywhere in this crate.
//! It is optional under IPv4 and skipping it avoids the pseudo-header sum
//! on the hot path; this is an accepted correctness gap, not a defect.

/// Compute the IPv4 header checksum over `header`
///
/// The caller must zero the existing checksum field before computing a new
/// value. A trailing odd byte is padded with zero (never occurs for a valid
/// IPv4 header since the IHL is in 4-byte words).
///
/// Verification uses the standard self-check: summing a header with its own
/// correct checksum in place yields 0.
///
/// # Example
///
/// ```
/// use dnsgate::packet::ip_checksum;
///
/// let mut header = [0u8; 20];
/// header[0] = 0x45;
/// header[9] = 17;
/// let sum = ip_checksum(&header);
/// header[10..12].copy_from_slice(&sum.to_be_bytes());
/// assert_eq!(ip_checksum(&header), 0);
/// ```
#[must_use]
pub fn ip_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = header.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
