//! Upstream DNS relay
//!
//! For queries that are not blocked, the raw DNS payload is forwarded to a
//! real resolver over a protected socket and the reply is wrapped back
//! into a full IPv4/UDP packet addressed to the original client.
//!
//! Failure semantics are uniform and silent: timeout, socket error, a
//! reply from the wrong source, or a reply too large for the response
//! buffer all yield `None` and the original query is dropped. UDP DNS
//! clients retry on their own timers, so no retry happens here and no
//! error detail is surfaced beyond a debug log line.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, trace};

use crate::packet::nxdomain::{patch_ip_checksum, swap_ip_addresses, swap_udp_ports};
use crate::packet::udp::UDP_HEADER_LEN;
use crate::packet::IP_TOTAL_LEN_OFFSET;
use crate::tun::ProtectedSocketFactory;

/// Receive buffer for the upstream reply
///
/// Large enough for EDNS0 responses. A reply that fills the buffer may
/// have been truncated by the socket and is dropped rather than relayed
/// as a corrupted message.
const RELAY_RECV_BUFFER_SIZE: usize = 4096;

/// Forwards DNS queries to a fixed upstream resolver
///
/// Cheap to clone; the factory is shared, sockets are not.
#[derive(Clone)]
pub struct UpstreamRelay {
    factory: Arc<dyn ProtectedSocketFactory>,
    upstream: SocketAddr,
    timeout: Duration,
}

impl UpstreamRelay {
    /// Create a relay towards `upstream` with the given receive timeout
    pub fn new(
        factory: Arc<dyn ProtectedSocketFactory>,
        upstream: SocketAddr,
        timeout: Duration,
    ) -> Self {
        Self {
            factory,
            upstream,
            timeout,
        }
    }

    /// The upstream resolver address
    #[must_use]
    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Relay one captured query and rebuild the response packet
    ///
    /// `packet` is the full captured IPv4 packet, `ihl` its IP header
    /// length in bytes, and `dns_start` the offset of the DNS message
    /// (`ihl + 8`). Returns the complete response packet ready to write
    /// back to the device, or `None` on any failure.
    pub async fn relay(&self, packet: &[u8], ihl: usize, dns_start: usize) -> Option<Vec<u8>> {
        let payload = packet.get(dns_start..)?;
        if payload.is_empty() {
            return None;
        }

        let socket = match self.factory.bind().await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(error = %e, "failed to bind relay socket");
                return None;
            }
        };

        if let Err(e) = socket.send_to(payload, self.upstream).await {
            debug!(upstream = %self.upstream, error = %e, "relay send failed");
            return None;
        }

        let mut reply = vec![0u8; RELAY_RECV_BUFFER_SIZE];
        let len = match timeout(self.timeout, socket.recv_from(&mut reply)).await {
            Ok(Ok((len, src))) => {
                if src != self.upstream {
                    debug!(src = %src, "relay reply from unexpected source, dropped");
                    return None;
                }
                len
            }
            Ok(Err(e)) => {
                debug!(upstream = %self.upstream, error = %e, "relay recv failed");
                return None;
            }
            Err(_) => {
                debug!(upstream = %self.upstream, timeout = ?self.timeout, "relay timed out");
                return None;
            }
        };

        // A full buffer means recv_from may have truncated the datagram
        if len >= RELAY_RECV_BUFFER_SIZE {
            debug!(len, "relay reply too large, dropped");
            return None;
        }

        trace!(len, "relay reply received");
        Some(build_response_packet(packet, ihl, &reply[..len]))
    }
}

impl std::fmt::Debug for UpstreamRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRelay")
            .field("upstream", &self.upstream)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Rebuild a full IPv4/UDP packet carrying the upstream's DNS reply
///
/// Copies the original IP and UDP headers, swaps both endpoint pairs,
/// patches the two length fields for the new payload, recomputes the IP
/// checksum, and zeroes the UDP checksum (optional under IPv4).
fn build_response_packet(query: &[u8], ihl: usize, dns_reply: &[u8]) -> Vec<u8> {
    let total_len = ihl + UDP_HEADER_LEN + dns_reply.len();
    let mut response = Vec::with_capacity(total_len);
    response.extend_from_slice(&query[..ihl + UDP_HEADER_LEN]);
    response.extend_from_slice(dns_reply);

    swap_ip_addresses(&mut response);
    response[IP_TOTAL_LEN_OFFSET..IP_TOTAL_LEN_OFFSET + 2]
        .copy_from_slice(&(total_len as u16).to_be_bytes());

    swap_udp_ports(&mut response, ihl);
    let udp_len = (UDP_HEADER_LEN + dns_reply.len()) as u16;
    response[ihl + 4..ihl + 6].copy_from_slice(&udp_len.to_be_bytes());
    response[ihl + 6] = 0;
    response[ihl + 7] = 0;

    patch_ip_checksum(&mut response, ihl);
    response
}
