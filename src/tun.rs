//! Capability traits at the OS boundary
//!
//! The filter core never creates a virtual interface or a protected socket
//! itself; both are handed in by the embedding application as capabilities.
//! This keeps the OS-specific parts (device establishment, routing rules,
//! socket protection against routing loops) out of the core and makes the
//! dispatch loop fully testable with in-memory doubles.

use std::io;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::config::TunConfig;
use crate::error::SessionError;

/// An established virtual network interface
///
/// Delivers raw IP packets in both directions. The dispatch loop is the
/// only reader; writes may come from many concurrently completing query
/// tasks and are serialized by the engine, not by implementations.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Read one packet into `buf`, returning its length
    ///
    /// A return of `Ok(0)` is a transient condition, not end-of-stream;
    /// the caller backs off briefly and retries.
    async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one complete packet
    ///
    /// Writes against a closed device fail with an error; callers treat
    /// that as a normal drop.
    async fn write_packet(&self, packet: &[u8]) -> io::Result<usize>;

    /// Close the device; subsequent reads and writes fail
    ///
    /// Must be idempotent.
    fn close(&self);
}

/// Establishes the virtual interface for a session
///
/// Implementations are expected to assign the configured address,
/// advertise the DNS server to the OS, route only that server's /32
/// through the device, and exclude this application's own traffic.
pub trait TunProvider: Send + Sync {
    /// Establish the device, or fail the session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EstablishFailed`] when the OS refuses the
    /// interface (permission revoked, another VPN active). The filter
    /// reports this upward and does not retry.
    fn establish(&self, config: &TunConfig) -> Result<Box<dyn TunDevice>, SessionError>;
}

/// Creates UDP sockets exempt from the virtual interface's routing
///
/// The relay's upstream query must not itself be captured by the device,
/// or every relayed query would loop back into the filter. Implementations
/// mark each socket as "protected" with the OS before returning it. One
/// fresh socket is bound per relayed query so concurrent relays can never
/// receive each other's replies.
#[async_trait]
pub trait ProtectedSocketFactory: Send + Sync {
    /// Bind a new protected UDP socket
    async fn bind(&self) -> io::Result<UdpSocket>;
}

/// Socket factory that binds plain, unprotected sockets
///
/// Correct wherever no virtual interface routing applies to this process
/// (tests, or hosts where the device only routes the DNS /32 and the
/// upstream resolver lies outside it).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSocketFactory;

#[async_trait]
impl ProtectedSocketFactory for DirectSocketFactory {
    async fn bind(&self) -> io::Result<UdpSocket> {
        UdpSocket::bind("0.0.0.0:0").await
    }
}
