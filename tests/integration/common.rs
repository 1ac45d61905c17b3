//! Shared fixtures: an in-memory TUN double and raw packet builders
//!
//! [`ChannelTun`] plays the virtual interface over a pair of channels, so
//! the full dispatch path (read, parse, decide, write) runs without any
//! OS device. The packet builders emit the same bytes a client stack
//! would put on the wire, including a valid IP header checksum.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

use dnsgate::config::TunConfig;
use dnsgate::error::SessionError;
use dnsgate::packet::checksum::ip_checksum;
use dnsgate::tun::{TunDevice, TunProvider};

/// How long tests wait for a response the filter is expected to produce
pub const RESPONSE_WAIT: Duration = Duration::from_secs(2);

/// How long tests wait to confirm the filter stays silent
pub const SILENCE_WAIT: Duration = Duration::from_millis(300);

/// In-memory TUN device backed by channels
///
/// Packets pushed into the inbound sender appear as device reads; every
/// packet the filter writes lands in the outbound receiver.
pub struct ChannelTun {
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

impl ChannelTun {
    /// Returns the device plus the test side of both channels
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let device = Self {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            closed: AtomicBool::new(false),
        };
        (device, in_tx, out_rx)
    }
}

#[async_trait]
impl TunDevice for ChannelTun {
    async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device closed"));
        }
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(packet) => {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(len)
            }
            None => std::future::pending().await,
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device closed"));
        }
        self.outbound
            .send(packet.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "test receiver gone"))?;
        Ok(packet.len())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Provider yielding a pre-built [`ChannelTun`], once
pub struct ChannelProvider {
    device: std::sync::Mutex<Option<Box<dyn TunDevice>>>,
}

impl ChannelProvider {
    pub fn new(device: ChannelTun) -> Arc<Self> {
        Arc::new(Self {
            device: std::sync::Mutex::new(Some(Box::new(device))),
        })
    }
}

impl TunProvider for ChannelProvider {
    fn establish(&self, _config: &TunConfig) -> Result<Box<dyn TunDevice>, SessionError> {
        self.device
            .lock()
            .map_err(|_| SessionError::EstablishFailed {
                reason: "provider poisoned".to_string(),
            })?
            .take()
            .ok_or(SessionError::EstablishFailed {
                reason: "device already taken".to_string(),
            })
    }
}

/// Encode `domain` as a DNS question message (A/IN) with the given id
pub fn dns_query(id: u16, domain: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(17 + domain.len());
    message.extend_from_slice(&id.to_be_bytes());
    message.extend_from_slice(&[0x01, 0x00]); // RD
    message.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
    for label in domain.split('.') {
        message.push(label.len() as u8);
        message.extend_from_slice(label.as_bytes());
    }
    message.push(0);
    message.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    message
}

/// Wrap a DNS message in IPv4/UDP headers from 10.0.0.2 to 10.0.0.1:53
pub fn query_packet(id: u16, domain: &str, src_port: u16) -> Vec<u8> {
    udp_packet(&dns_query(id, domain), src_port, 53)
}

/// Build a full IPv4/UDP packet carrying `payload`
pub fn udp_packet(payload: &[u8], src_port: u16, dst_port: u16) -> Vec<u8> {
    let total = 28 + payload.len();
    let mut packet = vec![0u8; 28];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    packet[8] = 64; // TTL
    packet[9] = 17; // UDP
    packet[12..16].copy_from_slice(&[10, 0, 0, 2]);
    packet[16..20].copy_from_slice(&[10, 0, 0, 1]);

    let checksum = ip_checksum(&packet[..20]);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());

    packet[20..22].copy_from_slice(&src_port.to_be_bytes());
    packet[22..24].copy_from_slice(&dst_port.to_be_bytes());
    packet[24..26].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Stub resolver answering every query with a fixed NOERROR response
///
/// Echoes the query id so the response pairs up with whatever was asked.
pub async fn spawn_stub_resolver() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = socket.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, src)) = socket.recv_from(&mut buf).await {
            if len < 12 {
                continue;
            }
            let mut reply = buf[..len].to_vec();
            reply[2] |= 0x80; // QR
            let _ = socket.send_to(&reply, src).await;
        }
    });
    addr
}
