//! End-to-end session tests over the in-memory device
//!
//! Each test starts a full filter session against a [`ChannelTun`],
//! pushes raw packets in, and asserts on the exact packets written back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::timeout;

use dnsgate::config::FilterConfig;
use dnsgate::packet::checksum::ip_checksum;
use dnsgate::rules::{BlockRule, BlocklistSnapshot, Schedule, SnapshotHandle};
use dnsgate::tun::DirectSocketFactory;
use dnsgate::{DnsFilter, FilterState};

use super::common::{
    dns_query, query_packet, spawn_stub_resolver, udp_packet, ChannelProvider, ChannelTun,
    RESPONSE_WAIT, SILENCE_WAIT,
};

/// Start a running filter over a fresh channel device
async fn start_filter(
    rules: Vec<BlockRule>,
    upstream: SocketAddr,
) -> (
    DnsFilter,
    tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (device, in_tx, out_rx) = ChannelTun::new();
    let config = FilterConfig::default()
        .with_upstream(upstream)
        .with_relay_timeout_ms(500);
    let filter = DnsFilter::new(
        config,
        ChannelProvider::new(device),
        Arc::new(DirectSocketFactory),
        SnapshotHandle::with_snapshot(BlocklistSnapshot::build(&rules)),
    );
    filter.start().await.expect("filter should start");
    (filter, in_tx, out_rx)
}

/// Upstream address for tests that must never reach a resolver
fn unreachable_upstream() -> SocketAddr {
    "127.0.0.1:1".parse().expect("static addr")
}

#[tokio::test]
async fn test_blocked_query_answered_with_nxdomain() {
    let rules = vec![BlockRule::new("example.com")];
    let (filter, in_tx, mut out_rx) = start_filter(rules, unreachable_upstream()).await;

    let query = query_packet(0x1234, "www.example.com", 51000);
    in_tx.send(query.clone()).expect("send query");

    let response = timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("response in time")
        .expect("response present");

    // Same shape as the query, endpoints reversed
    assert_eq!(response.len(), query.len());
    assert_eq!(&response[12..16], &[10, 0, 0, 1]);
    assert_eq!(&response[16..20], &[10, 0, 0, 2]);
    assert_eq!(u16::from_be_bytes([response[20], response[21]]), 53);
    assert_eq!(u16::from_be_bytes([response[22], response[23]]), 51000);
    assert_eq!(ip_checksum(&response[..20]), 0);

    // DNS: same id, response bit set, RCODE 3, question echoed
    assert_eq!(&response[28..30], &[0x12, 0x34]);
    assert_ne!(response[30] & 0x80, 0);
    assert_eq!(response[31] & 0x0F, 3);
    assert_eq!(&response[40..], &query[40..]);

    filter.stop().await;
}

#[tokio::test]
async fn test_allowed_query_relayed_upstream() {
    let upstream = spawn_stub_resolver().await;
    let rules = vec![BlockRule::new("blocked.net")];
    let (filter, in_tx, mut out_rx) = start_filter(rules, upstream).await;

    in_tx
        .send(query_packet(0xBEEF, "example.com", 52000))
        .expect("send query");

    let response = timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("response in time")
        .expect("response present");

    assert_eq!(&response[12..16], &[10, 0, 0, 1]);
    assert_eq!(&response[16..20], &[10, 0, 0, 2]);
    assert_eq!(u16::from_be_bytes([response[20], response[21]]), 53);
    assert_eq!(u16::from_be_bytes([response[22], response[23]]), 52000);

    // The stub echoes the query with QR set and RCODE 0
    assert_eq!(&response[28..30], &[0xBE, 0xEF]);
    assert_ne!(response[30] & 0x80, 0);
    assert_eq!(response[31] & 0x0F, 0);

    filter.stop().await;
}

#[tokio::test]
async fn test_closed_schedule_window_relays_instead_of_blocking() {
    let upstream = spawn_stub_resolver().await;
    // start > end makes the window permanently closed
    let rules = vec![BlockRule::new("example.com").with_schedule(Schedule::weekdays(1020, 540))];
    let (filter, in_tx, mut out_rx) = start_filter(rules, upstream).await;

    in_tx
        .send(query_packet(0x0042, "example.com", 53000))
        .expect("send query");

    let response = timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("response in time")
        .expect("response present");

    // Relayed, not spoofed: RCODE 0 from the stub
    assert_eq!(response[31] & 0x0F, 0);

    filter.stop().await;
}

#[tokio::test]
async fn test_malformed_traffic_dropped_and_loop_survives() {
    let rules = vec![BlockRule::new("example.com")];
    let (filter, in_tx, mut out_rx) = start_filter(rules, unreachable_upstream()).await;

    // Truncated: claims a question but ends mid-name
    let mut truncated = query_packet(0x0001, "example.com", 51000);
    truncated.truncate(truncated.len() - 8);
    in_tx.send(truncated).expect("send");

    // IPv6 version nibble
    let mut wrong_version = query_packet(0x0002, "example.com", 51000);
    wrong_version[0] = 0x65;
    in_tx.send(wrong_version).expect("send");

    // TCP instead of UDP
    let mut tcp = query_packet(0x0003, "example.com", 51000);
    tcp[9] = 6;
    in_tx.send(tcp).expect("send");

    // UDP but not port 53
    in_tx
        .send(udp_packet(&dns_query(0x0004, "example.com"), 51000, 443))
        .expect("send");

    // Compression pointer in the question name
    let mut pointer = dns_query(0x0005, "example.com");
    pointer[12] = 0xC0;
    pointer[13] = 0x0C;
    pointer.truncate(14);
    pointer.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    in_tx.send(udp_packet(&pointer, 51000, 53)).expect("send");

    // IHL pointing past the captured bytes
    let mut bad_ihl = query_packet(0x0006, "example.com", 51000);
    bad_ihl[0] = 0x4F;
    in_tx.send(bad_ihl).expect("send");

    // None of the above may produce a response
    assert!(timeout(SILENCE_WAIT, out_rx.recv()).await.is_err());

    // The loop is still alive and filtering
    assert!(filter.is_active());
    in_tx
        .send(query_packet(0x0007, "example.com", 51000))
        .expect("send");
    let response = timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("response in time")
        .expect("response present");
    assert_eq!(response[31] & 0x0F, 3);

    filter.stop().await;
}

#[tokio::test]
async fn test_relay_timeout_drops_query_silently() {
    // Silent socket: binds but never answers
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind silent socket");
    let upstream = silent.local_addr().expect("silent addr");

    let (filter, in_tx, mut out_rx) = start_filter(Vec::new(), upstream).await;

    in_tx
        .send(query_packet(0x0099, "example.com", 51000))
        .expect("send query");

    // 500ms relay timeout, then the query is simply gone
    assert!(timeout(RESPONSE_WAIT, out_rx.recv()).await.is_err());
    assert!(filter.is_active());

    filter.stop().await;
}

#[tokio::test]
async fn test_session_stats_track_decisions() {
    let upstream = spawn_stub_resolver().await;
    let rules = vec![BlockRule::new("blocked.net")];
    let (filter, in_tx, mut out_rx) = start_filter(rules, upstream).await;

    in_tx
        .send(query_packet(0x0001, "blocked.net", 51000))
        .expect("send");
    timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("blocked response")
        .expect("present");

    in_tx
        .send(query_packet(0x0002, "example.com", 51000))
        .expect("send");
    timeout(RESPONSE_WAIT, out_rx.recv())
        .await
        .expect("relayed response")
        .expect("present");

    let stats = filter.stats();
    assert_eq!(stats.packets_received, 2);
    assert_eq!(stats.queries_dispatched, 2);
    assert_eq!(stats.queries_blocked, 1);
    assert_eq!(stats.queries_relayed, 1);
    assert_eq!(stats.responses_written, 2);

    filter.stop().await;
}

#[tokio::test]
async fn test_stop_ends_session_and_is_idempotent() {
    let (filter, in_tx, mut out_rx) = start_filter(
        vec![BlockRule::new("example.com")],
        unreachable_upstream(),
    )
    .await;
    assert_eq!(filter.state(), FilterState::Running);

    filter.stop().await;
    filter.stop().await;
    assert_eq!(filter.state(), FilterState::Stopped);

    // Packets arriving after stop go nowhere: the outbound channel is
    // either already closed or stays silent
    let _ = in_tx.send(query_packet(0x0001, "example.com", 51000));
    assert!(matches!(
        timeout(SILENCE_WAIT, out_rx.recv()).await,
        Err(_) | Ok(None)
    ));
}
