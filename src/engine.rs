//! Session state machine and packet dispatch loop
//!
//! One [`DnsFilter`] instance drives one filtering session over the
//! virtual interface. The lifecycle is an explicit state machine:
//!
//! ```text
//! Stopped ──start()──▶ Starting ──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!                         │ establish failed                ▲
//!                         └──────────────────────────────────┘
//! ```
//!
//! While `Running`, a single read-loop task owns the device's read side.
//! Every packet is parsed down to the DNS question; anything that is not a
//! well-formed IPv4/UDP query to port 53 is dropped without a response.
//! Valid queries are dispatched as independent spawned tasks: the relay
//! path blocks on a network round-trip for up to the configured timeout
//! and must not stall the read loop or other in-flight queries. Responses
//! are written back through a mutex held only for the duration of one
//! write, so concurrently completing tasks cannot interleave bytes into a
//! corrupted frame.
//!
//! Error policy: fail open per-packet, fail closed per-session. A bad
//! packet costs at worst one DNS lookup (the client retries); only a
//! failure to establish the interface is surfaced to the caller.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::FilterConfig;
use crate::error::{FilterResult, SessionError};
use crate::packet::dns::DnsQuestion;
use crate::packet::ipv4::Ipv4Header;
use crate::packet::nxdomain::build_nxdomain;
use crate::packet::udp::{UdpHeader, UDP_HEADER_LEN};
use crate::relay::UpstreamRelay;
use crate::rules::SnapshotHandle;
use crate::tun::{ProtectedSocketFactory, TunDevice, TunProvider};

/// Backoff after a zero-length or failed device read
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterState {
    /// No session; the only state from which `start()` succeeds
    Stopped = 0,
    /// Acquiring the device and relay socket capability
    Starting = 1,
    /// Read loop active, queries being dispatched
    Running = 2,
    /// Shutdown signalled; device closing
    Stopping = 3,
}

impl FilterState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Counters for one filter session
///
/// All counters are monotonic within a session and reset on `start()`.
#[derive(Debug, Default)]
pub struct FilterStats {
    /// Raw packets read from the device
    packets_received: AtomicU64,
    /// Packets dropped before dispatch (not IPv4/UDP/DNS, or malformed)
    packets_ignored: AtomicU64,
    /// DNS queries dispatched to a worker task
    queries_dispatched: AtomicU64,
    /// Queries answered with a spoofed NXDOMAIN
    queries_blocked: AtomicU64,
    /// Queries relayed upstream successfully
    queries_relayed: AtomicU64,
    /// Relay attempts that timed out or failed
    relay_failures: AtomicU64,
    /// Responses written back to the device
    responses_written: AtomicU64,
    /// Device writes that failed (normal during shutdown)
    write_failures: AtomicU64,
}

impl FilterStats {
    /// Take a consistent-enough copy of all counters
    #[must_use]
    pub fn snapshot(&self) -> FilterStatsSnapshot {
        FilterStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_ignored: self.packets_ignored.load(Ordering::Relaxed),
            queries_dispatched: self.queries_dispatched.load(Ordering::Relaxed),
            queries_blocked: self.queries_blocked.load(Ordering::Relaxed),
            queries_relayed: self.queries_relayed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
            responses_written: self.responses_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_ignored.store(0, Ordering::Relaxed);
        self.queries_dispatched.store(0, Ordering::Relaxed);
        self.queries_blocked.store(0, Ordering::Relaxed);
        self.queries_relayed.store(0, Ordering::Relaxed);
        self.relay_failures.store(0, Ordering::Relaxed);
        self.responses_written.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`FilterStats`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStatsSnapshot {
    pub packets_received: u64,
    pub packets_ignored: u64,
    pub queries_dispatched: u64,
    pub queries_blocked: u64,
    pub queries_relayed: u64,
    pub relay_failures: u64,
    pub responses_written: u64,
    pub write_failures: u64,
}

/// Shared context handed to the read loop and each query task
struct LoopContext {
    device: Arc<dyn TunDevice>,
    write_lock: Mutex<()>,
    snapshot: SnapshotHandle,
    relay: UpstreamRelay,
    stats: Arc<FilterStats>,
}

/// The DNS filter session driver
///
/// Holds the capabilities handed in by the embedding application and runs
/// the dispatch loop while active. `start()`/`stop()` are the only control
/// surface; `is_active()` answers the app's "is the filter on" query.
pub struct DnsFilter {
    config: FilterConfig,
    provider: Arc<dyn TunProvider>,
    socket_factory: Arc<dyn ProtectedSocketFactory>,
    snapshot: SnapshotHandle,
    state: Arc<AtomicU8>,
    stats: Arc<FilterStats>,
    session: Mutex<Option<Session>>,
}

/// Live resources of one running session
struct Session {
    device: Arc<dyn TunDevice>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: JoinHandle<()>,
}

impl DnsFilter {
    /// Create a filter over the given capabilities
    ///
    /// `snapshot` is the handle the blocklist refresher writes into; the
    /// filter only reads it.
    pub fn new(
        config: FilterConfig,
        provider: Arc<dyn TunProvider>,
        socket_factory: Arc<dyn ProtectedSocketFactory>,
        snapshot: SnapshotHandle,
    ) -> Self {
        Self {
            config,
            provider,
            socket_factory,
            snapshot,
            state: Arc::new(AtomicU8::new(FilterState::Stopped as u8)),
            stats: Arc::new(FilterStats::default()),
            session: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> FilterState {
        FilterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True while the session is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == FilterState::Running
    }

    /// Session statistics
    #[must_use]
    pub fn stats(&self) -> FilterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start a filtering session
    ///
    /// Transitions `Stopped → Starting → Running`. If the virtual
    /// interface cannot be established the filter transitions straight
    /// back to `Stopped` and the failure is returned to the caller; no
    /// retry is attempted.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyRunning`] if a session is active, or
    /// [`SessionError::EstablishFailed`] from the provider.
    pub async fn start(&self) -> FilterResult<()> {
        // The session lock is held for the whole start sequence so a
        // concurrent stop() serializes behind it instead of observing a
        // half-started session
        let mut session = self.session.lock().await;

        self.state
            .compare_exchange(
                FilterState::Stopped as u8,
                FilterState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| SessionError::AlreadyRunning)?;

        let device = match self.provider.establish(&self.config.tun) {
            Ok(device) => Arc::from(device),
            Err(e) => {
                // Fail closed for the session: report upward, do not retry
                self.state
                    .store(FilterState::Stopped as u8, Ordering::SeqCst);
                warn!(error = %e, "virtual interface establishment failed");
                return Err(e.into());
            }
        };

        self.stats.reset();

        let relay = UpstreamRelay::new(
            Arc::clone(&self.socket_factory),
            self.config.upstream,
            self.config.relay_timeout(),
        );

        let context = Arc::new(LoopContext {
            device: Arc::clone(&device),
            write_lock: Mutex::new(()),
            snapshot: self.snapshot.clone(),
            relay,
            stats: Arc::clone(&self.stats),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mtu = usize::from(self.config.tun.mtu);
        let loop_handle = tokio::spawn(read_loop(context, shutdown_rx, mtu));

        *session = Some(Session {
            device,
            shutdown_tx,
            loop_handle,
        });
        self.state
            .store(FilterState::Running as u8, Ordering::SeqCst);

        info!(
            upstream = %self.config.upstream,
            tun = %self.config.tun.address,
            "dns filter running"
        );
        Ok(())
    }

    /// Stop the session
    ///
    /// Idempotent and safe to call from revoke and error paths. Signals
    /// the read loop, closes the device, and waits for the loop to exit.
    /// In-flight relay tasks are not cancelled; their late writes fail
    /// silently against the closed device.
    pub async fn stop(&self) {
        // Taking the lock first orders this stop after any start() in
        // flight, so a session that is mid-establishment is torn down
        // here rather than left running. While the lock is held the
        // state is never Starting.
        let mut session = self.session.lock().await;

        let current = self.state.load(Ordering::SeqCst);
        if current == FilterState::Stopped as u8 || current == FilterState::Stopping as u8 {
            return;
        }
        self.state
            .store(FilterState::Stopping as u8, Ordering::SeqCst);

        if let Some(session) = session.take() {
            let _ = session.shutdown_tx.send(true);
            session.device.close();
            let _ = session.loop_handle.await;
        }

        self.state
            .store(FilterState::Stopped as u8, Ordering::SeqCst);

        let stats = self.stats.snapshot();
        info!(
            received = stats.packets_received,
            blocked = stats.queries_blocked,
            relayed = stats.queries_relayed,
            "dns filter stopped"
        );
    }
}

impl std::fmt::Debug for DnsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsFilter")
            .field("state", &self.state())
            .field("upstream", &self.config.upstream)
            .finish_non_exhaustive()
    }
}

/// The device read loop
///
/// Owns exclusive read access. Exits when the shutdown signal fires; read
/// errors while shutting down are expected (the device is closed under
/// us) and end the loop quietly.
async fn read_loop(
    context: Arc<LoopContext>,
    mut shutdown_rx: watch::Receiver<bool>,
    mtu: usize,
) {
    let mut buf = vec![0u8; mtu];

    loop {
        let read = tokio::select! {
            read = context.device.read_packet(&mut buf) => read,
            _ = shutdown_rx.changed() => break,
        };

        match read {
            // Transient empty read; back off briefly and keep reading
            Ok(0) => tokio::time::sleep(READ_RETRY_DELAY).await,
            Ok(len) => {
                context.stats.packets_received.fetch_add(1, Ordering::Relaxed);
                dispatch_packet(&context, &buf[..len]);
            }
            Err(e) => {
                if *shutdown_rx.borrow() {
                    break;
                }
                debug!(error = %e, "device read failed, retrying");
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }

    trace!("read loop exited");
}

/// Parse one packet and, if it is a DNS query, hand it to a worker task
///
/// Everything that fails a parse step is dropped here with no response;
/// that is the whole error handling story for malformed input.
fn dispatch_packet(context: &Arc<LoopContext>, packet: &[u8]) {
    let Some(ip) = Ipv4Header::parse(packet) else {
        context.stats.packets_ignored.fetch_add(1, Ordering::Relaxed);
        return;
    };
    let Some(udp) = UdpHeader::parse(packet, &ip) else {
        context.stats.packets_ignored.fetch_add(1, Ordering::Relaxed);
        return;
    };
    if !udp.is_dns_query() {
        context.stats.packets_ignored.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let dns_start = ip.ihl + UDP_HEADER_LEN;
    let Some(question) = DnsQuestion::parse(packet, dns_start) else {
        context.stats.packets_ignored.fetch_add(1, Ordering::Relaxed);
        return;
    };

    context
        .stats
        .queries_dispatched
        .fetch_add(1, Ordering::Relaxed);

    // Fire and forget: the read loop's only obligation is to keep reading.
    // A panic inside the task is confined to this one query.
    let context = Arc::clone(context);
    let packet = packet.to_vec();
    let ihl = ip.ihl;
    tokio::spawn(async move {
        handle_query(&context, packet, ihl, dns_start, question).await;
    });
}

/// Decide and answer one DNS query
async fn handle_query(
    context: &LoopContext,
    packet: Vec<u8>,
    ihl: usize,
    dns_start: usize,
    question: DnsQuestion,
) {
    let snapshot = context.snapshot.load();

    let response = if snapshot.is_blocked(&question.name) {
        context.stats.queries_blocked.fetch_add(1, Ordering::Relaxed);
        debug!(domain = %question.name, "query blocked");
        Some(build_nxdomain(&packet, ihl))
    } else {
        match context.relay.relay(&packet, ihl, dns_start).await {
            Some(response) => {
                context.stats.queries_relayed.fetch_add(1, Ordering::Relaxed);
                trace!(domain = %question.name, "query relayed");
                Some(response)
            }
            None => {
                // The client's own retry covers this; nothing else to do
                context.stats.relay_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    };

    if let Some(response) = response {
        // Serialize writes: one frame at a time on the shared stream
        let _guard = context.write_lock.lock().await;
        match context.device.write_packet(&response).await {
            Ok(_) => {
                context
                    .stats
                    .responses_written
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                context.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "device write failed, response dropped");
            }
        }
    }
}
