//! dnsgate: DNS-intercepting traffic filter for a virtual network interface
//!
//! This crate implements the packet-level core of an on-device DNS filter.
//! Raw IP packets are read from a virtual network interface (TUN), parsed
//! down to the DNS question, and either answered with a spoofed NXDOMAIN
//! response (blocked domains) or relayed to a real upstream resolver with
//! full header and checksum reconstruction.
//!
//! # Architecture
//!
//! ```text
//! TUN device ──▶ read loop ──▶ IPv4/UDP/DNS parsers
//!                                   │
//!                                   ▼ (per query, spawned task)
//!                          blocklist snapshot
//!                            │            │
//!                        blocked       allowed
//!                            │            │
//!                            ▼            ▼
//!                     NXDOMAIN      upstream relay
//!                     synthesizer   (protected socket)
//!                            │            │
//!                            └─────┬──────┘
//!                                  ▼
//!                      serialized TUN write
//! ```
//!
//! # Scope
//!
//! Only UDP traffic destined to port 53 is intercepted; everything else on
//! the device is out of scope by design so non-DNS traffic pays no latency.
//! Encrypted DNS (DoH/DoT) bypasses the filter, and only IPv4 is parsed;
//! both are known limitations, not bugs.
//!
//! # Modules
//!
//! - [`config`]: Configuration types, loading, and logging setup
//! - [`engine`]: Session state machine and packet dispatch loop
//! - [`error`]: Error types
//! - [`packet`]: Wire-format parsers, checksum engine, response synthesizer
//! - [`relay`]: Upstream DNS relay over a protected socket
//! - [`rules`]: Block rules, schedules, matcher, and snapshot manager
//! - [`tun`]: Capability traits at the OS boundary

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod engine;
pub mod error;
pub mod packet;
pub mod relay;
pub mod rules;
pub mod tun;

// Re-export commonly used types at the crate root
pub use config::{FilterConfig, LogConfig, TunConfig};
pub use engine::{DnsFilter, FilterState, FilterStats, FilterStatsSnapshot};
pub use error::{ConfigError, FilterError, FilterResult, SessionError};
pub use relay::UpstreamRelay;
pub use rules::{BlockRule, BlocklistSnapshot, Schedule, ScheduleKind, SnapshotHandle};
pub use tun::{DirectSocketFactory, ProtectedSocketFactory, TunDevice, TunProvider};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
