//! Configuration types for the DNS filter
//!
//! Configuration is deliberately small: the filter carries a handful of
//! protocol constants (device addressing, upstream resolver, timeouts)
//! that form the implicit contract with the OS collaborator, plus logging
//! settings. Values can be loaded from a JSON file or built in code with
//! the `with_*` methods.
//!
//! # Example
//!
//! ```
//! use dnsgate::config::FilterConfig;
//!
//! let config = FilterConfig::default()
//!     .with_upstream("1.1.1.1:53".parse().unwrap())
//!     .with_relay_timeout_ms(2000);
//! config.validate().unwrap();
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Port the filter listens for (DNS)
pub const DNS_PORT: u16 = 53;

/// Default address assigned to the virtual interface
pub const DEFAULT_TUN_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// Default DNS server address advertised to the OS
///
/// Only this /32 is routed through the device, so the filter sees DNS
/// traffic and nothing else.
pub const DEFAULT_DNS_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

/// Default upstream resolver the relay forwards real queries to
pub const DEFAULT_UPSTREAM: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), DNS_PORT);

/// Default device MTU
pub const DEFAULT_MTU: u16 = 1500;

/// Default relay receive timeout in milliseconds
pub const DEFAULT_RELAY_TIMEOUT_MS: u64 = 3000;

/// Virtual interface configuration
///
/// Passed to the external [`TunProvider`](crate::tun::TunProvider) when a
/// session starts. The provider is expected to assign `address`, advertise
/// `dns_server` to the OS, route only the `dns_server` /32 through the
/// device, and exclude this application's own traffic (loop prevention).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunConfig {
    /// Address assigned to the device
    #[serde(default = "default_tun_address")]
    pub address: Ipv4Addr,

    /// Prefix length for the device address
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,

    /// DNS server address advertised to the OS (routed as a /32)
    #[serde(default = "default_dns_address")]
    pub dns_server: Ipv4Addr,

    /// Device MTU
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_tun_address() -> Ipv4Addr {
    DEFAULT_TUN_ADDRESS
}

fn default_prefix_len() -> u8 {
    24
}

fn default_dns_address() -> Ipv4Addr {
    DEFAULT_DNS_ADDRESS
}

fn default_mtu() -> u16 {
    DEFAULT_MTU
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_TUN_ADDRESS,
            prefix_len: 24,
            dns_server: DEFAULT_DNS_ADDRESS,
            mtu: DEFAULT_MTU,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LogConfig {
    /// Initialize the global tracing subscriber from this configuration
    ///
    /// Intended to be called once by the embedding application. Returns
    /// quietly if a subscriber is already installed (useful in tests).
    pub fn init(&self) {
        let level = match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        let filter = EnvFilter::from_default_env().add_directive(level.into());
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

        let result = if self.format == "json" {
            subscriber.json().try_init()
        } else {
            subscriber.try_init()
        };
        // A pre-installed subscriber is fine; keep whatever is there.
        drop(result);
    }
}

/// Top-level filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Virtual interface settings
    #[serde(default)]
    pub tun: TunConfig,

    /// Upstream resolver for relayed queries
    #[serde(default = "default_upstream")]
    pub upstream: SocketAddr,

    /// Relay receive timeout in milliseconds
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

fn default_upstream() -> SocketAddr {
    DEFAULT_UPSTREAM
}

fn default_relay_timeout_ms() -> u64 {
    DEFAULT_RELAY_TIMEOUT_MS
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            tun: TunConfig::default(),
            upstream: DEFAULT_UPSTREAM,
            relay_timeout_ms: DEFAULT_RELAY_TIMEOUT_MS,
            log: LogConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Set the upstream resolver address
    #[must_use]
    pub fn with_upstream(mut self, upstream: SocketAddr) -> Self {
        self.upstream = upstream;
        self
    }

    /// Set the relay receive timeout in milliseconds
    #[must_use]
    pub fn with_relay_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.relay_timeout_ms = timeout_ms;
        self
    }

    /// Set the virtual interface configuration
    #[must_use]
    pub fn with_tun(mut self, tun: TunConfig) -> Self {
        self.tun = tun;
        self
    }

    /// Relay timeout as a [`Duration`]
    #[must_use]
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if the path does not exist,
    /// [`ConfigError::Parse`] on malformed JSON, and a validation error if
    /// the parsed values are out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let data = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_timeout_ms == 0 {
            return Err(ConfigError::field(
                "relay timeout must be greater than zero",
                "relay_timeout_ms",
            ));
        }
        if self.tun.mtu < 576 {
            return Err(ConfigError::field(
                format!("MTU {} below IPv4 minimum reassembly size", self.tun.mtu),
                "tun.mtu",
            ));
        }
        if self.tun.prefix_len > 32 {
            return Err(ConfigError::field(
                format!("invalid prefix length {}", self.tun.prefix_len),
                "tun.prefix_len",
            ));
        }
        Ok(())
    }
}
