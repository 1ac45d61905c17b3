//! Block rules, schedules, matching, and snapshots
//!
//! The blocklist itself is owned by an external store (the host
//! application's database and UI). This module holds the read side:
//!
//! - [`types`]: [`BlockRule`] and its [`Schedule`] descriptor
//! - [`matcher`]: domain normalization and the schedule-gated match
//! - [`snapshot`]: the immutable [`BlocklistSnapshot`] and its lock-free
//!   [`SnapshotHandle`], refreshed from the store's push stream

pub mod matcher;
pub mod snapshot;
pub mod types;

pub use matcher::normalize_domain;
pub use snapshot::{spawn_refresher, BlocklistSnapshot, SnapshotHandle};
pub use types::{BlockRule, Schedule, ScheduleKind};
