//! Block rule and schedule types
//!
//! A [`BlockRule`] pairs a domain pattern with a weekly time window. Rules
//! are owned by the external blocklist store; the filter only ever reads
//! them through an immutable snapshot.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Last minute of a day (23:59)
pub const MAX_MINUTE: u16 = 1439;

/// Day-of-week bitmask with all seven bits set
pub const ALL_DAYS: u8 = 0b0111_1111;

/// Monday through Friday
pub const WEEKDAYS: u8 = 0b0001_1111;

/// Which days a schedule's bitmask applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Active every day; the stored bitmask is ignored
    Everyday,
    /// Active Monday through Friday; the stored bitmask is ignored
    Weekdays,
    /// Active on the days set in the bitmask (bit 0 = Monday)
    Custom,
}

/// Weekly activation window for a block rule
///
/// The minute range is an inclusive local-time window. A window with
/// `start_minute > end_minute` does not wrap past midnight; it is simply
/// never active. That is the stored behavior and is preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Day selection mode
    pub kind: ScheduleKind,
    /// Day-of-week bitmask, bit 0 = Monday (used only for `Custom`)
    pub days: u8,
    /// First active minute of the day, 0..=1439
    pub start_minute: u16,
    /// Last active minute of the day, 0..=1439 (inclusive)
    pub end_minute: u16,
}

impl Schedule {
    /// A schedule that is active at all times
    #[must_use]
    pub fn always() -> Self {
        Self {
            kind: ScheduleKind::Everyday,
            days: ALL_DAYS,
            start_minute: 0,
            end_minute: MAX_MINUTE,
        }
    }

    /// A weekday schedule over the given inclusive minute window
    #[must_use]
    pub fn weekdays(start_minute: u16, end_minute: u16) -> Self {
        Self {
            kind: ScheduleKind::Weekdays,
            days: WEEKDAYS,
            start_minute,
            end_minute,
        }
    }

    /// A custom-day schedule over the given inclusive minute window
    #[must_use]
    pub fn custom(days: u8, start_minute: u16, end_minute: u16) -> Self {
        Self {
            kind: ScheduleKind::Custom,
            days,
            start_minute,
            end_minute,
        }
    }

    /// The effective day bitmask for this schedule
    #[must_use]
    pub fn effective_days(&self) -> u8 {
        match self.kind {
            ScheduleKind::Everyday => ALL_DAYS,
            ScheduleKind::Weekdays => WEEKDAYS,
            ScheduleKind::Custom => self.days & ALL_DAYS,
        }
    }

    /// Whether this schedule is active at the given local wall-clock time
    #[must_use]
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        let day_bit = 1u8 << weekday_index(now.weekday());
        if self.effective_days() & day_bit == 0 {
            return false;
        }

        let minute = (now.hour() * 60 + now.minute()) as u16;
        self.start_minute <= minute && minute <= self.end_minute
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::always()
    }
}

/// Bit index for a weekday, Monday = 0
fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8
}

/// One entry of the external blocklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    /// Domain or domain fragment to block, matched case-insensitively
    pub pattern: String,
    /// Whether the rule participates in matching at all
    pub enabled: bool,
    /// When the rule is active
    #[serde(default)]
    pub schedule: Schedule,
}

impl BlockRule {
    /// An always-active, enabled rule for `pattern`
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: true,
            schedule: Schedule::always(),
        }
    }

    /// Replace the rule's schedule
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Disable the rule
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
