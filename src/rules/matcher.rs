//! Domain normalization and the schedule-gated block decision
//!
//! Matching is deliberately permissive. A rule's pattern blocks the exact
//! domain, any subdomain of it, and any domain merely containing it as a
//! substring. The substring case exists to catch CDN-hosted variants of a
//! blocked site and is known to over-block (a pattern of "art" matches
//! "smart.io"). That is carried behavior, not a bug to fix here.

use chrono::{Local, NaiveDateTime};

use super::snapshot::BlocklistSnapshot;

/// Mirror prefixes stripped before matching, checked in this order
///
/// At most one prefix is stripped; the first match wins. These cover the
/// common mobile/AMP mirrors of a site so "www.example.com" and
/// "m.example.com" both hit a rule for "example.com".
const MIRROR_PREFIXES: [&str; 6] = ["www.", "m.", "mobile.", "amp.", "web.", "touch."];

/// Normalize a domain for matching
///
/// Lower-cases, strips a trailing dot (FQDN form), and removes at most one
/// known mirror prefix. Idempotent: normalizing an already-normalized
/// domain returns it unchanged.
///
/// # Example
///
/// ```
/// use dnsgate::rules::normalize_domain;
///
/// assert_eq!(normalize_domain("WWW.Example.COM."), "example.com");
/// assert_eq!(normalize_domain("example.com"), "example.com");
/// ```
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.to_ascii_lowercase();
    let trimmed = lowered.trim_end_matches('.');

    for prefix in MIRROR_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    trimmed.to_string()
}

impl BlocklistSnapshot {
    /// Decide whether `domain` is blocked right now
    ///
    /// Convenience wrapper over [`is_blocked_at`](Self::is_blocked_at)
    /// using the local wall clock.
    #[must_use]
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.is_blocked_at(domain, Local::now().naive_local())
    }

    /// Decide whether `domain` is blocked at the given local time
    ///
    /// A rule matches when it is enabled, its schedule window covers `now`,
    /// and the normalized domain equals the pattern, is a subdomain of it,
    /// or contains it as a substring. Any active match suffices; there is
    /// no precedence between rules. Schedule gating is authoritative: a
    /// textually matching rule whose window is closed never blocks.
    #[must_use]
    pub fn is_blocked_at(&self, domain: &str, now: NaiveDateTime) -> bool {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return false;
        }

        self.rules().values().any(|rule| {
            if !rule.schedule.is_active_at(now) {
                return false;
            }
            let pattern = normalize_domain(&rule.pattern);
            if pattern.is_empty() {
                return false;
            }
            domain == pattern
                || domain.ends_with(&format!(".{pattern}"))
                || domain.contains(pattern.as_str())
        })
    }
}
