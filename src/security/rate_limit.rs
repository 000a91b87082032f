//! Fixed-window, per-identifier request counting.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use crate::clock::Clock;

/// Requests allowed per window when the caller does not pick a limit.
/// Also the fixed basis for [`RateLimiter::get_info`].
pub const DEFAULT_LIMIT: u32 = 60;

/// Length of one counting window.
pub const WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct RateRecord {
    count: u32,
    reset_at: u64,
}

/// Remaining quota for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Requests left in the current window, measured against [`DEFAULT_LIMIT`].
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_at: u64,
}

/// In-memory fixed-window rate limiter.
///
/// Each identifier gets a record on first sight; the record is reset when a
/// request arrives after its window has ended, and is otherwise incremented.
/// Records are never evicted implicitly, so the table grows with the number
/// of distinct identifiers seen; call [`purge_expired`](Self::purge_expired)
/// from a housekeeping task if that matters.
///
/// The limiter is meant to be built once by the composition root and
/// shared through an `Arc`. Each check runs under the record's shard lock,
/// so concurrent requests for the same identifier never lose an increment.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use edgekit::clock::ManualClock;
/// use edgekit::security::RateLimiter;
///
/// let limiter = RateLimiter::new(Arc::new(ManualClock::new(0)));
/// assert!(!limiter.is_limited("1.2.3.4", 2));
/// assert!(!limiter.is_limited("1.2.3.4", 2));
/// assert!(limiter.is_limited("1.2.3.4", 2));
/// assert_eq!(limiter.get_info("1.2.3.4").remaining, 57);
/// ```
pub struct RateLimiter {
    records: DashMap<String, RateRecord>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Counts one request for `identifier` and reports whether it exceeds `limit`.
    ///
    /// The first request of a window is never limited. Within a window the
    /// count is incremented before comparing, so request number `limit` is
    /// still allowed and request `limit + 1` is the first rejected.
    pub fn is_limited(&self, identifier: &str, limit: u32) -> bool {
        let now = self.clock.now_millis();
        let fresh = RateRecord {
            count: 1,
            reset_at: now + WINDOW_MS,
        };

        match self.records.entry(identifier.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                false
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if now > record.reset_at {
                    *record = fresh;
                    return false;
                }
                record.count = record.count.saturating_add(1);
                record.count > limit
            }
        }
    }

    /// Returns remaining quota and window end for `identifier` without recording anything.
    ///
    /// `remaining` is always computed against [`DEFAULT_LIMIT`], whatever
    /// limit the caller passes to [`is_limited`](Self::is_limited). An
    /// unknown identifier reports a full quota and a window ending
    /// [`WINDOW_MS`] from now.
    pub fn get_info(&self, identifier: &str) -> RateLimitInfo {
        match self.records.get(identifier) {
            Some(record) => RateLimitInfo {
                remaining: DEFAULT_LIMIT.saturating_sub(record.count),
                reset_at: record.reset_at,
            },
            None => RateLimitInfo {
                remaining: DEFAULT_LIMIT,
                reset_at: self.clock.now_millis() + WINDOW_MS,
            },
        }
    }

    /// Number of identifiers currently tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops records whose window has already ended and returns how many went.
    ///
    /// A dropped identifier behaves exactly as a rolled-over one on its next
    /// request, so this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.records.len();
        self.records.retain(|_, record| now <= record.reset_at);
        before.saturating_sub(self.records.len())
    }
}
