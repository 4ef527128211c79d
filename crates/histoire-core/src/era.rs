//! Era arithmetic.
//!
//! Shards are addressed by fixed-width buckets of epoch seconds. A record
//! written at time `t` lives in the shard for `era_of(t)`. Changing
//! [`ERA_SECONDS`] re-addresses every historical shard, so it is a
//! compatibility constant rather than a setting.

use serde::Serialize;

/// Width of one era in seconds.
pub const ERA_SECONDS: i64 = 1_000_000;

/// Default lookback when a query gives no start time.
pub const DEFAULT_LOOKBACK_SECS: i64 = 60 * 60 * 24 * 7;

/// Bucket containing `t`.
///
/// Uses euclidean remainder, so times before the epoch floor to the bucket
/// below rather than rounding toward zero. The lowest bucket start is not
/// representable; times in it saturate to `i64::MIN`.
#[must_use]
pub const fn era_of(t: i64) -> i64 {
    t.saturating_sub(t.rem_euclid(ERA_SECONDS))
}

/// Buckets covering `[start, end]`, newest first.
///
/// Does not validate ordering: callers normalize with [`TimeRange::new`]
/// first. With `end < start` the sequence is empty unless both times share
/// a bucket.
#[must_use]
pub fn eras_covering(start: i64, end: i64) -> Vec<i64> {
    let first = era_of(start);
    let mut eras = Vec::new();
    let mut era = era_of(end);
    while era >= first {
        eras.push(era);
        match era.checked_sub(ERA_SECONDS) {
            Some(next) => era = next,
            None => break,
        }
    }
    eras
}

/// Number of buckets [`eras_covering`] yields for `[start, end]`, without
/// building them. Saturates at `usize::MAX`.
#[must_use]
pub fn era_count(start: i64, end: i64) -> usize {
    let first = i128::from(era_of(start));
    let last = i128::from(era_of(end));
    if last < first {
        return 0;
    }
    let count = (last - first) / i128::from(ERA_SECONDS) + 1;
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// Inclusive `[start, end]` window in epoch seconds.
///
/// Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    start: i64,
    end: i64,
}

impl TimeRange {
    /// Build a range, clamping a degenerate `end < start` to `end = start`.
    #[must_use]
    pub const fn new(start: i64, end: i64) -> Self {
        let end = if end < start { start } else { end };
        Self { start, end }
    }

    /// Fill in missing bounds the way the feed always has: `end` defaults to
    /// `now` and `start` to `lookback` seconds before `end`.
    #[must_use]
    pub const fn resolve(start: Option<i64>, end: Option<i64>, now: i64, lookback: i64) -> Self {
        let end = match end {
            Some(end) => end,
            None => now,
        };
        let start = match start {
            Some(start) => start,
            None => end.saturating_sub(lookback),
        };
        Self::new(start, end)
    }

    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> i64 {
        self.end
    }

    /// Inclusive on both ends.
    #[must_use]
    pub const fn contains(&self, t: i64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Eras to fetch for this range, newest first.
    #[must_use]
    pub fn eras(&self) -> Vec<i64> {
        eras_covering(self.start, self.end)
    }

    /// Length of [`Self::eras`], computed without allocating.
    #[must_use]
    pub fn era_count(&self) -> usize {
        era_count(self.start, self.end)
    }
}

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
