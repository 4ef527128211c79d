//! Feed queries: selector resolution, the full pipeline, and per-session
//! query generations.
//!
//! # Generations
//!
//! Every query takes a [`QueryTicket`] from its [`FeedSession`]. Starting a
//! new query supersedes all older tickets: their pending fetches are skipped
//! and their results can no longer be published, so a slow old query never
//! overwrites a newer one.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

use crate::aggregate::{FetchPlan, QueryOutcome, aggregate, ensure_plan_size};
use crate::directory::DirectoryCache;
use crate::era::TimeRange;
use crate::error::FeedError;
use crate::record::Record;
use crate::store::ShardStore;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Which users a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "users", rename_all = "snake_case")]
pub enum UserSelector {
    /// Every user in the directory.
    All,
    /// An explicit, de-duplicated list.
    Users(Vec<String>),
}

impl UserSelector {
    /// `""`, `all` and `*` select everyone; anything else is a comma list.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") || raw == "*" {
            return Self::All;
        }

        let mut users: Vec<String> = Vec::new();
        for user in raw.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            if !users.iter().any(|seen| seen == user) {
                users.push(user.to_string());
            }
        }

        if users.is_empty() {
            Self::All
        } else {
            Self::Users(users)
        }
    }

    /// Heading text for the feed.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Users(users) => users.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FeedQuery {
    pub selector: UserSelector,
    pub range: TimeRange,
    pub channel: Option<String>,
}

/// Sort newest first. Stable, so equal timestamps keep plan order.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| b.when.cmp(&a.when));
}

/// Keep only records whose channel equals `channel` exactly.
#[must_use]
pub fn filter_channel(records: Vec<Record>, channel: Option<&str>) -> Vec<Record> {
    match channel {
        None => records,
        Some(channel) => records
            .into_iter()
            .filter(|record| record.channel == channel)
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedStatus {
    /// No shard existed for any planned `(user, era)`.
    NoUpdates,
    Updates { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedResult {
    pub users: Vec<String>,
    pub range: TimeRange,
    pub channel: Option<String>,
    #[serde(flatten)]
    pub status: FeedStatus,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub max_fetches: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self { max_fetches: 512 }
    }
}

/// Run the whole pipeline for `query`.
///
/// # Errors
///
/// Propagates every [`FeedError`] from planning and aggregation. Directory
/// failures are not errors: they fall back inside [`DirectoryCache`].
pub fn run_feed<S>(
    store: &S,
    directory: &DirectoryCache<'_>,
    query: &FeedQuery,
    ticket: &QueryTicket,
    limits: FeedLimits,
) -> Result<FeedResult, FeedError>
where
    S: ShardStore + ?Sized,
{
    let users = match &query.selector {
        UserSelector::All => directory.get_users().users,
        UserSelector::Users(users) => users.clone(),
    };

    ensure_plan_size(users.len(), query.range.era_count(), limits.max_fetches)?;
    let eras = if users.is_empty() {
        Vec::new()
    } else {
        query.range.eras()
    };
    let plan = FetchPlan::new(&users, &eras);

    let mut outcome = aggregate(store, &plan, query.range, ticket)?;
    let records = std::mem::take(&mut outcome.records);
    outcome.records = filter_channel(records, query.channel.as_deref());
    sort_records(&mut outcome.records);

    let status = if outcome.found == 0 {
        FeedStatus::NoUpdates
    } else {
        FeedStatus::Updates {
            label: query.selector.label(),
        }
    };

    info!(
        selector = %query.selector.label(),
        users = users.len(),
        shards = plan.len(),
        records = outcome.records.len(),
        "feed built"
    );

    Ok(FeedResult {
        users,
        range: query.range,
        channel: query.channel.clone(),
        status,
        outcome,
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Handle for one query generation.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl QueryTicket {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a newer query has begun in the same session.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// Owner of query generations and the memoized last result.
#[derive(Debug, Default)]
pub struct FeedSession {
    current: Arc<AtomicU64>,
    last: Mutex<Option<(FeedQuery, FeedResult)>>,
}

impl FeedSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, superseding every older ticket.
    #[must_use]
    pub fn begin(&self) -> QueryTicket {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        QueryTicket {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    /// Store `result` as the answer to `query` if `ticket` is still current.
    /// Returns whether it was stored.
    #[must_use]
    pub fn publish(&self, ticket: &QueryTicket, query: &FeedQuery, result: &FeedResult) -> bool {
        if !ticket.is_current() {
            return false;
        }
        match self.last.lock() {
            Ok(mut last) => {
                *last = Some((query.clone(), result.clone()));
                true
            }
            Err(_) => false,
        }
    }

    /// Memoized result of an identical earlier query.
    #[must_use]
    pub fn cached(&self, query: &FeedQuery) -> Option<FeedResult> {
        let last = self.last.lock().ok()?;
        last.as_ref()
            .filter(|(previous, _)| previous == query)
            .map(|(_, result)| result.clone())
    }

    /// Forget the memoized result.
    pub fn invalidate(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}
