//! Concurrent shard fan-out.
//!
//! One scoped task per `(user, era)` pair, all in flight at once. The scope
//! is the barrier: every task settles before any result is looked at, so a
//! failing shard never leaves siblings running behind the caller's back.

use std::thread;

use serde::Serialize;
use tracing::{debug, info};

use crate::era::TimeRange;
use crate::error::FeedError;
use crate::feed::QueryTicket;
use crate::parser::parse_shard;
use crate::record::Record;
use crate::store::{ShardFetch, ShardStore};
use crate::timing;

/// One pending shard read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlanEntry {
    pub user: String,
    pub era: i64,
}

/// Ordered cross product of users and eras, user-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    entries: Vec<PlanEntry>,
}

impl FetchPlan {
    #[must_use]
    pub fn new(users: &[String], eras: &[i64]) -> Self {
        let entries = users
            .iter()
            .flat_map(|user| {
                eras.iter().map(move |&era| PlanEntry {
                    user: user.clone(),
                    era,
                })
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject plans larger than `limit` before anything is dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::PlanTooLarge`] when the plan exceeds `limit`.
    pub fn ensure_within(&self, limit: usize) -> Result<(), FeedError> {
        ensure_plan_size(self.entries.len(), 1, limit)
    }
}

/// Reject a `users x eras` plan larger than `limit` without building it.
///
/// An overflowing product counts as `usize::MAX`.
///
/// # Errors
///
/// Returns [`FeedError::PlanTooLarge`] when the product exceeds `limit`.
pub fn ensure_plan_size(users: usize, eras: usize, limit: usize) -> Result<(), FeedError> {
    let planned = users.checked_mul(eras).unwrap_or(usize::MAX);
    if planned > limit {
        return Err(FeedError::PlanTooLarge { planned, limit });
    }
    Ok(())
}

/// Everything a query gathered, before filtering and sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    /// Shard reads issued.
    pub attempted: usize,
    /// Shards that existed (possibly with no records in range).
    pub found: usize,
    /// Concatenation of every shard's records, in plan order.
    pub records: Vec<Record>,
}

enum Settled {
    Skipped,
    Absent,
    Found(Vec<Record>),
}

/// Fetch and parse every shard in `plan`.
///
/// # Errors
///
/// Returns the first failure in plan order once all tasks have settled:
/// a fetch error, a malformed shard, or a panicked task. Returns
/// [`FeedError::Superseded`] if `ticket` went stale during the run.
pub fn aggregate<S>(
    store: &S,
    plan: &FetchPlan,
    range: TimeRange,
    ticket: &QueryTicket,
) -> Result<QueryOutcome, FeedError>
where
    S: ShardStore + ?Sized,
{
    let settled: Vec<(&PlanEntry, thread::Result<Result<Settled, FeedError>>)> =
        thread::scope(|scope| {
            let handles: Vec<_> = plan
                .entries()
                .iter()
                .map(|entry| {
                    let handle = scope.spawn(move || fetch_one(store, entry, range, ticket));
                    (entry, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(entry, handle)| (entry, handle.join()))
                .collect()
        });

    if !ticket.is_current() {
        debug!(generation = ticket.generation(), "query superseded, discarding results");
        return Err(FeedError::Superseded {
            generation: ticket.generation(),
        });
    }

    let mut outcome = QueryOutcome {
        attempted: plan.len(),
        ..QueryOutcome::default()
    };
    for (entry, joined) in settled {
        let result = joined.map_err(|_| FeedError::TaskPanicked {
            user: entry.user.clone(),
            era: entry.era,
        })?;
        match result? {
            Settled::Skipped | Settled::Absent => {}
            Settled::Found(records) => {
                outcome.found += 1;
                outcome.records.extend(records);
            }
        }
    }

    info!(
        attempted = outcome.attempted,
        found = outcome.found,
        records = outcome.records.len(),
        "aggregation complete"
    );
    Ok(outcome)
}

fn fetch_one<S>(
    store: &S,
    entry: &PlanEntry,
    range: TimeRange,
    ticket: &QueryTicket,
) -> Result<Settled, FeedError>
where
    S: ShardStore + ?Sized,
{
    if !ticket.is_current() {
        return Ok(Settled::Skipped);
    }

    let fetched = timing::timed("shard.fetch", || store.fetch(&entry.user, entry.era))?;
    match fetched {
        ShardFetch::Absent => Ok(Settled::Absent),
        ShardFetch::Found(raw) => parse_shard(&raw, &entry.user, entry.era, range)
            .map(Settled::Found)
            .map_err(|source| FeedError::Parse {
                user: entry.user.clone(),
                era: entry.era,
                source,
            }),
    }
}
