use std::fmt;

use crate::lock::LockError;
use crate::parser::ShardParseError;
use crate::store::FetchError;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidTimeRange,
    ShardFetchFailed,
    ShardMalformed,
    PlanTooLarge,
    QuerySuperseded,
    DirectoryCacheCorrupt,
    DirectoryCacheWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidTimeRange => "E1002",
            Self::ShardFetchFailed => "E2001",
            Self::ShardMalformed => "E2002",
            Self::PlanTooLarge => "E2003",
            Self::QuerySuperseded => "E2004",
            Self::DirectoryCacheCorrupt => "E3001",
            Self::DirectoryCacheWriteFailed => "E3002",
            Self::LockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidTimeRange => "Invalid time range",
            Self::ShardFetchFailed => "Shard fetch failed",
            Self::ShardMalformed => "Malformed shard line",
            Self::PlanTooLarge => "Fetch plan too large",
            Self::QuerySuperseded => "Query superseded",
            Self::DirectoryCacheCorrupt => "Directory cache unreadable",
            Self::DirectoryCacheWriteFailed => "Directory cache write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and scripts.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in histoire/config.toml and retry."),
            Self::InvalidTimeRange => {
                Some("Pass --start/--end as epoch seconds, RFC 3339, or YYYY-MM-DD.")
            }
            Self::ShardFetchFailed => Some("Check the store URL and network, then retry."),
            Self::ShardMalformed => {
                Some("Each shard line must read `<when> <channel> <message>`.")
            }
            Self::PlanTooLarge => Some("Narrow the time range or select fewer users."),
            Self::QuerySuperseded => None,
            Self::DirectoryCacheCorrupt => Some("Run `hist cache clear` to drop the cache."),
            Self::DirectoryCacheWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => {
                Some("Retry after the other `hist` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Whole-query failures raised by the feed pipeline.
///
/// Absent shards never show up here; they are zero records, not errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A shard could not be fetched (non-404 status or transport failure).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A shard contained a line that does not match the record shape.
    #[error("{user}/{era}: {source}")]
    Parse {
        user: String,
        era: i64,
        #[source]
        source: ShardParseError,
    },

    /// The user × era cross product exceeds the configured limit.
    #[error("fetch plan has {planned} shards, limit is {limit}")]
    PlanTooLarge { planned: usize, limit: usize },

    /// A newer query started before this one finished.
    #[error("query generation {generation} was superseded")]
    Superseded { generation: u64 },

    /// A fetch task panicked before settling.
    #[error("fetch task for {user}/{era} panicked")]
    TaskPanicked { user: String, era: i64 },
}

impl FeedError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Fetch(_) => ErrorCode::ShardFetchFailed,
            Self::Parse { .. } => ErrorCode::ShardMalformed,
            Self::PlanTooLarge { .. } => ErrorCode::PlanTooLarge,
            Self::Superseded { .. } => ErrorCode::QuerySuperseded,
            Self::TaskPanicked { .. } => ErrorCode::InternalUnexpected,
        }
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::DirectoryCacheWriteFailed,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
