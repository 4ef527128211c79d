pub mod cache;
pub mod completions;
pub mod eras;
pub mod feed;
pub mod users;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use histoire_core::config::HistoireConfig;
use histoire_core::directory::{
    DirectorySource, DirectoryStore, FileDirectoryStore, GitHubDirectory, LocalDirectory,
    MemoryDirectoryStore,
};
use histoire_core::error::ErrorCode;
use histoire_core::store::{ShardStore, StoreLocation, http_agent};
use tracing::debug;

use crate::output::{CliError, OutputMode, render_error};

/// Everything a command needs from configuration.
pub struct Context {
    pub config: HistoireConfig,
    pub output: OutputMode,
    pub quiet: bool,
    agent: ureq::Agent,
}

impl Context {
    pub fn new(config: HistoireConfig, output: OutputMode, quiet: bool) -> Self {
        let agent = http_agent(config.store.timeout(), &config.store.user_agent);
        Self {
            config,
            output,
            quiet,
            agent,
        }
    }

    pub fn shard_store(&self) -> Box<dyn ShardStore> {
        self.config.store.location().open(&self.agent)
    }

    /// Listing source matching the store: the contents API for a remote
    /// store, subdirectories for a local one.
    pub fn directory_source(&self) -> Box<dyn DirectorySource> {
        match self.config.store.location() {
            StoreLocation::Http(_) => Box::new(GitHubDirectory::new(
                self.agent.clone(),
                self.config.store.listing_url.clone(),
            )),
            StoreLocation::Dir(root) => Box::new(LocalDirectory::new(root)),
        }
    }

    /// Persistent listing cache, or an in-memory one when the platform has
    /// no cache directory.
    pub fn directory_store(&self) -> Box<dyn DirectoryStore> {
        match self.config.directory.resolved_cache_dir() {
            Some(dir) => {
                debug!(dir = %dir.display(), "using directory cache");
                Box::new(FileDirectoryStore::new(dir))
            }
            None => Box::new(MemoryDirectoryStore::default()),
        }
    }
}

/// Parse a command-line time: epoch seconds, RFC 3339, or a `YYYY-MM-DD`
/// date (midnight UTC).
pub fn parse_time(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.timestamp());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is not epoch seconds, RFC 3339 or YYYY-MM-DD"))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .map_or(0, |midnight| midnight.and_utc().timestamp()))
}

/// Parse an optional time flag, rendering a coded error on failure.
pub fn parse_time_flag(output: OutputMode, flag: &str, raw: Option<&str>) -> Result<Option<i64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match parse_time(raw) {
        Ok(secs) => Ok(Some(secs)),
        Err(err) => {
            render_error(
                output,
                &CliError::coded(ErrorCode::InvalidTimeRange, format!("--{flag}: {err:#}")),
            )?;
            Err(err.context(format!("invalid --{flag}")))
        }
    }
}

/// Epoch seconds as local wall-clock time.
pub fn format_local(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0).map_or_else(
        || secs.to_string(),
        |ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Epoch seconds as RFC 3339 in UTC, for text output.
pub fn format_utc(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |ts| ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_parse_directly() {
        assert_eq!(parse_time("1708012345").expect("epoch"), 1_708_012_345);
        assert_eq!(parse_time("-5").expect("negative epoch"), -5);
    }

    #[test]
    fn rfc3339_is_converted_to_epoch() {
        assert_eq!(parse_time("1970-01-02T00:00:00Z").expect("rfc3339"), 86_400);
        assert_eq!(parse_time("1970-01-01T01:00:00+01:00").expect("offset"), 0);
    }

    #[test]
    fn bare_date_is_midnight_utc() {
        assert_eq!(parse_time("1970-01-03").expect("date"), 172_800);
    }

    #[test]
    fn garbage_time_is_rejected() {
        let err = parse_time("last tuesday").expect_err("should fail");
        assert!(err.to_string().contains("last tuesday"));
    }

    #[test]
    fn utc_formatting_is_stable() {
        assert_eq!(format_utc(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn local_formatting_has_fixed_shape() {
        let shown = format_local(1_708_012_345);
        assert_eq!(shown.len(), "2024-02-15 15:52:25".len());
    }
}
