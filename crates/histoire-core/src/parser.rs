//! Shard line parser.
//!
//! # Line format
//!
//! ```text
//! <when> SP <channel> [SP <message>] \n
//! ```
//!
//! - `when` is an integer count of epoch seconds.
//! - `channel` is a single token; `#name` denotes a room.
//! - `message` is everything after the second space and may contain any
//!   character except newline.
//! - Blank and whitespace-only lines are skipped.
//!
//! A line that does not match this shape fails the whole shard. Malformed
//! data is reported, never silently dropped.

use std::fmt;

use tracing::trace;

use crate::era::TimeRange;
use crate::record::Record;

/// Why a single shard line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// The line has no space after the timestamp.
    MissingChannel,
    /// The timestamp token is not an integer.
    InvalidTimestamp(String),
    /// Timestamp or channel token is empty (doubled separator).
    EmptyField(&'static str),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingChannel => write!(f, "expected `<when> <channel> <message>`"),
            Self::InvalidTimestamp(raw) => write!(f, "invalid timestamp (not i64): '{raw}'"),
            Self::EmptyField(name) => write!(f, "empty {name} field"),
        }
    }
}

/// A malformed line, with its 1-indexed position in the shard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ShardParseError {
    pub line: usize,
    pub kind: LineError,
}

/// Fields of one line, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    pub when: i64,
    pub channel: &'a str,
    pub message: &'a str,
}

/// Split a non-blank line into its fields.
///
/// # Errors
///
/// Returns [`LineError`] if the line does not match the record shape.
pub fn parse_line(line: &str) -> Result<RawLine<'_>, LineError> {
    let Some((when_raw, rest)) = line.split_once(' ') else {
        return Err(LineError::MissingChannel);
    };
    if when_raw.is_empty() {
        return Err(LineError::EmptyField("when"));
    }
    let when: i64 = when_raw
        .parse()
        .map_err(|_| LineError::InvalidTimestamp(when_raw.to_string()))?;

    let (channel, message) = rest.split_once(' ').unwrap_or((rest, ""));
    if channel.is_empty() {
        return Err(LineError::EmptyField("channel"));
    }

    Ok(RawLine {
        when,
        channel,
        message,
    })
}

/// Parse a shard body into the records that fall inside `range`.
///
/// Records keep their on-disk order.
///
/// # Errors
///
/// Returns [`ShardParseError`] on the first malformed line.
pub fn parse_shard(
    raw: &str,
    user: &str,
    era: i64,
    range: TimeRange,
) -> Result<Vec<Record>, ShardParseError> {
    let mut records = Vec::new();

    for (i, line) in raw.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }

        let fields = parse_line(line).map_err(|kind| ShardParseError { line: i + 1, kind })?;
        if !range.contains(fields.when) {
            trace!(user, era, when = fields.when, "record outside range");
            continue;
        }

        records.push(Record {
            user: user.to_string(),
            era,
            when: fields.when,
            channel: fields.channel.to_string(),
            message: fields.message.to_string(),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERA: i64 = 1_708_000_000;

    fn wide() -> TimeRange {
        TimeRange::new(0, i64::MAX)
    }

    #[test]
    fn parse_line_splits_three_fields() {
        let line = parse_line("1708012345 #jsapi reviewed the GC patch").expect("should parse");
        assert_eq!(line.when, 1_708_012_345);
        assert_eq!(line.channel, "#jsapi");
        assert_eq!(line.message, "reviewed the GC patch");
    }

    #[test]
    fn message_keeps_inner_spacing() {
        let line = parse_line("1 irc  two  spaces ").expect("should parse");
        assert_eq!(line.message, " two  spaces ");
    }

    #[test]
    fn message_may_be_absent() {
        let line = parse_line("1708012345 #jsapi").expect("should parse");
        assert_eq!(line.channel, "#jsapi");
        assert_eq!(line.message, "");
    }

    #[test]
    fn bare_token_is_missing_channel() {
        assert_eq!(parse_line("1708012345"), Err(LineError::MissingChannel));
    }

    #[test]
    fn non_numeric_timestamp_is_rejected() {
        assert_eq!(
            parse_line("yesterday #a hi"),
            Err(LineError::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn doubled_separator_is_empty_channel() {
        assert_eq!(parse_line("17  hi"), Err(LineError::EmptyField("channel")));
        assert_eq!(parse_line(" #a hi"), Err(LineError::EmptyField("when")));
    }

    #[test]
    fn blank_only_shard_yields_nothing() {
        let records = parse_shard("\n\n   \n\r\n", "a", ERA, wide()).expect("should parse");
        assert!(records.is_empty());
    }

    #[test]
    fn empty_shard_yields_nothing() {
        let records = parse_shard("", "a", ERA, wide()).expect("should parse");
        assert!(records.is_empty());
    }

    #[test]
    fn records_keep_disk_order_and_origin() {
        let raw = "30 #b third\n10 #a first\n20 irc second\n";
        let records = parse_shard(raw, "sfink", ERA, wide()).expect("should parse");
        let whens: Vec<i64> = records.iter().map(|r| r.when).collect();
        assert_eq!(whens, vec![30, 10, 20]);
        assert!(records.iter().all(|r| r.user == "sfink" && r.era == ERA));
    }

    #[test]
    fn crlf_lines_are_accepted() {
        let records = parse_shard("5 #a hi\r\n6 #b yo\r\n", "a", ERA, wide()).expect("parse");
        assert_eq!(records[0].message, "hi");
        assert_eq!(records[1].message, "yo");
    }

    #[test]
    fn bounds_are_inclusive() {
        let raw = "99 #a below\n100 #a start\n150 #a middle\n200 #a end\n201 #a above\n";
        let records = parse_shard(raw, "a", 0, TimeRange::new(100, 200)).expect("parse");
        let whens: Vec<i64> = records.iter().map(|r| r.when).collect();
        assert_eq!(whens, vec![100, 150, 200]);
    }

    #[test]
    fn timestamps_compare_numerically_not_lexically() {
        // "99" > "100" as strings; numerically it is below the window.
        let raw = "99 #a short\n1000 #a long\n";
        let records = parse_shard(raw, "a", 0, TimeRange::new(100, 2000)).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].when, 1000);
    }

    // A malformed line fails the whole shard on purpose: records are never
    // silently skipped.
    #[test]
    fn malformed_line_fails_whole_shard() {
        let raw = "10 #a ok\ngarbage\n20 #a also ok\n";
        let err = parse_shard(raw, "a", ERA, wide()).expect_err("should fail");
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, LineError::MissingChannel);
        assert!(err.to_string().starts_with("line 2:"));
    }

    #[test]
    fn malformed_line_outside_range_still_fails() {
        let raw = "10 #a ok\nnope #a bad\n";
        let err = parse_shard(raw, "a", ERA, TimeRange::new(5, 15)).expect_err("should fail");
        assert!(matches!(err.kind, LineError::InvalidTimestamp(_)));
    }
}
