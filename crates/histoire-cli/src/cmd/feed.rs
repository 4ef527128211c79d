//! `hist feed`: merged updates for one or more users.

use std::collections::BTreeSet;
use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use histoire_core::directory::DirectoryCache;
use histoire_core::era::{TimeRange, now_secs};
use histoire_core::feed::{
    self as pipeline, FeedQuery, FeedResult, FeedSession, FeedStatus, UserSelector,
};
use serde::Serialize;

use super::{Context, format_local, format_utc, parse_time_flag};
use crate::output::{
    CliError, pretty_kv, pretty_rule, pretty_section, render_error, render_mode,
};

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// User id, comma-separated ids, or `all`. Defaults to the configured user.
    pub selector: Option<String>,

    /// Window start: epoch seconds, RFC 3339, or YYYY-MM-DD. Defaults to one
    /// lookback before --end.
    #[arg(long)]
    pub start: Option<String>,

    /// Window end. Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Only show records posted to this channel (exact match, e.g. `#jsapi`).
    #[arg(long)]
    pub channel: Option<String>,

    /// Show at most this many records (newest first).
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct FeedView {
    #[serde(flatten)]
    result: FeedResult,
    sources: Vec<String>,
}

/// Build the query from flags and configuration.
pub fn build_query(args: &FeedArgs, ctx: &Context) -> Result<FeedQuery> {
    let start = parse_time_flag(ctx.output, "start", args.start.as_deref())?;
    let end = parse_time_flag(ctx.output, "end", args.end.as_deref())?;
    let range = TimeRange::resolve(start, end, now_secs(), ctx.config.feed.lookback_secs);

    let selector = args
        .selector
        .as_deref()
        .unwrap_or(ctx.config.feed.default_user.as_str());

    Ok(FeedQuery {
        selector: UserSelector::parse(selector),
        range,
        channel: args.channel.clone(),
    })
}

pub fn run_feed(args: &FeedArgs, ctx: &Context) -> Result<()> {
    let query = build_query(args, ctx)?;

    let store = ctx.shard_store();
    let source = ctx.directory_source();
    let cache_store = ctx.directory_store();
    let directory = DirectoryCache::new(
        source.as_ref(),
        cache_store.as_ref(),
        ctx.config.directory.sentinels.clone(),
        ctx.config.feed.default_user.clone(),
    );

    let session = FeedSession::new();
    let ticket = session.begin();
    let mut result = match pipeline::run_feed(
        store.as_ref(),
        &directory,
        &query,
        &ticket,
        ctx.config.feed.limits(),
    ) {
        Ok(result) => result,
        Err(err) => {
            render_error(ctx.output, &CliError::from(&err))?;
            return Err(anyhow::Error::new(err).context("feed query failed"));
        }
    };

    if let Some(limit) = args.limit {
        result.outcome.records.truncate(limit);
    }

    let sources = shard_links(&result, &ctx.config.store.edit_url);
    let view = FeedView { result, sources };
    let quiet = ctx.quiet;
    render_mode(ctx.output, &view, render_text, |view, w| {
        render_pretty(view, quiet, w)
    })
}

fn shard_links(result: &FeedResult, edit_url: &str) -> Vec<String> {
    result
        .outcome
        .records
        .iter()
        .map(|record| record.shard_link(edit_url))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn heading(status: &FeedStatus) -> String {
    match status {
        FeedStatus::NoUpdates => "No updates found!".to_string(),
        FeedStatus::Updates { label } => format!("Updates for {label}"),
    }
}

fn render_text(view: &FeedView, w: &mut dyn Write) -> io::Result<()> {
    if view.result.status == FeedStatus::NoUpdates {
        return writeln!(w, "{}", heading(&view.result.status));
    }
    for record in &view.result.outcome.records {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            record.when,
            format_utc(record.when),
            record.user,
            record.channel,
            record.message
        )?;
    }
    Ok(())
}

fn render_pretty(view: &FeedView, quiet: bool, w: &mut dyn Write) -> io::Result<()> {
    let result = &view.result;
    pretty_section(w, &heading(&result.status))?;

    for record in &result.outcome.records {
        let channel = if record.is_room() {
            format!("[{}]", record.channel)
        } else {
            record.channel.clone()
        };
        let line = format!(
            "{} - {} {} {}",
            format_local(record.when),
            record.user,
            channel,
            record.message
        );
        writeln!(w, "{}", line.trim_end())?;
    }

    if result.status != FeedStatus::NoUpdates && result.outcome.records.is_empty() {
        writeln!(w, "(no records in range)")?;
    }

    if quiet {
        return Ok(());
    }

    pretty_rule(w)?;
    pretty_kv(
        w,
        "window",
        format!(
            "{} .. {}",
            format_local(result.range.start()),
            format_local(result.range.end())
        ),
    )?;
    pretty_kv(
        w,
        "shards",
        format!(
            "{} found / {} fetched",
            result.outcome.found, result.outcome.attempted
        ),
    )?;
    for source in &view.sources {
        pretty_kv(w, "edit", source)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use histoire_core::aggregate::QueryOutcome;
    use histoire_core::record::Record;

    fn view(records: Vec<Record>, found: usize) -> FeedView {
        let status = if found == 0 {
            FeedStatus::NoUpdates
        } else {
            FeedStatus::Updates {
                label: "sfink".to_string(),
            }
        };
        let result = FeedResult {
            users: vec!["sfink".to_string()],
            range: TimeRange::new(0, 10),
            channel: None,
            status,
            outcome: QueryOutcome {
                attempted: 1,
                found,
                records,
            },
        };
        let sources = shard_links(&result, "https://edit.test/users");
        FeedView { result, sources }
    }

    fn record(when: i64, channel: &str, message: &str) -> Record {
        Record {
            user: "sfink".to_string(),
            era: 0,
            when,
            channel: channel.to_string(),
            message: message.to_string(),
        }
    }

    fn pretty(view: &FeedView, quiet: bool) -> String {
        let mut buf = Vec::new();
        render_pretty(view, quiet, &mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn pretty_marks_rooms_and_lists_sources() {
        let v = view(vec![record(5, "#jsapi", "landed"), record(3, "irc", "")], 1);
        let out = pretty(&v, false);
        assert!(out.starts_with("Updates for sfink\n"));
        assert!(out.contains(" - sfink [#jsapi] landed\n"));
        assert!(out.contains(" - sfink irc\n"));
        assert!(out.contains("https://edit.test/users/sfink/sfink.0.txt"));
        assert_eq!(v.sources.len(), 1);
    }

    #[test]
    fn pretty_no_updates_heading() {
        let out = pretty(&view(Vec::new(), 0), true);
        assert!(out.starts_with("No updates found!\n"));
        assert!(!out.contains("shards:"));
    }

    #[test]
    fn found_but_filtered_out_is_not_no_updates() {
        let out = pretty(&view(Vec::new(), 1), true);
        assert!(out.starts_with("Updates for sfink"));
        assert!(out.contains("(no records in range)"));
    }

    #[test]
    fn text_rows_are_tab_separated() {
        let mut buf = Vec::new();
        render_text(&view(vec![record(5, "#jsapi", "two words")], 1), &mut buf).expect("render");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "5\t1970-01-01T00:00:05+00:00\tsfink\t#jsapi\ttwo words\n"
        );
    }
}
