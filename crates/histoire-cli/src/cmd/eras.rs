//! `hist eras`: shard buckets a time window touches.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use histoire_core::aggregate::ensure_plan_size;
use histoire_core::era::{ERA_SECONDS, TimeRange, now_secs};
use serde::Serialize;

use super::{Context, format_local, parse_time_flag};
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ErasArgs {
    /// Window start: epoch seconds, RFC 3339, or YYYY-MM-DD.
    #[arg(long)]
    pub start: Option<String>,

    /// Window end. Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Show where each era's shard lives for this user.
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Debug, Serialize)]
struct EraRow {
    era: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErasView {
    range: TimeRange,
    era_seconds: i64,
    eras: Vec<EraRow>,
}

pub fn run_eras(args: &ErasArgs, ctx: &Context) -> Result<()> {
    let start = parse_time_flag(ctx.output, "start", args.start.as_deref())?;
    let end = parse_time_flag(ctx.output, "end", args.end.as_deref())?;
    let range = TimeRange::resolve(start, end, now_secs(), ctx.config.feed.lookback_secs);

    if let Err(err) = ensure_plan_size(1, range.era_count(), ctx.config.feed.max_fetches) {
        render_error(ctx.output, &CliError::from(&err))?;
        return Err(anyhow::Error::new(err).context("era listing too large"));
    }

    let store = args.user.as_ref().map(|_| ctx.shard_store());
    let eras = range
        .eras()
        .into_iter()
        .map(|era| EraRow {
            era,
            shard: store
                .as_ref()
                .zip(args.user.as_deref())
                .map(|(store, user)| store.locate(user, era)),
        })
        .collect();

    let view = ErasView {
        range,
        era_seconds: ERA_SECONDS,
        eras,
    };
    render_mode(ctx.output, &view, render_text, render_pretty)
}

fn render_text(view: &ErasView, w: &mut dyn Write) -> io::Result<()> {
    for row in &view.eras {
        match row.shard {
            Some(ref shard) => writeln!(w, "{}\t{shard}", row.era)?,
            None => writeln!(w, "{}", row.era)?,
        }
    }
    Ok(())
}

fn render_pretty(view: &ErasView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Eras ({})", view.eras.len()))?;
    pretty_kv(w, "from", format_local(view.range.start()))?;
    pretty_kv(w, "to", format_local(view.range.end()))?;
    writeln!(w)?;
    for row in &view.eras {
        let span = format!(
            "{} .. {}",
            format_local(row.era),
            format_local(row.era.saturating_add(ERA_SECONDS - 1))
        );
        match row.shard {
            Some(ref shard) => writeln!(w, "  {:>12}  {span}  {shard}", row.era)?,
            None => writeln!(w, "  {:>12}  {span}", row.era)?,
        }
    }
    Ok(())
}
