//! `hist users`: known users and their display names.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use histoire_core::directory::{DirectoryCache, ListingOrigin, RefreshOutcome, RefreshState};
use histoire_core::display::{DisplayName, display_names};
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct UsersArgs {
    /// Revalidate the cached listing against the store.
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Debug, Serialize)]
struct UsersView {
    users: Vec<DisplayName>,
    #[serde(flatten)]
    state: RefreshState,
    origin: ListingOrigin,
}

impl From<RefreshOutcome> for UsersView {
    fn from(outcome: RefreshOutcome) -> Self {
        Self {
            users: display_names(&outcome.users),
            state: outcome.state,
            origin: outcome.origin,
        }
    }
}

pub fn run_users(args: &UsersArgs, ctx: &Context) -> Result<()> {
    let source = ctx.directory_source();
    let cache_store = ctx.directory_store();
    let directory = DirectoryCache::new(
        source.as_ref(),
        cache_store.as_ref(),
        ctx.config.directory.sentinels.clone(),
        ctx.config.feed.default_user.clone(),
    );

    let outcome = if args.refresh {
        directory.refresh_users()
    } else {
        directory.get_users()
    };

    let view = UsersView::from(outcome);
    let quiet = ctx.quiet;
    render_mode(ctx.output, &view, render_text, |view, w| {
        render_pretty(view, quiet, w)
    })
}

fn state_label(state: &RefreshState) -> String {
    match state {
        RefreshState::Updated => "updated".to_string(),
        RefreshState::NotModified => "not modified".to_string(),
        RefreshState::Cached => "cached".to_string(),
        RefreshState::Failed { message } => format!("refresh failed: {message}"),
    }
}

const fn origin_label(origin: ListingOrigin) -> &'static str {
    match origin {
        ListingOrigin::Network => "store",
        ListingOrigin::Cache => "cache",
        ListingOrigin::Default => "default user",
    }
}

fn render_text(view: &UsersView, w: &mut dyn Write) -> io::Result<()> {
    for name in &view.users {
        writeln!(w, "{}\t{}", name.id, name.display)?;
    }
    Ok(())
}

fn render_pretty(view: &UsersView, quiet: bool, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Users ({})", view.users.len()))?;
    for name in &view.users {
        if name.display == name.id {
            writeln!(w, "  {}", name.id)?;
        } else {
            writeln!(w, "  {:<24} ({})", name.display, name.id)?;
        }
    }
    if !quiet {
        writeln!(w)?;
        pretty_kv(w, "listing", origin_label(view.origin))?;
        pretty_kv(w, "refresh", state_label(&view.state))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(users: &[&str], state: RefreshState, origin: ListingOrigin) -> UsersView {
        UsersView::from(RefreshOutcome {
            users: users.iter().map(|s| (*s).to_string()).collect(),
            state,
            origin,
        })
    }

    #[test]
    fn pretty_shows_short_names_with_ids() {
        let v = view(&["jonco:moz", "sfink"], RefreshState::Cached, ListingOrigin::Cache);
        let mut buf = Vec::new();
        render_pretty(&v, false, &mut buf).expect("render");
        let out = String::from_utf8(buf).expect("utf8");

        assert!(out.starts_with("Users (2)\n"));
        assert!(out.contains("jonco"));
        assert!(out.contains("(jonco:moz)"));
        assert!(out.contains("  sfink\n"));
        assert!(out.contains("cache"));
    }

    #[test]
    fn failed_refresh_is_reported() {
        let v = view(
            &["mrgiggles"],
            RefreshState::Failed {
                message: "HTTP 500".to_string(),
            },
            ListingOrigin::Default,
        );
        let mut buf = Vec::new();
        render_pretty(&v, false, &mut buf).expect("render");
        let out = String::from_utf8(buf).expect("utf8");
        assert!(out.contains("refresh failed: HTTP 500"));
        assert!(out.contains("default user"));
    }

    #[test]
    fn json_shape_has_state_tag() {
        let v = view(&["a:dom"], RefreshState::Updated, ListingOrigin::Network);
        let json = serde_json::to_value(&v).expect("serialize");
        assert_eq!(json["state"], "updated");
        assert_eq!(json["origin"], "network");
        assert_eq!(json["users"][0]["display"], "a");
    }
}
