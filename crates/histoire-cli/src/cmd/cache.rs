//! `hist cache`: inspect or drop the persisted user listing.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use histoire_core::directory::{DirectoryEntry, DirectoryStore, FileDirectoryStore};
use histoire_core::error::ErrorCode;
use serde::Serialize;

use super::Context;
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show the cached listing and its freshness token.
    Show,
    /// Delete the cached listing; the next lookup refetches it.
    Clear,
}

#[derive(Debug, Serialize)]
struct CacheView {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<DirectoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleared: Option<bool>,
}

pub fn run_cache(command: &CacheCommand, ctx: &Context) -> Result<()> {
    let Some(dir) = ctx.config.directory.resolved_cache_dir() else {
        render_error(
            ctx.output,
            &CliError::coded(
                ErrorCode::DirectoryCacheWriteFailed,
                "no cache directory available on this platform",
            ),
        )?;
        anyhow::bail!("no cache directory; set directory.cache_dir or HISTOIRE_CACHE_DIR");
    };
    let store = FileDirectoryStore::new(dir);

    let result = match command {
        CacheCommand::Show => store.load().map(|entry| CacheView {
            path: store.path(),
            entry,
            cleared: None,
        }),
        CacheCommand::Clear => store.clear().map(|cleared| CacheView {
            path: store.path(),
            entry: None,
            cleared: Some(cleared),
        }),
    };

    let view = match result {
        Ok(view) => view,
        Err(err) => {
            render_error(ctx.output, &CliError::coded(err.code(), err.to_string()))?;
            return Err(anyhow::Error::new(err).context("directory cache"));
        }
    };

    render_mode(ctx.output, &view, render_text, render_pretty)
}

fn render_text(view: &CacheView, w: &mut dyn Write) -> io::Result<()> {
    if let Some(cleared) = view.cleared {
        let verb = if cleared { "cleared" } else { "empty" };
        return writeln!(w, "{verb}\t{}", view.path.display());
    }
    match view.entry {
        Some(ref entry) => {
            writeln!(
                w,
                "token\t{}",
                entry.freshness_token.as_deref().unwrap_or("-")
            )?;
            for user in &entry.users {
                writeln!(w, "user\t{user}")?;
            }
            Ok(())
        }
        None => writeln!(w, "empty\t{}", view.path.display()),
    }
}

fn render_pretty(view: &CacheView, w: &mut dyn Write) -> io::Result<()> {
    if let Some(cleared) = view.cleared {
        let msg = if cleared {
            "Directory cache cleared"
        } else {
            "Directory cache was already empty"
        };
        writeln!(w, "{msg}")?;
        return pretty_kv(w, "path", view.path.display().to_string());
    }

    pretty_section(w, "Directory cache")?;
    pretty_kv(w, "path", view.path.display().to_string())?;
    match view.entry {
        Some(ref entry) => {
            pretty_kv(
                w,
                "token",
                entry.freshness_token.as_deref().unwrap_or("(none)"),
            )?;
            pretty_kv(w, "users", entry.users.len().to_string())?;
            for user in &entry.users {
                writeln!(w, "  {user}")?;
            }
            Ok(())
        }
        None => pretty_kv(w, "users", "(not cached)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_show_lists_token_and_users() {
        let view = CacheView {
            path: PathBuf::from("/tmp/x/directory.json"),
            entry: Some(DirectoryEntry {
                users: vec!["a".to_string(), "b".to_string()],
                freshness_token: Some("\"e1\"".to_string()),
            }),
            cleared: None,
        };
        let mut buf = Vec::new();
        render_text(&view, &mut buf).expect("render");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "token\t\"e1\"\nuser\ta\nuser\tb\n"
        );
    }

    #[test]
    fn text_clear_reports_outcome() {
        let view = CacheView {
            path: PathBuf::from("/tmp/x/directory.json"),
            entry: None,
            cleared: Some(false),
        };
        let mut buf = Vec::new();
        render_text(&view, &mut buf).expect("render");
        assert!(String::from_utf8(buf).expect("utf8").starts_with("empty\t"));
    }
}
