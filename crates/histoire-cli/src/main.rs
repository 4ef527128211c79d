#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use histoire_core::config::load_config;
use histoire_core::error::ErrorCode;
use histoire_core::timing;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "hist",
    author,
    version,
    about = "histoire: merged feeds of era-sharded status updates",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Read configuration from this file instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "Show merged updates",
        long_about = "Fetch every shard the selected users wrote in the time window, \
                      merge them and print the records newest first.",
        after_help = "EXAMPLES:\n    # Last week for the configured user\n    hist feed\n\n    # Two users, one channel, since a date\n    hist feed sfink,jonco --channel '#jsapi' --start 2024-02-01\n\n    # Everyone, machine-readable\n    hist feed all --json"
    )]
    Feed(cmd::feed::FeedArgs),

    #[command(
        next_help_heading = "Read",
        about = "List known users",
        after_help = "EXAMPLES:\n    # Cached listing\n    hist users\n\n    # Revalidate against the store\n    hist users --refresh"
    )]
    Users(cmd::users::UsersArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the eras a time window covers",
        after_help = "EXAMPLES:\n    # Eras for the default lookback\n    hist eras\n\n    # Where sfink's shards live for a window\n    hist eras --start 2024-02-01 --end 2024-02-20 --user sfink"
    )]
    Eras(cmd::eras::ErasArgs),

    #[command(next_help_heading = "Maintenance", about = "Inspect or clear the user listing cache")]
    Cache {
        #[command(subcommand)]
        command: cmd::cache::CacheCommand,
    },

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    hist completions bash > ~/.local/share/bash-completion/completions/hist"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Default filter when `HISTOIRE_LOG` is unset. Covers the library crate
/// and the `hist` binary itself.
const fn default_log_directives(debug: bool) -> &'static str {
    if debug {
        "histoire_core=debug,hist=debug,info"
    } else {
        "histoire_core=info,hist=info,warn"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("HISTOIRE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(default_log_directives(
            verbose || env::var("DEBUG").is_ok(),
        ))
    });

    let format = env::var("HISTOIRE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear_timings();

    let output = cli.output_mode();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            render_error(
                output,
                &CliError::coded(ErrorCode::ConfigParseError, format!("{err:#}")),
            )?;
            return Err(err);
        }
    };
    debug!(store = %config.store.url, "configuration loaded");

    let ctx = cmd::Context::new(config, output, cli.quiet);

    let command_result = match cli.command {
        Commands::Feed(ref args) => timing::timed("cmd.feed", || cmd::feed::run_feed(args, &ctx)),
        Commands::Users(ref args) => {
            timing::timed("cmd.users", || cmd::users::run_users(args, &ctx))
        }
        Commands::Eras(ref args) => timing::timed("cmd.eras", || cmd::eras::run_eras(args, &ctx)),
        Commands::Cache { ref command } => {
            timing::timed("cmd.cache", || cmd::cache::run_cache(command, &ctx))
        }
        Commands::Completions(ref args) => timing::timed("cmd.completions", || {
            cmd::completions::run_completions(args)
        }),
    };

    if timing_enabled {
        let report = timing::collect_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    command_result
}
