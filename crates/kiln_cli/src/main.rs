//! Kiln CLI: operator commands for the kiln incremental build cache.
//!
//! Provides `kiln invalidate` for pruning cached pages, `kiln inspect` for
//! listing cache entries with their freshness, and `kiln deps` for showing
//! which templates a source page depends on.

#![warn(missing_docs)]

mod deps;
mod inspect;
mod invalidate;
mod logging;
mod pipeline;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Kiln, a static site generator with incremental rebuilds.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln static site generator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove cache entries matching a query; with no query, clear the cache.
    Invalidate(InvalidateArgs),
    /// List cache entries and when they go stale.
    Inspect(InspectArgs),
    /// Show the templates a source page depends on.
    Deps(DepsArgs),
}

/// Arguments for the `kiln invalidate` subcommand.
#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    /// Query terms, e.g. `tag:blog path:/docs glob:'/**/*.html' age:2weeks`.
    pub query: Vec<String>,

    /// Output format for the result.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `kiln inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Output format for the listing.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `kiln deps` subcommand.
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Page source file.
    pub source: String,

    /// Layout name, as a page would declare it in front matter.
    #[arg(long)]
    pub layout: Option<String>,
}

/// Output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    logging::init(&global);

    let result = match cli.command {
        Command::Invalidate(ref args) => invalidate::run(args, &global),
        Command::Inspect(ref args) => inspect::run(args, &global),
        Command::Deps(ref args) => deps::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
