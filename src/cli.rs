//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Build a dictionary from an online source.
///
/// Fetches the source documents named by a plugin, extracts
/// headword/definition entries from them and consolidates the result
/// into a clean glossary. Interrupted runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "dictforge")]
#[command(author, version, about)]
pub struct Args {
    /// Name of the source plugin to run
    pub plugin: String,

    /// Plugin option as key=value (repeatable)
    #[arg(long = "popts", value_name = "KEY=VALUE")]
    pub plugin_options: Vec<String>,

    /// Wipe the working directory and start from scratch
    #[arg(long)]
    pub reset: bool,

    /// Keep fetched payloads but redo extraction and consolidation
    #[arg(long)]
    pub force_reprocess: bool,

    /// Working directory (default: data/<plugin>)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Override the number of concurrent fetch workers (1-32)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub workers: Option<u8>,

    /// Skip the consolidation stage
    #[arg(long)]
    pub no_consolidate: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
