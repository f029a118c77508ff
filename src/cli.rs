//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use hysetter_core::config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_RATE_LIMIT_MS};

/// Fetch and subset hydroclimate data for an area of interest.
///
/// HySetter reads a YAML config naming the area of interest and the data
/// categories to fetch, then writes every dataset under the project
/// directory. Files that already exist are reused.
#[derive(Parser, Debug)]
#[command(name = "hysetter")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the project configuration file
    #[arg(value_name = "CONFIG_YML")]
    pub config: PathBuf,

    /// Remove the existing project directory before fetching
    #[arg(long)]
    pub overwrite: bool,

    /// Print the resolved plan without fetching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum data categories fetched at once (1-16)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: u8,

    /// Maximum attempts per request for transient failures (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: u8,

    /// Minimum delay between requests to the same host in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, default_value_t = DEFAULT_RATE_LIMIT_MS, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: u64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
