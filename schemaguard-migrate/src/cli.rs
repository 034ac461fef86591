//! Command-line definition.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Environment variables consulted for the database URL, in order.
pub const DATABASE_URL_VARS: [&str; 2] = ["SCHEMAGUARD_DATABASE_URL", "DATABASE_URL"];

#[derive(Debug, Parser)]
#[command(name = "schemaguard-migrate")]
#[command(about = "Startup migration tool for PostgreSQL services")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Database connection URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Migrations directory path
    #[arg(long, default_value = "migrations")]
    pub migrations_dir: PathBuf,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Apply pending migrations with the startup retry policy
    Up {
        /// Skip the random startup delay (single operator run)
        #[arg(long)]
        no_jitter: bool,
    },

    /// Print the stored schema version
    Version,

    /// Show applied and pending migrations
    Status,
}

impl Cli {
    /// Default `env_logger` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// `--database-url`, then the first of [`DATABASE_URL_VARS`] that is set.
    pub fn database_url_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        self.database_url
            .clone()
            .or_else(|| DATABASE_URL_VARS.iter().find_map(|var| lookup(var)))
            .ok_or_else(|| {
                anyhow!(
                    "database URL not provided. Use --database-url or set {} or {}",
                    DATABASE_URL_VARS[0],
                    DATABASE_URL_VARS[1]
                )
            })
    }

    pub fn database_url(&self) -> Result<String> {
        self.database_url_from(|var| std::env::var(var).ok())
    }
}
