//! Schemaguard Migration CLI Tool
//!
//! Runs the same contention-safe startup sequence a service runs, from a
//! shell or a CI/CD pipeline, and inspects the stored schema version.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use schemaguard::migration::DriverConfig;
use schemaguard::{
    CancelToken, MigrateConfig, MigrationSource, Migrator, PgPool, SchemaVersion, StartupJitter,
    UpOutcome,
};
use schemaguard_migrate::cli::{Cli, Commands};
use schemaguard_migrate::status::StatusReport;
use std::process;

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "Success".green());
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut cfg = MigrateConfig::load().context("loading migrate configuration")?;
    if let Ok(url) = cli.database_url() {
        cfg.database_url = Some(url);
    }
    let url = cfg.database_url.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "database URL not provided. Use --database-url or set SCHEMAGUARD_DATABASE_URL or DATABASE_URL"
        )
    })?;
    let pool = PgPool::new(url).context("invalid database URL")?;
    log::debug!("using database {:?} command={:?}", pool, cli.command);

    match cli.command {
        Commands::Up { no_jitter } => handle_up(cli, &cfg, &pool, no_jitter),
        Commands::Version => handle_version(&cfg, &pool),
        Commands::Status => handle_status(cli, &cfg, &pool),
    }
}

fn handle_up(cli: &Cli, cfg: &MigrateConfig, pool: &PgPool, no_jitter: bool) -> Result<()> {
    let mut migrator = Migrator::from_config(cli.migrations_dir.clone(), cfg)?;
    log::debug!(
        "startup policy driver_attempts={} migrate_attempts={} delay_ms={} no_jitter={}",
        cfg.driver_max_attempts,
        cfg.migrate_max_attempts,
        cfg.retry_delay_ms,
        no_jitter
    );
    if no_jitter {
        migrator = migrator.with_jitter(StartupJitter::none());
    }

    println!("Applying migrations from {}...", cli.migrations_dir.display());
    let outcome = migrator.up(&CancelToken::new(), Some(pool)).map_err(|e| {
        if e.is_contention() {
            eprintln!(
                "{}",
                "Another migrator held the lock for the whole retry window; try again later."
                    .yellow()
            );
        }
        e
    })?;
    match outcome {
        UpOutcome::NoChange => println!("No migrations to apply"),
        UpOutcome::Applied { from, to, count } => println!(
            "Applied {} migration(s): {} -> {}",
            count,
            from.map_or_else(|| "none".to_string(), |v| v.to_string()),
            to
        ),
    }
    Ok(())
}

fn handle_version(cfg: &MigrateConfig, pool: &PgPool) -> Result<()> {
    let current = read_version(cfg, pool)?;
    println!("{}", current);
    Ok(())
}

fn handle_status(cli: &Cli, cfg: &MigrateConfig, pool: &PgPool) -> Result<()> {
    let source = MigrationSource::from_dir(&cli.migrations_dir)
        .with_context(|| format!("loading {}", cli.migrations_dir.display()))?;
    let current = read_version(cfg, pool)?;

    print!("{}", StatusReport::build(&source, current).render());
    Ok(())
}

/// Read-only: never waits on the migration lock of a running migrator.
fn read_version(cfg: &MigrateConfig, pool: &PgPool) -> Result<SchemaVersion> {
    let config = DriverConfig::from(cfg);
    log::debug!(
        "reading schema version table={} schema={}",
        config.migrations_table,
        config.schema_name.as_deref().unwrap_or("<current>")
    );
    pool.current_version(&config)
        .context("reading schema version")
}
