//! Tests for argument parsing and database URL resolution

use clap::Parser;
use schemaguard_migrate::cli::{Cli, Commands};
use std::path::PathBuf;

#[test]
fn test_defaults() {
    let cli = Cli::try_parse_from(["schemaguard-migrate", "up"]).unwrap();
    assert_eq!(cli.command, Commands::Up { no_jitter: false });
    assert_eq!(cli.migrations_dir, PathBuf::from("migrations"));
    assert_eq!(cli.database_url, None);
    assert_eq!(cli.log_filter(), "info");
}

#[test]
fn test_global_flags_and_subcommands() {
    let cli = Cli::try_parse_from([
        "schemaguard-migrate",
        "--database-url",
        "postgres://app@localhost/app",
        "--migrations-dir",
        "db/migrations",
        "-v",
        "status",
    ])
    .unwrap();
    assert_eq!(cli.command, Commands::Status);
    assert_eq!(cli.migrations_dir, PathBuf::from("db/migrations"));
    assert_eq!(cli.log_filter(), "debug");

    let cli = Cli::try_parse_from(["schemaguard-migrate", "-q", "up", "--no-jitter"]).unwrap();
    assert_eq!(cli.command, Commands::Up { no_jitter: true });
    assert_eq!(cli.log_filter(), "error");

    let cli = Cli::try_parse_from(["schemaguard-migrate", "version"]).unwrap();
    assert_eq!(cli.command, Commands::Version);
}

#[test]
fn test_verbose_and_quiet_conflict() {
    assert!(Cli::try_parse_from(["schemaguard-migrate", "-v", "-q", "up"]).is_err());
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["schemaguard-migrate", "down"]).is_err());
}

#[test]
fn test_database_url_precedence() {
    let env = |var: &str| match var {
        "SCHEMAGUARD_DATABASE_URL" => Some("postgres://from-schemaguard-var".to_string()),
        "DATABASE_URL" => Some("postgres://from-generic-var".to_string()),
        _ => None,
    };

    let cli = Cli::try_parse_from(["schemaguard-migrate", "--database-url", "postgres://flag", "up"])
        .unwrap();
    assert_eq!(cli.database_url_from(env).unwrap(), "postgres://flag");

    let cli = Cli::try_parse_from(["schemaguard-migrate", "up"]).unwrap();
    assert_eq!(
        cli.database_url_from(env).unwrap(),
        "postgres://from-schemaguard-var"
    );

    let only_generic = |var: &str| (var == "DATABASE_URL").then(|| "postgres://generic".to_string());
    assert_eq!(cli.database_url_from(only_generic).unwrap(), "postgres://generic");

    let err = cli.database_url_from(|_| None).unwrap_err();
    assert!(err.to_string().contains("--database-url"));
}
