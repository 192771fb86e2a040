//! Tests for argument parsing.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_fetch_daily_defaults() {
    match parse(&["matchdl", "fetch-daily"]) {
        CliCommand::FetchDaily {
            api_limit,
            batch_size,
            dry_run,
        } => {
            assert!(api_limit.is_none());
            assert!(batch_size.is_none());
            assert!(!dry_run);
        }
        _ => panic!("expected FetchDaily"),
    }
}

#[test]
fn cli_parse_fetch_daily_short_flags() {
    match parse(&["matchdl", "fetch-daily", "-a", "300", "-b", "20", "-d"]) {
        CliCommand::FetchDaily {
            api_limit,
            batch_size,
            dry_run,
        } => {
            assert_eq!(api_limit, Some(300));
            assert_eq!(batch_size, Some(20));
            assert!(dry_run);
        }
        _ => panic!("expected FetchDaily"),
    }
}

#[test]
fn cli_parse_fetch_daily_long_flags() {
    match parse(&[
        "matchdl",
        "fetch-daily",
        "--api-limit",
        "1",
        "--batch-size",
        "0",
        "--dry-run",
    ]) {
        CliCommand::FetchDaily {
            api_limit,
            batch_size,
            dry_run,
        } => {
            assert_eq!(api_limit, Some(1));
            assert_eq!(batch_size, Some(0));
            assert!(dry_run);
        }
        _ => panic!("expected FetchDaily"),
    }
}

#[test]
fn cli_parse_status() {
    assert!(matches!(parse(&["matchdl", "status"]), CliCommand::Status));
}

#[test]
fn cli_parse_global_config_after_subcommand() {
    let cli = Cli::try_parse_from(["matchdl", "status", "--config", "/tmp/m.toml"]).unwrap();
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/m.toml")));
}

#[test]
fn cli_rejects_negative_api_limit() {
    assert!(Cli::try_parse_from(["matchdl", "fetch-daily", "-a", "-5"]).is_err());
}

#[test]
fn cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["matchdl"]).is_err());
}
