//! RocketScrape CLI - main entry point
//!
//! The subcommand list is derived from the analysis registry, so adding an
//! analysis never touches this file.

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rocketscrape::analysis::{self, AnalysisRegistration};
use rocketscrape::{config, resolver, CacheLock, Config, DiscordClient, TimeSpan};

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (space or `T`), or a bare date.
/// Naive inputs are taken as UTC.
fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(format!(
        "unrecognized date/time {raw:?} (expected e.g. 2024-01-31 or 2024-01-31T12:00:00)"
    ))
}

fn build_cli(registry: &[AnalysisRegistration]) -> Command {
    let mut cli = Command::new("rocketscrape")
        .about("Discord message-history scraper and analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("channel")
                .short('c')
                .long("channel")
                .value_name("CHANNEL")
                .action(ArgAction::Append)
                .global(true)
                .conflicts_with("server")
                .help("Channel name or ID to scan (repeatable)"),
        )
        .arg(
            Arg::new("server")
                .long("server")
                .value_name("SERVER")
                .global(true)
                .help("Scan every text channel of a server instead"),
        )
        .arg(
            Arg::new("start")
                .short('s')
                .long("start")
                .value_name("DATETIME")
                .value_parser(parse_datetime)
                .global(true)
                .help("Only include messages at or after this time (UTC)"),
        )
        .arg(
            Arg::new("end")
                .short('e')
                .long("end")
                .value_name("DATETIME")
                .value_parser(parse_datetime)
                .global(true)
                .help("Only include messages before this time (UTC)"),
        )
        .arg(
            Arg::new("max-results")
                .short('r')
                .long("max-results")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("10")
                .global(true)
                .help("Number of entries to show in rankings"),
        )
        .arg(
            Arg::new("log-interval")
                .short('l')
                .long("log-interval")
                .value_name("SECONDS")
                .value_parser(value_parser!(f64))
                .default_value("1")
                .global(true)
                .help("Seconds between progress log lines"),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Skip the on-disk message cache entirely"),
        );

    for registration in registry {
        let subcommand = Command::new(registration.name).about(registration.about);
        cli = cli.subcommand((registration.augment)(subcommand));
    }
    cli
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rocketscrape=info".parse()?))
        .init();

    let registry = analysis::registry();
    let matches = build_cli(&registry).get_matches();
    let (name, sub_matches) = matches
        .subcommand()
        .context("an analysis subcommand is required")?;

    run(&registry, name, sub_matches).await
}

async fn run(
    registry: &[AnalysisRegistration],
    name: &str,
    matches: &ArgMatches,
) -> anyhow::Result<()> {
    let registration = analysis::find(registry, name)?;
    let mut analysis = (registration.build)(matches);

    let config = Config::new();
    let span = TimeSpan::new(
        matches.get_one::<DateTime<Utc>>("start").copied(),
        matches.get_one::<DateTime<Utc>>("end").copied(),
    )?;

    let channel_refs: Vec<String> = matches
        .get_many::<String>("channel")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let server_ref = matches.get_one::<String>("server").map(String::as_str);
    let channel_refs = if channel_refs.is_empty() && server_ref.is_none() {
        vec![config::DEFAULT_CHANNEL.to_string()]
    } else {
        channel_refs
    };

    let client = DiscordClient::new(config.api_token()?)?;
    let channels = resolver::resolve_channels(&client, &config, &channel_refs, server_ref).await?;

    // The lock outlives the scan; dropping it at the end releases the cache.
    let no_cache = matches.get_flag("no-cache");
    let _lock = if no_cache {
        None
    } else {
        Some(CacheLock::acquire(&config.cache_dir)?)
    };
    let cache_dir = (!no_cache).then(|| config.cache_dir.clone());

    let max_results = matches
        .get_one::<usize>("max-results")
        .copied()
        .unwrap_or(10);
    let log_interval = matches
        .get_one::<f64>("log-interval")
        .copied()
        .unwrap_or(1.0);

    let scan_start = Instant::now();
    analysis::run_analysis(
        analysis.as_mut(),
        &client,
        &channels,
        &span,
        cache_dir.as_deref(),
        Duration::from_secs_f64(log_interval),
    )
    .await?;
    info!(
        channels = channels.len(),
        elapsed = ?scan_start.elapsed(),
        "scan complete"
    );

    analysis.render(&client, &span, max_results).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli(&analysis::registry()).debug_assert();
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 31, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-31T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_datetime("2024-01-31T12:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-01-31 12:30:00").unwrap(), expected);

        let midnight = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-31").unwrap(), midnight);
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
        assert!(parse_datetime("2024-13-01").is_err());
    }

    #[test]
    fn test_channel_and_server_flags_conflict() {
        let result = build_cli(&analysis::registry()).try_get_matches_from([
            "rocketscrape",
            "message-count",
            "-c",
            "support",
            "--server",
            "rocket-pool",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_args_parse() {
        let matches = build_cli(&analysis::registry())
            .try_get_matches_from([
                "rocketscrape",
                "contributors",
                "-c",
                "support",
                "-s",
                "2024-01-01",
                "--session-timeout",
                "30",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "contributors");
        assert_eq!(sub.get_one::<f64>("session-timeout"), Some(&30.0));
        assert!(sub.get_one::<DateTime<Utc>>("start").is_some());
    }
}
