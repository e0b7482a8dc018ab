use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use outage_watch::adapters::{LocalZone, TomlSubscriberRepository};
use outage_watch::config::{AppConfig, DEFAULT_DESIGNATED_REGION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const DEFAULT_LOG_LEVEL: &str = "info";
const OFFSET: &[BorrowedFormatItem<'_>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Migrate(args)) = cli.command {
        let code = run_migrate(args);
        return RunOutcome::Exit(code);
    }

    match resolve_config(cli) {
        Ok(config) => RunOutcome::Serve(config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "outage-watch",
    version,
    about = "Tracks published power-outage schedules and notifies subscribers"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "OUTAGE_WATCH_PRIMARY_FEED_URL")]
    primary_feed_url: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_SECONDARY_FEED_URL")]
    secondary_feed_url: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_SECONDARY_QUEUES_URL")]
    secondary_queues_url: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_DESIGNATED_REGION")]
    designated_region: Option<String>,
    #[arg(long = "regions", env = "OUTAGE_WATCH_REGIONS")]
    regions_path: Option<PathBuf>,
    #[arg(long = "subscribers", env = "OUTAGE_WATCH_SUBSCRIBERS")]
    subscribers_path: Option<PathBuf>,
    #[arg(long, env = "OUTAGE_WATCH_WEBHOOK_URL")]
    webhook_url: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_CACHE_TTL")]
    cache_ttl: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_CHECK_INTERVAL")]
    check_interval: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_REMINDER_INTERVAL")]
    reminder_interval: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_REQUEST_TIMEOUT")]
    request_timeout: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_TIME_ZONE")]
    time_zone: Option<String>,
    /// Fixed offset that overrides the time zone.
    #[arg(long, env = "OUTAGE_WATCH_UTC_OFFSET")]
    utc_offset: Option<String>,
    #[arg(long, env = "OUTAGE_WATCH_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
    #[arg(long, env = "OUTAGE_WATCH_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite a subscriber file in the current record format.
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[arg(long = "subscribers", env = "OUTAGE_WATCH_SUBSCRIBERS")]
    subscribers_path: PathBuf,
}

fn run_migrate(args: MigrateArgs) -> i32 {
    match TomlSubscriberRepository::load(&args.subscribers_path) {
        Ok(repository) => {
            println!(
                "{}: migrated {} subscriber record(s)",
                repository.path().display(),
                repository.migrated()
            );
            0
        }
        Err(err) => {
            eprintln!("failed to migrate {}: {err}", args.subscribers_path.display());
            1
        }
    }
}

fn resolve_config(cli: Cli) -> Result<AppConfig, String> {
    let primary_feed_url = non_empty(cli.primary_feed_url, "--primary-feed-url")?;
    let subscribers_path = cli
        .subscribers_path
        .ok_or("--subscribers is required unless using a subcommand")?;
    let designated_region = match cli.designated_region {
        Some(region) if region.trim().is_empty() => {
            return Err("designated region cannot be empty".to_string());
        }
        Some(region) => region.trim().to_string(),
        None => DEFAULT_DESIGNATED_REGION.to_string(),
    };

    Ok(AppConfig {
        primary_feed_url,
        secondary_feed_url: cli.secondary_feed_url,
        secondary_queues_url: cli.secondary_queues_url,
        designated_region,
        regions_path: cli.regions_path,
        subscribers_path,
        webhook_url: cli.webhook_url,
        cache_ttl: duration_or(cli.cache_ttl, "cache ttl", Duration::from_secs(60))?,
        check_interval: duration_or(
            cli.check_interval,
            "check interval",
            Duration::from_secs(30 * 60),
        )?,
        reminder_interval: duration_or(
            cli.reminder_interval,
            "reminder interval",
            Duration::from_secs(60),
        )?,
        request_timeout: duration_or(
            cli.request_timeout,
            "request timeout",
            Duration::from_secs(30),
        )?,
        zone: resolve_zone(cli.time_zone.as_deref(), cli.utc_offset.as_deref())?,
        listen: cli.listen,
        log_level: cli.log_level,
    })
}

fn non_empty(value: Option<String>, flag: &str) -> Result<String, String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Some(_) => Err(format!("{flag} cannot be empty")),
        None => Err(format!("{flag} is required unless using a subcommand")),
    }
}

fn duration_or(raw: Option<String>, what: &str, default: Duration) -> Result<Duration, String> {
    match raw.as_deref() {
        Some(raw) => parse_duration(raw, what),
        None => Ok(default),
    }
}

fn resolve_zone(time_zone: Option<&str>, utc_offset: Option<&str>) -> Result<LocalZone, String> {
    if let Some(raw) = utc_offset {
        return parse_utc_offset(raw).map(LocalZone::Fixed);
    }
    match time_zone {
        Some(raw) => raw
            .trim()
            .parse::<Tz>()
            .map(LocalZone::Named)
            .map_err(|_| format!("unknown time zone '{}'", raw.trim())),
        None => Ok(LocalZone::DEFAULT),
    }
}

fn parse_duration(raw: &str, what: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(format!("{what} cannot be empty"));
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid {what} '{value}'; expected <number>[s|m|h|d]"))?;

    if amount == 0 {
        return Err(format!("{what} must be greater than 0"));
    }

    let seconds = match unit {
        's' => amount,
        'm' => amount.saturating_mul(60),
        'h' => amount.saturating_mul(60 * 60),
        'd' => amount.saturating_mul(24 * 60 * 60),
        _ => {
            return Err(format!(
                "invalid {what} '{value}'; expected <number>[s|m|h|d]"
            ));
        }
    };
    Ok(Duration::from_secs(seconds))
}

fn parse_utc_offset(raw: &str) -> Result<UtcOffset, String> {
    let value = raw.trim();
    UtcOffset::parse(value, OFFSET)
        .map_err(|_| format!("invalid utc offset '{value}'; expected +HH:MM or -HH:MM"))
}
