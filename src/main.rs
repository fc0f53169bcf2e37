use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use matchstats_backfill::config::{self, Settings};
use matchstats_backfill::replay_feed::ReplayFeed;
use matchstats_backfill::statsperform::StatsPerformClient;
use matchstats_backfill::{
    BackfillOptions, BackfillSummary, StatSchema, Warehouse, run_backfill,
};

fn main() -> Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let settings = Settings::from_env();

    let tmcl = parse_value_arg(&args, "--tmcl")
        .or_else(|| std::env::var("TOURNAMENT_CALENDAR_ID").ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("no tournament calendar id (pass --tmcl or set TOURNAMENT_CALENDAR_ID)"))?;
    let match_limit = match parse_value_arg(&args, "--limit") {
        Some(raw) => Some(
            raw.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid --limit {raw:?}"))?,
        ),
        None => None,
    };
    let db_path = parse_value_arg(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| settings.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let schema = match parse_value_arg(&args, "--schema")
        .map(PathBuf::from)
        .or_else(|| settings.schema_path.clone())
    {
        Some(path) => StatSchema::load(&path)?,
        None => StatSchema::bundled()?,
    };
    let options = BackfillOptions {
        match_limit,
        parallelism: settings.parallelism,
        include_unplayed: args.iter().any(|a| a == "--include-unplayed"),
    };

    let mut warehouse = Warehouse::open(&db_path, &schema)?;
    let started_at = Utc::now().to_rfc3339();
    info!(
        db = %db_path.display(),
        schema_version = %schema.version,
        tmcl = %tmcl,
        "starting backfill"
    );

    let summary = match parse_value_arg(&args, "--feed-dir") {
        Some(dir) => {
            let feed = ReplayFeed::new(dir);
            info!(dir = %feed.dir().display(), "replaying saved feeds");
            run_backfill(&feed, &mut warehouse, &schema, &tmcl, options)?
        }
        None => {
            let feed = StatsPerformClient::new(&settings.feed)?;
            run_backfill(&feed, &mut warehouse, &schema, &tmcl, options)?
        }
    };
    warehouse.record_run(&schema, &started_at, &summary)?;

    print_summary(&db_path, &schema, &summary);
    Ok(())
}

fn print_summary(db_path: &std::path::Path, schema: &StatSchema, summary: &BackfillSummary) {
    println!("Match stats backfill complete");
    println!("DB: {}", db_path.display());
    println!("Schema: {} ({})", schema.version, &schema.fingerprint()[..12]);
    println!("Tournament calendar: {}", summary.tournament_calendar_id);
    println!(
        "Matches: listed={} unreadable={} unplayed={} planned={} processed={}",
        summary.matches_listed,
        summary.matches_unreadable,
        summary.matches_unplayed,
        summary.matches_planned,
        summary.matches_processed
    );
    println!(
        "Rows written: team={} player={}",
        summary.team_rows_written, summary.player_rows_written
    );
    if !summary.skipped.is_empty() {
        println!("Skipped: {}", summary.skipped.len());
        for (reason, count) in summary.skipped_by_reason() {
            println!("  {reason}: {count}");
        }
        for item in summary.skipped.iter().take(8) {
            let aspects = item
                .aspects
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join("+");
            println!(" - {} [{}] {}: {}", item.match_id, aspects, item.reason, item.detail);
        }
    }
}

fn parse_value_arg(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
