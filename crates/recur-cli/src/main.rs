use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recur_core::app::{Engine, EngineBuilder};
use recur_core::config::{EngineConfig, LoggingConfig};
use recur_core::domain::{
    LAST_DAY_OF_MONTH, PatternSpec, PatternStats, Priority, RecurrenceRule, RecurringTask,
    TaskTemplate,
};
use recur_core::observability::SchedulerStats;
use recur_core::ports::FixedClock;

/// Seeds a few demo patterns, runs the scheduler over simulated days and
/// prints what it generated.
#[derive(Parser, Debug)]
#[command(name = "recur", version, about)]
struct Args {
    /// Path to a TOML config file (falls back to $RECUR_CONFIG, then ./recur.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simulated days; the clock advances one day per tick.
    #[arg(long, default_value_t = 10)]
    ticks: u32,

    /// Real-time tick period in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// First simulated day.
    #[arg(long, default_value = "2024-01-01")]
    start_date: NaiveDate,
}

#[derive(Serialize)]
struct PatternReport {
    id: String,
    title: String,
    paused: bool,
    due_dates: Vec<NaiveDate>,
    stats: PatternStats,
}

#[derive(Serialize)]
struct RunReport {
    patterns: Vec<PatternReport>,
    scheduler: SchedulerStats,
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level {:?}", logging.level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn demo_patterns(start: NaiveDate) -> Vec<PatternSpec> {
    let mut standup = PatternSpec::new("team standup", RecurrenceRule::weekly(start, 1, [1, 3]), "demo");
    standup.task_template = TaskTemplate::new("standup notes")
        .with_priority(Priority::High)
        .with_tag("team");

    let books = PatternSpec::new(
        "close the books",
        RecurrenceRule::monthly(start, 1, LAST_DAY_OF_MONTH),
        "demo",
    );

    let mut workout = PatternSpec::new("workout", RecurrenceRule::daily(start, 1).limited_to(5), "demo");
    workout.skip_weekends = true;

    vec![standup, books, workout]
}

async fn report(engine: &Engine, patterns: &[RecurringTask]) -> anyhow::Result<RunReport> {
    let mut out = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let current = engine.service.get_pattern(pattern.id).await?;
        let tasks = engine.service.list_tasks(pattern.id).await?;
        let stats = engine.service.get_stats(pattern.id).await?;
        out.push(PatternReport {
            id: current.id.to_string(),
            title: current.title,
            paused: current.paused,
            due_dates: tasks.iter().map(|t| t.due_date).collect(),
            stats,
        });
    }
    Ok(RunReport {
        patterns: out,
        scheduler: engine.scheduler.stats().await,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = EngineConfig::load(args.config.as_deref()).context("failed to load config")?;
    init_tracing(&config.logging)?;

    let start = args
        .start_date
        .and_hms_opt(9, 0, 0)
        .context("invalid start time")?;
    let clock = FixedClock::new(Utc.from_utc_datetime(&start));
    let tick = Duration::from_millis(args.tick_ms.max(1));

    let engine = EngineBuilder::new()
        .config(config)
        .clock(Arc::new(clock.clone()))
        .tick_interval(tick)
        .build()
        .context("failed to build engine")?;

    let mut patterns = Vec::new();
    for spec in demo_patterns(args.start_date) {
        patterns.push(engine.service.create_pattern(spec).await?);
    }
    info!(count = patterns.len(), "seeded demo patterns");

    engine.scheduler.start().await;
    for _ in 0..args.ticks {
        tokio::time::sleep(tick).await;
        clock.advance(chrono::Duration::days(1));
    }
    engine.scheduler.stop().await;

    let run = report(&engine, &patterns).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}
