//! RSI Sentinel
//!
//! Evaluates RSI14 for a catalog of instruments on a wall-clock schedule and
//! emits oversold/overbought alerts with crossing detection and cooldowns.

use clap::{Parser, Subcommand};
use rsi_sentinel::{
    catalog::TickerCatalog,
    config::Config,
    error::SentinelError,
    market::{BatchFetcher, ScreenerClient},
    notify::{AlertSink, CycleKind, CycleReport, LogSink, WebhookSink},
    scheduler::{CycleOutcome, Scheduler, SystemClock},
    storage::Database,
    types::Condition,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rsi-sentinel")]
#[command(about = "RSI14 alert evaluation and scheduling engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon
    Run,
    /// Run a full-catalog auto-scan for a guild now, bypassing the schedule
    ScanNow {
        guild_id: i64,
    },
    /// Run the subscription check for a guild now, bypassing the schedule
    CheckNow {
        guild_id: i64,
    },
    /// Create an alert subscription
    Subscribe {
        guild_id: i64,
        ticker: String,
        /// UNDER or OVER
        condition: String,
        threshold: f64,
        /// Cooldown override in hours
        #[arg(long)]
        cooldown: Option<i64>,
        /// Owner user id
        #[arg(long)]
        user: Option<i64>,
    },
    /// Delete a subscription by id
    Unsubscribe {
        guild_id: i64,
        id: i64,
    },
    /// List a guild's subscriptions
    Subs {
        guild_id: i64,
    },
    /// Apply one guild configuration change
    SetConfig {
        guild_id: i64,
        field: String,
        value: String,
    },
    /// Show catalog and store statistics
    Status,
    /// Send a test message through the configured sink
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::ScanNow { guild_id } => scan_now(config, guild_id).await,
        Commands::CheckNow { guild_id } => check_now(config, guild_id).await,
        Commands::Subscribe {
            guild_id,
            ticker,
            condition,
            threshold,
            cooldown,
            user,
        } => subscribe(config, guild_id, ticker, condition, threshold, cooldown, user).await,
        Commands::Unsubscribe { guild_id, id } => unsubscribe(config, guild_id, id).await,
        Commands::Subs { guild_id } => list_subscriptions(config, guild_id).await,
        Commands::SetConfig {
            guild_id,
            field,
            value,
        } => set_config(config, guild_id, field, value).await,
        Commands::Status => show_status(config).await,
        Commands::TestNotify => test_notify(config).await,
    }
}

fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn AlertSink>> {
    match &config.webhook {
        Some(webhook) => Ok(Arc::new(WebhookSink::new(webhook.clone())?)),
        None => {
            tracing::warn!("no webhook configured, reports go to the log");
            Ok(Arc::new(LogSink))
        }
    }
}

async fn build_scheduler(config: &Config) -> anyhow::Result<Arc<Scheduler>> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let catalog = Arc::new(TickerCatalog::load(&config.catalog.path)?);
    let source = Arc::new(ScreenerClient::new(&config.screener, catalog.clone())?);
    let fetcher = BatchFetcher::new(
        source,
        config.screener.batch_size,
        config.screener.max_concurrent_batches,
    );
    let sink = build_sink(config)?;

    Ok(Arc::new(Scheduler::new(
        db,
        catalog,
        fetcher,
        sink,
        Arc::new(SystemClock),
        config.scheduler.clone(),
    )))
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    tracing::info!("starting RSI sentinel");
    let scheduler = build_scheduler(&config).await?;
    scheduler.run().await;
    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    println!("Cycle complete:");
    println!(
        "  tickers: {}/{} ok, {} failed",
        outcome.tickers_succeeded, outcome.tickers_requested, outcome.tickers_failed
    );
    if outcome.subscriptions_evaluated > 0 {
        println!("  subscriptions evaluated: {}", outcome.subscriptions_evaluated);
    }
    println!(
        "  oversold: {} total ({} new) | overbought: {} total ({} new)",
        outcome.oversold_total, outcome.oversold_new, outcome.overbought_total, outcome.overbought_new
    );
    println!("  alerts: {}", outcome.alerts);
    println!(
        "  posted: oversold={}, overbought={}",
        outcome.posted_oversold, outcome.posted_overbought
    );
}

async fn scan_now(config: Config, guild_id: i64) -> anyhow::Result<()> {
    let scheduler = build_scheduler(&config).await?;
    match scheduler.trigger_scan_now(guild_id).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(SentinelError::CycleBusy) => println!("Busy: a cycle is already running for this guild"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn check_now(config: Config, guild_id: i64) -> anyhow::Result<()> {
    let scheduler = build_scheduler(&config).await?;
    match scheduler.trigger_check_now(guild_id).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(SentinelError::CycleBusy) => println!("Busy: a cycle is already running for this guild"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn subscribe(
    config: Config,
    guild_id: i64,
    ticker: String,
    condition: String,
    threshold: f64,
    cooldown: Option<i64>,
    user: Option<i64>,
) -> anyhow::Result<()> {
    let catalog = TickerCatalog::load(&config.catalog.path)?;
    if !catalog.contains(&ticker) {
        anyhow::bail!("ticker {} is not in the catalog", ticker.to_ascii_uppercase());
    }
    let condition = Condition::parse(&condition)
        .ok_or_else(|| anyhow::anyhow!("condition must be UNDER or OVER"))?;
    if threshold <= 0.0 {
        anyhow::bail!("threshold must be positive");
    }

    let db = Database::connect(&config.database.path).await?;
    if db
        .subscription_exists(guild_id, &ticker, condition, threshold)
        .await?
    {
        anyhow::bail!("an identical subscription already exists");
    }

    let sub = db
        .create_subscription(guild_id, &ticker, condition, threshold, cooldown, user)
        .await?;
    println!(
        "Created subscription {}: {} {} {} (cooldown {}h)",
        sub.id,
        sub.ticker,
        sub.condition.rule_symbol(),
        sub.threshold,
        sub.cooldown_hours
    );
    Ok(())
}

async fn unsubscribe(config: Config, guild_id: i64, id: i64) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    if db.delete_subscription(id, guild_id).await? {
        println!("Deleted subscription {id}");
    } else {
        println!("No subscription {id} in guild {guild_id}");
    }
    Ok(())
}

async fn list_subscriptions(config: Config, guild_id: i64) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let catalog = TickerCatalog::load(&config.catalog.path)?;
    let subs = db.subscriptions_for_guild(guild_id).await?;

    if subs.is_empty() {
        println!("No subscriptions for guild {guild_id}");
        return Ok(());
    }

    println!("Subscriptions for guild {guild_id} ({} total):\n", subs.len());
    for condition in [Condition::Under, Condition::Over] {
        let group: Vec<_> = subs.iter().filter(|s| s.condition == condition).collect();
        if group.is_empty() {
            continue;
        }
        println!("{condition}:");
        for sub in group {
            println!(
                "  {} - {} ({}) | RSI14 {} {}",
                sub.id,
                sub.ticker,
                catalog.display_name(&sub.ticker),
                condition.rule_symbol(),
                sub.threshold
            );
        }
        println!();
    }
    Ok(())
}

async fn set_config(config: Config, guild_id: i64, field: String, value: String) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    match db.apply_config(guild_id, &field, &value).await {
        Ok(updated) => {
            println!("Updated {field} for guild {guild_id}");
            println!(
                "  cooldown: {}h | mode: {} | hysteresis: {} | auto: <{} / >{} | daily at {} | enabled: {}",
                updated.default_cooldown_hours,
                updated.alert_mode,
                updated.hysteresis,
                updated.auto_oversold,
                updated.auto_overbought,
                updated.schedule_time,
                updated.schedule_enabled
            );
        }
        Err(SentinelError::ConfigValidation(reason)) => println!("Rejected: {reason}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn show_status(config: Config) -> anyhow::Result<()> {
    let catalog = TickerCatalog::load(&config.catalog.path)?;
    let db = Database::connect(&config.database.path).await?;

    println!("Catalog: {} instruments", catalog.len());
    println!("Guilds configured: {}", db.all_guild_ids().await?.len());
    println!("Stored RSI snapshots: {}", db.count_ticker_rsi().await?);
    Ok(())
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let sink = build_sink(&config)?;
    let report = CycleReport {
        guild_id: 0,
        kind: CycleKind::AutoScan,
        qualifying_oversold: Vec::new(),
        qualifying_overbought: Vec::new(),
        subscription_alerts: Vec::new(),
        status_summary: "Test notification: the sentinel sink is working".to_string(),
        post_oversold: false,
        post_overbought: false,
    };
    sink.deliver(&report).await?;
    println!("Test notification sent");
    Ok(())
}
