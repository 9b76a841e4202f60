//! Time-driven batch orchestration
//!
//! A single minute-resolution loop dispatches due triggers: hourly catalog
//! auto-scans inside the market-hour windows, and one daily subscription
//! check per guild at its configured time. Manual triggers reuse the same
//! cycle code paths and bypass only the schedule gate.
//!
//! Guild cycles are isolated. Each runs under its own lock, so a manual
//! trigger overlapping a scheduled cycle is rejected as busy instead of
//! queued, and one guild's failure never blocks the others.

pub mod windows;


pub use windows::{Clock, ScanWindow, SystemClock};

use crate::catalog::TickerCatalog;
use crate::config::SchedulerConfig;
use crate::engine::{self, evaluate, Rule};
use crate::error::{Result, SentinelError};
use crate::market::{BatchFetcher, FetchReport, TickerFetch};
use crate::notify::{format, AlertSink, CycleKind, CycleReport, ScanEntry};
use crate::storage::Database;
use crate::types::{Alert, Condition, ConditionClass, SubscriptionState, TickerRsi};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Counters surfaced to manual-trigger callers and the status line.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub tickers_requested: usize,
    pub tickers_succeeded: usize,
    pub tickers_failed: usize,
    pub subscriptions_evaluated: usize,
    pub oversold_total: usize,
    pub oversold_new: usize,
    pub overbought_total: usize,
    pub overbought_new: usize,
    pub alerts: usize,
    pub posted_oversold: bool,
    pub posted_overbought: bool,
    pub skipped_disabled: bool,
}

pub struct Scheduler {
    db: Arc<Database>,
    catalog: Arc<TickerCatalog>,
    fetcher: BatchFetcher,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    scan_windows: Vec<ScanWindow>,
    guild_locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl Scheduler {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<TickerCatalog>,
        fetcher: BatchFetcher,
        sink: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let scan_windows = vec![
            ScanWindow {
                label: "european",
                start_hour: config.europe_start_hour,
                end_hour: config.europe_end_hour,
                minute: config.scan_minute,
            },
            ScanWindow {
                label: "us_canada",
                start_hour: config.us_start_hour,
                end_hour: config.us_end_hour,
                minute: config.scan_minute,
            },
        ];
        Self {
            db,
            catalog,
            fetcher,
            sink,
            clock,
            config,
            scan_windows,
            guild_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Main loop: wake once per poll interval, dispatch whatever is due.
    /// Outside trigger windows this does no network or evaluation work.
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_secs = self.config.poll_interval_secs,
            windows = self.scan_windows.len(),
            "scheduler started"
        );
        for window in &self.scan_windows {
            let hours = format!("{:02}-{:02}", window.start_hour, window.end_hour);
            info!(
                label = window.label,
                hours = %hours,
                minute = window.minute,
                "auto-scan window registered"
            );
        }

        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval_secs));
        let mut last_scan: Option<(NaiveDate, u32)> = None;
        let mut last_daily: HashMap<i64, NaiveDate> = HashMap::new();

        loop {
            ticker.tick().await;
            let now = self.clock.now();
            self.clone()
                .dispatch(now, &mut last_scan, &mut last_daily)
                .await;
        }
    }

    /// One dispatch pass. Split out of `run` so tests can drive it with a
    /// fixed clock. Overlapping scan windows coalesce on the (date, hour) key.
    pub async fn dispatch(
        self: Arc<Self>,
        now: DateTime<Utc>,
        last_scan: &mut Option<(NaiveDate, u32)>,
        last_daily: &mut HashMap<i64, NaiveDate>,
    ) {
        let scan_key = (now.date_naive(), now.hour());
        if self.scan_windows.iter().any(|w| w.is_due(now)) && *last_scan != Some(scan_key) {
            *last_scan = Some(scan_key);
            self.clone().run_auto_scan(now).await;
        }

        if !windows::is_weekday(now) {
            return;
        }

        let guild_ids = match self.db.all_guild_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to list guilds, skipping daily dispatch");
                return;
            }
        };

        let mut tasks = Vec::new();
        for guild_id in guild_ids {
            let config = match self.db.get_or_create_guild_config(guild_id).await {
                Ok(config) => config,
                Err(e) => {
                    error!(guild_id, error = %e, "failed to read guild config");
                    continue;
                }
            };
            if !config.schedule_enabled {
                continue;
            }
            let Some((hour, minute)) = windows::parse_schedule_time(&config.schedule_time) else {
                warn!(guild_id, time = %config.schedule_time, "unparseable schedule time");
                continue;
            };
            let today = now.date_naive();
            if now.hour() == hour && now.minute() == minute && last_daily.get(&guild_id) != Some(&today)
            {
                last_daily.insert(guild_id, today);
                let scheduler = self.clone();
                tasks.push(tokio::spawn(async move {
                    match scheduler.run_subscription_cycle(guild_id, false).await {
                        Ok(outcome) => info!(
                            guild_id,
                            alerts = outcome.alerts,
                            "daily subscription check complete"
                        ),
                        Err(SentinelError::CycleBusy) => {
                            info!(guild_id, "daily check skipped, cycle in progress")
                        }
                        Err(e) => error!(guild_id, error = %e, "daily subscription check failed"),
                    }
                    match scheduler
                        .db
                        .cleanup_auto_scan_states(scheduler.config.cleanup_days, today)
                        .await
                    {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "pruned old auto-scan states"),
                        Err(e) => warn!(error = %e, "auto-scan state cleanup failed"),
                    }
                }));
            }
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Full-catalog auto-scan. Readings are fetched once and shared; guild
    /// processing runs concurrently, one task per guild, each isolated.
    pub async fn run_auto_scan(self: Arc<Self>, now: DateTime<Utc>) {
        let tickers = self.catalog.all_tickers();
        if tickers.is_empty() {
            warn!("catalog is empty, skipping auto-scan");
            return;
        }

        info!(tickers = tickers.len(), "auto-scan started");
        let (readings, fetch_report) = self.fetcher.fetch_readings(&tickers).await;
        let readings = Arc::new(readings);
        let fetch_report = Arc::new(fetch_report);

        if let Err(e) = self.persist_readings(&readings, now).await {
            error!(error = %e, "aborting auto-scan cycle, store unavailable");
            return;
        }

        let guild_ids = match self.db.all_guild_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "aborting auto-scan cycle, store unavailable");
                return;
            }
        };

        let mut tasks = Vec::new();
        for guild_id in guild_ids {
            let scheduler = self.clone();
            let readings = readings.clone();
            let fetch_report = fetch_report.clone();
            tasks.push(tokio::spawn(async move {
                match scheduler
                    .run_guild_autoscan(guild_id, &readings, &fetch_report, now, false)
                    .await
                {
                    Ok(outcome) if outcome.skipped_disabled => {
                        debug!(guild_id, "auto-scan skipped, schedule disabled")
                    }
                    Ok(outcome) => info!(
                        guild_id,
                        oversold_new = outcome.oversold_new,
                        overbought_new = outcome.overbought_new,
                        "guild auto-scan complete"
                    ),
                    Err(SentinelError::CycleBusy) => {
                        info!(guild_id, "auto-scan skipped, cycle in progress")
                    }
                    Err(e) => error!(guild_id, error = %e, "guild auto-scan failed"),
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("auto-scan finished");
    }

    /// Manual auto-scan for one guild, bypassing the schedule gate. Rejected
    /// up front when a cycle already holds the guild lock, before any fetch
    /// work happens.
    pub async fn trigger_scan_now(&self, guild_id: i64) -> Result<CycleOutcome> {
        {
            let lock = self.guild_lock(guild_id);
            let _probe = lock.try_lock().map_err(|_| SentinelError::CycleBusy)?;
        }

        let now = self.clock.now();
        let tickers = self.catalog.all_tickers();
        let (readings, fetch_report) = self.fetcher.fetch_readings(&tickers).await;
        self.persist_readings(&readings, now).await?;
        self.run_guild_autoscan(guild_id, &readings, &fetch_report, now, true)
            .await
    }

    /// Manual subscription check for one guild, bypassing the schedule gate.
    pub async fn trigger_check_now(&self, guild_id: i64) -> Result<CycleOutcome> {
        self.run_subscription_cycle(guild_id, true).await
    }

    async fn run_guild_autoscan(
        &self,
        guild_id: i64,
        readings: &HashMap<String, TickerFetch>,
        fetch_report: &FetchReport,
        now: DateTime<Utc>,
        manual: bool,
    ) -> Result<CycleOutcome> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.try_lock().map_err(|_| SentinelError::CycleBusy)?;

        // Toggle is read fresh at cycle start; a mid-cycle change takes
        // effect on the next cycle.
        let config = self.db.get_or_create_guild_config(guild_id).await?;
        if !manual && !config.schedule_enabled {
            return Ok(CycleOutcome {
                skipped_disabled: true,
                ..Default::default()
            });
        }

        let mut outcome = CycleOutcome {
            tickers_requested: readings.len(),
            tickers_succeeded: fetch_report.succeeded,
            tickers_failed: fetch_report.failed,
            ..Default::default()
        };

        let oversold = self
            .scan_side(guild_id, ConditionClass::Oversold, config.auto_oversold, readings, now)
            .await?;
        outcome.oversold_total = oversold.total;
        outcome.oversold_new = oversold.entries.len();
        outcome.posted_oversold = oversold.posted;

        let overbought = self
            .scan_side(
                guild_id,
                ConditionClass::Overbought,
                config.auto_overbought,
                readings,
                now,
            )
            .await?;
        outcome.overbought_total = overbought.total;
        outcome.overbought_new = overbought.entries.len();
        outcome.posted_overbought = overbought.posted;

        let finished = self.clock.now();
        let status_summary = scan_status_line(&outcome, fetch_report, now, finished);

        let report = CycleReport {
            guild_id,
            kind: CycleKind::AutoScan,
            qualifying_oversold: oversold.entries,
            qualifying_overbought: overbought.entries,
            subscription_alerts: Vec::new(),
            status_summary,
            post_oversold: outcome.posted_oversold,
            post_overbought: outcome.posted_overbought,
        };

        // Delivery failures (missing channels, webhook outages) are logged,
        // never fatal for the cycle or for other guilds.
        if let Err(e) = self.sink.deliver(&report).await {
            warn!(guild_id, error = %e, "report delivery failed");
        }

        Ok(outcome)
    }

    async fn scan_side(
        &self,
        guild_id: i64,
        class: ConditionClass,
        threshold: f64,
        readings: &HashMap<String, TickerFetch>,
        now: DateTime<Utc>,
    ) -> Result<ScanSide> {
        let today = now.date_naive();
        let today_set = engine::qualifying_set(readings, class, threshold);
        let previous = self.db.get_auto_scan_state(guild_id, class, today).await?;
        let delta = engine::detect_change(previous.as_ref().map(|s| &s.tickers), &today_set);
        self.db
            .update_auto_scan_state(guild_id, class, today, &today_set, delta.should_post, now)
            .await?;

        let mut entries: Vec<ScanEntry> = delta
            .newly_entered
            .iter()
            .filter_map(|ticker| {
                let rsi = readings.get(ticker)?.reading()?.rsi;
                Some(ScanEntry {
                    ticker: ticker.clone(),
                    name: self.catalog.display_name(ticker),
                    rsi,
                    rule_text: format!("{} {}", class.condition().rule_symbol(), threshold),
                    day_label: "new".to_string(),
                    chart_url: self.catalog.chart_url(ticker),
                })
            })
            .collect();
        match class {
            ConditionClass::Oversold => entries.sort_by(|a, b| a.rsi.total_cmp(&b.rsi)),
            ConditionClass::Overbought => entries.sort_by(|a, b| b.rsi.total_cmp(&a.rsi)),
        }

        Ok(ScanSide {
            total: today_set.len(),
            posted: delta.should_post,
            entries,
        })
    }

    async fn run_subscription_cycle(&self, guild_id: i64, manual: bool) -> Result<CycleOutcome> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.try_lock().map_err(|_| SentinelError::CycleBusy)?;

        let now = self.clock.now();
        let config = self.db.get_or_create_guild_config(guild_id).await?;
        if !manual && !config.schedule_enabled {
            return Ok(CycleOutcome {
                skipped_disabled: true,
                ..Default::default()
            });
        }

        let subscriptions = self.db.subscriptions_for_guild(guild_id).await?;
        let mut outcome = CycleOutcome {
            subscriptions_evaluated: subscriptions.len(),
            ..Default::default()
        };
        if subscriptions.is_empty() {
            debug!(guild_id, "no subscriptions to evaluate");
            return Ok(outcome);
        }

        let tickers: BTreeSet<String> = subscriptions.iter().map(|s| s.ticker.clone()).collect();
        outcome.tickers_requested = tickers.len();
        let (readings, fetch_report) = self.fetcher.fetch_readings(&tickers).await;
        outcome.tickers_succeeded = fetch_report.succeeded;
        outcome.tickers_failed = fetch_report.failed;

        self.persist_readings(&readings, now).await?;

        let mut under_alerts = Vec::new();
        let mut over_alerts = Vec::new();
        for sub in &subscriptions {
            let prev = self
                .db
                .get_subscription_state(sub.id)
                .await?
                .unwrap_or_else(SubscriptionState::unseen);
            let rule = Rule {
                condition: sub.condition,
                threshold: sub.threshold,
                hysteresis: config.hysteresis,
                alert_mode: config.alert_mode,
                cooldown_hours: sub.cooldown_hours,
            };
            let reading = readings.get(&sub.ticker).and_then(|f| f.reading());
            let eval = evaluate(&prev, reading, &rule, now);
            self.db.put_subscription_state(sub.id, &eval.state).await?;

            if eval.fire {
                let alert = Alert {
                    subscription_id: sub.id,
                    guild_id,
                    ticker: sub.ticker.clone(),
                    name: self.catalog.display_name(&sub.ticker),
                    condition: sub.condition,
                    threshold: sub.threshold,
                    rsi: eval.state.last_rsi.unwrap_or_default(),
                    chart_url: self.catalog.chart_url(&sub.ticker),
                    days_in_zone: eval.state.days_in_zone,
                    just_crossed: eval.state.days_in_zone <= 1,
                    owner_user_id: sub.owner_user_id,
                };
                match sub.condition {
                    Condition::Under => under_alerts.push(alert),
                    Condition::Over => over_alerts.push(alert),
                }
            }
        }

        under_alerts.sort_by(|a, b| a.rsi.total_cmp(&b.rsi));
        over_alerts.sort_by(|a, b| b.rsi.total_cmp(&a.rsi));
        outcome.alerts = under_alerts.len() + over_alerts.len();
        outcome.posted_oversold = !under_alerts.is_empty();
        outcome.posted_overbought = !over_alerts.is_empty();

        let finished = self.clock.now();
        let status_summary = check_status_line(&outcome, &fetch_report, now, finished);

        let mut subscription_alerts = under_alerts;
        subscription_alerts.extend(over_alerts);

        let report = CycleReport {
            guild_id,
            kind: CycleKind::SubscriptionCheck,
            qualifying_oversold: Vec::new(),
            qualifying_overbought: Vec::new(),
            subscription_alerts,
            status_summary,
            post_oversold: outcome.posted_oversold,
            post_overbought: outcome.posted_overbought,
        };
        if let Err(e) = self.sink.deliver(&report).await {
            warn!(guild_id, error = %e, "report delivery failed");
        }

        Ok(outcome)
    }

    /// Persist the latest RSI snapshot for every successfully fetched ticker.
    async fn persist_readings(
        &self,
        readings: &HashMap<String, TickerFetch>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshots: Vec<TickerRsi> = readings
            .iter()
            .filter_map(|(ticker, fetch)| {
                let reading = fetch.reading()?;
                Some(TickerRsi {
                    ticker: ticker.clone(),
                    rsi_14: reading.rsi,
                    trading_date: reading.trading_date,
                    fetched_at: now,
                })
            })
            .collect();
        self.db.upsert_ticker_rsi(&snapshots).await?;
        Ok(())
    }

    fn guild_lock(&self, guild_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.guild_locks.lock();
        locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

struct ScanSide {
    total: usize,
    posted: bool,
    entries: Vec<ScanEntry>,
}

fn scan_status_line(
    outcome: &CycleOutcome,
    fetch: &FetchReport,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> String {
    let mut line = format!(
        "Auto-scan complete in {:.1}s; tickers {}/{} ok; oversold {} total ({} new), overbought {} total ({} new); posted: oversold={}, overbought={}",
        (finished - started).num_milliseconds() as f64 / 1000.0,
        outcome.tickers_succeeded,
        outcome.tickers_requested,
        outcome.oversold_total,
        outcome.oversold_new,
        outcome.overbought_total,
        outcome.overbought_new,
        outcome.posted_oversold,
        outcome.posted_overbought,
    );
    if !fetch.failed_tickers.is_empty() {
        line.push_str(&format!(
            "; failed: {}",
            format::failed_preview(&fetch.failed_tickers)
        ));
    }
    line
}

fn check_status_line(
    outcome: &CycleOutcome,
    fetch: &FetchReport,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> String {
    let mut line = format!(
        "Subscription check complete in {:.1}s; {} subscriptions over {} tickers ({} ok, {} failed); {} alerts",
        (finished - started).num_milliseconds() as f64 / 1000.0,
        outcome.subscriptions_evaluated,
        outcome.tickers_requested,
        outcome.tickers_succeeded,
        outcome.tickers_failed,
        outcome.alerts,
    );
    if !fetch.failed_tickers.is_empty() {
        line.push_str(&format!(
            "; failed: {}",
            format::failed_preview(&fetch.failed_tickers)
        ));
    }
    line
}
