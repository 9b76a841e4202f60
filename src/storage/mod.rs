//! SQLite persistence
//!
//! Durable storage for guild configuration, subscriptions, per-subscription
//! evaluation state, day-scoped auto-scan snapshots, and the latest RSI value
//! per ticker. State writes are single-statement upserts keyed by row id, so
//! concurrent guild cycles never clobber each other's rows.

use crate::error::{Result, SentinelError};
use crate::types::{
    AlertMode, AutoScanState, Condition, ConditionClass, GuildConfig, Subscription,
    SubscriptionState, TickerRsi,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(SentinelError::Store)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;
        info!(path, "database ready");
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_config (
                guild_id INTEGER PRIMARY KEY,
                default_cooldown_hours INTEGER NOT NULL DEFAULT 24,
                alert_mode TEXT NOT NULL DEFAULT 'CROSSING',
                hysteresis REAL NOT NULL DEFAULT 2.0,
                auto_oversold REAL NOT NULL DEFAULT 34,
                auto_overbought REAL NOT NULL DEFAULT 70,
                schedule_time TEXT NOT NULL DEFAULT '18:30',
                schedule_enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                ticker TEXT NOT NULL,
                condition TEXT NOT NULL CHECK (condition IN ('UNDER', 'OVER')),
                threshold REAL NOT NULL,
                cooldown_hours INTEGER NOT NULL,
                owner_user_id INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscription_state (
                subscription_id INTEGER PRIMARY KEY,
                last_rsi REAL,
                in_zone INTEGER NOT NULL DEFAULT 0,
                armed INTEGER NOT NULL DEFAULT 1,
                last_alert_at TEXT,
                days_in_zone INTEGER NOT NULL DEFAULT 0,
                last_trading_date TEXT,
                missed_fetches INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (subscription_id) REFERENCES subscriptions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auto_scan_state (
                guild_id INTEGER NOT NULL,
                condition_class TEXT NOT NULL CHECK (condition_class IN ('OVERSOLD', 'OVERBOUGHT')),
                scan_date TEXT NOT NULL,
                tickers_json TEXT NOT NULL DEFAULT '[]',
                last_scan_at TEXT,
                post_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (guild_id, condition_class, scan_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ticker_rsi (
                ticker TEXT PRIMARY KEY,
                rsi_14 REAL NOT NULL,
                trading_date TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_guild ON subscriptions(guild_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_ticker ON subscriptions(ticker)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- guild config ----

    pub async fn get_guild_config(&self, guild_id: i64) -> Result<Option<GuildConfig>> {
        let row: Option<(i64, i64, String, f64, f64, f64, String, bool)> = sqlx::query_as(
            r#"
            SELECT guild_id, default_cooldown_hours, alert_mode, hysteresis,
                   auto_oversold, auto_overbought, schedule_time, schedule_enabled
            FROM guild_config WHERE guild_id = ?
            "#,
        )
        .bind(guild_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(GuildConfig {
                guild_id: r.0,
                default_cooldown_hours: r.1,
                alert_mode: AlertMode::parse(&r.2)
                    .ok_or_else(|| decode_err("alert_mode", &r.2))?,
                hysteresis: r.3,
                auto_oversold: r.4,
                auto_overbought: r.5,
                schedule_time: r.6,
                schedule_enabled: r.7,
            })
        })
        .transpose()
    }

    pub async fn get_or_create_guild_config(&self, guild_id: i64) -> Result<GuildConfig> {
        if let Some(config) = self.get_guild_config(guild_id).await? {
            return Ok(config);
        }

        let defaults = GuildConfig::defaults(guild_id);
        sqlx::query(
            r#"
            INSERT INTO guild_config (guild_id, default_cooldown_hours, alert_mode,
                hysteresis, auto_oversold, auto_overbought, schedule_time, schedule_enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO NOTHING
            "#,
        )
        .bind(guild_id)
        .bind(defaults.default_cooldown_hours)
        .bind(defaults.alert_mode.as_str())
        .bind(defaults.hysteresis)
        .bind(defaults.auto_oversold)
        .bind(defaults.auto_overbought)
        .bind(&defaults.schedule_time)
        .bind(defaults.schedule_enabled)
        .execute(&self.pool)
        .await?;

        Ok(defaults)
    }

    pub async fn all_guild_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT guild_id FROM guild_config ORDER BY guild_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Apply one administrative configuration change. Invalid input is
    /// rejected synchronously and nothing is mutated.
    pub async fn apply_config(&self, guild_id: i64, field: &str, value: &str) -> Result<GuildConfig> {
        let current = self.get_or_create_guild_config(guild_id).await?;

        let (column, text): (&str, String) = match field {
            "cooldown" => {
                let hours: i64 = value.parse().map_err(|_| {
                    SentinelError::ConfigValidation(format!("cooldown must be hours: {value}"))
                })?;
                if hours < 0 {
                    return Err(SentinelError::ConfigValidation(
                        "cooldown must be non-negative".into(),
                    ));
                }
                ("default_cooldown_hours", hours.to_string())
            }
            "alert_mode" => {
                let mode = AlertMode::parse(value).ok_or_else(|| {
                    SentinelError::ConfigValidation(format!(
                        "alert_mode must be CROSSING or LEVEL: {value}"
                    ))
                })?;
                ("alert_mode", mode.as_str().to_string())
            }
            "hysteresis" => {
                let margin: f64 = value.parse().map_err(|_| {
                    SentinelError::ConfigValidation(format!("hysteresis must be numeric: {value}"))
                })?;
                if margin < 0.0 {
                    return Err(SentinelError::ConfigValidation(
                        "hysteresis must be non-negative".into(),
                    ));
                }
                ("hysteresis", margin.to_string())
            }
            "auto_oversold" => {
                let threshold = parse_threshold(value)?;
                if threshold >= current.auto_overbought {
                    return Err(SentinelError::ConfigValidation(
                        "auto_oversold must be below auto_overbought".into(),
                    ));
                }
                ("auto_oversold", threshold.to_string())
            }
            "auto_overbought" => {
                let threshold = parse_threshold(value)?;
                if threshold <= current.auto_oversold {
                    return Err(SentinelError::ConfigValidation(
                        "auto_overbought must be above auto_oversold".into(),
                    ));
                }
                ("auto_overbought", threshold.to_string())
            }
            "schedule_time" => {
                if crate::scheduler::windows::parse_schedule_time(value).is_none() {
                    return Err(SentinelError::ConfigValidation(format!(
                        "schedule_time must be HH:MM: {value}"
                    )));
                }
                ("schedule_time", value.to_string())
            }
            "schedule_enabled" => {
                let enabled: bool = value.parse().map_err(|_| {
                    SentinelError::ConfigValidation(format!(
                        "schedule_enabled must be true or false: {value}"
                    ))
                })?;
                ("schedule_enabled", (enabled as i64).to_string())
            }
            other => {
                return Err(SentinelError::ConfigValidation(format!(
                    "unknown config field: {other}"
                )));
            }
        };

        sqlx::query(&format!(
            "UPDATE guild_config SET {column} = ? WHERE guild_id = ?"
        ))
        .bind(&text)
        .bind(guild_id)
        .execute(&self.pool)
        .await?;

        self.get_or_create_guild_config(guild_id).await
    }

    // ---- subscriptions ----

    pub async fn create_subscription(
        &self,
        guild_id: i64,
        ticker: &str,
        condition: Condition,
        threshold: f64,
        cooldown_hours: Option<i64>,
        owner_user_id: Option<i64>,
    ) -> Result<Subscription> {
        let config = self.get_or_create_guild_config(guild_id).await?;
        let cooldown = cooldown_hours.unwrap_or(config.default_cooldown_hours);
        let ticker = ticker.to_ascii_uppercase();
        let created_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (guild_id, ticker, condition, threshold,
                cooldown_hours, owner_user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(guild_id)
        .bind(&ticker)
        .bind(condition.as_str())
        .bind(threshold)
        .bind(cooldown)
        .bind(owner_user_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        // Every subscription gets exactly one state row, created unseen.
        sqlx::query("INSERT INTO subscription_state (subscription_id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Subscription {
            id,
            guild_id,
            ticker,
            condition,
            threshold,
            cooldown_hours: cooldown,
            owner_user_id,
            created_at,
        })
    }

    pub async fn subscription_exists(
        &self,
        guild_id: i64,
        ticker: &str,
        condition: Condition,
        threshold: f64,
    ) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM subscriptions
            WHERE guild_id = ? AND ticker = ? AND condition = ? AND threshold = ?
            "#,
        )
        .bind(guild_id)
        .bind(ticker.to_ascii_uppercase())
        .bind(condition.as_str())
        .bind(threshold)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn subscriptions_for_guild(&self, guild_id: i64) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, guild_id, ticker, condition, threshold, cooldown_hours,
                   owner_user_id, created_at
            FROM subscriptions WHERE guild_id = ?
            ORDER BY ticker, condition, threshold
            "#,
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    /// Delete a subscription; the guild id must match. Returns whether a row
    /// was removed. The state row goes with it via cascade.
    pub async fn delete_subscription(&self, id: i64, guild_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ? AND guild_id = ?")
            .bind(id)
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every subscription a user owns in a guild.
    pub async fn delete_owner_subscriptions(&self, guild_id: i64, owner_user_id: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE guild_id = ? AND owner_user_id = ?")
                .bind(guild_id)
                .bind(owner_user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // ---- subscription state ----

    pub async fn get_subscription_state(&self, subscription_id: i64) -> Result<Option<SubscriptionState>> {
        let row: Option<(
            Option<f64>,
            bool,
            bool,
            Option<DateTime<Utc>>,
            i64,
            Option<NaiveDate>,
            i64,
        )> = sqlx::query_as(
            r#"
            SELECT last_rsi, in_zone, armed, last_alert_at, days_in_zone,
                   last_trading_date, missed_fetches
            FROM subscription_state WHERE subscription_id = ?
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SubscriptionState {
            last_rsi: r.0,
            in_zone: r.1,
            armed: r.2,
            last_alert_at: r.3,
            days_in_zone: r.4,
            last_trading_date: r.5,
            missed_fetches: r.6,
        }))
    }

    /// Write the full state snapshot for a subscription in one statement.
    pub async fn put_subscription_state(
        &self,
        subscription_id: i64,
        state: &SubscriptionState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_state (subscription_id, last_rsi, in_zone, armed,
                last_alert_at, days_in_zone, last_trading_date, missed_fetches)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscription_id) DO UPDATE SET
                last_rsi = excluded.last_rsi,
                in_zone = excluded.in_zone,
                armed = excluded.armed,
                last_alert_at = excluded.last_alert_at,
                days_in_zone = excluded.days_in_zone,
                last_trading_date = excluded.last_trading_date,
                missed_fetches = excluded.missed_fetches
            "#,
        )
        .bind(subscription_id)
        .bind(state.last_rsi)
        .bind(state.in_zone)
        .bind(state.armed)
        .bind(state.last_alert_at)
        .bind(state.days_in_zone)
        .bind(state.last_trading_date)
        .bind(state.missed_fetches)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- auto-scan state ----

    pub async fn get_auto_scan_state(
        &self,
        guild_id: i64,
        class: ConditionClass,
        scan_date: NaiveDate,
    ) -> Result<Option<AutoScanState>> {
        let row: Option<(String, Option<DateTime<Utc>>, i64)> = sqlx::query_as(
            r#"
            SELECT tickers_json, last_scan_at, post_count
            FROM auto_scan_state
            WHERE guild_id = ? AND condition_class = ? AND scan_date = ?
            "#,
        )
        .bind(guild_id)
        .bind(class.as_str())
        .bind(scan_date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let tickers: BTreeSet<String> = serde_json::from_str(&r.0)
                .map_err(|_| decode_err("tickers_json", &r.0))?;
            Ok(AutoScanState {
                guild_id,
                class,
                scan_date,
                tickers,
                last_scan_at: r.1,
                post_count: r.2,
            })
        })
        .transpose()
    }

    /// Overwrite the stored qualifying set for (guild, class, date), bumping
    /// the post counter when the scan produced a post.
    pub async fn update_auto_scan_state(
        &self,
        guild_id: i64,
        class: ConditionClass,
        scan_date: NaiveDate,
        tickers: &BTreeSet<String>,
        posted: bool,
        scanned_at: DateTime<Utc>,
    ) -> Result<()> {
        let tickers_json = serde_json::to_string(tickers)
            .map_err(|e| SentinelError::ConfigValidation(e.to_string()))?;
        let bump = posted as i64;

        sqlx::query(
            r#"
            INSERT INTO auto_scan_state (guild_id, condition_class, scan_date,
                tickers_json, last_scan_at, post_count)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, condition_class, scan_date) DO UPDATE SET
                tickers_json = excluded.tickers_json,
                last_scan_at = excluded.last_scan_at,
                post_count = auto_scan_state.post_count + ?
            "#,
        )
        .bind(guild_id)
        .bind(class.as_str())
        .bind(scan_date)
        .bind(&tickers_json)
        .bind(scanned_at)
        .bind(bump)
        .bind(bump)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop auto-scan snapshots older than `days_to_keep`.
    pub async fn cleanup_auto_scan_states(&self, days_to_keep: i64, today: NaiveDate) -> Result<u64> {
        let cutoff = today - Duration::days(days_to_keep);
        let result = sqlx::query("DELETE FROM auto_scan_state WHERE scan_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ---- ticker RSI snapshots ----

    pub async fn upsert_ticker_rsi(&self, snapshots: &[TickerRsi]) -> Result<u64> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            sqlx::query(
                r#"
                INSERT INTO ticker_rsi (ticker, rsi_14, trading_date, fetched_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(ticker) DO UPDATE SET
                    rsi_14 = excluded.rsi_14,
                    trading_date = excluded.trading_date,
                    fetched_at = excluded.fetched_at
                "#,
            )
            .bind(&snapshot.ticker)
            .bind(snapshot.rsi_14)
            .bind(snapshot.trading_date)
            .bind(snapshot.fetched_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(snapshots.len() as u64)
    }

    pub async fn get_ticker_rsi(&self, ticker: &str) -> Result<Option<TickerRsi>> {
        let row: Option<(String, f64, NaiveDate, DateTime<Utc>)> = sqlx::query_as(
            "SELECT ticker, rsi_14, trading_date, fetched_at FROM ticker_rsi WHERE ticker = ?",
        )
        .bind(ticker.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TickerRsi {
            ticker: r.0,
            rsi_14: r.1,
            trading_date: r.2,
            fetched_at: r.3,
        }))
    }

    pub async fn count_ticker_rsi(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ticker_rsi")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

type SubscriptionRow = (i64, i64, String, String, f64, i64, Option<i64>, DateTime<Utc>);

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = SentinelError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Subscription {
            id: row.0,
            guild_id: row.1,
            ticker: row.2,
            condition: Condition::parse(&row.3).ok_or_else(|| decode_err("condition", &row.3))?,
            threshold: row.4,
            cooldown_hours: row.5,
            owner_user_id: row.6,
            created_at: row.7,
        })
    }
}

fn decode_err(column: &str, value: &str) -> SentinelError {
    SentinelError::Store(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value: {value}").into(),
    })
}

fn parse_threshold(value: &str) -> Result<f64> {
    let threshold: f64 = value
        .parse()
        .map_err(|_| SentinelError::ConfigValidation(format!("threshold must be numeric: {value}")))?;
    if threshold <= 0.0 {
        return Err(SentinelError::ConfigValidation(
            "threshold must be positive".into(),
        ));
    }
    Ok(threshold)
}

#[cfg(test)]
mod tests;
