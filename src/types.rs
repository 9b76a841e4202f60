//! Core domain types shared by the engine, scheduler, and storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Subscription trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Alert when RSI drops under the threshold.
    Under,
    /// Alert when RSI rises over the threshold.
    Over,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Under => "UNDER",
            Condition::Over => "OVER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UNDER" => Some(Condition::Under),
            "OVER" => Some(Condition::Over),
            _ => None,
        }
    }

    /// Comparison symbol used in rendered rule text.
    pub fn rule_symbol(&self) -> char {
        match self {
            Condition::Under => '<',
            Condition::Over => '>',
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert firing mode for subscription evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertMode {
    /// Fire only on the armed → in-zone transition.
    Crossing,
    /// Fire on every in-zone evaluation once the cooldown has elapsed.
    Level,
}

impl AlertMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertMode::Crossing => "CROSSING",
            AlertMode::Level => "LEVEL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CROSSING" => Some(AlertMode::Crossing),
            "LEVEL" => Some(AlertMode::Level),
            _ => None,
        }
    }
}

impl fmt::Display for AlertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Population-level condition class used by catalog auto-scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionClass {
    Oversold,
    Overbought,
}

impl ConditionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionClass::Oversold => "OVERSOLD",
            ConditionClass::Overbought => "OVERBOUGHT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OVERSOLD" => Some(ConditionClass::Oversold),
            "OVERBOUGHT" => Some(ConditionClass::Overbought),
            _ => None,
        }
    }

    /// The subscription condition this class corresponds to.
    pub fn condition(&self) -> Condition {
        match self {
            ConditionClass::Oversold => Condition::Under,
            ConditionClass::Overbought => Condition::Over,
        }
    }
}

impl fmt::Display for ConditionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-guild configuration, read fresh at the start of every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildConfig {
    pub guild_id: i64,
    /// Default cooldown applied to subscriptions without an override (hours).
    pub default_cooldown_hours: i64,
    pub alert_mode: AlertMode,
    /// Margin past the threshold a reading must cross back over before a
    /// subscription re-arms.
    pub hysteresis: f64,
    /// Auto-scan oversold threshold (population snapshot, no hysteresis).
    pub auto_oversold: f64,
    /// Auto-scan overbought threshold.
    pub auto_overbought: f64,
    /// Daily subscription check time, "HH:MM".
    pub schedule_time: String,
    pub schedule_enabled: bool,
}

impl GuildConfig {
    pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;
    pub const DEFAULT_HYSTERESIS: f64 = 2.0;
    pub const DEFAULT_AUTO_OVERSOLD: f64 = 34.0;
    pub const DEFAULT_AUTO_OVERBOUGHT: f64 = 70.0;
    pub const DEFAULT_SCHEDULE_TIME: &'static str = "18:30";

    /// Configuration for a guild that has never been configured.
    pub fn defaults(guild_id: i64) -> Self {
        Self {
            guild_id,
            default_cooldown_hours: Self::DEFAULT_COOLDOWN_HOURS,
            alert_mode: AlertMode::Crossing,
            hysteresis: Self::DEFAULT_HYSTERESIS,
            auto_oversold: Self::DEFAULT_AUTO_OVERSOLD,
            auto_overbought: Self::DEFAULT_AUTO_OVERBOUGHT,
            schedule_time: Self::DEFAULT_SCHEDULE_TIME.to_string(),
            schedule_enabled: true,
        }
    }
}

/// A user-created alert subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub guild_id: i64,
    pub ticker: String,
    pub condition: Condition,
    pub threshold: f64,
    /// Cooldown override in hours; falls back to the guild default when the
    /// subscription was created without one.
    pub cooldown_hours: i64,
    pub owner_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Evaluation state tracked one-to-one with a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    pub last_rsi: Option<f64>,
    /// Whether the last reading satisfied the subscription condition.
    pub in_zone: bool,
    /// Whether the next zone entry is eligible to fire. Drops on entry,
    /// recovers only past the hysteresis-adjusted re-arm boundary.
    pub armed: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
    /// Consecutive trading days the reading has stayed in zone.
    pub days_in_zone: i64,
    pub last_trading_date: Option<NaiveDate>,
    /// Evaluations that saw no reading for the ticker.
    pub missed_fetches: i64,
}

impl SubscriptionState {
    /// Sentinel state for a subscription that has never been evaluated.
    /// Starts armed so a first reading already in zone fires.
    pub fn unseen() -> Self {
        Self {
            last_rsi: None,
            in_zone: false,
            armed: true,
            last_alert_at: None,
            days_in_zone: 0,
            last_trading_date: None,
            missed_fetches: 0,
        }
    }
}

/// Latest persisted RSI snapshot for a ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRsi {
    pub ticker: String,
    pub rsi_14: f64,
    pub trading_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

/// Day-scoped auto-scan snapshot used for change detection.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoScanState {
    pub guild_id: i64,
    pub class: ConditionClass,
    pub scan_date: NaiveDate,
    /// Tickers that qualified on the most recent scan of `scan_date`.
    pub tickers: BTreeSet<String>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub post_count: i64,
}

/// A triggered subscription alert, ready for the notification boundary.
#[derive(Debug, Clone)]
pub struct Alert {
    pub subscription_id: i64,
    pub guild_id: i64,
    pub ticker: String,
    pub name: String,
    pub condition: Condition,
    pub threshold: f64,
    pub rsi: f64,
    pub chart_url: String,
    pub days_in_zone: i64,
    pub just_crossed: bool,
    pub owner_user_id: Option<i64>,
}

impl Alert {
    /// Rendered rule, e.g. `< 30`.
    pub fn rule_text(&self) -> String {
        format!("{} {}", self.condition.rule_symbol(), self.threshold)
    }

    /// Persistence marker: "just crossed" on the first in-zone day,
    /// otherwise "day N".
    pub fn day_label(&self) -> String {
        if self.just_crossed || self.days_in_zone <= 1 {
            "just crossed".to_string()
        } else {
            format!("day {}", self.days_in_zone)
        }
    }
}
