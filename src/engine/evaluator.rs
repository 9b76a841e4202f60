//! Crossing/cooldown state machine
//!
//! `evaluate` is a pure function from (previous state, reading, rule, now) to
//! (next state, fire decision). Absence of data is a valid no-op input, not a
//! failure: the state records the miss and nothing else changes.

use crate::market::Reading;
use crate::types::{AlertMode, Condition, SubscriptionState};
use chrono::{DateTime, Duration, Utc};

/// Evaluation rule derived from a subscription and its guild config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub threshold: f64,
    pub hysteresis: f64,
    pub alert_mode: AlertMode,
    pub cooldown_hours: i64,
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: SubscriptionState,
    pub fire: bool,
}

pub fn evaluate(
    prev: &SubscriptionState,
    reading: Option<Reading>,
    rule: &Rule,
    now: DateTime<Utc>,
) -> Evaluation {
    let Some(reading) = reading else {
        let mut state = prev.clone();
        state.missed_fetches += 1;
        return Evaluation { state, fire: false };
    };

    let in_zone = match rule.condition {
        Condition::Under => reading.rsi < rule.threshold,
        Condition::Over => reading.rsi > rule.threshold,
    };

    // Re-arm boundary is inclusive: a reading landing exactly on
    // threshold ± hysteresis re-arms.
    let past_rearm_boundary = match rule.condition {
        Condition::Under => reading.rsi >= rule.threshold + rule.hysteresis,
        Condition::Over => reading.rsi <= rule.threshold - rule.hysteresis,
    };

    // Arming drops on any in-zone cycle and recovers only once the reading
    // has moved back past the boundary.
    let armed = if in_zone {
        false
    } else {
        prev.armed || past_rearm_boundary
    };

    // Day counting is trading-day granular: repeated intraday scans on the
    // same bar date do not advance the counter.
    let new_day = prev.last_trading_date != Some(reading.trading_date);
    let days_in_zone = if !in_zone {
        0
    } else if !prev.in_zone {
        1
    } else if new_day {
        prev.days_in_zone + 1
    } else {
        prev.days_in_zone
    };

    let cooled = match prev.last_alert_at {
        Some(at) => now - at >= Duration::hours(rule.cooldown_hours),
        None => true,
    };

    let crossed = prev.armed && !prev.in_zone && in_zone;
    let fire = match rule.alert_mode {
        AlertMode::Level => in_zone && cooled,
        AlertMode::Crossing => crossed && cooled,
    };

    let state = SubscriptionState {
        last_rsi: Some(reading.rsi),
        in_zone,
        armed,
        last_alert_at: if fire { Some(now) } else { prev.last_alert_at },
        days_in_zone,
        last_trading_date: Some(reading.trading_date),
        missed_fetches: prev.missed_fetches,
    };

    Evaluation { state, fire }
}
