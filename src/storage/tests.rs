//! Unit tests for SQLite persistence

use super::*;
use crate::types::{AlertMode, Condition, ConditionClass, SubscriptionState};
use chrono::TimeZone;

async fn temp_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Database::connect(path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

#[tokio::test]
async fn test_guild_config_defaults_on_create() {
    let (db, _dir) = temp_db().await;
    let config = db.get_or_create_guild_config(123).await.unwrap();

    assert_eq!(config.guild_id, 123);
    assert_eq!(config.default_cooldown_hours, 24);
    assert_eq!(config.alert_mode, AlertMode::Crossing);
    assert!(config.schedule_enabled);

    // Persisted, not just returned
    let fetched = db.get_guild_config(123).await.unwrap().unwrap();
    assert_eq!(fetched, config);
}

#[tokio::test]
async fn test_schedule_toggle_persists_and_leaves_other_fields() {
    let (db, _dir) = temp_db().await;
    db.get_or_create_guild_config(1).await.unwrap();
    db.apply_config(1, "cooldown", "48").await.unwrap();
    db.apply_config(1, "auto_oversold", "25").await.unwrap();

    let config = db.apply_config(1, "schedule_enabled", "false").await.unwrap();
    assert!(!config.schedule_enabled);
    assert_eq!(config.default_cooldown_hours, 48);
    assert_eq!(config.auto_oversold, 25.0);

    let config = db.apply_config(1, "schedule_enabled", "true").await.unwrap();
    assert!(config.schedule_enabled);
}

#[tokio::test]
async fn test_guild_configs_are_independent() {
    let (db, _dir) = temp_db().await;
    db.get_or_create_guild_config(1).await.unwrap();
    db.get_or_create_guild_config(2).await.unwrap();

    db.apply_config(1, "schedule_enabled", "false").await.unwrap();

    assert!(!db.get_guild_config(1).await.unwrap().unwrap().schedule_enabled);
    assert!(db.get_guild_config(2).await.unwrap().unwrap().schedule_enabled);

    let ids = db.all_guild_ids().await.unwrap();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_apply_config_rejects_invalid_input_without_mutation() {
    let (db, _dir) = temp_db().await;
    let before = db.get_or_create_guild_config(1).await.unwrap();

    assert!(db.apply_config(1, "alert_mode", "SOMETIMES").await.is_err());
    assert!(db.apply_config(1, "schedule_time", "25:99").await.is_err());
    assert!(db.apply_config(1, "cooldown", "-1").await.is_err());
    assert!(db.apply_config(1, "hysteresis", "abc").await.is_err());
    assert!(db.apply_config(1, "no_such_field", "1").await.is_err());
    // Cross-field constraint: oversold must stay below overbought
    assert!(db.apply_config(1, "auto_oversold", "75").await.is_err());

    let after = db.get_guild_config(1).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_apply_config_valid_fields() {
    let (db, _dir) = temp_db().await;
    db.get_or_create_guild_config(1).await.unwrap();

    let config = db.apply_config(1, "alert_mode", "level").await.unwrap();
    assert_eq!(config.alert_mode, AlertMode::Level);

    let config = db.apply_config(1, "schedule_time", "09:15").await.unwrap();
    assert_eq!(config.schedule_time, "09:15");

    let config = db.apply_config(1, "hysteresis", "3.5").await.unwrap();
    assert_eq!(config.hysteresis, 3.5);
}

#[tokio::test]
async fn test_subscription_create_and_state_row() {
    let (db, _dir) = temp_db().await;
    let sub = db
        .create_subscription(1, "eqnr.ol", Condition::Under, 30.0, None, Some(99))
        .await
        .unwrap();

    assert_eq!(sub.ticker, "EQNR.OL");
    // Falls back to the guild default cooldown
    assert_eq!(sub.cooldown_hours, 24);

    let state = db.get_subscription_state(sub.id).await.unwrap().unwrap();
    assert_eq!(state, SubscriptionState::unseen());

    assert!(db
        .subscription_exists(1, "EQNR.OL", Condition::Under, 30.0)
        .await
        .unwrap());
    assert!(!db
        .subscription_exists(1, "EQNR.OL", Condition::Over, 30.0)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete_subscription_cascades_state() {
    let (db, _dir) = temp_db().await;
    let sub = db
        .create_subscription(1, "AAPL", Condition::Over, 70.0, Some(12), None)
        .await
        .unwrap();
    assert_eq!(sub.cooldown_hours, 12);

    // Wrong guild does not delete
    assert!(!db.delete_subscription(sub.id, 2).await.unwrap());
    assert!(db.delete_subscription(sub.id, 1).await.unwrap());

    assert!(db.get_subscription_state(sub.id).await.unwrap().is_none());
    assert!(db.subscriptions_for_guild(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_owner_subscriptions() {
    let (db, _dir) = temp_db().await;
    db.create_subscription(1, "AAPL", Condition::Over, 70.0, None, Some(7))
        .await
        .unwrap();
    db.create_subscription(1, "MSFT", Condition::Under, 30.0, None, Some(7))
        .await
        .unwrap();
    db.create_subscription(1, "EQNR.OL", Condition::Under, 30.0, None, Some(8))
        .await
        .unwrap();

    let removed = db.delete_owner_subscriptions(1, 7).await.unwrap();
    assert_eq!(removed, 2);

    let remaining = db.subscriptions_for_guild(1).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].owner_user_id, Some(8));
}

#[tokio::test]
async fn test_subscription_state_roundtrip() {
    let (db, _dir) = temp_db().await;
    let sub = db
        .create_subscription(1, "AAPL", Condition::Under, 30.0, None, None)
        .await
        .unwrap();

    let state = SubscriptionState {
        last_rsi: Some(27.3),
        in_zone: true,
        armed: false,
        last_alert_at: Some(Utc.with_ymd_and_hms(2024, 3, 4, 18, 30, 0).unwrap()),
        days_in_zone: 3,
        last_trading_date: NaiveDate::from_ymd_opt(2024, 3, 4),
        missed_fetches: 2,
    };
    db.put_subscription_state(sub.id, &state).await.unwrap();

    let fetched = db.get_subscription_state(sub.id).await.unwrap().unwrap();
    assert_eq!(fetched, state);
}

#[tokio::test]
async fn test_auto_scan_state_roundtrip_and_post_count() {
    let (db, _dir) = temp_db().await;
    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 30, 0).unwrap();

    assert!(db
        .get_auto_scan_state(1, ConditionClass::Oversold, date)
        .await
        .unwrap()
        .is_none());

    let tickers: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
    db.update_auto_scan_state(1, ConditionClass::Oversold, date, &tickers, true, now)
        .await
        .unwrap();

    let state = db
        .get_auto_scan_state(1, ConditionClass::Oversold, date)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.tickers, tickers);
    assert_eq!(state.post_count, 1);

    // Second scan without a post keeps the counter
    db.update_auto_scan_state(1, ConditionClass::Oversold, date, &tickers, false, now)
        .await
        .unwrap();
    let state = db
        .get_auto_scan_state(1, ConditionClass::Oversold, date)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.post_count, 1);

    // Classes are keyed independently
    assert!(db
        .get_auto_scan_state(1, ConditionClass::Overbought, date)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cleanup_old_auto_scan_states() {
    let (db, _dir) = temp_db().await;
    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    let old = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 10, 30, 0).unwrap();
    let tickers = BTreeSet::new();

    db.update_auto_scan_state(1, ConditionClass::Oversold, old, &tickers, false, now)
        .await
        .unwrap();
    db.update_auto_scan_state(1, ConditionClass::Oversold, today, &tickers, false, now)
        .await
        .unwrap();

    let removed = db.cleanup_auto_scan_states(7, today).await.unwrap();
    assert_eq!(removed, 1);
    assert!(db
        .get_auto_scan_state(1, ConditionClass::Oversold, today)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_ticker_rsi_upsert_and_fetch() {
    let (db, _dir) = temp_db().await;
    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 30, 0).unwrap();

    let snapshots = vec![
        TickerRsi {
            ticker: "AAPL".into(),
            rsi_14: 55.2,
            trading_date: date,
            fetched_at: now,
        },
        TickerRsi {
            ticker: "EQNR.OL".into(),
            rsi_14: 28.9,
            trading_date: date,
            fetched_at: now,
        },
    ];
    assert_eq!(db.upsert_ticker_rsi(&snapshots).await.unwrap(), 2);
    assert_eq!(db.count_ticker_rsi().await.unwrap(), 2);

    // Upsert overwrites
    let update = vec![TickerRsi {
        ticker: "AAPL".into(),
        rsi_14: 61.0,
        trading_date: date,
        fetched_at: now,
    }];
    db.upsert_ticker_rsi(&update).await.unwrap();

    let fetched = db.get_ticker_rsi("aapl").await.unwrap().unwrap();
    assert_eq!(fetched.rsi_14, 61.0);
    assert_eq!(db.count_ticker_rsi().await.unwrap(), 2);
}
