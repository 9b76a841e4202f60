//! Tests for core domain types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    #[test]
    fn test_condition_parse() {
        assert_eq!(Condition::parse("UNDER"), Some(Condition::Under));
        assert_eq!(Condition::parse("over"), Some(Condition::Over));
        assert_eq!(Condition::parse("sideways"), None);
    }

    #[test]
    fn test_condition_rule_symbol() {
        assert_eq!(Condition::Under.rule_symbol(), '<');
        assert_eq!(Condition::Over.rule_symbol(), '>');
    }

    #[test]
    fn test_alert_mode_parse() {
        assert_eq!(AlertMode::parse("CROSSING"), Some(AlertMode::Crossing));
        assert_eq!(AlertMode::parse("level"), Some(AlertMode::Level));
        assert_eq!(AlertMode::parse(""), None);
    }

    #[test]
    fn test_condition_class_maps_to_condition() {
        assert_eq!(ConditionClass::Oversold.condition(), Condition::Under);
        assert_eq!(ConditionClass::Overbought.condition(), Condition::Over);
    }

    #[test]
    fn test_condition_class_roundtrip() {
        for class in [ConditionClass::Oversold, ConditionClass::Overbought] {
            assert_eq!(ConditionClass::parse(class.as_str()), Some(class));
        }
    }

    #[test]
    fn test_guild_config_defaults() {
        let config = GuildConfig::defaults(42);
        assert_eq!(config.guild_id, 42);
        assert_eq!(config.default_cooldown_hours, 24);
        assert_eq!(config.alert_mode, AlertMode::Crossing);
        assert_eq!(config.hysteresis, 2.0);
        assert_eq!(config.auto_oversold, 34.0);
        assert_eq!(config.auto_overbought, 70.0);
        assert_eq!(config.schedule_time, "18:30");
        assert!(config.schedule_enabled);
    }

    #[test]
    fn test_unseen_state_is_armed() {
        let state = SubscriptionState::unseen();
        assert!(state.armed);
        assert!(!state.in_zone);
        assert_eq!(state.days_in_zone, 0);
        assert!(state.last_rsi.is_none());
        assert!(state.last_trading_date.is_none());
    }

    #[test]
    fn test_alert_day_label() {
        let mut alert = Alert {
            subscription_id: 1,
            guild_id: 1,
            ticker: "EQNR.OL".into(),
            name: "Equinor".into(),
            condition: Condition::Under,
            threshold: 30.0,
            rsi: 25.4,
            chart_url: String::new(),
            days_in_zone: 1,
            just_crossed: true,
            owner_user_id: None,
        };
        assert_eq!(alert.day_label(), "just crossed");
        assert_eq!(alert.rule_text(), "< 30");

        alert.just_crossed = false;
        alert.days_in_zone = 4;
        assert_eq!(alert.day_label(), "day 4");
    }
}
