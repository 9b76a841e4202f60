//! Trigger windows
//!
//! Wall-clock trigger conditions are data, evaluated against an injectable
//! clock so the scheduler is testable with a fixed time.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Source of current time. Production uses [`SystemClock`]; tests inject a
/// fixed one.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An hourly scan window: due at `minute` past each hour of
/// `start_hour..=end_hour`, weekdays only.
#[derive(Debug, Clone)]
pub struct ScanWindow {
    pub label: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
    pub minute: u32,
}

impl ScanWindow {
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        is_weekday(at)
            && at.minute() == self.minute
            && (self.start_hour..=self.end_hour).contains(&at.hour())
    }
}

pub fn is_weekday(at: DateTime<Utc>) -> bool {
    !matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Parse a guild schedule time of the form `HH:MM`.
pub fn parse_schedule_time(s: &str) -> Option<(u32, u32)> {
    let (hour, minute) = s.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        // March 2024: the 4th is a Monday, the 9th a Saturday
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn window() -> ScanWindow {
        ScanWindow {
            label: "european",
            start_hour: 9,
            end_hour: 17,
            minute: 30,
        }
    }

    #[test]
    fn test_due_inside_window_on_weekday() {
        assert!(window().is_due(at(4, 9, 30)));
        assert!(window().is_due(at(4, 17, 30)));
        assert!(window().is_due(at(8, 12, 30)));
    }

    #[test]
    fn test_not_due_outside_hours_or_minute() {
        assert!(!window().is_due(at(4, 8, 30)));
        assert!(!window().is_due(at(4, 18, 30)));
        assert!(!window().is_due(at(4, 12, 0)));
        assert!(!window().is_due(at(4, 12, 31)));
    }

    #[test]
    fn test_not_due_on_weekend() {
        assert!(!window().is_due(at(9, 12, 30)));
        assert!(!window().is_due(at(10, 12, 30)));
    }

    #[test]
    fn test_is_weekday() {
        assert!(is_weekday(at(4, 0, 0)));
        assert!(is_weekday(at(8, 0, 0)));
        assert!(!is_weekday(at(9, 0, 0)));
        assert!(!is_weekday(at(10, 0, 0)));
    }

    #[test]
    fn test_parse_schedule_time() {
        assert_eq!(parse_schedule_time("18:30"), Some((18, 30)));
        assert_eq!(parse_schedule_time("09:05"), Some((9, 5)));
        assert_eq!(parse_schedule_time("24:00"), None);
        assert_eq!(parse_schedule_time("12:60"), None);
        assert_eq!(parse_schedule_time("noonish"), None);
        assert_eq!(parse_schedule_time(""), None);
    }
}
