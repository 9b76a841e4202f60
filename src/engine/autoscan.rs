//! Auto-scan change detection
//!
//! Catalog scans are population-level snapshots against the guild thresholds,
//! independent from subscription evaluation: no hysteresis, no ownership.
//! A post is warranted only when today's qualifying set differs from the one
//! stored for the same scan date.

use crate::market::TickerFetch;
use crate::types::ConditionClass;
use std::collections::{BTreeSet, HashMap};

/// Result of comparing today's qualifying set against the stored one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDelta {
    pub should_post: bool,
    /// Tickers qualifying today that were absent from the stored set.
    pub newly_entered: BTreeSet<String>,
    /// Tickers from the stored set that no longer qualify.
    pub left: BTreeSet<String>,
    pub previous: Option<BTreeSet<String>>,
}

/// Compare today's qualifying set against the stored one for the same
/// (guild, class, date) key. `previous = None` means first scan of the day.
pub fn detect_change(previous: Option<&BTreeSet<String>>, today: &BTreeSet<String>) -> ScanDelta {
    match previous {
        None => ScanDelta {
            should_post: !today.is_empty(),
            newly_entered: today.clone(),
            left: BTreeSet::new(),
            previous: None,
        },
        Some(prev) => {
            // Set inequality covers the transition to empty as well: going
            // from "some tickers qualify" to "none qualify" is reportable.
            let should_post = prev != today;
            ScanDelta {
                should_post,
                newly_entered: today.difference(prev).cloned().collect(),
                left: prev.difference(today).cloned().collect(),
                previous: Some(prev.clone()),
            }
        }
    }
}

/// Tickers from a fetch result that qualify for `class` at `threshold`.
pub fn qualifying_set(
    readings: &HashMap<String, TickerFetch>,
    class: ConditionClass,
    threshold: f64,
) -> BTreeSet<String> {
    readings
        .iter()
        .filter_map(|(ticker, fetch)| {
            let reading = fetch.reading()?;
            let qualifies = match class {
                ConditionClass::Oversold => reading.rsi < threshold,
                ConditionClass::Overbought => reading.rsi > threshold,
            };
            qualifies.then(|| ticker.clone())
        })
        .collect()
}
