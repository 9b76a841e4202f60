//! Notification boundary
//!
//! The scheduler hands each cycle's structured result to an [`AlertSink`];
//! sinks own formatting, chunking, and transport. The core never builds
//! transport-specific payloads.

pub mod format;
mod webhook;

pub use webhook::WebhookSink;

use crate::error::Result;
use crate::types::Alert;
use async_trait::async_trait;
use tracing::info;

/// What kind of cycle produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    AutoScan,
    SubscriptionCheck,
}

/// One qualifying-catalog entry, already sorted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub ticker: String,
    pub name: String,
    pub rsi: f64,
    pub rule_text: String,
    pub day_label: String,
    pub chart_url: String,
}

/// Structured per-cycle result for one guild.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub guild_id: i64,
    pub kind: CycleKind,
    /// Ascending by RSI.
    pub qualifying_oversold: Vec<ScanEntry>,
    /// Descending by RSI.
    pub qualifying_overbought: Vec<ScanEntry>,
    /// Under alerts ascending, then over alerts descending.
    pub subscription_alerts: Vec<Alert>,
    pub status_summary: String,
    pub post_oversold: bool,
    pub post_overbought: bool,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, report: &CycleReport) -> Result<()>;
}

/// Sink that writes rendered reports to the log. Used when no webhook is
/// configured, and handy for manual runs.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, report: &CycleReport) -> Result<()> {
        if report.post_oversold {
            for message in format::render_oversold(report) {
                info!(guild_id = report.guild_id, "{message}");
            }
        }
        if report.post_overbought {
            for message in format::render_overbought(report) {
                info!(guild_id = report.guild_id, "{message}");
            }
        }
        info!(guild_id = report.guild_id, "{}", report.status_summary);
        Ok(())
    }
}
