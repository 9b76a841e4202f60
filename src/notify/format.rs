//! Text rendering for cycle reports
//!
//! Produces the numbered alert lines and splits long lists into messages
//! under the transport's character limit, items never split mid-line.

use super::{CycleReport, ScanEntry};
use crate::types::{Alert, Condition};

pub const DEFAULT_MAX_LEN: usize = 1900;
const CONTINUATION_HEADER: &str = "**...continued**\n\n";
const FAILED_PREVIEW_LIMIT: usize = 5;

pub fn render_oversold(report: &CycleReport) -> Vec<String> {
    render_side(report, Condition::Under, DEFAULT_MAX_LEN)
}

pub fn render_overbought(report: &CycleReport) -> Vec<String> {
    render_side(report, Condition::Over, DEFAULT_MAX_LEN)
}

pub fn render_side(report: &CycleReport, condition: Condition, max_len: usize) -> Vec<String> {
    let (header, entries) = match condition {
        Condition::Under => ("📉 **RSI Oversold**", &report.qualifying_oversold),
        Condition::Over => ("📈 **RSI Overbought**", &report.qualifying_overbought),
    };

    let mut lines = Vec::new();
    if !entries.is_empty() {
        lines.push("**Catalog (newly entered zone):**".to_string());
        for (i, entry) in entries.iter().enumerate() {
            lines.push(format_scan_entry(i + 1, entry));
        }
    }

    let subs: Vec<&Alert> = report
        .subscription_alerts
        .iter()
        .filter(|a| a.condition == condition)
        .collect();
    if !subs.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("**Subscription alerts:**".to_string());
        for (i, alert) in subs.iter().enumerate() {
            lines.push(format_alert_line(i + 1, alert));
        }
    }

    if lines.is_empty() {
        // Posted on the transition to an empty qualifying set
        return vec![format!("{header}\n\nNo tickers currently qualify.")];
    }

    chunk_lines(&format!("{header}\n\n"), &lines, max_len, CONTINUATION_HEADER)
}

pub fn format_scan_entry(index: usize, entry: &ScanEntry) -> String {
    if entry.chart_url.is_empty() {
        format!(
            "{index}) **{}** — {} — RSI14: **{:.1}** | Rule: **{}** | {}",
            entry.ticker, entry.name, entry.rsi, entry.rule_text, entry.day_label
        )
    } else {
        format!(
            "{index}) **{}** — [{}](<{}>) — RSI14: **{:.1}** | Rule: **{}** | {}",
            entry.ticker, entry.name, entry.chart_url, entry.rsi, entry.rule_text, entry.day_label
        )
    }
}

pub fn format_alert_line(index: usize, alert: &Alert) -> String {
    if alert.chart_url.is_empty() {
        format!(
            "{index}) **{}** — {} — RSI14: **{:.1}** | Rule: **{}** | **{}**",
            alert.ticker,
            alert.name,
            alert.rsi,
            alert.rule_text(),
            alert.day_label()
        )
    } else {
        format!(
            "{index}) **{}** — [{}](<{}>) — RSI14: **{:.1}** | Rule: **{}** | **{}**",
            alert.ticker,
            alert.name,
            alert.chart_url,
            alert.rsi,
            alert.rule_text(),
            alert.day_label()
        )
    }
}

/// Join `lines` under `header`, splitting into messages that stay within
/// `max_len`. Continuation messages get their own header; items are never
/// split across messages.
pub fn chunk_lines(
    header: &str,
    lines: &[String],
    max_len: usize,
    continuation_header: &str,
) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = header.to_string();
    let mut has_items = false;

    for line in lines {
        let with_newline = format!("{line}\n");
        if has_items && current.len() + with_newline.len() > max_len {
            messages.push(current.trim_end().to_string());
            current = continuation_header.to_string();
        }
        current.push_str(&with_newline);
        has_items = true;
    }

    if has_items {
        messages.push(current.trim_end().to_string());
    }
    messages
}

/// Short failed-ticker list for the status line, e.g. `AAPL, MSFT (+3 more)`.
pub fn failed_preview(failed: &[String]) -> String {
    if failed.is_empty() {
        return String::new();
    }
    let shown: Vec<&str> = failed
        .iter()
        .take(FAILED_PREVIEW_LIMIT)
        .map(String::as_str)
        .collect();
    let mut preview = shown.join(", ");
    if failed.len() > FAILED_PREVIEW_LIMIT {
        preview.push_str(&format!(" (+{} more)", failed.len() - FAILED_PREVIEW_LIMIT));
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CycleKind;

    fn entry(ticker: &str, rsi: f64) -> ScanEntry {
        ScanEntry {
            ticker: ticker.to_string(),
            name: format!("{ticker} Corp"),
            rsi,
            rule_text: "< 34".to_string(),
            day_label: "new".to_string(),
            chart_url: String::new(),
        }
    }

    fn report_with(oversold: Vec<ScanEntry>) -> CycleReport {
        CycleReport {
            guild_id: 1,
            kind: CycleKind::AutoScan,
            qualifying_oversold: oversold,
            qualifying_overbought: vec![],
            subscription_alerts: vec![],
            status_summary: String::new(),
            post_oversold: true,
            post_overbought: false,
        }
    }

    #[test]
    fn test_scan_entry_format() {
        let line = format_scan_entry(1, &entry("AAPL", 28.94));
        assert_eq!(
            line,
            "1) **AAPL** — AAPL Corp — RSI14: **28.9** | Rule: **< 34** | new"
        );
    }

    #[test]
    fn test_scan_entry_with_chart_link() {
        let mut e = entry("AAPL", 28.9);
        e.chart_url = "https://example.com/aapl".to_string();
        let line = format_scan_entry(2, &e);
        assert!(line.contains("[AAPL Corp](<https://example.com/aapl>)"));
    }

    #[test]
    fn test_empty_report_renders_none_qualify() {
        let messages = render_oversold(&report_with(vec![]));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("No tickers currently qualify"));
    }

    #[test]
    fn test_short_list_is_one_message() {
        let messages = render_oversold(&report_with(vec![entry("A", 20.0), entry("B", 25.0)]));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("📉"));
        assert!(messages[0].contains("1) **A**"));
        assert!(messages[0].contains("2) **B**"));
    }

    #[test]
    fn test_chunking_splits_long_lists() {
        let lines: Vec<String> = (0..100).map(|i| format!("line number {i:03}")).collect();
        let messages = chunk_lines("HEADER\n\n", &lines, 200, "...cont\n\n");

        assert!(messages.len() > 1);
        assert!(messages[0].starts_with("HEADER"));
        assert!(messages[1].starts_with("...cont"));
        for message in &messages {
            assert!(message.len() <= 200);
        }
        // No line lost
        let total: usize = messages
            .iter()
            .map(|m| m.matches("line number").count())
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_failed_preview_truncates() {
        let failed: Vec<String> = (0..8).map(|i| format!("T{i}")).collect();
        assert_eq!(failed_preview(&failed), "T0, T1, T2, T3, T4 (+3 more)");
        assert_eq!(failed_preview(&failed[..2]), "T0, T1");
        assert_eq!(failed_preview(&[]), "");
    }
}
