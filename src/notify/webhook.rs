//! Webhook delivery
//!
//! Posts rendered cycle reports as JSON `{"content": ...}` payloads to the
//! configured channel webhooks. Alert channels are only hit when the cycle
//! decided to post; the status line always goes to the changelog webhook.

use super::{format, AlertSink, CycleReport};
use crate::config::WebhookConfig;
use crate::error::{Result, SentinelError};
use crate::types::Condition;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

pub struct WebhookSink {
    http: Client,
    config: WebhookConfig,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self { http, config })
    }

    async fn post(&self, url: &str, content: &str) -> Result<()> {
        let resp = self
            .http
            .post(url)
            .json(&WebhookPayload { content })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SentinelError::DataFetch(format!(
                "webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn post_all(&self, url: &str, messages: &[String]) -> Result<usize> {
        let mut sent = 0;
        for message in messages {
            self.post(url, message).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, report: &CycleReport) -> Result<()> {
        let max_len = self.config.max_message_len;
        let mut sent = 0;

        if report.post_oversold {
            let messages = format::render_side(report, Condition::Under, max_len);
            sent += self.post_all(&self.config.oversold_url, &messages).await?;
        }
        if report.post_overbought {
            let messages = format::render_side(report, Condition::Over, max_len);
            sent += self
                .post_all(&self.config.overbought_url, &messages)
                .await?;
        }

        if let Some(changelog_url) = &self.config.changelog_url {
            self.post(changelog_url, &report.status_summary).await?;
        }

        debug!(guild_id = report.guild_id, sent, "webhook delivery complete");
        Ok(())
    }
}
