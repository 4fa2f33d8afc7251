//! Fan-out to configured channels. Table-failure notifications are
//! rate-limited per process: a flood of failing tables in one run should
//! not turn into a flood of pages. Run-start and run-finish notifications
//! are never rate-limited — there is at most one of each per run.

use crate::error::NotifyError;
use crate::payload::{NotifyEvent, NotifyPayload};
use governor::{Quota, RateLimiter};
use lettre::message::Message;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};
use rowvault_config::{resolve_secret_env, NotifyChannel, NotifyConfig};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

const TABLE_FAILURE_RATE_PER_MINUTE: u32 = 6;

pub struct NotifyDispatcher {
    channels: Vec<NotifyChannel>,
    http: reqwest::Client,
    table_failure_limiter: DirectLimiter,
}

impl NotifyDispatcher {
    pub fn new(config: NotifyConfig) -> Self {
        let rate = NonZeroU32::new(TABLE_FAILURE_RATE_PER_MINUTE).unwrap();
        Self {
            channels: config.channels,
            http: reqwest::Client::new(),
            table_failure_limiter: RateLimiter::direct(Quota::per_minute(rate)),
        }
    }

    /// Dispatches `event` to every configured channel. A table failure that
    /// exceeds the rate limit is dropped silently (logged at debug) rather
    /// than queued, so notification delivery never backs up the run it is
    /// reporting on. Per-channel failures are logged and do not affect each
    /// other or the run.
    pub async fn notify(&self, event: NotifyEvent) {
        if matches!(event, NotifyEvent::TableFailure { .. }) && self.table_failure_limiter.check().is_err() {
            tracing::debug!("table-failure notification suppressed by rate limit");
            return;
        }

        if self.channels.is_empty() {
            return;
        }

        let payload = NotifyPayload::from(&event);
        for channel in &self.channels {
            let result = match channel {
                NotifyChannel::Slack { webhook_url_env } => self.send_webhook(webhook_url_env, &payload).await,
                NotifyChannel::Teams { webhook_url_env } => self.send_webhook(webhook_url_env, &payload).await,
                NotifyChannel::Email { to, smtp_url_env } => self.send_email(to, smtp_url_env, &payload).await,
            };
            if let Err(error) = result {
                tracing::warn!(%error, channel = channel_label(channel), "notification delivery failed");
            }
        }
    }

    async fn send_webhook(&self, url_env: &str, payload: &NotifyPayload) -> Result<(), NotifyError> {
        let url = resolve_secret_env(url_env)?;
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "text": payload.subject, "payload": payload }))
            .send()
            .await
            .map_err(|source| NotifyError::Webhook { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(NotifyError::WebhookStatus { url, status: response.status() });
        }
        Ok(())
    }

    async fn send_email(&self, to: &[String], smtp_url_env: &str, payload: &NotifyPayload) -> Result<(), NotifyError> {
        let smtp_url = resolve_secret_env(smtp_url_env)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(&smtp_url)
            .map_err(|e| NotifyError::SmtpTransport(e.to_string()))?
            .build();

        let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.subject.clone());
        for recipient in to {
            let message = Message::builder()
                .from("rowvault@localhost".parse().map_err(|e: lettre::address::AddressError| NotifyError::MessageBuild(e.to_string()))?)
                .to(recipient.parse().map_err(|e: lettre::address::AddressError| NotifyError::MessageBuild(e.to_string()))?)
                .subject(payload.subject.clone())
                .body(body.clone())
                .map_err(|e| NotifyError::MessageBuild(e.to_string()))?;

            transport.send(message).await.map_err(|e| NotifyError::SmtpSend(e.to_string()))?;
        }
        Ok(())
    }
}

fn channel_label(channel: &NotifyChannel) -> &'static str {
    match channel {
        NotifyChannel::Slack { .. } => "slack",
        NotifyChannel::Teams { .. } => "teams",
        NotifyChannel::Email { .. } => "email",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowvault_config::NotifyConfig;

    #[tokio::test]
    async fn empty_channel_list_is_a_no_op() {
        let dispatcher = NotifyDispatcher::new(NotifyConfig { channels: Vec::new() });
        dispatcher
            .notify(NotifyEvent::RunStart { run_id: "r1".into(), databases: vec!["db1".into()] })
            .await;
    }

    #[tokio::test]
    async fn table_failure_beyond_rate_is_suppressed_without_panicking() {
        let dispatcher = NotifyDispatcher::new(NotifyConfig { channels: Vec::new() });
        for _ in 0..(TABLE_FAILURE_RATE_PER_MINUTE as usize + 3) {
            dispatcher
                .notify(NotifyEvent::TableFailure {
                    run_id: "r1".into(),
                    database: "db1".into(),
                    schema: "public".into(),
                    table: "audit_logs".into(),
                    error_class: "BATCH_ERROR_TRANSIENT".into(),
                    message: "timeout".into(),
                })
                .await;
        }
    }
}
