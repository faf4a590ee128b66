//! Outbound notification sink for newly trending contracts.
//!
//! The webhook payload follows the Discord embed format, which Slack-style
//! relays also accept: `{"embeds": [{"title", "description", "url"}]}`.

use eyre::{Context, Result};
use serde::Serialize;
use std::time::Duration;

/// One announced contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrendingEmbed {
    /// Contract address.
    pub title: String,
    /// `transactions=N / transfers=M`.
    pub description: String,
    /// Block explorer link.
    pub url: String,
}

/// Webhook body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<TrendingEmbed>,
}

impl WebhookPayload {
    pub fn is_empty(&self) -> bool {
        self.embeds.is_empty()
    }
}

/// Notification boundary.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Deliver a non-empty payload.
    ///
    /// # Errors
    /// Returns error if delivery fails.
    async fn notify(&self, payload: &WebhookPayload) -> Result<()>;
}

/// HTTP webhook poster.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip_all, fields(embeds = payload.embeds.len()))]
    async fn notify(&self, payload: &WebhookPayload) -> Result<()> {
        self.client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .wrap_err("failed to post webhook payload")?
            .error_for_status()
            .wrap_err("webhook returned an HTTP error status")?;

        tracing::info!(
            announced = payload.embeds.len(),
            "announced new contracts"
        );
        Ok(())
    }
}

/// Sink selected at startup: a webhook when one is configured, otherwise
/// structured log lines only.
pub enum NotificationSink {
    Webhook(WebhookNotifier),
    Log,
}

impl Notifier for NotificationSink {
    async fn notify(&self, payload: &WebhookPayload) -> Result<()> {
        match self {
            NotificationSink::Webhook(webhook) => webhook.notify(payload).await,
            NotificationSink::Log => {
                for embed in &payload.embeds {
                    tracing::info!(
                        contract = %embed.title,
                        summary = %embed.description,
                        url = %embed.url,
                        "trending free mint"
                    );
                }
                Ok(())
            }
        }
    }
}
