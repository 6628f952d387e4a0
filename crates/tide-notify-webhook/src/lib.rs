// # Webhook Notifier
//
// Sends markdown messages (DingTalk-style robot payload) to a webhook:
//
// ```json
// { "msgtype": "markdown", "markdown": { "title": "...", "text": "..." } }
// ```
//
// Delivery is best-effort. Transport errors and non-2xx answers are logged
// and swallowed; the engine never sees them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tide_core::config::NotificationConfig;
use tide_core::traits::{NotificationEvent, Notifier};

/// Default HTTP timeout for webhook requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("tide-ddns-webhook/", env!("CARGO_PKG_VERSION"));

/// Webhook request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub msgtype: String,
    pub markdown: MarkdownBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownBody {
    pub title: String,
    pub text: String,
}

impl WebhookPayload {
    fn markdown(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            msgtype: "markdown".to_string(),
            markdown: MarkdownBody {
                title: title.into(),
                text: text.into(),
            },
        }
    }
}

/// Notifier posting markdown messages to a webhook URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    config: NotificationConfig,

    /// Zone shown in messages
    domain_label: String,

    /// Record shown in messages
    record_label: String,

    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier
    ///
    /// `domain_label` and `record_label` only decorate the messages; empty
    /// labels render as "N/A".
    pub fn new(
        config: NotificationConfig,
        domain_label: impl Into<String>,
        record_label: impl Into<String>,
    ) -> Self {
        Self {
            config,
            domain_label: domain_label.into(),
            record_label: record_label.into(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Set the HTTP request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        self
    }

    /// URL to post to, if notifications are enabled and a URL is set
    fn active_url(&self) -> Option<&str> {
        if !self.config.enabled {
            return None;
        }
        self.config.webhook_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Render the message for an event at time `now`
    pub fn render(&self, event: &NotificationEvent, now: DateTime<Utc>) -> WebhookPayload {
        let mut text = String::new();

        let title = match event {
            NotificationEvent::IpChanged {
                old_ip,
                new_ip,
                update_succeeded,
                error,
            } => {
                let (icon, status) = match (*update_succeeded, error) {
                    (true, _) => ("🟢", "✅ Succeeded"),
                    (false, Some(_)) => ("🔴", "❌ Failed"),
                    (false, None) => ("🟡", "⏭️ DNS update skipped"),
                };

                text.push_str(&format!("### {} DDNS IP change\n\n", icon));
                self.push_labels(&mut text);
                text.push_str(&format!("**Old IP**: `{}`\n\n", display_ip(*old_ip)));
                text.push_str(&format!("**New IP**: `{}`\n\n", new_ip));
                text.push_str(&format!("**Status**: {}\n\n", status));
                push_time(&mut text, now);
                if let Some(error) = error {
                    text.push_str(&format!("**Error**: {}\n\n", error));
                }
                "tide - DDNS IP change"
            }

            NotificationEvent::InitialRecord { ip } => {
                text.push_str("### 🆕 DDNS initial IP record\n\n");
                self.push_labels(&mut text);
                text.push_str(&format!("**IP**: `{}`\n\n", ip));
                text.push_str("**Status**: ✅ Recorded\n\n");
                push_time(&mut text, now);
                "tide - DDNS initial IP record"
            }

            NotificationEvent::Error {
                message,
                last_known_ip,
            } => {
                text.push_str("### ⚠️ DDNS error\n\n");
                self.push_labels(&mut text);
                if let Some(ip) = last_known_ip {
                    text.push_str(&format!("**Current IP**: `{}`\n\n", ip));
                }
                text.push_str(&format!("**Error**: {}\n\n", message));
                push_time(&mut text, now);
                "tide - DDNS error"
            }
        };

        WebhookPayload::markdown(title, text)
    }

    fn push_labels(&self, text: &mut String) {
        text.push_str(&format!("**Domain**: {}\n\n", or_na(&self.domain_label)));
        text.push_str(&format!("**Record**: {}\n\n", or_na(&self.record_label)));
    }

    async fn send(&self, url: &str, payload: &WebhookPayload) {
        tracing::info!("Sending webhook notification: {}", payload.markdown.title);

        match self.client.post(url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    "Webhook notification delivered: {} (status {})",
                    payload.markdown.title,
                    response.status()
                );
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    "Webhook answered {} for '{}': {}",
                    status,
                    payload.markdown.title,
                    body.trim()
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to send webhook notification '{}': {}",
                    payload.markdown.title,
                    e.without_url()
                );
            }
        }
    }
}

fn display_ip(ip: Option<Ipv4Addr>) -> String {
    ip.map(|ip| ip.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn or_na(label: &str) -> &str {
    if label.is_empty() { "N/A" } else { label }
}

fn push_time(text: &mut String, now: DateTime<Utc>) {
    text.push_str(&format!("**Time**: {}\n\n", now.format("%Y-%m-%d %H:%M:%S UTC")));
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        let Some(url) = self.active_url() else {
            tracing::debug!(
                "Webhook notification disabled or URL missing, dropping {} event",
                event.kind()
            );
            return;
        };

        let payload = self.render(event, Utc::now());
        self.send(url, &payload).await;
    }

    fn validate_config(&self) -> bool {
        if self.config.enabled && self.active_url().is_none() {
            tracing::error!("Webhook notifications are enabled but no URL is configured");
            return false;
        }
        true
    }
}
