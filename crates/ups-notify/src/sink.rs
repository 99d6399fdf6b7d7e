//! Concrete notification sinks. The distilled spec delegates wire-protocol
//! delivery to "a pluggable notifier"; a complete binary needs at least
//! one real implementation, so this ships a generic HTTP(S) POST sink and
//! a Discord-webhook-shaped variant for the legacy config migration.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use ups_core::event::Severity;

/// One delivery target the dispatcher worker posts to.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Human-readable name for logging (the configured URL, typically).
    fn name(&self) -> &str;

    async fn send(&self, message: &str, severity: Severity, timeout: Duration) -> Result<(), String>;
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "success",
        Severity::Warning => "warning",
        Severity::Failure => "failure",
    }
}

/// Generic HTTP(S) POST sink: `{"text": message, "severity": severity}`.
pub struct HttpNotifier {
    url: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    fn name(&self) -> &str {
        &self.url
    }

    async fn send(&self, message: &str, severity: Severity, timeout: Duration) -> Result<(), String> {
        let body = json!({ "text": message, "severity": severity_str(severity) });
        self.client
            .post(&self.url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// A `discord://{id}/{token}` URL (produced by the legacy webhook config
/// migration) translated back to the real Discord webhook endpoint,
/// POSTing `{"content": message}` plus an optional `avatar_url`.
pub struct DiscordWebhookNotifier {
    original_url: String,
    endpoint: String,
    client: reqwest::Client,
    avatar_url: Option<String>,
}

impl DiscordWebhookNotifier {
    /// Parses `discord://{id}/{token}`. Returns `None` if `url` does not
    /// match that shape, so the caller can fall back to a plain
    /// [`HttpNotifier`] instead.
    pub fn from_discord_url(url: &str, avatar_url: Option<String>) -> Option<Self> {
        let rest = url.strip_prefix("discord://")?;
        let (id, token) = rest.split_once('/')?;
        if id.is_empty() || token.is_empty() {
            return None;
        }
        Some(Self {
            original_url: url.to_string(),
            endpoint: format!("https://discord.com/api/webhooks/{id}/{token}"),
            client: reqwest::Client::new(),
            avatar_url,
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookNotifier {
    fn name(&self) -> &str {
        &self.original_url
    }

    async fn send(&self, message: &str, _severity: Severity, timeout: Duration) -> Result<(), String> {
        let mut body = json!({ "content": message });
        if let Some(avatar_url) = &self.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }
        self.client
            .post(&self.endpoint)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
