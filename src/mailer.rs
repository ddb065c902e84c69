//! Escalation notification email
//!
//! Fire-and-forget capability: when a lead escalates, the tenant gets at most
//! one email. Delivery failure is logged and swallowed; it never becomes a
//! pipeline error.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::EmailConfig;

/// Outbound notification capability
#[async_trait]
pub trait LeadNotifier: Send + Sync {
    /// Send a notification email. Returns whether the provider accepted it.
    async fn notify(&self, to: &str, subject: &str, body_html: &str) -> bool;
}

/// Notifier backed by a Resend-style transactional email API
pub struct EmailNotifier {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    from_address: String,
}

impl EmailNotifier {
    /// Create a notifier from application configuration
    pub fn new(config: &EmailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        }
    }
}

#[async_trait]
impl LeadNotifier for EmailNotifier {
    async fn notify(&self, to: &str, subject: &str, body_html: &str) -> bool {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("Email notification disabled (no API key)");
            return false;
        };

        let url = format!("{}/emails", self.api_base);

        let result = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from_address,
                "to": [to],
                "subject": subject,
                "html": body_html
            }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "Notification email rejected by provider"
                );
                false
            }
            Err(error) => {
                tracing::warn!(%error, "Notification email send failed");
                false
            }
        }
    }
}
