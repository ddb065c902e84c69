//! WhatsApp Cloud API client
//!
//! The outbound send-text capability behind a trait so the engine and the
//! reminder scheduler can be driven with a recording stub in tests. A non-2xx
//! upstream response is a hard failure for the turn.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use crate::config::WhatsAppConfig;

/// Decrypted credentials of the channel a message goes out through
#[derive(Debug, Clone)]
pub struct SendCredentials {
    pub phone_number_id: String,
    pub access_token: String,
}

/// Result of a successful send
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-assigned message id, when the response carried one
    pub wa_message_id: Option<String>,
    /// Raw provider response, persisted with the outbound message
    pub raw_response: JsonValue,
}

/// Errors from the send-text operation
#[derive(Debug, Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl SendError {
    /// Upstream HTTP status, when the provider answered at all
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            SendError::Upstream { status, .. } => Some(*status),
            SendError::Http(_) => None,
        }
    }
}

/// Send-text capability of the messaging gateway
#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    /// Send a text message, returning the provider receipt.
    async fn send_text(
        &self,
        credentials: &SendCredentials,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SendError>;
}

#[derive(Debug, Deserialize)]
struct CloudApiResponse {
    #[serde(default)]
    messages: Vec<CloudApiMessageId>,
}

#[derive(Debug, Deserialize)]
struct CloudApiMessageId {
    id: String,
}

/// HTTP implementation against the WhatsApp Cloud API
pub struct CloudApiSender {
    client: reqwest::Client,
    api_base: String,
}

impl CloudApiSender {
    /// Create a sender from application configuration
    pub fn new(config: &WhatsAppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.send_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WhatsAppSender for CloudApiSender {
    async fn send_text(
        &self,
        credentials: &SendCredentials,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SendError> {
        let url = format!("{}/{}/messages", self.api_base, credentials.phone_number_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": text }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                phone_number_id = %credentials.phone_number_id,
                "WhatsApp send failed"
            );
            return Err(SendError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw_response: JsonValue = response.json().await?;
        let parsed: CloudApiResponse =
            serde_json::from_value(raw_response.clone()).unwrap_or(CloudApiResponse {
                messages: Vec::new(),
            });

        Ok(SendReceipt {
            wa_message_id: parsed.messages.into_iter().next().map(|m| m.id),
            raw_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender_for(server: &MockServer) -> CloudApiSender {
        CloudApiSender::new(&WhatsAppConfig {
            api_base: server.uri(),
            send_timeout_ms: 2_000,
        })
    }

    fn credentials() -> SendCredentials {
        SendCredentials {
            phone_number_id: "15551230001".to_string(),
            access_token: "token-abc".to_string(),
        }
    }

    #[tokio::test]
    async fn send_text_posts_payload_and_returns_message_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/15551230001/messages"))
            .and(bearer_token("token-abc"))
            .and(body_partial_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "56911112222",
                "text": { "body": "hola" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{ "id": "wamid.1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = sender_for(&server)
            .send_text(&credentials(), "56911112222", "hola")
            .await
            .expect("send succeeds");

        assert_eq!(receipt.wa_message_id.as_deref(), Some("wamid.1"));
    }

    #[tokio::test]
    async fn send_text_maps_non_2xx_to_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let error = sender_for(&server)
            .send_text(&credentials(), "56911112222", "hola")
            .await
            .expect_err("send fails");

        assert_eq!(error.upstream_status(), Some(401));
    }

    #[tokio::test]
    async fn send_text_tolerates_response_without_message_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let receipt = sender_for(&server)
            .send_text(&credentials(), "56911112222", "hola")
            .await
            .expect("send succeeds");

        assert!(receipt.wa_message_id.is_none());
    }
}
