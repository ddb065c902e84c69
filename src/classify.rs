//! AI-assisted option classification
//!
//! The third resolution tier: given free text and the current step's options,
//! an external model either names one option code or declares the text out of
//! scope. The capability MUST fail closed — any provider error, timeout, or
//! malformed response degrades to "no match" and never aborts the turn.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::ClassifierConfig;

/// One option as presented to the classifier
#[derive(Debug, Clone)]
pub struct ClassifierOption {
    pub option_code: String,
    pub label_text: String,
}

/// Classification request context
#[derive(Debug, Clone)]
pub struct ClassificationRequest<'a> {
    pub message_text: &'a str,
    pub business_name: &'a str,
    pub step_prompt: &'a str,
    pub options: Vec<ClassifierOption>,
}

/// Classification result
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Code of the matched option; must be validated against the real option set
    pub matched_code: Option<String>,
    /// Whether the model declared the text unrelated to every option
    pub out_of_scope: bool,
    /// Short summary of what the user wrote
    pub summary: Option<String>,
}

impl Classification {
    /// The fail-closed fallback: no match, not explicitly out of scope.
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// Text-classification capability
#[async_trait]
pub trait OptionClassifier: Send + Sync {
    /// Map free text to at most one option code. Never fails; errors degrade
    /// to [`Classification::no_match`].
    async fn classify(&self, request: &ClassificationRequest<'_>) -> Classification;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    #[serde(default)]
    matched_option_code: Option<String>,
    #[serde(default)]
    out_of_scope: bool,
    #[serde(default)]
    summary: Option<String>,
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint
pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClassifier {
    /// Create a classifier from application configuration
    pub fn new(config: &ClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn build_prompt(request: &ClassificationRequest<'_>) -> String {
        let options = request
            .options
            .iter()
            .map(|o| format!("- {}: {}", o.option_code, o.label_text))
            .collect::<Vec<_>>()
            .join("\n");

        [
            "Eres un clasificador de mensajes para un asistente de WhatsApp.".to_string(),
            "No converses. No inventes opciones.".to_string(),
            "Devuelve solo JSON válido con estas llaves exactas:".to_string(),
            "matched_option_code (string o null), out_of_scope (boolean), summary (string).".to_string(),
            "matched_option_code debe ser uno de los códigos listados o null.".to_string(),
            String::new(),
            format!("Negocio: {}", request.business_name),
            format!("Pregunta actual: {}", request.step_prompt),
            format!("Opciones:\n{}", options),
            format!("Mensaje del usuario: {}", request.message_text),
        ]
        .join("\n")
    }

    async fn request_verdict(
        &self,
        api_key: &str,
        request: &ClassificationRequest<'_>,
    ) -> Result<ClassifierVerdict, String> {
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "Clasifica el mensaje. Solo JSON válido." },
                    { "role": "user", "content": Self::build_prompt(request) }
                ]
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("provider returned status {}", status));
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| e.to_string())?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| "completion carried no content".to_string())?;

        serde_json::from_str(&content).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl OptionClassifier for OpenAiClassifier {
    async fn classify(&self, request: &ClassificationRequest<'_>) -> Classification {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("Classifier disabled (no API key); treating as no match");
            return Classification::no_match();
        };

        match self.request_verdict(api_key, request).await {
            Ok(verdict) => Classification {
                matched_code: verdict
                    .matched_option_code
                    .filter(|code| !code.trim().is_empty()),
                out_of_scope: verdict.out_of_scope,
                summary: verdict.summary.filter(|s| !s.trim().is_empty()),
            },
            Err(reason) => {
                tracing::warn!(%reason, "Classification failed; treating as no match");
                Classification::no_match()
            }
        }
    }
}
