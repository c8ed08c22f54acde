//! OpenAI-compatible chat-completions backend.
//!
//! Works against any endpoint that accepts `image_url` content parts and
//! `response_format: json_object` (Gemini's OpenAI surface, Groq, vLLM, ...).

use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CallIdentity, InferenceRequest, ProviderConfig, ProviderErrorKind, ProviderOutcome,
};
use crate::domain::ports::InferenceBackend;
use crate::infrastructure::logging::redact_secrets;

/// Added on top of every provider retry hint.
const RETRY_HINT_BUFFER: Duration = Duration::from_secs(1);

const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Provider backend speaking the OpenAI-compatible chat completions API.
pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    temperature: f32,
}

impl OpenAiCompatBackend {
    /// Build the HTTP client from provider settings.
    pub fn new(config: &ProviderConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    fn build_body(&self, model: &str, request: &InferenceRequest) -> Value {
        let mut content = vec![json!({"type": "text", "text": request.prompt})];
        for image in request.images.iter().chain(request.grid.iter()) {
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": image.data_url()}
            }));
        }

        let mut messages = Vec::new();
        if let Some(description) = &request.description {
            messages.push(json!({"role": "system", "content": description}));
        }
        messages.push(json!({"role": "user", "content": content}));

        // json_object mode requires the word JSON somewhere in the conversation.
        let mentions_json = request.prompt.contains("JSON")
            || request.description.as_deref().is_some_and(|d| d.contains("JSON"));
        if !mentions_json {
            messages.push(json!({"role": "user", "content": "Please respond in JSON format."}));
        }

        json!({
            "model": model,
            "messages": messages,
            "response_format": {"type": "json_object"},
            "temperature": self.temperature,
            "max_tokens": MAX_TOKENS,
        })
    }

    async fn classify_response(response: Response) -> ProviderOutcome<Value> {
        let status = response.status();
        if status.is_success() {
            return match response.json::<ChatCompletion>().await {
                Ok(completion) => parse_completion(completion),
                Err(e) => ProviderOutcome::failure(ProviderErrorKind::MalformedResponse(e.to_string())),
            };
        }

        let header_hint = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        ProviderOutcome::failure(classify_status(status, &body, header_hint))
    }
}

fn parse_completion(completion: ChatCompletion) -> ProviderOutcome<Value> {
    let Some(text) = completion.choices.into_iter().next().and_then(|c| c.message.content) else {
        return ProviderOutcome::failure(ProviderErrorKind::MalformedResponse(
            "completion has no message content".to_string(),
        ));
    };
    match serde_json::from_str(strip_code_fence(&text)) {
        Ok(value) => ProviderOutcome::Ok(value),
        Err(e) => ProviderOutcome::failure(ProviderErrorKind::MalformedResponse(format!(
            "content is not JSON: {e}"
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

/// Map a non-success status and body to a provider error.
pub fn classify_status(status: StatusCode, body: &str, header_hint: Option<Duration>) -> ProviderErrorKind {
    let message = redact_secrets(&body.chars().take(500).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        // An explicit hint wins over a per-day quota mention.
        let hint = header_hint.or_else(|| parse_retry_hint(body));
        return ProviderErrorKind::QuotaExhausted {
            retry_after: hint.map(|d| d + RETRY_HINT_BUFFER),
            daily: hint.is_none() && is_daily_quota(body),
        };
    }
    if status.is_server_error() {
        return ProviderErrorKind::ServerError {
            status: status.as_u16(),
            message,
        };
    }
    ProviderErrorKind::ClientError {
        status: status.as_u16(),
        message,
    }
}

fn retry_hint_patterns() -> Option<&'static [Regex; 2]> {
    static PATTERNS: OnceLock<Option<[Regex; 2]>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some([
                Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)s").ok()?,
                Regex::new(r#"retryDelay['"]?\s*:\s*['"](\d+(?:\.\d+)?)s['"]"#).ok()?,
            ])
        })
        .as_ref()
}

/// Extract a provider retry hint such as `retry in 12.5s` or `"retryDelay": "7s"`.
pub fn parse_retry_hint(body: &str) -> Option<Duration> {
    retry_hint_patterns()?
        .iter()
        .find_map(|re| re.captures(body))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn is_daily_quota(body: &str) -> bool {
    body.contains("PerDay") || body.to_ascii_lowercase().contains("per day")
}

#[async_trait]
impl InferenceBackend for OpenAiCompatBackend {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn call(&self, identity: &CallIdentity, request: &InferenceRequest) -> ProviderOutcome<Value> {
        let body = self.build_body(&identity.model, request);
        let sent = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(identity.credential.expose())
            .json(&body)
            .send()
            .await;

        match sent {
            Ok(response) => Self::classify_response(response).await,
            Err(e) if e.is_timeout() => ProviderOutcome::failure(ProviderErrorKind::Timeout),
            Err(e) => ProviderOutcome::failure(ProviderErrorKind::Network(redact_secrets(&e.to_string()))),
        }
    }
}
