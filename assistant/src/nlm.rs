//! Natural-language model capabilities and the HTTP client backing them.
//!
//! The pipeline only sees the [`Classifier`] and [`Extractor`] traits, so tests can
//! substitute deterministic fakes for the remote model.

use crate::config::NlmConfig;
use crate::errors::{Error, Result};
use crate::retry::{with_backoff, Backoff};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Returns the raw category label the model chose for a query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String>;
}

/// Returns the raw model output for parameter extraction (expected to hold a JSON object).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_parameters(&self, text: &str) -> Result<String>;
}

pub const CLASSIFY_PROMPT: &str = r#"You are a home energy monitoring assistant.
Classify the user's message into exactly one of these categories:

- ENERGY_USAGE: energy consumption of a specific device, or of all devices
- DEVICE_COMPARISON: comparing energy usage between devices
- TOP_CONSUMERS: which devices consume the most energy
- ENERGY_SUMMARY: overall energy statistics for a period
- DEVICE_LIST: listing the user's devices or their status
- GREETING: hello, hi, good morning
- THANKS: thank you, thanks
- GOODBYE: goodbye, bye, see you
- OFF_TOPIC: anything unrelated to home energy monitoring

Reply with the category name only (for example: ENERGY_USAGE). No punctuation, no explanation."#;

pub const EXTRACT_PROMPT: &str = r#"Extract parameters from the user's home energy question.
Reply with a single JSON object and nothing else, using exactly these fields
(null when not mentioned):

{
  "device_name": string or null,
  "device_type": string or null,
  "time_period": "today" | "yesterday" | "last_week" | "last_month" | "specific_hours" | null,
  "start_time": RFC 3339 timestamp or null,
  "end_time": RFC 3339 timestamp or null,
  "comparison": true if the user compares devices, otherwise null,
  "aggregation": "total" | "average" | "max" | "min" | null,
  "limit": number of results requested, or null
}

Do not wrap the object in Markdown and do not add text before or after it."#;

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    backoff: Backoff,
}

impl ChatCompletionsClient {
    pub fn new(config: &NlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(config.timeout))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            backoff: Backoff::new(
                config.max_retries,
                Duration::from_millis(250),
                Duration::from_secs(4),
            )
            .with_jitter(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one system + user exchange and returns the assistant's text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        with_backoff(&self.backoff, "Language model request", is_retryable, || {
            self.complete_once(system, user)
        })
        .await
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: CompletionResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Nlm("completion contained no message".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "Language model replied");
        Ok(content)
    }
}

/// Transport failures, rate limiting and server errors are worth another attempt.
fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Http(e) if e.is_decode() => false,
        Error::Http(e) => e
            .status()
            .map_or(true, |s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS),
        _ => false,
    }
}

#[async_trait]
impl Classifier for ChatCompletionsClient {
    async fn classify(&self, text: &str) -> Result<String> {
        self.complete(CLASSIFY_PROMPT, text).await
    }
}

#[async_trait]
impl Extractor for ChatCompletionsClient {
    async fn extract_parameters(&self, text: &str) -> Result<String> {
        self.complete(EXTRACT_PROMPT, text).await
    }
}
