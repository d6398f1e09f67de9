// ABOUTME: OpenAI-compatible chat completions client over reqwest.
// ABOUTME: Implements ChatClient; maps HTTP 429 to the quota-rejection error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use super::{ChatRequest, ChatResponse, Message, Role, Usage};
use crate::config::{DEFAULT_ENDPOINT, GatewayConfig};
use crate::error::LlmError;

/// OpenAI API request format.
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// OpenAI message format.
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
    #[serde(default)]
    pub error: Option<OpenAIErrorDetail>,
}

/// OpenAI response choice.
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
}

/// OpenAI usage stats.
#[derive(Debug, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIErrorDetail {
    pub message: String,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl OpenAIClient {
    /// Create a client for the default endpoint with reqwest's default timeouts.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Create a client with the endpoint, credential, and timeouts from `config`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LlmError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            http,
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        OpenAIMessage {
            role: role.to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

impl From<&ChatRequest> for OpenAIRequest {
    fn from(req: &ChatRequest) -> Self {
        OpenAIRequest {
            model: req.model.clone(),
            messages: req.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        }
    }
}

impl TryFrom<OpenAIResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(resp: OpenAIResponse) -> Result<Self, Self::Error> {
        if let Some(error) = resp.error {
            return Err(LlmError::Api {
                status: StatusCode::OK.as_u16(),
                message: error.message,
            });
        }

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("response contained no choices".to_string()))?;
        let text = choice.message.content.ok_or_else(|| {
            LlmError::Malformed("first choice has no message content".to_string())
        })?;

        Ok(ChatResponse {
            id: resp.id,
            model: resp.model,
            text,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

/// Pull a readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAIError>(body) {
        Ok(error) => error.error.message,
        Err(_) if body.trim().is_empty() => "no error body".to_string(),
        Err(_) => body.chars().take(512).collect(),
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = value.strip_suffix('s').unwrap_or(value).parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[async_trait]
impl super::client::ChatClient for OpenAIClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let openai_req = OpenAIRequest::from(req);

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_req)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited {
                retry_after,
                message: error_message(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body = response.text().await?;
        let openai_resp: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Malformed(format!("cannot parse response body: {e}")))?;
        ChatResponse::try_from(openai_resp)
    }
}
