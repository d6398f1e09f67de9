// ABOUTME: Core chat types - role-tagged messages, requests, responses, usage.
// ABOUTME: Provider-neutral; the HTTP client maps them to the wire format.

use serde::{Deserialize, Serialize};

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Request to create a chat completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// Create a new request with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Add a message to the request.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the system preamble; it is always sent first.
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.messages.retain(|m| m.role != Role::System);
        self.messages.insert(0, Message::system(system));
        self
    }

    /// Set max response tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Completed chat response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub text: String,
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Create a text-only response without usage data.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            text: text.into(),
            usage: None,
        }
    }

    /// Attach provider-reported usage.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Actual cost of the call, if the provider reported one.
    pub fn billed_tokens(&self) -> Option<u64> {
        let usage = self.usage?;
        if usage.total_tokens > 0 {
            return Some(u64::from(usage.total_tokens));
        }
        let summed = u64::from(usage.prompt_tokens) + u64::from(usage.completion_tokens);
        (summed > 0).then_some(summed)
    }
}
