// ABOUTME: Gateway configuration - provider credentials, quota ceilings, timeouts.
// ABOUTME: Loaded from env vars or JSON, validated before any client is built.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Default OpenAI-compatible chat completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";

const ENV_PREFIX: &str = "TOLLGATE_";

static PLACEHOLDER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*(
            |<[^>]*>
            |\$\{[^}]*\}
            |your[-_\s]?(api[-_\s]?)?key([-_\s]?here)?
            |(api[-_\s]?)?key[-_\s]?here
            |changeme|placeholder|todo|xxx+
            |sk-(\.\.\.|x+|\*+)
        )\s*$",
    )
    .expect("placeholder pattern is valid")
});

/// Provider-published rolling quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    /// Maximum admitted requests per window.
    pub max_requests: u32,
    /// Maximum consumed tokens per window.
    pub max_tokens: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl QuotaLimits {
    pub fn new(max_requests: u32, max_tokens: u64, window: Duration) -> Self {
        Self {
            max_requests,
            max_tokens,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_requests: 30,
            max_tokens: 14_400,
            window_ms: 60_000,
        }
    }
}

/// Everything the gateway needs to talk to the provider.
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_response_tokens: u32,
    #[serde(flatten)]
    pub limits: QuotaLimits,
    pub connect_timeout_ms: u64,
    /// Total request timeout, covering both the write and the read side.
    pub request_timeout_ms: u64,
    pub quota_cooldown_ms: u64,
    pub max_quota_retries: u32,
    pub near_limit_threshold: f64,
    pub admission_poll_min_ms: u64,
    pub admission_poll_max_ms: u64,
    /// Record the estimate as usage when the provider answers 429.
    pub bill_quota_rejections: bool,
    /// Record the estimate as usage when the provider answers with another error.
    pub bill_provider_errors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_response_tokens: 2048,
            limits: QuotaLimits::default(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 60_000,
            quota_cooldown_ms: 5_000,
            max_quota_retries: 3,
            near_limit_threshold: 0.8,
            admission_poll_min_ms: 10,
            admission_poll_max_ms: 1_000,
            bill_quota_rejections: false,
            bill_provider_errors: false,
        }
    }
}

impl GatewayConfig {
    /// Create a default configuration with the given credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from `TOLLGATE_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are configuration errors.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(json)
            .map_err(|e| GatewayError::Configuration(format!("invalid config JSON: {e}")))
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));
        let mut config = Self::default();

        if let Some(v) = var("API_KEY") {
            config.api_key = v;
        }
        if let Some(v) = var("ENDPOINT") {
            config.endpoint = v;
        }
        if let Some(v) = var("MODEL") {
            config.model = v;
        }
        if let Some(v) = var("SYSTEM_PROMPT") {
            config.system_prompt = v;
        }
        parse_var(&var, "TEMPERATURE", &mut config.temperature)?;
        parse_var(&var, "MAX_RESPONSE_TOKENS", &mut config.max_response_tokens)?;
        parse_var(&var, "MAX_REQUESTS", &mut config.limits.max_requests)?;
        parse_var(&var, "MAX_TOKENS", &mut config.limits.max_tokens)?;
        parse_var(&var, "WINDOW_MS", &mut config.limits.window_ms)?;
        parse_var(&var, "CONNECT_TIMEOUT_MS", &mut config.connect_timeout_ms)?;
        parse_var(&var, "REQUEST_TIMEOUT_MS", &mut config.request_timeout_ms)?;
        parse_var(&var, "QUOTA_COOLDOWN_MS", &mut config.quota_cooldown_ms)?;
        parse_var(&var, "MAX_QUOTA_RETRIES", &mut config.max_quota_retries)?;
        parse_var(&var, "NEAR_LIMIT_THRESHOLD", &mut config.near_limit_threshold)?;
        parse_var(&var, "ADMISSION_POLL_MIN_MS", &mut config.admission_poll_min_ms)?;
        parse_var(&var, "ADMISSION_POLL_MAX_MS", &mut config.admission_poll_max_ms)?;
        parse_var(&var, "BILL_QUOTA_REJECTIONS", &mut config.bill_quota_rejections)?;
        parse_var(&var, "BILL_PROVIDER_ERRORS", &mut config.bill_provider_errors)?;

        Ok(config)
    }

    /// Set the bearer credential.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the quota ceilings.
    pub fn with_limits(mut self, limits: QuotaLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the cooldown applied after a provider quota rejection.
    pub fn with_quota_cooldown(mut self, cooldown: Duration) -> Self {
        self.quota_cooldown_ms = millis(cooldown);
        self
    }

    /// Set how many times a quota rejection is retried.
    pub fn with_max_quota_retries(mut self, retries: u32) -> Self {
        self.max_quota_retries = retries;
        self
    }

    /// Set the requested maximum response size.
    pub fn with_max_response_tokens(mut self, tokens: u32) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn quota_cooldown(&self) -> Duration {
        Duration::from_millis(self.quota_cooldown_ms)
    }

    pub fn admission_poll_min(&self) -> Duration {
        Duration::from_millis(self.admission_poll_min_ms)
    }

    pub fn admission_poll_max(&self) -> Duration {
        Duration::from_millis(self.admission_poll_max_ms)
    }

    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if is_placeholder_key(&self.api_key) {
            return Err(GatewayError::Configuration(
                "API key is missing or still a placeholder".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(GatewayError::Configuration("endpoint is empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(GatewayError::Configuration("model is empty".to_string()));
        }
        if self.limits.max_requests == 0 || self.limits.max_tokens == 0 {
            return Err(GatewayError::Configuration(
                "quota ceilings must be positive".to_string(),
            ));
        }
        if self.limits.window_ms == 0 {
            return Err(GatewayError::Configuration(
                "window length must be positive".to_string(),
            ));
        }
        if !(self.near_limit_threshold > 0.0 && self.near_limit_threshold <= 1.0) {
            return Err(GatewayError::Configuration(format!(
                "near-limit threshold {} is outside (0, 1]",
                self.near_limit_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GatewayError::Configuration(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if self.admission_poll_min_ms > self.admission_poll_max_ms {
            return Err(GatewayError::Configuration(
                "admission poll minimum exceeds maximum".to_string(),
            ));
        }
        Ok(())
    }
}

/// True for empty credentials and the usual template placeholders.
pub fn is_placeholder_key(key: &str) -> bool {
    PLACEHOLDER_KEY.is_match(key)
}

fn parse_var<T, F>(var: &F, key: &str, slot: &mut T) -> Result<(), GatewayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(key) {
        *slot = raw.trim().parse().map_err(|e| {
            GatewayError::Configuration(format!("{ENV_PREFIX}{key}={raw:?} is invalid: {e}"))
        })?;
    }
    Ok(())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
