// ABOUTME: Request dispatcher - estimate, wait for quota, send, retry on 429,
// ABOUTME: and record what the call actually cost in the ledger.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::error::{AdmissionError, GatewayError, LlmError};
use crate::llm::{ChatClient, ChatRequest, Message};
use crate::quota::{AdmissionController, Reservation, TokenEstimator};

/// How provider quota rejections are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed pause before retrying. A longer `Retry-After` from the provider wins.
    pub cooldown: Duration,
    /// Ceiling on how far a `Retry-After` hint can stretch the pause.
    pub max_hint: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn cooldown_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.map_or(self.cooldown, |hint| hint.min(self.max_hint).max(self.cooldown))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cooldown: Duration::from_secs(5),
            max_hint: Duration::from_secs(60),
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Give up with `AdmissionTimeout` if quota is not available within this long.
    pub admission_deadline: Option<Duration>,
    /// Response budget for this call instead of the configured one.
    pub max_response_tokens: Option<u32>,
}

impl SendOptions {
    pub fn with_admission_deadline(mut self, deadline: Duration) -> Self {
        self.admission_deadline = Some(deadline);
        self
    }

    pub fn with_max_response_tokens(mut self, tokens: u32) -> Self {
        self.max_response_tokens = Some(tokens);
        self
    }
}

/// The only component that calls the provider.
///
/// One logical call runs as an explicit bounded loop: estimate, wait for
/// admission, send. A quota rejection releases the reservation, cools down,
/// and starts over; any other failure ends the call. On success the
/// provider-reported cost is recorded, or the estimate when none is reported,
/// which means recorded usage can drift from the provider's own count.
pub struct RequestDispatcher {
    client: Arc<dyn ChatClient>,
    admission: AdmissionController,
    estimator: TokenEstimator,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    model: String,
    system_prompt: String,
    temperature: f64,
    max_response_tokens: u32,
    bill_quota_rejections: bool,
    bill_provider_errors: bool,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("client", &"<chat client>")
            .field("admission", &self.admission)
            .field("estimator", &self.estimator)
            .field("retry", &self.retry)
            .field("model", &self.model)
            .finish()
    }
}

impl RequestDispatcher {
    pub fn new(
        config: &GatewayConfig,
        client: Arc<dyn ChatClient>,
        admission: AdmissionController,
        estimator: TokenEstimator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            admission,
            estimator,
            clock,
            retry: RetryPolicy {
                max_retries: config.max_quota_retries,
                cooldown: config.quota_cooldown(),
                // The window has fully turned over by then.
                max_hint: config.limits.window(),
            },
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_response_tokens: config.max_response_tokens,
            bill_quota_rejections: config.bill_quota_rejections,
            bill_provider_errors: config.bill_provider_errors,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Estimate for a request carrying `message` under the configured budget.
    pub fn estimate(&self, message: &str, max_response_tokens: Option<u32>) -> u64 {
        let max_response = max_response_tokens.unwrap_or(self.max_response_tokens);
        let request = self.build_request(message, max_response);
        self.estimator
            .estimate_messages(&request.messages, max_response)
    }

    /// Wire request: system preamble first, then the caller's message.
    pub fn build_request(&self, message: &str, max_response_tokens: u32) -> ChatRequest {
        ChatRequest::new(self.model.clone())
            .system(self.system_prompt.clone())
            .message(Message::user(message))
            .temperature(self.temperature)
            .max_tokens(max_response_tokens)
    }

    /// Run one logical call to completion on the current task.
    pub async fn dispatch(
        &self,
        message: &str,
        options: SendOptions,
    ) -> Result<String, GatewayError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %request_id);
        self.dispatch_inner(message, options).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        message: &str,
        options: SendOptions,
    ) -> Result<String, GatewayError> {
        let max_response = options.max_response_tokens.unwrap_or(self.max_response_tokens);
        let request = self.build_request(message, max_response);
        let max_attempts = self.retry.max_attempts();
        let mut cooldown = self.retry.cooldown;

        for attempt in 1..=max_attempts {
            let estimated = self
                .estimator
                .estimate_messages(&request.messages, max_response);

            let reservation = self
                .admission
                .await_admission(estimated, options.admission_deadline)
                .await
                .map_err(|e| self.admission_failure(e, estimated))?;

            match self.client.complete(&request).await {
                Ok(response) => {
                    let (tokens, source) = match response.billed_tokens() {
                        Some(tokens) => (tokens, "provider"),
                        None => (reservation.tokens(), "estimate"),
                    };
                    reservation.settle(self.clock.now_millis(), tokens);
                    tracing::info!(attempt, tokens, source, "Request completed");
                    return Ok(response.text);
                }
                Err(LlmError::RateLimited {
                    retry_after,
                    message,
                }) => {
                    self.close(reservation, self.bill_quota_rejections);
                    cooldown = self.retry.cooldown_for(retry_after);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        cooldown_ms = cooldown.as_millis() as u64,
                        %message,
                        "Provider rejected request for quota"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(cooldown).await;
                    }
                }
                Err(err) => {
                    // A malformed success still ran on the provider.
                    let billed = match &err {
                        LlmError::Malformed(_) | LlmError::Deserialize(_) => true,
                        LlmError::Api { .. } => self.bill_provider_errors,
                        _ => false,
                    };
                    self.close(reservation, billed);
                    tracing::warn!(attempt, error = %err, "Request failed");
                    return Err(err.into());
                }
            }
        }

        Err(GatewayError::QuotaExhausted {
            attempts: max_attempts,
            retry_in: cooldown,
        })
    }

    /// Settle a failed attempt at its estimate, or give the hold back.
    fn close(&self, reservation: Reservation<'_>, billed: bool) {
        if billed {
            let tokens = reservation.tokens();
            reservation.settle(self.clock.now_millis(), tokens);
        } else {
            reservation.release();
        }
    }

    fn admission_failure(&self, err: AdmissionError, estimated: u64) -> GatewayError {
        match err {
            AdmissionError::Timeout { waited } => {
                let retry_in = self.admission.estimated_wait(estimated);
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Gave up waiting for quota"
                );
                GatewayError::AdmissionTimeout { waited, retry_in }
            }
        }
    }
}
