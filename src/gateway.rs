// ABOUTME: Public gateway surface - send, can_send_now, estimated wait, status.
// ABOUTME: Wires config, ledger, admission, dispatcher, and status reporter together.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::config::GatewayConfig;
use crate::dispatch::{RequestDispatcher, SendHandle, SendOptions};
use crate::error::GatewayError;
use crate::llm::{ChatClient, OpenAIClient};
use crate::quota::{
    AdmissionController, Advisory, QuotaLedger, RateLimitSnapshot, StatusReporter, TokenEstimator,
};

/// Builder for a [`Gateway`] with a custom client, clock, or estimator.
///
/// # Example
///
/// ```no_run
/// use tollgate::{Gateway, GatewayConfig};
///
/// # async fn run() -> Result<(), tollgate::GatewayError> {
/// let gateway = Gateway::builder(GatewayConfig::from_env()?).build()?;
/// let answer = gateway.send("What does the borrow checker do?").await?;
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    client: Option<Arc<dyn ChatClient>>,
    clock: Option<Arc<dyn Clock>>,
    estimator: TokenEstimator,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: None,
            clock: None,
            estimator: TokenEstimator::default(),
        }
    }

    /// Use this transport instead of the HTTP client built from the config.
    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Use this time source instead of the runtime's monotonic clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Validate the configuration and assemble the gateway.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        self.config.validate()?;

        let client: Arc<dyn ChatClient> = match self.client {
            Some(client) => client,
            None => Arc::new(OpenAIClient::from_config(&self.config)?),
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::default()));

        let ledger = Arc::new(QuotaLedger::new(self.config.limits));
        let admission = AdmissionController::new(
            ledger.clone(),
            clock.clone(),
            self.config.admission_poll_min(),
            self.config.admission_poll_max(),
        );
        let status = StatusReporter::new(
            ledger.clone(),
            clock.clone(),
            self.config.near_limit_threshold,
        );
        let dispatcher = RequestDispatcher::new(
            &self.config,
            client,
            admission,
            self.estimator,
            clock.clone(),
        );

        // What a typical call costs before its message is known.
        let default_estimate = dispatcher
            .estimate("", None)
            .min(self.config.limits.max_tokens);

        tracing::debug!(
            model = %self.config.model,
            max_requests = self.config.limits.max_requests,
            max_tokens = self.config.limits.max_tokens,
            window_ms = self.config.limits.window_ms,
            "Gateway ready"
        );

        Ok(Gateway {
            dispatcher: Arc::new(dispatcher),
            status,
            ledger,
            clock,
            default_estimate,
        })
    }
}

/// Quota-aware front door to the provider.
///
/// Cheap to clone; clones share one ledger, so every clone counts against
/// the same window.
#[derive(Debug, Clone)]
pub struct Gateway {
    dispatcher: Arc<RequestDispatcher>,
    status: StatusReporter,
    ledger: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    default_estimate: u64,
}

impl Gateway {
    /// Build a gateway talking HTTP to the configured endpoint.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new(config).build()
    }

    /// Build a gateway from `TOLLGATE_*` environment variables.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Send `message` and return a handle to the pending answer.
    ///
    /// Returns immediately; the call waits for quota, talks to the provider,
    /// and retries quota rejections on a spawned task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn send(&self, message: impl Into<String>) -> SendHandle {
        self.send_with(message, SendOptions::default())
    }

    /// Like [`Gateway::send`] with per-call options.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn send_with(&self, message: impl Into<String>, options: SendOptions) -> SendHandle {
        let dispatcher = self.dispatcher.clone();
        let message = message.into();
        SendHandle::new(tokio::spawn(async move {
            dispatcher.dispatch(&message, options).await
        }))
    }

    /// Run a call on the current task instead of spawning one.
    pub async fn complete(&self, message: &str) -> Result<String, GatewayError> {
        self.dispatcher
            .dispatch(message, SendOptions::default())
            .await
    }

    /// True if a default-sized request would be admitted right now.
    pub fn can_send_now(&self) -> bool {
        self.ledger
            .can_admit(self.default_estimate, self.clock.now_millis())
    }

    /// How long a default-sized request would wait right now.
    pub fn estimated_wait(&self) -> Duration {
        self.dispatcher
            .admission()
            .estimated_wait(self.default_estimate)
    }

    pub fn estimated_wait_ms(&self) -> u64 {
        u64::try_from(self.estimated_wait().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn status_snapshot(&self) -> RateLimitSnapshot {
        self.status.snapshot()
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// Near-limit flags and wait estimate for a default-sized request.
    pub fn advisory(&self) -> Advisory {
        self.status.advisory(self.default_estimate)
    }

    /// Estimated cost of sending `message` with the configured response budget.
    pub fn estimate(&self, message: &str) -> u64 {
        self.dispatcher.estimate(message, None)
    }
}
