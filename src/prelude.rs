// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use tollgate::prelude::*;` to get started quickly.

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::{GatewayConfig, QuotaLimits};
pub use crate::dispatch::{RequestDispatcher, RetryPolicy, SendHandle, SendOptions};
pub use crate::error::{AdmissionError, ErrorKind, GatewayError, LlmError};
pub use crate::gateway::{Gateway, GatewayBuilder};
pub use crate::llm::{ChatClient, ChatRequest, ChatResponse, Message, OpenAIClient, Role, Usage};
pub use crate::quota::{
    AdmissionController, Advisory, QuotaLedger, RateLimitSnapshot, Reservation, StatusReporter,
    TokenEstimator,
};
