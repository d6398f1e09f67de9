// ABOUTME: Root module for tollgate - quota-aware gateway for rate-limited LLM APIs.
// ABOUTME: Re-exports the public surface from submodules.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod prelude;
pub mod quota;

pub use config::{GatewayConfig, QuotaLimits};
pub use error::{ErrorKind, GatewayError};
pub use gateway::{Gateway, GatewayBuilder};
