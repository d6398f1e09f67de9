// ABOUTME: Quota module - sliding-window accounting and admission control.
// ABOUTME: Ledger, estimator, blocking admission, and status reporting.

mod admission;
mod estimator;
mod ledger;
mod status;

pub use admission::AdmissionController;
pub use estimator::TokenEstimator;
pub use ledger::{QuotaLedger, RateLimitSnapshot, RequestRecord, Reservation, TokenUsageRecord};
pub use status::{Advisory, StatusReporter};

#[cfg(test)]
mod ledger_test;
