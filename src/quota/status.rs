// ABOUTME: Read-only view of the quota window plus near-limit advisories.
// ABOUTME: Safe to call from anywhere, concurrently with in-flight dispatches.

use std::sync::Arc;
use std::time::Duration;

use super::ledger::{QuotaLedger, RateLimitSnapshot};
use crate::clock::Clock;

/// Near-limit flags and wait estimate, for proactive user warnings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advisory {
    pub snapshot: RateLimitSnapshot,
    pub near_request_limit: bool,
    pub near_token_limit: bool,
    /// How long a default-sized request would wait right now.
    pub estimated_wait: Duration,
}

impl Advisory {
    /// True if either quota is close to its ceiling.
    pub fn is_near_limit(&self) -> bool {
        self.near_request_limit || self.near_token_limit
    }
}

/// Reports window state without mutating anything observable.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    ledger: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    threshold: f64,
}

impl StatusReporter {
    /// `threshold` is the used fraction above which a quota counts as "near".
    pub fn new(ledger: Arc<QuotaLedger>, clock: Arc<dyn Clock>, threshold: f64) -> Self {
        Self {
            ledger,
            clock,
            threshold,
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.ledger.snapshot(self.clock.now_millis())
    }

    pub fn near_request_limit(&self) -> bool {
        self.snapshot().request_ratio() > self.threshold
    }

    pub fn near_token_limit(&self) -> bool {
        self.snapshot().token_ratio() > self.threshold
    }

    /// Both flags computed from a single snapshot, plus the wait for `estimated` tokens.
    pub fn advisory(&self, estimated: u64) -> Advisory {
        let now = self.clock.now_millis();
        let snapshot = self.ledger.snapshot(now);
        let estimated = estimated.min(snapshot.max_tokens);
        Advisory {
            snapshot,
            near_request_limit: snapshot.request_ratio() > self.threshold,
            near_token_limit: snapshot.token_ratio() > self.threshold,
            estimated_wait: self.ledger.time_until_admittable(estimated, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::QuotaLimits;

    fn reporter() -> (StatusReporter, Arc<QuotaLedger>, ManualClock) {
        let ledger = Arc::new(QuotaLedger::new(QuotaLimits::new(
            10,
            1_000,
            Duration::from_secs(60),
        )));
        let clock = ManualClock::new(0);
        let reporter = StatusReporter::new(ledger.clone(), Arc::new(clock.clone()), 0.8);
        (reporter, ledger, clock)
    }

    #[test]
    fn test_fresh_ledger_is_not_near_limit() {
        let (reporter, _, _) = reporter();
        assert!(!reporter.near_request_limit());
        assert!(!reporter.near_token_limit());
        let advisory = reporter.advisory(100);
        assert!(!advisory.is_near_limit());
        assert_eq!(advisory.estimated_wait, Duration::ZERO);
    }

    #[test]
    fn test_request_flag_trips_above_threshold() {
        let (reporter, ledger, _) = reporter();
        for _ in 0..8 {
            ledger.admit(0);
        }
        // 8/10 is not above 0.8
        assert!(!reporter.near_request_limit());
        ledger.admit(0);
        assert!(reporter.near_request_limit());
        assert!(!reporter.near_token_limit());
    }

    #[test]
    fn test_token_flag_trips_and_clears_with_window() {
        let (reporter, ledger, clock) = reporter();
        ledger.record_usage(0, 900);
        assert!(reporter.near_token_limit());

        clock.advance(Duration::from_millis(60_001));
        assert!(!reporter.near_token_limit());
        assert_eq!(reporter.snapshot().total_tokens, 900);
    }

    #[test]
    fn test_advisory_reports_wait_when_full() {
        let (reporter, ledger, _) = reporter();
        ledger.record_usage(0, 1_000);
        let advisory = reporter.advisory(100);
        assert!(advisory.near_token_limit);
        assert!(advisory.estimated_wait > Duration::ZERO);
    }
}
