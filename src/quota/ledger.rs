// ABOUTME: Sliding-window ledger of admitted requests and consumed tokens.
// ABOUTME: One mutex guards both quotas so they are never observed torn.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::config::QuotaLimits;

/// Marks when a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    pub at: u64,
}

/// Tokens consumed by a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsageRecord {
    pub at: u64,
    pub tokens: u64,
}

/// Point-in-time view of the window, recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub current_requests: u32,
    pub max_requests: u32,
    /// Recorded usage in the window plus tokens held by in-flight requests.
    pub current_tokens: u64,
    /// The in-flight share of `current_tokens`.
    pub reserved_tokens: u64,
    pub max_tokens: u64,
    /// Tokens recorded over the ledger's lifetime, never pruned.
    pub total_tokens: u64,
}

impl RateLimitSnapshot {
    /// Fraction of the request ceiling in use.
    pub fn request_ratio(&self) -> f64 {
        ratio(u64::from(self.current_requests), u64::from(self.max_requests))
    }

    /// Fraction of the token ceiling in use.
    pub fn token_ratio(&self) -> f64 {
        ratio(self.current_tokens, self.max_tokens)
    }

    pub fn requests_remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.current_requests)
    }

    pub fn tokens_remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.current_tokens)
    }
}

impl fmt::Display for RateLimitSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests {}/{}, tokens {}/{}",
            self.current_requests, self.max_requests, self.current_tokens, self.max_tokens
        )
    }
}

fn ratio(current: u64, max: u64) -> f64 {
    if max == 0 {
        return 1.0;
    }
    current as f64 / max as f64
}

/// Mutable state for the ledger, protected by a single mutex.
#[derive(Debug, Default)]
struct LedgerState {
    requests: VecDeque<RequestRecord>,
    usage: VecDeque<TokenUsageRecord>,
    /// Sum of `usage` token counts.
    window_tokens: u64,
    /// Tokens held by admitted requests that have not settled yet.
    reserved: u64,
    total_tokens: u64,
}

impl LedgerState {
    fn prune(&mut self, now: u64, window_ms: u64) {
        while self
            .requests
            .front()
            .is_some_and(|r| now.saturating_sub(r.at) > window_ms)
        {
            self.requests.pop_front();
        }
        while let Some(front) = self.usage.front() {
            if now.saturating_sub(front.at) <= window_ms {
                break;
            }
            self.window_tokens -= front.tokens;
            self.usage.pop_front();
        }
    }

    fn tokens_in_window(&self) -> u64 {
        self.window_tokens + self.reserved
    }

    fn admissible(&self, estimated: u64, limits: &QuotaLimits) -> bool {
        (self.requests.len() as u64) < u64::from(limits.max_requests)
            && self.tokens_in_window().saturating_add(estimated) <= limits.max_tokens
    }

    // Records are kept oldest-first even if callers race on timestamps.
    fn push_request(&mut self, now: u64) {
        let at = self.requests.back().map_or(now, |r| r.at.max(now));
        self.requests.push_back(RequestRecord { at });
    }

    fn push_usage(&mut self, now: u64, tokens: u64) {
        let at = self.usage.back().map_or(now, |r| r.at.max(now));
        self.usage.push_back(TokenUsageRecord { at, tokens });
        self.window_tokens += tokens;
        self.total_tokens += tokens;
    }

    fn wait_for(&self, estimated: u64, now: u64, limits: &QuotaLimits) -> Duration {
        if self.admissible(estimated, limits) {
            return Duration::ZERO;
        }

        let window = limits.window_ms;
        // A record stops counting once `now - at > window`.
        let until_expired = |at: u64| (at.saturating_add(window) + 1).saturating_sub(now);

        let mut wait = 0;

        let max_requests = limits.max_requests as usize;
        if self.requests.len() >= max_requests {
            // The oldest `len - max + 1` records must age out.
            let last_to_expire = self.requests.len() - max_requests;
            if let Some(record) = self.requests.get(last_to_expire) {
                wait = wait.max(until_expired(record.at));
            }
        }

        let needed = self.tokens_in_window().saturating_add(estimated);
        if needed > limits.max_tokens {
            let excess = needed - limits.max_tokens;
            let mut freed = 0;
            let mut token_wait = None;
            for record in &self.usage {
                freed += record.tokens;
                if freed >= excess {
                    token_wait = Some(until_expired(record.at));
                    break;
                }
            }
            // Held tokens only free up when their requests settle.
            wait = wait.max(token_wait.unwrap_or(window));
        }

        Duration::from_millis(wait.max(1))
    }
}

/// Authoritative sliding-window counter for both provider quotas.
///
/// All operations take the current time explicitly and prune the window
/// before doing anything else, so every caller sees an up-to-date view.
/// Requests and tokens live behind one lock and change together.
#[derive(Debug)]
pub struct QuotaLedger {
    state: Mutex<LedgerState>,
    limits: QuotaLimits,
    freed: Notify,
}

impl QuotaLedger {
    /// Create an empty ledger for the given ceilings.
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            limits,
            freed: Notify::new(),
        }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Drop every record older than the window.
    pub fn prune(&self, now: u64) {
        self.state.lock().prune(now, self.limits.window_ms);
    }

    /// Whether a request costing `estimated` tokens fits in the window right now.
    pub fn can_admit(&self, estimated: u64, now: u64) -> bool {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        state.admissible(estimated, &self.limits)
    }

    /// Record an admitted request.
    pub fn admit(&self, now: u64) {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        state.push_request(now);
    }

    /// Record tokens consumed by a finished request.
    pub fn record_usage(&self, now: u64, tokens: u64) {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        state.push_usage(now, tokens);
    }

    /// Estimated time until `estimated` tokens could be admitted.
    ///
    /// Zero when admission is possible now, otherwise strictly positive.
    /// Tokens held by in-flight requests are not predictable, so callers
    /// must recheck after waiting.
    pub fn time_until_admittable(&self, estimated: u64, now: u64) -> Duration {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        state.wait_for(estimated, now, &self.limits)
    }

    /// Check and admit in one step, holding `estimated` tokens until settled.
    ///
    /// Returns the estimated wait when the request does not fit.
    pub fn try_reserve(&self, estimated: u64, now: u64) -> Result<Reservation<'_>, Duration> {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        if !state.admissible(estimated, &self.limits) {
            return Err(state.wait_for(estimated, now, &self.limits));
        }
        state.push_request(now);
        state.reserved += estimated;
        Ok(Reservation {
            ledger: self,
            tokens: estimated,
            open: true,
        })
    }

    /// Current window state.
    pub fn snapshot(&self, now: u64) -> RateLimitSnapshot {
        let mut state = self.state.lock();
        state.prune(now, self.limits.window_ms);
        RateLimitSnapshot {
            current_requests: u32::try_from(state.requests.len()).unwrap_or(u32::MAX),
            max_requests: self.limits.max_requests,
            current_tokens: state.tokens_in_window(),
            reserved_tokens: state.reserved,
            max_tokens: self.limits.max_tokens,
            total_tokens: state.total_tokens,
        }
    }

    /// Future that completes the next time held tokens are given back.
    pub(crate) fn capacity_freed(&self) -> Notified<'_> {
        self.freed.notified()
    }

    fn settle_hold(&self, held: u64, now: u64, actual: u64) {
        {
            let mut state = self.state.lock();
            state.prune(now, self.limits.window_ms);
            state.reserved -= held;
            state.push_usage(now, actual);
        }
        if actual < held {
            self.freed.notify_waiters();
        }
    }

    fn release_hold(&self, held: u64) {
        self.state.lock().reserved -= held;
        self.freed.notify_waiters();
    }
}

/// Tokens held for an admitted request until its real cost is known.
///
/// Dropping an open reservation gives the tokens back without recording usage.
#[must_use = "dropping a reservation releases the held tokens"]
#[derive(Debug)]
pub struct Reservation<'a> {
    ledger: &'a QuotaLedger,
    tokens: u64,
    open: bool,
}

impl Reservation<'_> {
    /// Tokens held by this reservation.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Replace the hold with a usage record of `actual` tokens.
    pub fn settle(mut self, now: u64, actual: u64) {
        self.open = false;
        self.ledger.settle_hold(self.tokens, now, actual);
    }

    /// Give the hold back without recording usage.
    pub fn release(mut self) {
        self.open = false;
        self.ledger.release_hold(self.tokens);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.open {
            self.ledger.release_hold(self.tokens);
        }
    }
}
