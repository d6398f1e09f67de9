// ABOUTME: Tests for the sliding-window quota ledger.
// ABOUTME: Covers pruning, admission safety, wait estimates, and reservations.

use std::time::Duration;

use super::ledger::QuotaLedger;
use crate::config::QuotaLimits;

const WINDOW_MS: u64 = 60_000;
const T0: u64 = 1_000_000;

fn ledger() -> QuotaLedger {
    QuotaLedger::new(QuotaLimits::new(30, 14_400, Duration::from_millis(WINDOW_MS)))
}

/// Deterministic pseudo-random sequence for property-style loops.
fn lcg(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    *seed >> 33
}

#[test]
fn test_fresh_ledger_admits_and_records() {
    let ledger = ledger();
    assert!(ledger.can_admit(1_000, T0));

    ledger.admit(T0);
    ledger.record_usage(T0, 1_000);

    let snapshot = ledger.snapshot(T0);
    assert_eq!(snapshot.current_requests, 1);
    assert_eq!(snapshot.current_tokens, 1_000);
    assert_eq!(snapshot.max_requests, 30);
    assert_eq!(snapshot.max_tokens, 14_400);
    assert_eq!(snapshot.total_tokens, 1_000);
    assert_eq!(snapshot.requests_remaining(), 29);
    assert_eq!(snapshot.tokens_remaining(), 13_400);
    assert_eq!(snapshot.to_string(), "requests 1/30, tokens 1000/14400");
}

#[test]
fn test_request_ceiling_blocks_and_estimates_wait() {
    let ledger = ledger();
    for i in 0..30 {
        ledger.admit(T0 + i);
        ledger.record_usage(T0 + i, 100);
    }

    assert!(!ledger.can_admit(100, T0 + 30));
    let wait = ledger.time_until_admittable(100, T0 + 30);
    let wait_ms = wait.as_millis() as u64;
    assert!(
        (59_960..=59_980).contains(&wait_ms),
        "Expected ~59970ms, got {}",
        wait_ms
    );
}

#[test]
fn test_oldest_request_ages_out() {
    let ledger = ledger();
    for i in 0..30 {
        ledger.admit(T0 + i);
        ledger.record_usage(T0 + i, 100);
    }

    assert!(ledger.can_admit(100, T0 + 60_001));
    assert_eq!(ledger.snapshot(T0 + 60_001).current_requests, 29);
}

#[test]
fn test_record_counts_until_window_boundary() {
    let ledger = ledger();
    ledger.admit(T0);
    ledger.record_usage(T0, 500);

    let at_edge = ledger.snapshot(T0 + WINDOW_MS);
    assert_eq!(at_edge.current_requests, 1);
    assert_eq!(at_edge.current_tokens, 500);

    let past_edge = ledger.snapshot(T0 + WINDOW_MS + 1);
    assert_eq!(past_edge.current_requests, 0);
    assert_eq!(past_edge.current_tokens, 0);
    // Lifetime total is never pruned
    assert_eq!(past_edge.total_tokens, 500);
}

#[test]
fn test_sliding_window_drops_every_aged_record() {
    let ledger = ledger();
    let mut seed = 7;
    let mut now = T0;
    let mut history = Vec::new();

    for _ in 0..500 {
        now += lcg(&mut seed) % 2_000;
        let tokens = lcg(&mut seed) % 300;
        ledger.admit(now);
        ledger.record_usage(now, tokens);
        history.push((now, tokens));

        let expected_requests = history
            .iter()
            .filter(|(at, _)| now - at <= WINDOW_MS)
            .count() as u32;
        let expected_tokens: u64 = history
            .iter()
            .filter(|(at, _)| now - at <= WINDOW_MS)
            .map(|(_, t)| t)
            .sum();

        let snapshot = ledger.snapshot(now);
        assert_eq!(snapshot.current_requests, expected_requests);
        assert_eq!(snapshot.current_tokens, expected_tokens);
    }
}

#[test]
fn test_can_admit_implies_both_ceilings_hold() {
    let ledger = ledger();
    let mut seed = 42;
    let mut now = T0;

    for _ in 0..2_000 {
        now += lcg(&mut seed) % 1_500;
        let estimate = lcg(&mut seed) % 3_000;
        let snapshot = ledger.snapshot(now);
        if ledger.can_admit(estimate, now) {
            assert!(snapshot.current_requests < snapshot.max_requests);
            assert!(snapshot.current_tokens + estimate <= snapshot.max_tokens);
            ledger.admit(now);
            ledger.record_usage(now, estimate);
        }
    }
}

#[test]
fn test_empty_ledger_never_starves() {
    let ledger = ledger();
    for estimate in [0, 1, 2_048, 14_399, 14_400] {
        assert!(ledger.can_admit(estimate, T0), "estimate {}", estimate);
    }
    assert!(!ledger.can_admit(14_401, T0));
}

#[test]
fn test_wait_is_zero_exactly_when_admissible() {
    let ledger = ledger();
    let mut seed = 99;
    let mut now = T0;

    for _ in 0..1_000 {
        now += lcg(&mut seed) % 800;
        let estimate = lcg(&mut seed) % 4_000;
        let admissible = ledger.can_admit(estimate, now);
        let wait = ledger.time_until_admittable(estimate, now);
        if admissible {
            assert_eq!(wait, Duration::ZERO);
            ledger.admit(now);
            ledger.record_usage(now, estimate);
        } else {
            assert!(wait > Duration::ZERO);
        }
    }
}

#[test]
fn test_token_wait_covers_enough_expirations() {
    let ledger = ledger();
    ledger.record_usage(T0, 8_000);
    ledger.record_usage(T0 + 1_000, 6_000);

    // 14000 used, 2000 more needs the first record gone
    let wait = ledger.time_until_admittable(2_000, T0 + 2_000);
    assert_eq!(wait, Duration::from_millis(WINDOW_MS + 1 - 2_000));

    // 9000 more needs both records gone
    let wait = ledger.time_until_admittable(9_000, T0 + 2_000);
    assert_eq!(wait, Duration::from_millis(WINDOW_MS + 1 - 1_000));

    // After waiting out the estimate the request fits
    assert!(ledger.can_admit(2_000, T0 + WINDOW_MS + 1));
}

#[test]
fn test_reservation_holds_tokens_until_settled() {
    let ledger = ledger();
    let reservation = ledger.try_reserve(10_000, T0).unwrap();
    assert_eq!(reservation.tokens(), 10_000);

    let snapshot = ledger.snapshot(T0);
    assert_eq!(snapshot.current_requests, 1);
    assert_eq!(snapshot.current_tokens, 10_000);
    assert_eq!(snapshot.reserved_tokens, 10_000);
    assert_eq!(snapshot.tokens_remaining(), 4_400);
    assert!(!ledger.can_admit(5_000, T0));

    reservation.settle(T0 + 10, 3_000);
    let snapshot = ledger.snapshot(T0 + 10);
    assert_eq!(snapshot.current_tokens, 3_000);
    assert_eq!(snapshot.reserved_tokens, 0);
    assert_eq!(snapshot.total_tokens, 3_000);
    assert!(ledger.can_admit(5_000, T0 + 10));
}

#[test]
fn test_released_reservation_records_nothing() {
    let ledger = ledger();
    let reservation = ledger.try_reserve(4_000, T0).unwrap();
    reservation.release();

    let snapshot = ledger.snapshot(T0);
    assert_eq!(snapshot.current_requests, 1);
    assert_eq!(snapshot.current_tokens, 0);
    assert_eq!(snapshot.total_tokens, 0);
}

#[test]
fn test_dropped_reservation_gives_tokens_back() {
    let ledger = ledger();
    {
        let _reservation = ledger.try_reserve(14_400, T0).unwrap();
        assert!(!ledger.can_admit(1, T0));
    }
    assert!(ledger.can_admit(14_400, T0));
}

#[test]
fn test_try_reserve_refusal_leaves_ledger_untouched() {
    let ledger = ledger();
    ledger.record_usage(T0, 14_000);
    let before = ledger.snapshot(T0);

    let wait = ledger.try_reserve(1_000, T0).unwrap_err();
    assert!(wait > Duration::ZERO);
    assert_eq!(ledger.snapshot(T0), before);
}

#[test]
fn test_held_tokens_fall_back_to_full_window_wait() {
    let ledger = ledger();
    let _held = ledger.try_reserve(14_400, T0).unwrap();
    let wait = ledger.time_until_admittable(1, T0);
    assert_eq!(wait, Duration::from_millis(WINDOW_MS));
}

#[test]
fn test_out_of_order_timestamps_stay_ordered() {
    let ledger = ledger();
    ledger.admit(T0 + 100);
    ledger.admit(T0);
    // The late-stamped record is clamped forward, so both expire together
    assert_eq!(ledger.snapshot(T0 + 100 + WINDOW_MS).current_requests, 2);
    assert_eq!(ledger.snapshot(T0 + 101 + WINDOW_MS).current_requests, 0);
}
