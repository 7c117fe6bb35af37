use std::time::{Duration, Instant};

use inkpost_core::{
    looks_like_transport_failure, Admission, BackendState, BreakerPolicy, CircuitBreaker,
};

#[test]
fn fresh_breaker_admits_calls() {
    let mut breaker = CircuitBreaker::default();
    assert_eq!(breaker.state(), BackendState::Unknown);
    assert_eq!(breaker.admit(Instant::now()), Admission::Proceed);
}

#[test]
fn transport_failure_short_circuits_within_cooldown() {
    let mut breaker = CircuitBreaker::new(BreakerPolicy::default());
    let t0 = Instant::now();
    breaker.record_transport_failure(t0);
    assert_eq!(breaker.state(), BackendState::Unavailable);

    match breaker.admit(t0 + Duration::from_millis(4_999)) {
        Admission::ShortCircuit { remaining } => {
            assert_eq!(remaining, Duration::from_millis(1));
        }
        other => panic!("expected short circuit, got {other:?}"),
    }
    assert_eq!(breaker.state(), BackendState::Unavailable);
}

#[test]
fn cooldown_elapsed_resets_to_unknown() {
    let mut breaker = CircuitBreaker::default();
    let t0 = Instant::now();
    breaker.record_transport_failure(t0);

    assert_eq!(breaker.admit(t0 + Duration::from_secs(5)), Admission::Proceed);
    assert_eq!(breaker.state(), BackendState::Unknown);

    breaker.record_success();
    assert_eq!(breaker.state(), BackendState::Available);
}

#[test]
fn notices_are_throttled_to_one_per_interval() {
    let mut breaker = CircuitBreaker::default();
    let t0 = Instant::now();

    assert!(breaker.should_notify(t0));
    assert!(!breaker.should_notify(t0 + Duration::from_millis(1_000)));
    assert!(!breaker.should_notify(t0 + Duration::from_millis(2_999)));
    assert!(breaker.should_notify(t0 + Duration::from_millis(3_000)));
    assert!(!breaker.should_notify(t0 + Duration::from_millis(3_500)));
}

#[test]
fn transport_signatures_match_case_insensitively() {
    assert!(looks_like_transport_failure("TypeError: Failed to fetch"));
    assert!(looks_like_transport_failure("net::ERR_CONNECTION_REFUSED"));
    assert!(looks_like_transport_failure("blocked by CORS policy"));
    assert!(!looks_like_transport_failure("invalid appsecret"));
}
