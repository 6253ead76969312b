//! Integration tests for the circuit breaker state machine.
//!
//! These tests validate:
//! 1. Consecutive failures trip the circuit open
//! 2. Open-state rejections never invoke the wrapped operation
//! 3. Recovery probing: open -> half-open -> closed on sustained success
//! 4. A half-open probe failure reopens the circuit immediately
//! 5. The per-call timeout unblocks callers and counts as a failure
//! 6. The concurrency cap rejects excess in-flight calls
//! 7. Registry-shared breakers pool their learned state

use atlas_scheduler::core::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        recovery_timeout: Duration::from_millis(100),
        call_timeout: Duration::from_millis(200),
        max_concurrent: 2,
    }
}

async fn fail_times(breaker: &CircuitBreaker, n: u32) {
    for _ in 0..n {
        let result: Result<(), _> = breaker.call(|| async { Err("downstream error") }).await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
    }
}

#[tokio::test]
async fn test_trips_open_and_rejects_without_invoking() {
    let breaker = CircuitBreaker::new("model-server", config());
    let invocations = Arc::new(AtomicU32::new(0));

    fail_times(&breaker, 3).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // While open, the operation must never run.
    let counter = Arc::clone(&invocations);
    let result: Result<(), BreakerError<&str>> = breaker
        .call(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    match result {
        Err(BreakerError::Open { name, .. }) => assert_eq!(name, "model-server"),
        other => panic!("expected open rejection, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let stats = breaker.stats();
    assert_eq!(stats.total_failures, 3);
    assert_eq!(stats.total_rejections, 1);
}

#[tokio::test]
async fn test_recovers_through_half_open() {
    let breaker = CircuitBreaker::new("model-server", config());
    fail_times(&breaker, 3).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // First probe is admitted and succeeds; still probing.
    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    assert!(result.is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // Second consecutive success closes the circuit.
    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    assert!(result.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_probe_failure_reopens() {
    let breaker = CircuitBreaker::new("model-server", config());
    fail_times(&breaker, 3).await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    // A single failure during probing slams the circuit shut again.
    let result: Result<(), _> = breaker.call(|| async { Err("still broken") }).await;
    assert!(matches!(result, Err(BreakerError::Inner(_))));
    assert_eq!(breaker.state(), CircuitState::Open);

    // And the next call is rejected outright.
    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    assert!(matches!(result, Err(BreakerError::Open { .. })));
}

#[tokio::test]
async fn test_call_timeout_unblocks_caller() {
    let breaker = CircuitBreaker::new("model-server", config());

    let started = tokio::time::Instant::now();
    let result: Result<(), BreakerError<&str>> = breaker
        .call(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(BreakerError::Timeout { .. })));
    assert!(
        elapsed < Duration::from_secs(5),
        "caller blocked for {elapsed:?} past the 200ms call timeout"
    );

    let stats = breaker.stats();
    assert_eq!(stats.total_timeouts, 1);
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_abandoned_call_frees_its_in_flight_slot() {
    let breaker = CircuitBreaker::new("model-server", config());

    // An impatient caller drops the call future mid-await, well before the
    // breaker's own 200ms call timeout fires. The reserved slot must come
    // back anyway.
    for _ in 0..2 {
        let call = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), &str>(())
        });
        let abandoned = tokio::time::timeout(Duration::from_millis(20), call).await;
        assert!(abandoned.is_err(), "call should still be in flight when dropped");
    }

    assert_eq!(breaker.stats().in_flight, 0);

    // With max_concurrent = 2 and both abandoned, a leak would reject this.
    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_concurrency_cap_rejects_excess_calls() {
    // Generous call timeout so the held slots cannot time out mid-test.
    let breaker = Arc::new(CircuitBreaker::new(
        "model-server",
        CircuitBreakerConfig {
            call_timeout: Duration::from_secs(10),
            ..config()
        },
    ));
    let (release_tx, release_rx) = tokio::sync::watch::channel(false);

    // Occupy both in-flight slots.
    let mut holders = Vec::new();
    for _ in 0..2 {
        let b = Arc::clone(&breaker);
        let mut release = release_rx.clone();
        holders.push(tokio::spawn(async move {
            let result: Result<(), BreakerError<&str>> = b
                .call(move || async move {
                    let _ = release.wait_for(|done| *done).await;
                    Ok(())
                })
                .await;
            assert!(result.is_ok());
        }));
    }

    // Wait until both calls are actually in flight.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while breaker.stats().in_flight < 2 {
        assert!(tokio::time::Instant::now() < deadline, "holders never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    let err = result.expect_err("third call should be rejected at capacity");
    assert!(err.is_rejection());
    match err {
        BreakerError::AtCapacity {
            name,
            in_flight,
            max_concurrent,
        } => {
            assert_eq!(name, "model-server");
            assert_eq!(in_flight, 2);
            assert_eq!(max_concurrent, 2);
        }
        other => panic!("expected capacity rejection, got {other:?}"),
    }

    release_tx.send(true).ok();
    for outcome in futures::future::join_all(holders).await {
        outcome.expect("holder task panicked");
    }

    // Slots free up once the holders return.
    let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_registry_shares_learned_state_across_call_sites() {
    let registry = CircuitBreakerRegistry::new();

    // Two independent call sites targeting the same logical backend.
    let site_a = registry.get_or_create("shared-backend", config());
    let site_b = registry.get_or_create("shared-backend", config());
    assert!(Arc::ptr_eq(&site_a, &site_b));

    fail_times(&site_a, 3).await;

    // Site B inherits the tripped state without ever failing itself.
    let result: Result<(), BreakerError<&str>> = site_b.call(|| async { Ok(()) }).await;
    assert!(matches!(result, Err(BreakerError::Open { .. })));

    let stats = registry.all_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].state, CircuitState::Open);
}
