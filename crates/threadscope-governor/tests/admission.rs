//! Scenario tests for the admission gates.

use std::sync::Arc;
use std::time::Duration;
use threadscope_core::{ConcurrencyConfig, RateLimitConfig, ScrapeError};
use threadscope_governor::{ConcurrencyGovernor, MemoryProbe, RateLimiter};
use tokio::sync::oneshot;

struct NoMemory;

impl MemoryProbe for NoMemory {
    fn resident_bytes(&self) -> Option<u64> {
        None
    }
}

fn governor(max_concurrent: usize) -> Arc<ConcurrencyGovernor> {
    let config = ConcurrencyConfig {
        max_concurrent,
        ..ConcurrencyConfig::default()
    };
    Arc::new(ConcurrencyGovernor::with_probe(&config, Arc::new(NoMemory)))
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn fourth_operation_waits_for_a_free_slot() {
    let gov = governor(3);
    let mut releases = Vec::new();
    let mut handles = Vec::new();

    for i in 0..4 {
        let (tx, rx) = oneshot::channel::<bool>();
        releases.push(tx);
        let gov = Arc::clone(&gov);
        handles.push(tokio::spawn(async move {
            gov.with_resource_control(async move {
                match rx.await {
                    Ok(true) => Ok(i),
                    _ => Err(ScrapeError::Network(format!("op {i} failed"))),
                }
            })
            .await
        }));
        settle().await;
    }

    let stats = gov.stats();
    assert_eq!(stats.current_active, 3);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.total_started, 3);
    assert!(!gov.should_allow_new_operation());

    let mut releases = releases.into_iter();
    releases.next().expect("first sender").send(true).expect("op 0 alive");
    settle().await;

    let stats = gov.stats();
    assert_eq!(stats.current_active, 3);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.total_started, 4);

    releases.next().expect("second sender").send(false).expect("op 1 alive");
    for tx in releases {
        tx.send(true).expect("op alive");
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.expect("task joins").is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 3);

    let stats = gov.stats();
    assert_eq!(stats.terminal(), 4);
    assert_eq!(stats.total_completed, 3);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.current_active, 0);
    assert!(gov.should_allow_new_operation());
}

#[tokio::test(start_paused = true)]
async fn active_never_exceeds_max() {
    let gov = governor(2);
    let mut handles = Vec::new();

    for _ in 0..8 {
        let gov = Arc::clone(&gov);
        handles.push(tokio::spawn(async move {
            let inner = Arc::clone(&gov);
            gov.with_resource_control(async move {
                let active = inner.stats().current_active;
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ScrapeError>(active)
            })
            .await
        }));
    }

    for handle in handles {
        let seen = handle.await.expect("task joins").expect("op succeeds");
        assert!(seen <= 2, "saw {seen} active operations");
    }
    assert_eq!(gov.stats().total_completed, 8);
}

#[tokio::test(start_paused = true)]
async fn timed_out_operations_trip_the_circuit() {
    let config = ConcurrencyConfig {
        timeout_secs: 1,
        ..ConcurrencyConfig::default()
    };
    let gov = ConcurrencyGovernor::with_probe(&config, Arc::new(NoMemory));

    for _ in 0..5 {
        let result: Result<(), _> = gov
            .with_resource_control(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ScrapeError::Timeout(_))));
    }

    let health = gov.health();
    assert!(!health.healthy);
    assert!(health.issues.iter().any(|i| i.contains("timeout rate")));
    assert!(matches!(
        gov.check_admission(),
        Err(ScrapeError::Capacity(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn repeat_offender_is_blocked_longer_each_time() {
    let limiter = RateLimiter::new(&RateLimitConfig::default());

    for _ in 0..5 {
        assert!(limiter.check("203.0.113.9").allowed);
    }

    let first = limiter.check("203.0.113.9");
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = limiter.check("203.0.113.9");

    assert!(!first.allowed && !second.allowed);
    assert!(second.reset_at > first.reset_at);
    assert!(second.retry_after > first.retry_after);
    assert!(limiter.status("203.0.113.9").blocked);
    assert!(limiter.check("198.51.100.1").allowed);
}
