//! Tests for the request limiter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use ragchat::error::ChatError;
use ragchat::limiter::RequestLimiter;
use tokio::sync::Notify;

#[tokio::test]
async fn nth_concurrent_request_is_rejected() {
    let limiter = RequestLimiter::new(3);
    let release = Arc::new(Notify::new());

    let mut running = Vec::new();
    for _ in 0..2 {
        let limiter = limiter.clone();
        let release = Arc::clone(&release);
        running.push(tokio::spawn(async move {
            limiter
                .run(async move {
                    release.notified().await;
                    Ok(())
                })
                .await
        }));
    }
    // Let both tasks take their slot.
    while limiter.available_permits() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let rejected = limiter.run(async { Ok(()) }).await;
    assert!(matches!(rejected, Err(ChatError::Busy)));
    assert!(!limiter.is_available());

    release.notify_waiters();
    for task in running {
        task.await.unwrap().unwrap();
    }
    assert_eq!(limiter.available_permits(), 2);
    assert!(limiter.run(async { Ok(1) }).await.is_ok());
}

#[tokio::test]
async fn failed_work_releases_its_slot() {
    let limiter = RequestLimiter::new(2);
    let result: Result<(), _> = limiter
        .run(async { Err(ChatError::Stream("boom".into())) })
        .await;
    assert!(result.is_err());
    assert_eq!(limiter.available_permits(), 1);
}

#[test]
fn panicking_work_releases_its_slot() {
    let limiter = RequestLimiter::new(2);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        limiter.run_blocking::<()>(|| panic!("worker exploded"))
    }));
    assert!(outcome.is_err());
    assert_eq!(limiter.available_permits(), 1);
}

#[tokio::test]
async fn cancelled_work_releases_its_slot() {
    let limiter = RequestLimiter::new(2);
    let pending = limiter.run(std::future::pending::<ragchat::error::Result<()>>());
    let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
    assert!(timed_out.is_err());
    assert_eq!(limiter.available_permits(), 1);
}

#[test]
fn availability_check_does_not_hold_a_slot() {
    let limiter = RequestLimiter::new(2);
    assert!(limiter.is_available());
    assert!(limiter.is_available());
    assert_eq!(limiter.available_permits(), 1);
    assert_eq!(limiter.limit(), 2);
}
