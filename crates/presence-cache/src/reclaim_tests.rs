//! Tests for `reclaim` module - deferred work queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::config::ReclaimerConfig;
use super::error::Error;
use super::reclaim::*;

fn queue() -> AsyncWorkQueue {
    AsyncWorkQueue::new(&ReclaimerConfig::default()).expect("start queue")
}

#[test]
fn test_queue_runs_jobs_in_order() {
    let queue = queue();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let order = Arc::clone(&order);
        assert!(queue
            .add_work(Box::new(move || order.lock().push(i)))
            .is_ok());
    }
    queue.shutdown();

    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    assert_eq!(queue.completed_jobs(), 10);
}

#[test]
fn test_queue_runs_jobs_off_caller_thread() {
    let queue = queue();
    let caller = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));

    let ran_on_clone = Arc::clone(&ran_on);
    assert!(queue
        .add_work(Box::new(move || {
            *ran_on_clone.lock() = Some(thread::current().id());
        }))
        .is_ok());
    queue.shutdown();

    let worker = ran_on.lock().expect("job ran");
    assert_ne!(worker, caller);
}

#[test]
fn test_queue_uses_configured_thread_name() {
    let config = ReclaimerConfig {
        thread_name: "reclaim-named".to_string(),
    };
    let queue = AsyncWorkQueue::new(&config).expect("start queue");
    let name = Arc::new(Mutex::new(None));

    let name_clone = Arc::clone(&name);
    assert!(queue
        .add_work(Box::new(move || {
            *name_clone.lock() = thread::current().name().map(str::to_string);
        }))
        .is_ok());
    queue.shutdown();

    assert_eq!(name.lock().as_deref(), Some("reclaim-named"));
}

#[test]
fn test_queue_rejects_work_after_shutdown() {
    let queue = queue();
    queue.shutdown();
    let ran = Arc::new(AtomicUsize::new(0));

    let ran_clone = Arc::clone(&ran);
    let rejected = queue.add_work(Box::new(move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
    }));

    let job = rejected.expect_err("queue is closed");
    job();
    assert_eq!(ran.load(Ordering::SeqCst), 1, "rejected job is handed back unrun");
    assert_eq!(queue.completed_jobs(), 0);
}

#[test]
fn test_queue_survives_panicking_job() {
    let queue = queue();
    let ran = Arc::new(AtomicUsize::new(0));

    assert!(queue.add_work(Box::new(|| panic!("job failure"))).is_ok());
    let ran_clone = Arc::clone(&ran);
    assert!(queue
        .add_work(Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .is_ok());
    queue.shutdown();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(queue.completed_jobs(), 2);
}

#[test]
fn test_queue_shutdown_is_idempotent() {
    let queue = queue();

    queue.shutdown();
    queue.shutdown();

    assert_eq!(queue.pending_jobs(), 0);
}

#[test]
fn test_queue_rejects_thread_name_with_nul() {
    let config = ReclaimerConfig {
        thread_name: "bad\0name".to_string(),
    };

    let result = AsyncWorkQueue::new(&config);

    let err = result.expect_err("NUL in thread name must be rejected");
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("reclaimer.thread_name"));
}

#[test]
fn test_queue_rejects_empty_thread_name() {
    let config = ReclaimerConfig {
        thread_name: String::new(),
    };

    let result = AsyncWorkQueue::new(&config);

    assert!(matches!(result, Err(Error::Config(_))));
}
