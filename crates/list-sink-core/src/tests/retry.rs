//! Per-key retry tests.
//!
//! Covers:
//! - a transient failure is retried after the configured delay
//! - exhaustion is logged once and the send still returns normally
//! - cancelling a retry wait abandons only the current key
//! - no wait follows the final attempt

use super::harness::{started, KeyBehavior, LogCapture};
use crate::cancel::CancelToken;
use crate::engine::{Delivery, DeliveryFailure};
use crate::payload::Payload;
use crate::retry::{push_with_retry, KeyOutcome, RetryPolicy};
use crate::transport::Transport;
use std::time::{Duration, Instant};
use tracing::Level;

#[test]
fn transient_failure_is_retried_after_delay() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(2, Duration::from_millis(50)));
    store.set_behavior("app-logs", KeyBehavior::FailTimes(1));

    let delivery = engine.send(&Payload::from("hello")).unwrap();

    assert_eq!(delivery, Delivery::Delivered);
    let attempts = store.attempts_for("app-logs");
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1].at.duration_since(attempts[0].at) >= Duration::from_millis(50));
    assert_eq!(store.list("app-logs"), vec![b"hello".to_vec()]);
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn retries_reuse_the_same_connection() {
    let (engine, store) = started(&["k"], RetryPolicy::new(3, Duration::from_millis(5)));
    store.set_behavior("k", KeyBehavior::FailTimes(2));

    engine.send(&Payload::from("x")).unwrap();

    let attempts = store.attempts_for("k");
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.link_id == attempts[0].link_id));
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn exhausted_key_logs_one_error_and_returns() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(2, Duration::from_millis(10)));
    store.set_behavior("app-logs", KeyBehavior::AlwaysFail);

    let (result, logs) = LogCapture::capture(|| engine.send(&Payload::from("hello")));

    assert!(matches!(
        result,
        Ok(Delivery::Failed(DeliveryFailure::Undelivered { .. }))
    ));
    assert_eq!(store.attempts_for("app-logs").len(), 2);
    assert!(store.list("app-logs").is_empty());

    let errors = logs.at_level(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Unable to send a log record after 2 tries");
    assert_eq!(errors[0].fields.get("key").map(String::as_str), Some("app-logs"));
    assert_eq!(logs.at_level(Level::WARN).len(), 1);
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn every_retry_waits_the_full_delay() {
    let delay = Duration::from_millis(20);
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(3, delay));
    store.set_behavior("app-logs", KeyBehavior::AlwaysFail);

    engine.send(&Payload::from("hello")).unwrap();

    let attempts = store.attempts_for("app-logs");
    assert_eq!(attempts.len(), 3);
    for pair in attempts.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= delay);
    }
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn no_wait_after_final_attempt() {
    let delay = Duration::from_millis(300);
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(1, delay));
    store.set_behavior("app-logs", KeyBehavior::AlwaysFail);

    let started_at = Instant::now();
    engine.send(&Payload::from("hello")).unwrap();

    assert!(started_at.elapsed() < delay);
    assert_eq!(store.attempts_for("app-logs").len(), 1);
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn cancelled_wait_abandons_only_current_key() {
    let (engine, store) = started(&["slow", "next"], RetryPolicy::new(5, Duration::from_secs(5)));
    store.set_behavior("slow", KeyBehavior::AlwaysFail);

    let token = engine.child_token();
    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };

    let started_at = Instant::now();
    let (delivery, logs) =
        LogCapture::capture(|| engine.send_with_cancel(&Payload::from("rec"), &token).unwrap());
    canceller.join().unwrap();

    assert!(started_at.elapsed() < Duration::from_secs(5));
    assert_eq!(store.attempts_for("slow").len(), 1);
    // the next key still gets its attempt
    assert_eq!(store.last("next"), Some(b"rec".to_vec()));
    assert_eq!(
        delivery,
        Delivery::Failed(DeliveryFailure::Undelivered {
            exhausted: vec![],
            cancelled: vec!["slow".to_string()],
        })
    );
    assert_eq!(logs.at_level(Level::INFO).len(), 1);
    // the engine itself is unaffected
    store.set_behavior("slow", KeyBehavior::FailTimes(0));
    assert!(engine.send(&Payload::from("after")).unwrap().is_delivered());
    assert_eq!(store.last("next"), Some(b"after".to_vec()));
    assert_eq!(store.last("slow"), Some(b"after".to_vec()));
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn push_with_retry_counts_only_command_failures() {
    let store = super::harness::MockStore::new();
    let transport = super::harness::MockTransport::new(store.clone());
    let mut link = transport
        .connect(&crate::endpoint::Endpoint::new("127.0.0.1", 6379))
        .unwrap();
    store.set_behavior("k", KeyBehavior::FailTimes(1));
    store.drop_connection_at(2);

    let outcome = push_with_retry(
        &mut link,
        "k",
        b"x",
        &RetryPolicy::new(3, Duration::ZERO),
        &CancelToken::new(),
    );

    assert!(matches!(outcome, KeyOutcome::ConnectionLost { .. }));
    assert_eq!(store.attempts().len(), 2);
}

#[test]
fn push_with_retry_with_cancelled_token_tries_once() {
    let store = super::harness::MockStore::new();
    let transport = super::harness::MockTransport::new(store.clone());
    let mut link = transport
        .connect(&crate::endpoint::Endpoint::new("127.0.0.1", 6379))
        .unwrap();
    store.set_behavior("k", KeyBehavior::AlwaysFail);

    let token = CancelToken::new();
    token.cancel();
    let outcome = push_with_retry(
        &mut link,
        "k",
        b"x",
        &RetryPolicy::new(3, Duration::from_secs(10)),
        &token,
    );

    assert_eq!(outcome, KeyOutcome::Cancelled { attempts: 1 });
    assert_eq!(store.attempts().len(), 1);
}
