//! Bulk send tests.

use super::harness::{started, KeyBehavior, LogCapture};
use crate::payload::Payload;
use crate::retry::RetryPolicy;
use std::time::Duration;
use tracing::Level;

fn batch(n: usize) -> Vec<Payload> {
    (0..n).map(|i| Payload::from(format!("record-{}", i))).collect()
}

#[test]
fn batch_is_delivered_in_order_over_one_connection() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(1, Duration::ZERO));

    let report = engine.send_bulk(batch(5)).unwrap();

    assert_eq!(report.delivered, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.total(), 5);

    let expected: Vec<Vec<u8>> = (0..5).map(|i| format!("record-{}", i).into_bytes()).collect();
    assert_eq!(store.list("app-logs"), expected);

    let attempts = store.attempts();
    assert!(attempts.iter().all(|a| a.link_id == attempts[0].link_id));
    assert_eq!(store.opened(), 1);
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn empty_batch_is_a_no_op() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::default());

    let report = engine.send_bulk(Vec::new()).unwrap();

    assert_eq!(report.total(), 0);
    assert!(store.attempts().is_empty());
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn connection_loss_abandons_rest_of_batch() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(3, Duration::ZERO));
    store.drop_connection_at(3);

    let (report, logs) = LogCapture::capture(|| engine.send_bulk(batch(10)).unwrap());

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.abandoned, 7);

    // no pushes after the failure, no retry of the failed push
    assert_eq!(store.attempts().len(), 3);
    assert_eq!(store.list("app-logs").len(), 2);

    let lost = logs.matching("Connection to list store lost");
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].level, Level::ERROR);
    assert_eq!(logs.at_level(Level::ERROR).len(), 1);
    assert_eq!(logs.matching("Batch partially delivered").len(), 1);

    assert_eq!(engine.pool_state().connections, 0);
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn exhausted_payload_does_not_stop_batch() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::new(2, Duration::ZERO));
    store.set_behavior("app-logs", KeyBehavior::FailTimes(2));

    let report = engine.send_bulk(batch(3)).unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.abandoned, 0);
    assert_eq!(
        store.list("app-logs"),
        vec![b"record-1".to_vec(), b"record-2".to_vec()]
    );
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn unreachable_store_abandons_whole_batch() {
    let (engine, store) = started(&["app-logs"], RetryPolicy::default());
    store.refuse_connections(true);

    let (report, logs) = LogCapture::capture(|| engine.send_bulk(batch(4)).unwrap());

    assert_eq!(report.abandoned, 4);
    assert_eq!(report.delivered + report.failed, 0);
    assert_eq!(logs.at_level(Level::ERROR).len(), 1);
    assert!(store.attempts().is_empty());
    engine.shutdown(Duration::from_secs(1));
}

#[test]
fn batches_get_distinct_ids() {
    let (engine, _store) = started(&["app-logs"], RetryPolicy::default());

    let first = engine.send_bulk(batch(1)).unwrap();
    let second = engine.send_bulk(batch(1)).unwrap();

    assert_ne!(first.batch_id, second.batch_id);
    engine.shutdown(Duration::from_secs(1));
}
