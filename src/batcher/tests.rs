use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::{BATCH_LABEL, BatchEntry, Batcher};
use crate::relay::testing::{FakeRelay, deliveries, recorder};
use crate::relay::{Relay, RelayEvent};
use crate::utils::RelayError;

const FLUSH: Duration = Duration::from_millis(250);

fn batcher() -> (Arc<FakeRelay>, Batcher<FakeRelay>) {
    let inner = FakeRelay::new();
    let batcher = Batcher::new(inner.clone(), FLUSH);
    (inner, batcher)
}

#[test]
fn test_batch_entry_is_a_pair_on_the_wire() {
    let entry = BatchEntry("iomsg".to_string(), json!({"a": 1}));
    assert_eq!(serde_json::to_value(&entry).unwrap(), json!(["iomsg", {"a": 1}]));
}

#[test]
fn test_send_only_buffers() {
    let (inner, batcher) = batcher();
    batcher.send("a", json!(1));
    batcher.send("b", json!(2));
    batcher.send("c", json!(3));

    assert!(inner.sent().is_empty());
    assert_eq!(batcher.pending_len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_flush_tick_sends_one_batch_in_order() {
    let (inner, batcher) = batcher();
    batcher.start().await.unwrap();

    batcher.send("a", json!(1));
    batcher.send("b", json!(2));
    batcher.send("c", json!(3));
    assert!(inner.sent().is_empty());

    tokio::time::sleep(FLUSH + Duration::from_millis(10)).await;

    assert_eq!(
        inner.sent(),
        vec![(
            BATCH_LABEL.to_string(),
            json!([["a", 1], ["b", 2], ["c", 3]])
        )]
    );
    assert_eq!(batcher.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_ticks_send_nothing() {
    let (inner, batcher) = batcher();
    batcher.start().await.unwrap();

    tokio::time::sleep(FLUSH * 4).await;
    assert!(inner.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_each_tick_sends_only_what_accumulated_since_last_flush() {
    let (inner, batcher) = batcher();
    batcher.start().await.unwrap();

    batcher.send("a", json!(1));
    tokio::time::sleep(FLUSH + Duration::from_millis(10)).await;
    batcher.send("b", json!(2));
    tokio::time::sleep(FLUSH).await;

    let sent = inner.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1, json!([["a", 1]]));
    assert_eq!(sent[1].1, json!([["b", 2]]));
}

#[test]
fn test_manual_flush() {
    let (inner, batcher) = batcher();
    batcher.flush();
    assert!(inner.sent().is_empty());

    batcher.send("a", json!(null));
    batcher.flush();
    assert_eq!(inner.sent().len(), 1);
    assert_eq!(batcher.pending_len(), 0);
}

#[test]
fn test_received_batch_is_exploded_in_order() {
    let (inner, batcher) = batcher();
    let (handler, events) = recorder();
    batcher.on_event(handler);

    inner.deliver(
        "node-7",
        BATCH_LABEL,
        json!([["first", 1], ["second", {"x": 2}], ["third", [3]]]),
        42,
    );

    let delivered = deliveries(&events);
    assert_eq!(delivered.len(), 3);
    let labels: Vec<&str> = delivered.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["first", "second", "third"]);
    assert_eq!(delivered[1].args, json!({"x": 2}));
    assert!(delivered.iter().all(|d| d.sender_id == "node-7"));
    assert!(delivered.iter().all(|d| d.sequence_number == 42));
}

#[test]
fn test_malformed_batch_is_discarded() {
    let (inner, batcher) = batcher();
    let (handler, events) = recorder();
    batcher.on_event(handler);

    inner.deliver("n", BATCH_LABEL, json!({"not": "a list"}), 1);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_unbatched_messages_and_operational_events_pass_through() {
    let (inner, batcher) = batcher();
    let (handler, events) = recorder();
    batcher.on_event(handler);

    inner.deliver("n", "plain", json!("hi"), 1);
    inner.emit(RelayEvent::SendFailed(Arc::new(RelayError::Config(
        config::ConfigError::Message("x".to_string()),
    ))));

    let recorded = events.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(matches!(&recorded[0], RelayEvent::Message(d) if d.label == "plain"));
    assert!(recorded[1].is_operational());
}

#[tokio::test(start_paused = true)]
async fn test_start_and_stop_are_idempotent() {
    let (inner, batcher) = batcher();
    batcher.stop().await;
    assert_eq!(inner.stops(), 0);

    batcher.start().await.unwrap();
    batcher.start().await.unwrap();
    assert_eq!(inner.starts(), 1);

    batcher.stop().await;
    batcher.stop().await;
    assert_eq!(inner.stops(), 1);

    batcher.start().await.unwrap();
    assert_eq!(inner.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_pending_and_cancels_timer() {
    let (inner, batcher) = batcher();
    batcher.start().await.unwrap();
    batcher.send("late", json!(1));

    batcher.stop().await;
    assert_eq!(inner.sent(), vec![(BATCH_LABEL.to_string(), json!([["late", 1]]))]);

    batcher.send("after-stop", json!(2));
    tokio::time::sleep(FLUSH * 4).await;
    assert_eq!(inner.sent().len(), 1);
    assert_eq!(batcher.pending_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_leaves_timer_off() {
    let inner = FakeRelay::failing();
    let batcher = Batcher::new(inner.clone(), FLUSH);

    assert!(batcher.start().await.is_err());
    batcher.send("a", json!(1));
    tokio::time::sleep(FLUSH * 2).await;
    assert!(inner.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_slow_start_keeps_timer_off() {
    let inner = FakeRelay::slow(Duration::from_millis(100));
    let batcher = Arc::new(Batcher::new(inner.clone(), FLUSH));

    let starting = tokio::spawn({
        let batcher = batcher.clone();
        async move { batcher.start().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    batcher.stop().await;
    assert_eq!(inner.stops(), 1);
    starting.await.unwrap().unwrap();

    batcher.send("after-stop", json!(1));
    tokio::time::sleep(FLUSH * 4).await;
    assert!(inner.sent().is_empty());
    assert_eq!(batcher.pending_len(), 1);

    // A later start brings the timer back.
    batcher.start().await.unwrap();
    tokio::time::sleep(FLUSH + Duration::from_millis(10)).await;
    assert_eq!(
        inner.sent(),
        vec![(BATCH_LABEL.to_string(), json!([["after-stop", 1]]))]
    );
}
