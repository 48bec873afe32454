use std::time::Duration;

use serde_json::json;

use super::topic::Topic;
use super::{BrokerError, Envelope, MemoryBus, ServiceBus, SubscriptionOptions};

fn envelope(sender: &str, label: &str) -> Envelope {
    Envelope::pack(sender, label, &json!({"n": 1})).unwrap()
}

#[test]
fn test_topic_new() {
    let topic = Topic::new("events");
    assert_eq!(topic.name, "events");
    assert!(topic.subscription("any").is_none());
}

#[test]
fn test_topic_subscribe_rejects_duplicate_name() {
    let mut topic = Topic::new("events");
    assert!(topic.subscribe("sub", SubscriptionOptions::default()));
    assert!(!topic.subscribe("sub", SubscriptionOptions::default()));
}

#[test]
fn test_topic_publish_assigns_increasing_sequence_numbers() {
    let mut topic = Topic::new("events");
    topic.subscribe("a", SubscriptionOptions::default());
    topic.subscribe("b", SubscriptionOptions::default());

    assert_eq!(topic.publish(envelope("n1", "x")), 1);
    assert_eq!(topic.publish(envelope("n2", "y")), 2);

    for sub in ["a", "b"] {
        let first = topic.pop(sub).unwrap().unwrap();
        let second = topic.pop(sub).unwrap().unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.sender_id, "n1");
        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.label, "y");
        assert!(topic.pop(sub).unwrap().is_none());
    }
}

#[test]
fn test_topic_pop_unknown_subscription() {
    let mut topic = Topic::new("events");
    assert!(matches!(topic.pop("missing"), Err(BrokerError::NotFound(_))));
}

#[test]
fn test_envelope_pack_serializes_args_as_json() {
    let env = Envelope::pack("node", "label", &json!([1, "two"])).unwrap();
    assert_eq!(env.sender_id, "node");
    assert_eq!(env.label, "label");
    assert_eq!(env.body, br#"[1,"two"]"#.to_vec());
}

#[tokio::test]
async fn test_create_topic_twice_reports_already_exists() {
    let bus = MemoryBus::default();
    bus.create_topic("t").await.unwrap();
    assert_eq!(
        bus.create_topic("t").await,
        Err(BrokerError::AlreadyExists("t".to_string()))
    );
}

#[tokio::test]
async fn test_create_subscription_records_options() {
    let bus = MemoryBus::default();
    bus.create_topic("t").await.unwrap();
    let options = SubscriptionOptions {
        auto_delete_on_idle: Duration::from_secs(60),
    };
    bus.create_subscription("t", "s", &options).await.unwrap();

    assert_eq!(bus.subscription_options("t", "s"), Some(options.clone()));
    assert!(matches!(
        bus.create_subscription("t", "s", &options).await,
        Err(BrokerError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_create_subscription_without_topic() {
    let bus = MemoryBus::default();
    let result = bus
        .create_subscription("missing", "s", &SubscriptionOptions::default())
        .await;
    assert_eq!(result, Err(BrokerError::NotFound("missing".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_receive_times_out_with_no_messages() {
    let bus = MemoryBus::new(Duration::from_millis(500));
    bus.create_topic("t").await.unwrap();
    bus.create_subscription("t", "s", &SubscriptionOptions::default())
        .await
        .unwrap();

    assert_eq!(
        bus.receive_subscription_message("t", "s").await,
        Err(BrokerError::NoMessages)
    );
}

#[tokio::test(start_paused = true)]
async fn test_receive_wakes_on_publish() {
    let bus = std::sync::Arc::new(MemoryBus::new(Duration::from_secs(30)));
    bus.create_topic("t").await.unwrap();
    bus.create_subscription("t", "s", &SubscriptionOptions::default())
        .await
        .unwrap();

    let receiver = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.receive_subscription_message("t", "s").await })
    };
    tokio::task::yield_now().await;

    bus.send_topic_message("t", envelope("n1", "hello"))
        .await
        .unwrap();

    let message = receiver.await.unwrap().unwrap();
    assert_eq!(message.label, "hello");
    assert_eq!(message.sequence_number, 1);
    assert_eq!(bus.backlog("t", "s"), 0);
}

#[tokio::test]
async fn test_send_to_missing_topic() {
    let bus = MemoryBus::default();
    assert!(matches!(
        bus.send_topic_message("nope", envelope("n", "l")).await,
        Err(BrokerError::NotFound(_))
    ));
}
