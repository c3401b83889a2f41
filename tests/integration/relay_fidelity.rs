//! Relay tiers must pass frames through byte-for-byte

use std::time::Duration;

use telepoint::broker::Broker;
use telepoint::logging::LogHandle;
use telepoint::transport::{Endpoint, Message, Publisher, Subscriber};
use tokio::time::timeout;

async fn ephemeral_broker(label: &str) -> Broker {
    Broker::start(
        &Endpoint::new("127.0.0.1", 0),
        &Endpoint::new("127.0.0.1", 0),
        LogHandle::new(label),
    )
    .await
    .unwrap()
}

/// Publishes repeatedly until the subscription handshake has propagated and
/// a copy arrives.
async fn publish_until_received(
    publisher: &Publisher,
    subscriber: &mut Subscriber,
    message: &Message,
) -> Message {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

    loop {
        publisher.publish(message.clone());

        match timeout(Duration::from_millis(100), subscriber.recv()).await {
            Ok(Some(received)) => return received,
            Ok(None) => panic!("subscriber channel closed"),
            Err(_) => assert!(
                tokio::time::Instant::now() < deadline,
                "message never arrived"
            ),
        }
    }
}

#[tokio::test]
async fn broker_preserves_part_boundaries_and_bytes() {
    let publisher = Publisher::bind_local().await.unwrap();

    let broker = ephemeral_broker("relay-test").await;
    broker
        .add(None, publisher.endpoint().clone())
        .await
        .unwrap();

    let mut subscriber = Subscriber::new();
    subscriber.subscribe_all().await;
    subscriber.add(broker.publish_endpoint()).await.unwrap();

    // three parts, one empty, one binary
    let message = vec![
        b"Probes.TimeOfDay.node1".to_vec(),
        Vec::new(),
        vec![0u8, 1, 2, 255, 254],
    ];

    let received = publish_until_received(&publisher, &mut subscriber, &message).await;
    assert_eq!(received, message);

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn stacked_brokers_relay_transitively() {
    let publisher = Publisher::bind_local().await.unwrap();

    let upstream = ephemeral_broker("upstream").await;
    upstream
        .add(None, publisher.endpoint().clone())
        .await
        .unwrap();

    let downstream = ephemeral_broker("downstream").await;
    downstream
        .add(
            Some(upstream.discovery_endpoint().clone()),
            upstream.publish_endpoint().clone(),
        )
        .await
        .unwrap();

    let mut subscriber = Subscriber::new();
    subscriber.subscribe_all().await;
    subscriber.add(downstream.publish_endpoint()).await.unwrap();

    let message = vec![b"Probes.X.node9".to_vec(), b"payload".to_vec()];
    let received = publish_until_received(&publisher, &mut subscriber, &message).await;
    assert_eq!(received, message);

    downstream.shutdown().await.unwrap();
    upstream.shutdown().await.unwrap();
}

#[tokio::test]
async fn prefix_subscription_reaches_the_source() {
    let publisher = Publisher::bind_local().await.unwrap();

    let broker = ephemeral_broker("filter-test").await;
    broker
        .add(None, publisher.endpoint().clone())
        .await
        .unwrap();

    let mut subscriber = Subscriber::new();
    subscriber
        .send(telepoint::transport::pubsub::subscribe_frame(b"wanted."))
        .await;
    subscriber.add(broker.publish_endpoint()).await.unwrap();

    let wanted = vec![b"wanted.topic".to_vec(), b"1".to_vec()];
    let received = publish_until_received(&publisher, &mut subscriber, &wanted).await;
    assert_eq!(received, wanted);

    // once settled, an unmatched topic is filtered at the source
    publisher.publish(vec![b"other.topic".to_vec(), b"2".to_vec()]);
    publisher.publish(vec![b"wanted.again".to_vec(), b"3".to_vec()]);

    let next = timeout(Duration::from_secs(10), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next[0], b"wanted.again".to_vec());

    broker.shutdown().await.unwrap();
}
