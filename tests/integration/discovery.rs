//! Transitive discovery across controller and broker tiers

use std::time::Duration;

use telepoint::broker::Broker;
use telepoint::engine::discover;
use telepoint::logging::LogHandle;
use telepoint::transport::Endpoint;

use crate::helpers;

#[tokio::test]
async fn broker_discovery_unions_node_names() {
    let controller_a = helpers::timeofday_controller("node1", 60).await;
    let controller_b = helpers::timeofday_controller("node2", 60).await;

    let broker = Broker::start(
        &Endpoint::new("127.0.0.1", 0),
        &Endpoint::new("127.0.0.1", 0),
        LogHandle::new("discovery-test"),
    )
    .await
    .unwrap();

    broker
        .add(
            Some(controller_a.discovery_endpoint().clone()),
            controller_a.publish_endpoint().clone(),
        )
        .await
        .unwrap();
    broker
        .add(
            Some(controller_b.discovery_endpoint().clone()),
            controller_b.publish_endpoint().clone(),
        )
        .await
        .unwrap();

    let (names, publish) = discover(broker.discovery_endpoint(), Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        names,
        vec![
            "Probes.TimeOfDay.node1".to_string(),
            "Probes.TimeOfDay.node2".to_string(),
        ]
    );
    // the answer advertises the broker's publish endpoint, not an upstream's
    assert_eq!(publish, Some(broker.publish_endpoint().clone()));

    // a dead upstream slows the answer but does not poison it
    broker
        .add(
            Some(Endpoint::new("127.0.0.1", 1)),
            Endpoint::new("127.0.0.1", 1),
        )
        .await
        .unwrap();

    let (names, _) = discover(broker.discovery_endpoint(), Duration::from_secs(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(names.len(), 2);

    broker.shutdown().await.unwrap();
    controller_a.shutdown().await.unwrap();
    controller_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn controller_discovery_answers_its_own_names() {
    let controller = helpers::timeofday_controller("node7", 60).await;

    let (names, publish) = discover(controller.discovery_endpoint(), Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(names, vec!["Probes.TimeOfDay.node7".to_string()]);
    assert_eq!(publish, Some(controller.publish_endpoint().clone()));

    controller.shutdown().await.unwrap();
}
