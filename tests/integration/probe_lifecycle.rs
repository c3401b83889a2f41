//! End-to-end lifecycle of a real probe-hosting process

use std::time::Duration;

use assert_matches::assert_matches;
use telepoint::container::ProbeContainer;
use telepoint::error::Error;
use telepoint::protocol::{PluginDescriptor, ProbeReport};
use telepoint::transport::Subscriber;
use tokio::time::timeout;

use crate::helpers;

#[tokio::test]
async fn timeofday_probe_publishes_aligned_reports() {
    let settings = helpers::container_settings("node1", 0, 2);
    let uuid = settings.uuid;

    let mut container = ProbeContainer::spawn(
        settings,
        PluginDescriptor::Native {
            name: "timeofday".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(!container.failed());

    let names = container.initialize(None).await;
    assert_eq!(names, vec!["Probes.TimeOfDay.node1".to_string()]);

    let mut subscriber = Subscriber::new();
    subscriber.subscribe_all().await;
    subscriber.add(container.publish_endpoint()).await.unwrap();

    container.start().await;
    assert!(!container.failed());

    let first = timeout(Duration::from_secs(10), subscriber.recv())
        .await
        .expect("no report within ten seconds")
        .unwrap();
    let (topic, report) = ProbeReport::from_frame(&first).unwrap();

    assert_eq!(topic, "Probes.TimeOfDay.node1");
    assert_eq!(report.uuid, uuid);
    assert_eq!(report.index, 0);
    assert_eq!(report.tag, "node1");
    assert_eq!(report.timestamp % 2, 0, "timestamp not on a period boundary");

    let second = timeout(Duration::from_secs(10), subscriber.recv())
        .await
        .expect("no second report")
        .unwrap();
    let (_, second_report) = ProbeReport::from_frame(&second).unwrap();

    assert!(second_report.timestamp > report.timestamp);
    assert_eq!(second_report.timestamp % 2, 0);

    container.stop().await;
    container.destroy().await;
    assert!(!container.failed());
}

#[tokio::test]
async fn unknown_plugin_latches_but_destroy_still_works() {
    let settings = helpers::container_settings("node1", 1, 60);

    let mut container = ProbeContainer::spawn(
        settings,
        PluginDescriptor::Native {
            name: "nonesuch".to_string(),
        },
    )
    .await
    .unwrap();

    // the rejected create latched the container
    assert!(container.failed());

    let names = container.initialize(None).await;
    assert!(names.is_empty());
    container.start().await;

    container.destroy().await;
}

#[tokio::test]
async fn unresponsive_command_fails_bootstrap() {
    let mut settings = helpers::container_settings("node1", 0, 60);
    settings.probe_command = "/bin/true".to_string();
    settings.bootstrap_timeout = Duration::from_millis(500);

    let err = ProbeContainer::spawn(
        settings,
        PluginDescriptor::Native {
            name: "timeofday".to_string(),
        },
    )
    .await
    .err()
    .unwrap();

    assert_matches!(err, Error::Bootstrap(_));
}
