//! Shared fixtures for the end-to-end tests
#![allow(dead_code)]

use std::time::Duration;

use telepoint::builder::ControllerBuilder;
use telepoint::container::ContainerSettings;
use telepoint::controller::Controller;
use telepoint::transport::Endpoint;
use uuid::Uuid;

/// Path of the compiled probe-hosting binary.
pub fn probe_command() -> String {
    env!("CARGO_BIN_EXE_telepoint-probe").to_string()
}

pub fn container_settings(node_id: &str, index: u32, rate_secs: u32) -> ContainerSettings {
    ContainerSettings {
        node_id: node_id.to_string(),
        index,
        uuid: Uuid::new_v4(),
        rate_secs,
        comm_timeout: Duration::from_secs(5),
        bootstrap_timeout: Duration::from_secs(10),
        probe_command: probe_command(),
    }
}

/// A controller on ephemeral ports hosting one time-of-day probe, already
/// initialized but not started.
pub async fn timeofday_controller(node_id: &str, rate_secs: u32) -> Controller {
    let mut builder = ControllerBuilder::new()
        .probe_rate(rate_secs)
        .comm_timeout(Duration::from_secs(5))
        .probe_command(probe_command());

    builder
        .build_service(
            node_id,
            &Endpoint::new("127.0.0.1", 0),
            &Endpoint::new("127.0.0.1", 0),
        )
        .await
        .unwrap();
    builder.build_native_probe("timeofday", None).await.unwrap();

    let mut controller = builder.finish().unwrap();
    controller.initialize().await.unwrap();
    assert_eq!(controller.failed_count(), 0);

    controller
}
