//! Builders and configuration directors
//!
//! [`ControllerBuilder`] assembles a controller step by step: the service
//! must be built first, then probes in registration order (their indices are
//! assigned sequentially). The `direct_*` functions walk a parsed
//! configuration file and drive the corresponding component through its
//! builder or start sequence. Configured endpoints are resolved to their
//! canonical numeric form on the way in.

use std::time::Duration;

use anyhow::{Context, bail};
use uuid::Uuid;

use crate::ProbeIndex;
use crate::broker::Broker;
use crate::config::{BrokerConfig, ControllerConfig, ProbeConfig, RecorderConfig};
use crate::container::{ContainerSettings, ProbeContainer};
use crate::controller::Controller;
use crate::index::SqliteIndex;
use crate::logging::LogHandle;
use crate::protocol::PluginDescriptor;
use crate::recorder::Recorder;
use crate::transport::Endpoint;

const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ControllerBuilder {
    uuid: Uuid,
    next_index: ProbeIndex,
    rate_secs: u32,
    comm_timeout: Duration,
    bootstrap_timeout: Duration,
    probe_command: String,
    controller: Option<Controller>,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            next_index: 0,
            rate_secs: 5,
            comm_timeout: Duration::from_secs(10),
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            probe_command: "telepoint-probe".to_string(),
            controller: None,
        }
    }

    pub fn probe_rate(mut self, rate_secs: u32) -> Self {
        self.rate_secs = rate_secs;
        self
    }

    pub fn comm_timeout(mut self, timeout: Duration) -> Self {
        self.comm_timeout = timeout;
        self
    }

    pub fn bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    pub fn probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }

    /// Identifier stamped into every report from this controller's probes.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Bind the node engine. Must precede any probe build.
    pub async fn build_service(
        &mut self,
        node_id: impl Into<String>,
        service: &Endpoint,
        publish: &Endpoint,
    ) -> anyhow::Result<()> {
        if self.controller.is_some() {
            bail!("controller already created");
        }

        let service = service.resolved().await?;
        let publish = publish.resolved().await?;

        let node_id = node_id.into();
        let log = LogHandle::new(node_id.clone());

        let controller = Controller::start(node_id, &service, &publish, log)
            .await
            .context("unable to start controller service")?;

        self.controller = Some(controller);
        Ok(())
    }

    pub async fn build_native_probe(
        &mut self,
        name: impl Into<String>,
        configuration: Option<String>,
    ) -> anyhow::Result<()> {
        let descriptor = PluginDescriptor::Native { name: name.into() };
        self.build_probe(descriptor, configuration).await
    }

    pub async fn build_script_probe(
        &mut self,
        module: impl Into<String>,
        class: impl Into<String>,
        configuration: Option<String>,
    ) -> anyhow::Result<()> {
        let descriptor = PluginDescriptor::Script {
            module: module.into(),
            class: class.into(),
        };
        self.build_probe(descriptor, configuration).await
    }

    async fn build_probe(
        &mut self,
        descriptor: PluginDescriptor,
        configuration: Option<String>,
    ) -> anyhow::Result<()> {
        let Some(controller) = self.controller.as_mut() else {
            bail!("controller not created");
        };

        let settings = ContainerSettings {
            node_id: controller.node_id().to_string(),
            index: self.next_index,
            uuid: self.uuid,
            rate_secs: self.rate_secs,
            comm_timeout: self.comm_timeout,
            bootstrap_timeout: self.bootstrap_timeout,
            probe_command: self.probe_command.clone(),
        };

        let container = ProbeContainer::spawn(settings, descriptor)
            .await
            .with_context(|| format!("unable to spawn probe {}", self.next_index))?;

        controller.add_probe(container, configuration).await?;
        self.next_index += 1;

        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<Controller> {
        self.controller
            .ok_or_else(|| anyhow::anyhow!("controller not created"))
    }
}

#[derive(Default)]
pub struct BrokerBuilder {
    broker: Option<Broker>,
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn build_service(
        &mut self,
        service: &Endpoint,
        publish: &Endpoint,
    ) -> anyhow::Result<()> {
        if self.broker.is_some() {
            bail!("broker already created");
        }

        let service = service.resolved().await?;
        let publish = publish.resolved().await?;

        let broker = Broker::start(&service, &publish, LogHandle::new("broker"))
            .await
            .context("unable to start broker")?;

        self.broker = Some(broker);
        Ok(())
    }

    pub async fn add_testpoint(
        &mut self,
        discovery: Endpoint,
        publish: Endpoint,
    ) -> anyhow::Result<()> {
        let Some(broker) = self.broker.as_ref() else {
            bail!("broker not created");
        };

        let discovery = discovery.resolved().await?;
        let publish = publish.resolved().await?;

        broker.add(Some(discovery), publish).await?;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<Broker> {
        self.broker
            .ok_or_else(|| anyhow::anyhow!("broker not created"))
    }
}

#[derive(Default)]
pub struct RecorderBuilder {
    recorder: Option<Recorder>,
}

impl RecorderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the data file and its SQLite index beside it (`<output>.db`).
    pub async fn build_service(&mut self, output: &std::path::Path) -> anyhow::Result<()> {
        if self.recorder.is_some() {
            bail!("recorder already created");
        }

        let index_path = format!("{}.db", output.display());
        let index = SqliteIndex::open(&index_path)
            .await
            .with_context(|| format!("unable to open index {index_path}"))?;

        let recorder = Recorder::start(output, Box::new(index), LogHandle::new("recorder"))
            .await
            .context("unable to start recorder")?;

        self.recorder = Some(recorder);
        Ok(())
    }

    pub async fn add_testpoint(&mut self, publish: Endpoint) -> anyhow::Result<()> {
        let Some(recorder) = self.recorder.as_ref() else {
            bail!("recorder not created");
        };

        recorder.add(publish.resolved().await?).await?;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<Recorder> {
        self.recorder
            .ok_or_else(|| anyhow::anyhow!("recorder not created"))
    }
}

/// Build a controller from its configuration file contents.
pub async fn direct_controller(config: &ControllerConfig) -> anyhow::Result<Controller> {
    let mut builder = ControllerBuilder::new()
        .probe_rate(config.probe_rate)
        .comm_timeout(Duration::from_secs(u64::from(config.comm_timeout)))
        .probe_command(config.probe_command.clone());

    builder
        .build_service(&config.node_id, &config.service, &config.publish)
        .await?;

    for probe in &config.probes {
        match probe {
            ProbeConfig::Native {
                plugin,
                configuration,
            } => {
                builder
                    .build_native_probe(plugin, configuration.clone())
                    .await?;
            }
            ProbeConfig::Script {
                module,
                class,
                configuration,
            } => {
                builder
                    .build_script_probe(module, class, configuration.clone())
                    .await?;
            }
        }
    }

    builder.finish()
}

/// Build a broker and attach its configured upstreams.
pub async fn direct_broker(config: &BrokerConfig) -> anyhow::Result<Broker> {
    let mut builder = BrokerBuilder::new();
    builder.build_service(&config.service, &config.publish).await?;

    for testpoint in &config.testpoints {
        builder
            .add_testpoint(testpoint.discovery.clone(), testpoint.publish.clone())
            .await?;
    }

    builder.finish()
}

/// Build a recorder writing to the configured output, with a SQLite index
/// beside it.
pub async fn direct_recorder(config: &RecorderConfig) -> anyhow::Result<Recorder> {
    let mut builder = RecorderBuilder::new();
    builder.build_service(&config.output).await?;

    for testpoint in &config.testpoints {
        builder.add_testpoint(testpoint.publish.clone()).await?;
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probes_require_the_service_first() {
        let mut builder = ControllerBuilder::new();

        let err = builder
            .build_native_probe("timeofday", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "controller not created");

        let err = builder.finish().err().unwrap();
        assert_eq!(err.to_string(), "controller not created");
    }

    #[tokio::test]
    async fn service_builds_exactly_once() {
        let mut builder = ControllerBuilder::new();

        builder
            .build_service(
                "node1",
                &Endpoint::new("127.0.0.1", 0),
                &Endpoint::new("127.0.0.1", 0),
            )
            .await
            .unwrap();

        let err = builder
            .build_service(
                "node1",
                &Endpoint::new("127.0.0.1", 0),
                &Endpoint::new("127.0.0.1", 0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "controller already created");

        let controller = builder.finish().unwrap();
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn broker_testpoints_require_the_service_first() {
        let mut builder = BrokerBuilder::new();

        let err = builder
            .add_testpoint(Endpoint::new("127.0.0.1", 1), Endpoint::new("127.0.0.1", 1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "broker not created");
    }

    #[tokio::test]
    async fn hostname_endpoints_resolve_before_binding() {
        let mut builder = BrokerBuilder::new();

        builder
            .build_service(&Endpoint::new("localhost", 0), &Endpoint::new("localhost", 0))
            .await
            .unwrap();

        let broker = builder.finish().unwrap();
        assert!(broker.discovery_endpoint().ip().is_some());
        broker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn direct_broker_with_no_testpoints() {
        let config = BrokerConfig {
            service: Endpoint::new("127.0.0.1", 0),
            publish: Endpoint::new("127.0.0.1", 0),
            testpoints: Vec::new(),
        };

        let broker = direct_broker(&config).await.unwrap();
        broker.shutdown().await.unwrap();
    }
}
