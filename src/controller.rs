//! Testpoint controller
//!
//! The controller is the top-tier node owner: it holds the probe containers
//! spawned on this node and the node's own forwarding engine. Each probe
//! process publishes into the engine, which re-publishes downstream and
//! answers discovery with the names gathered at initialize time.
//!
//! Lifecycle fan-out is sequential over the containers. Latched containers
//! answer locally, so a dead probe process costs one timeout when it latches
//! and nothing afterwards.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::container::ProbeContainer;
use crate::engine::{EngineHandle, ForwardingEngine};
use crate::error::Result;
use crate::logging::LogHandle;
use crate::transport::Endpoint;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

struct ProbeEntry {
    container: ProbeContainer,
    configuration: Option<String>,
}

pub struct Controller {
    node_id: String,
    handle: EngineHandle,
    task: JoinHandle<()>,
    discovery: Endpoint,
    publish: Endpoint,
    probes: Vec<ProbeEntry>,
    log: LogHandle,
}

impl Controller {
    /// Bind the node's forwarding engine and start serving.
    pub async fn start(
        node_id: impl Into<String>,
        service: &Endpoint,
        publish: &Endpoint,
        log: LogHandle,
    ) -> Result<Self> {
        let (engine, handle) = ForwardingEngine::bind(service, publish, log.clone()).await?;

        let discovery = engine.discovery_endpoint().clone();
        let publish = engine.publish_endpoint().clone();

        let task = tokio::spawn(engine.run());

        handle.ready(READY_TIMEOUT).await?;

        Ok(Self {
            node_id: node_id.into(),
            handle,
            task,
            discovery,
            publish,
            probes: Vec::new(),
            log,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn discovery_endpoint(&self) -> &Endpoint {
        &self.discovery
    }

    pub fn publish_endpoint(&self) -> &Endpoint {
        &self.publish
    }

    /// Number of registered probes.
    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Number of probes whose control plane has latched failed.
    pub fn failed_count(&self) -> usize {
        self.probes
            .iter()
            .filter(|entry| entry.container.failed())
            .count()
    }

    /// Register a spawned probe container, subscribing its publish endpoint
    /// into the node engine.
    pub async fn add_probe(
        &mut self,
        container: ProbeContainer,
        configuration: Option<String>,
    ) -> Result<()> {
        self.handle
            .add(None, container.publish_endpoint().clone())
            .await?;

        self.probes.push(ProbeEntry {
            container,
            configuration,
        });

        Ok(())
    }

    /// Initialize every probe and advertise the union of their qualified
    /// names for discovery.
    pub async fn initialize(&mut self) -> Result<()> {
        let mut names = Vec::new();

        for entry in &mut self.probes {
            let probe_names = entry
                .container
                .initialize(entry.configuration.clone())
                .await;
            names.extend(probe_names);
        }

        self.log.info(format!(
            "initialized {} probes publishing {} names",
            self.probes.len(),
            names.len()
        ));

        self.handle.advertise(names).await
    }

    pub async fn start_probes(&mut self) {
        for entry in &mut self.probes {
            entry.container.start().await;
        }
    }

    pub async fn stop_probes(&mut self) {
        for entry in &mut self.probes {
            entry.container.stop().await;
        }
    }

    pub async fn destroy_probes(&mut self) {
        for entry in &mut self.probes {
            entry.container.destroy().await;
        }
    }

    /// Destroy all probes and stop the engine.
    pub async fn shutdown(mut self) -> Result<()> {
        self.destroy_probes().await;
        self.handle.end().await?;
        let _ = self.task.await;
        Ok(())
    }
}
