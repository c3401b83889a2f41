//! Broker front
//!
//! A broker is a forwarding engine with a lifecycle wrapper: bind, confirm
//! the engine task is serving, attach upstream testpoints, shut down. Fan-in
//! brokers stack; a downstream broker adds an upstream broker the same way a
//! broker adds a testpoint.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::engine::{EngineHandle, ForwardingEngine};
use crate::error::Result;
use crate::logging::LogHandle;
use crate::transport::Endpoint;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Broker {
    handle: EngineHandle,
    task: JoinHandle<()>,
    discovery: Endpoint,
    publish: Endpoint,
}

impl Broker {
    /// Bind and start the relay, returning once the engine task confirms it
    /// is serving.
    pub async fn start(service: &Endpoint, publish: &Endpoint, log: LogHandle) -> Result<Self> {
        let (engine, handle) = ForwardingEngine::bind(service, publish, log).await?;

        let discovery = engine.discovery_endpoint().clone();
        let publish = engine.publish_endpoint().clone();

        let task = tokio::spawn(engine.run());

        handle.ready(READY_TIMEOUT).await?;

        Ok(Self {
            handle,
            task,
            discovery,
            publish,
        })
    }

    /// Attach an upstream testpoint or broker.
    pub async fn add(&self, discovery: Option<Endpoint>, publish: Endpoint) -> Result<()> {
        self.handle.add(discovery, publish).await
    }

    /// Discovery service endpoint, for downstream tiers to query.
    pub fn discovery_endpoint(&self) -> &Endpoint {
        &self.discovery
    }

    /// Publish endpoint downstream subscribers connect to.
    pub fn publish_endpoint(&self) -> &Endpoint {
        &self.publish
    }

    pub async fn shutdown(self) -> Result<()> {
        self.handle.end().await?;
        let _ = self.task.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::discover;

    #[tokio::test]
    async fn start_add_and_shutdown() {
        let log = LogHandle::new("broker-test");
        let broker = Broker::start(
            &Endpoint::new("127.0.0.1", 0),
            &Endpoint::new("127.0.0.1", 0),
            log.clone(),
        )
        .await
        .unwrap();

        let upstream = Broker::start(
            &Endpoint::new("127.0.0.1", 0),
            &Endpoint::new("127.0.0.1", 0),
            log,
        )
        .await
        .unwrap();

        broker
            .add(
                Some(upstream.discovery_endpoint().clone()),
                upstream.publish_endpoint().clone(),
            )
            .await
            .unwrap();

        let answer = discover(broker.discovery_endpoint(), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.1, Some(broker.publish_endpoint().clone()));

        upstream.shutdown().await.unwrap();
        broker.shutdown().await.unwrap();
    }
}
