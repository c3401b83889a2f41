//! Report forwarding engine
//!
//! The engine is the relay core shared by brokers and controllers: it owns a
//! downstream-facing publisher, an upstream-facing subscriber and a discovery
//! service, and runs them from a single task. Everything reaching it from its
//! owner arrives as a command message.
//!
//! Report traffic flows upstream-to-downstream (subscriber to publisher)
//! unmodified. Subscription frames flow the opposite way: frames received
//! from downstream subscribers are relayed to every upstream, so a
//! subscription made at the bottom tier propagates to the publishing probes.
//!
//! Discovery answers are transitive. The engine queries each of its
//! upstreams' discovery services, waits up to one second per upstream, and
//! returns the deduplicated union of their names with its own.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::logging::{LogEndpoints, LogHandle};
use crate::protocol::{DiscoveryRequest, DiscoveryResponse};
use crate::transport::{
    Endpoint, MessageListener, MessageSocket, Publisher, Subscriber, send_failure, send_reply,
    transact,
};

/// Per-upstream budget for discovery queries and inbound discovery requests.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(1);

enum EngineCommand {
    Ready {
        respond_to: oneshot::Sender<LogEndpoints>,
    },
    Add {
        discovery: Option<Endpoint>,
        publish: Endpoint,
        respond_to: oneshot::Sender<()>,
    },
    Advertise {
        names: Vec<String>,
        respond_to: oneshot::Sender<()>,
    },
    End {
        respond_to: oneshot::Sender<()>,
    },
}

/// Command-side handle to a running [`ForwardingEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Confirm the engine task is serving and fetch its log endpoints.
    pub async fn ready(&self, wait: Duration) -> Result<LogEndpoints> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(EngineCommand::Ready { respond_to })
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))?;

        match timeout(wait, response).await {
            Ok(Ok(endpoints)) => Ok(endpoints),
            Ok(Err(_)) => Err(Error::Transport("engine task is gone".to_string())),
            Err(_) => Err(Error::Bootstrap(format!(
                "engine did not report ready within {wait:?}"
            ))),
        }
    }

    /// Attach an upstream source.
    ///
    /// `publish` is subscribed for report traffic; `discovery`, when given,
    /// joins the set queried for transitive discovery. A dead upstream is
    /// still acknowledged, matching the remove-later model where sources may
    /// come and go.
    pub async fn add(&self, discovery: Option<Endpoint>, publish: Endpoint) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(EngineCommand::Add {
                discovery,
                publish,
                respond_to,
            })
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))?;

        response
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))
    }

    /// Register locally-published names for discovery answers.
    ///
    /// Resolves once the engine has taken the names, so a discovery request
    /// accepted afterwards sees them.
    pub async fn advertise(&self, names: Vec<String>) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(EngineCommand::Advertise { names, respond_to })
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))?;

        response
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))
    }

    /// Stop the engine task.
    pub async fn end(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(EngineCommand::End { respond_to })
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))?;

        response
            .await
            .map_err(|_| Error::Transport("engine task is gone".to_string()))
    }
}

/// The relay task state.
pub struct ForwardingEngine {
    command_rx: mpsc::Receiver<EngineCommand>,
    discovery: MessageListener,
    publisher: Publisher,
    subscriber: Subscriber,
    upstream_discovery: Vec<Endpoint>,
    local_names: BTreeSet<String>,
    log: LogHandle,
}

impl ForwardingEngine {
    /// Bind the discovery and publish sockets.
    pub async fn bind(
        service: &Endpoint,
        publish: &Endpoint,
        log: LogHandle,
    ) -> Result<(Self, EngineHandle)> {
        let discovery = MessageListener::bind(service).await?;
        let publisher = Publisher::bind(publish).await?;

        let (tx, command_rx) = mpsc::channel(32);

        let engine = Self {
            command_rx,
            discovery,
            publisher,
            subscriber: Subscriber::new(),
            upstream_discovery: Vec::new(),
            local_names: BTreeSet::new(),
            log,
        };

        Ok((engine, EngineHandle { tx }))
    }

    pub fn discovery_endpoint(&self) -> &Endpoint {
        self.discovery.local_endpoint()
    }

    pub fn publish_endpoint(&self) -> &Endpoint {
        self.publisher.endpoint()
    }

    /// Serve until told to end.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        return;
                    };

                    if self.handle_command(command).await {
                        return;
                    }
                }

                accepted = self.discovery.accept() => {
                    match accepted {
                        Ok(socket) => {
                            tokio::spawn(serve_discovery(
                                socket,
                                self.local_names.iter().cloned().collect(),
                                self.upstream_discovery.clone(),
                                self.publisher.endpoint().clone(),
                                self.log.scoped("discovery"),
                            ));
                        }
                        Err(e) => {
                            self.log.warn(format!("discovery accept failed: {e}"));
                        }
                    }
                }

                inbound = self.publisher.next_inbound() => {
                    // subscription frame from downstream, relay upstream
                    if let Some(frame) = inbound {
                        self.subscriber.send(frame).await;
                    }
                }

                message = self.subscriber.recv() => {
                    if let Some(message) = message {
                        self.publisher.publish(message);
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Ready { respond_to } => {
                let _ = respond_to.send(self.log.endpoints());
            }

            EngineCommand::Add {
                discovery,
                publish,
                respond_to,
            } => {
                if let Err(e) = self.subscriber.add(&publish).await {
                    // acknowledge anyway; the source may appear later under a
                    // different registration
                    self.log.warn(format!("unable to subscribe {publish}: {e}"));
                } else {
                    self.log.info(format!("subscribed upstream {publish}"));
                }

                if let Some(discovery) = discovery {
                    self.upstream_discovery.push(discovery);
                }

                let _ = respond_to.send(());
            }

            EngineCommand::Advertise { names, respond_to } => {
                self.local_names.extend(names);
                let _ = respond_to.send(());
            }

            EngineCommand::End { respond_to } => {
                let _ = respond_to.send(());
                return true;
            }
        }

        false
    }
}

/// Answer one discovery request on an accepted connection.
async fn serve_discovery(
    mut socket: MessageSocket,
    local_names: Vec<String>,
    upstreams: Vec<Endpoint>,
    publish: Endpoint,
    log: LogHandle,
) {
    let received = match timeout(DISCOVERY_TIMEOUT, socket.recv()).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            log.warn(format!("discovery request failed: {e}"));
            return;
        }
        Err(_) => return,
    };

    let request: std::result::Result<DiscoveryRequest, _> = received
        .first()
        .ok_or_else(|| Error::Protocol("empty discovery request".to_string()))
        .and_then(|part| serde_json::from_slice(part).map_err(Error::from));

    if let Err(e) = request {
        log.warn(format!("undecodable discovery request: {e}"));
        let _ = send_failure::<DiscoveryResponse>(&mut socket, e.to_string()).await;
        return;
    }

    let mut names: BTreeSet<String> = local_names.into_iter().collect();

    for upstream in &upstreams {
        match discover(upstream, DISCOVERY_TIMEOUT).await {
            Ok(Some((upstream_names, _))) => {
                names.extend(upstream_names);
            }
            Ok(None) => {
                log.warn(format!("discovery of {upstream} timed out"));
            }
            Err(e) => {
                log.warn(format!("discovery of {upstream} failed: {e}"));
            }
        }
    }

    let reply = DiscoveryResponse::Discovery {
        names: names.into_iter().collect(),
        publish: Some(publish),
    };

    if let Err(e) = send_reply(&mut socket, &reply).await {
        log.warn(format!("unable to answer discovery request: {e}"));
    }
}

/// Query one discovery service for its known names and publish endpoint.
///
/// Returns `Ok(None)` when the service does not answer within `wait`.
pub async fn discover(
    endpoint: &Endpoint,
    wait: Duration,
) -> Result<Option<(Vec<String>, Option<Endpoint>)>> {
    let mut socket = MessageSocket::connect(endpoint).await?;

    let response: Option<DiscoveryResponse> =
        transact(&mut socket, &DiscoveryRequest::Discover, wait).await?;

    match response {
        Some(DiscoveryResponse::Discovery { names, publish }) => Ok(Some((names, publish))),
        Some(DiscoveryResponse::Error { message }) => Err(Error::Remote(message)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn running_engine(names: Vec<String>) -> (EngineHandle, Endpoint, Endpoint) {
        let (engine, handle) = ForwardingEngine::bind(
            &Endpoint::new("127.0.0.1", 0),
            &Endpoint::new("127.0.0.1", 0),
            LogHandle::new("test/engine"),
        )
        .await
        .unwrap();

        let discovery = engine.discovery_endpoint().clone();
        let publish = engine.publisher.endpoint().clone();

        tokio::spawn(engine.run());

        handle.ready(Duration::from_secs(5)).await.unwrap();
        handle.advertise(names).await.unwrap();

        (handle, discovery, publish)
    }

    #[tokio::test]
    async fn discovery_answers_advertised_names() {
        let (_handle, discovery, publish) =
            running_engine(vec!["b.n".to_string(), "a.n".to_string()]).await;

        let (names, answered_publish) = discover(&discovery, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(names, vec!["a.n".to_string(), "b.n".to_string()]);
        assert_eq!(answered_publish, Some(publish));
    }

    #[tokio::test]
    async fn discovery_union_is_transitive_and_deduplicated() {
        let (_upstream_handle, upstream_discovery, upstream_publish) =
            running_engine(vec!["x.n".to_string(), "y.n".to_string()]).await;

        let (handle, discovery, _publish) =
            running_engine(vec!["y.n".to_string(), "z.n".to_string()]).await;

        handle
            .add(Some(upstream_discovery), upstream_publish)
            .await
            .unwrap();

        let (names, _) = discover(&discovery, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            names,
            vec!["x.n".to_string(), "y.n".to_string(), "z.n".to_string()]
        );
    }

    #[tokio::test]
    async fn advertised_names_are_visible_once_acknowledged() {
        let (engine, handle) = ForwardingEngine::bind(
            &Endpoint::new("127.0.0.1", 0),
            &Endpoint::new("127.0.0.1", 0),
            LogHandle::new("test/engine"),
        )
        .await
        .unwrap();

        let discovery = engine.discovery_endpoint().clone();
        tokio::spawn(engine.run());

        // no ready round trip first; the advertise ack alone must order the
        // names before the following discovery request
        handle.advertise(vec!["a.n".to_string()]).await.unwrap();

        let (names, _) = discover(&discovery, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(names, vec!["a.n".to_string()]);
    }

    #[tokio::test]
    async fn dead_upstream_is_skipped_not_fatal() {
        let (handle, discovery, _publish) = running_engine(vec!["local.n".to_string()]).await;

        // reserve a port with no service behind it
        let dead = MessageListener::bind_local().await.unwrap();
        let dead_discovery = dead.local_endpoint().clone();
        let dead_publish = dead_discovery.clone();
        drop(dead);

        handle.add(Some(dead_discovery), dead_publish).await.unwrap();

        let (names, _) = discover(&discovery, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(names, vec!["local.n".to_string()]);
    }

    #[tokio::test]
    async fn end_stops_the_task() {
        let (handle, _discovery, _publish) = running_engine(Vec::new()).await;

        handle.end().await.unwrap();

        let err = handle.ready(Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::Bootstrap(_)));
    }
}
