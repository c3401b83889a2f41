//! Probe-hosting server
//!
//! One process hosts exactly one probe instance. At startup the server binds
//! its control and publish sockets on ephemeral loopback ports, then reports
//! them to the parent over the rendezvous endpoint taken from the
//! environment. After the parent acknowledges, the server accepts a single
//! control connection and dispatches lifecycle requests against its state
//! machine, publishing sample reports on aligned schedule boundaries while
//! running.

use std::env;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::logging::LogHandle;
use crate::protocol::{
    ProbeReport, ProbeRequest, ProbeResponse, ReportData, ReportKind, StatusReport, StatusResponse,
};
use crate::transport::{
    Endpoint, MessageListener, MessageSocket, Publisher, send_failure, send_reply, send_success,
    transact,
};
use crate::{ProbeIndex, ProbeNames, qualified_name};

use super::adapter::ProbeAdapter;
use super::scheduler::SampleSchedule;
use super::{ProbeLoader, ScriptHost};

const ENV_STATUS: &str = "TELEPOINT_STATUS";
const ENV_NODE_ID: &str = "TELEPOINT_NODEID";
const ENV_PROBE_INDEX: &str = "TELEPOINT_PROBEINDEX";
const ENV_UUID: &str = "TELEPOINT_UUID";
const ENV_PROBE_RATE: &str = "TELEPOINT_PROBERATE";

const READY_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Bootstrap parameters handed down by the spawning container.
#[derive(Debug, Clone)]
pub struct BootstrapEnv {
    pub status: Endpoint,
    pub node_id: String,
    pub index: ProbeIndex,
    pub uuid: Uuid,
    pub rate_secs: u32,
}

impl BootstrapEnv {
    /// Read the bootstrap parameters from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            status: required(ENV_STATUS)?.parse()?,
            node_id: required(ENV_NODE_ID)?,
            index: parse_var(ENV_PROBE_INDEX)?,
            uuid: required(ENV_UUID)?
                .parse()
                .map_err(|e| Error::Bootstrap(format!("{ENV_UUID} is not a uuid: {e}")))?,
            rate_secs: parse_var(ENV_PROBE_RATE)?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Bootstrap(format!("missing environment variable {name}")))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    required(name)?
        .parse()
        .map_err(|e| Error::Bootstrap(format!("unable to parse {name}: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Created,
    Initialized,
    Running,
    Stopped,
    Destroyed,
}

/// The probe-hosting server for one probe instance.
pub struct ProbeServer {
    control: MessageListener,
    publisher: Publisher,
    node_id: String,
    index: ProbeIndex,
    uuid: Uuid,
    schedule: SampleSchedule,
    loader: Box<dyn ProbeLoader>,
    script_host: Box<dyn ScriptHost>,
    log: LogHandle,
    state: State,
    adapter: Option<ProbeAdapter>,
    names: ProbeNames,
}

impl ProbeServer {
    /// Bind sockets and complete the rendezvous with the spawning container.
    ///
    /// Fails with [`Error::Bootstrap`] when the ready report is not
    /// acknowledged within five seconds.
    pub async fn bootstrap(
        env: BootstrapEnv,
        loader: Box<dyn ProbeLoader>,
        script_host: Box<dyn ScriptHost>,
    ) -> Result<Self> {
        let control = MessageListener::bind_local().await?;
        let publisher = Publisher::bind_local().await?;

        let log = LogHandle::new(format!("{}/{}/probe", env.node_id, env.index));

        let mut status = MessageSocket::connect(&env.status).await?;

        let ready = StatusReport::Ready {
            control: control.local_endpoint().clone(),
            publish: publisher.endpoint().clone(),
            log: log.endpoints(),
        };

        let acked: Option<StatusResponse> =
            transact(&mut status, &ready, READY_ACK_TIMEOUT).await?;

        if acked.is_none() {
            return Err(Error::Bootstrap(
                "ready report was not acknowledged".to_string(),
            ));
        }

        log.debug(format!(
            "rendezvous complete, control {} publish {}",
            control.local_endpoint(),
            publisher.endpoint()
        ));

        Ok(Self {
            control,
            publisher,
            node_id: env.node_id,
            index: env.index,
            uuid: env.uuid,
            schedule: SampleSchedule::new(env.rate_secs),
            loader,
            script_host,
            log,
            state: State::Uninitialized,
            adapter: None,
            names: Vec::new(),
        })
    }

    /// Accept the container's control connection and serve requests until
    /// destroyed or disconnected.
    pub async fn run(mut self) -> Result<()> {
        let mut channel = self.control.accept().await?;

        // armed while running: the boundary timestamp and its timer
        let mut timer: Option<(i64, Pin<Box<Sleep>>)> = None;

        loop {
            tokio::select! {
                received = channel.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(e) => {
                            self.log.info(format!("control channel closed: {e}"));
                            return Ok(());
                        }
                    };

                    let request: ProbeRequest = match message
                        .first()
                        .ok_or_else(|| Error::Protocol("empty control request".to_string()))
                        .and_then(|part| serde_json::from_slice(part).map_err(Error::from))
                    {
                        Ok(request) => request,
                        Err(e) => {
                            self.log.warn(format!("undecodable control request: {e}"));
                            send_failure::<ProbeResponse>(&mut channel, e.to_string()).await?;
                            continue;
                        }
                    };

                    let destroyed = self.dispatch(request, &mut channel, &mut timer).await?;

                    if destroyed {
                        return Ok(());
                    }
                }

                boundary = fire(&mut timer), if timer.is_some() => {
                    self.sample(boundary);
                    timer = Some(self.schedule.arm());
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        request: ProbeRequest,
        channel: &mut MessageSocket,
        timer: &mut Option<(i64, Pin<Box<Sleep>>)>,
    ) -> Result<bool> {
        match request {
            ProbeRequest::Create { plugin } => {
                if self.state != State::Uninitialized {
                    send_failure::<ProbeResponse>(channel, "probe already created").await?;
                    return Ok(false);
                }

                match ProbeAdapter::create(&plugin, self.loader.as_ref(), self.script_host.as_ref())
                {
                    Ok(adapter) => {
                        self.log.info(format!("created {}", adapter.describe()));
                        self.adapter = Some(adapter);
                        self.state = State::Created;
                        send_success::<ProbeResponse>(channel).await?;
                    }
                    Err(e) => {
                        self.log.error(format!("create failed: {e}"));
                        send_failure::<ProbeResponse>(channel, e.to_string()).await?;
                    }
                }
            }

            ProbeRequest::Initialize { configuration } => {
                if self.state != State::Created {
                    send_failure::<ProbeResponse>(channel, "probe not created").await?;
                    return Ok(false);
                }

                let adapter = self.adapter.as_mut().expect("created state has an adapter");
                let configuration = configuration.as_deref().map(Path::new);

                match adapter.initialize(configuration) {
                    Ok(names) => {
                        self.names = names
                            .iter()
                            .map(|name| qualified_name(name, &self.node_id))
                            .collect();
                        self.state = State::Initialized;

                        let reply = ProbeResponse::Initialize {
                            names: self.names.clone(),
                        };
                        send_reply(channel, &reply).await?;
                    }
                    Err(e) => {
                        self.log.error(format!("initialize failed: {e}"));
                        send_failure::<ProbeResponse>(channel, e.to_string()).await?;
                    }
                }
            }

            ProbeRequest::Start => {
                if !matches!(self.state, State::Initialized | State::Stopped) {
                    send_failure::<ProbeResponse>(channel, "probe not initialized").await?;
                    return Ok(false);
                }

                let adapter = self.adapter.as_mut().expect("initialized state has an adapter");

                match adapter.start() {
                    Ok(()) => {
                        self.state = State::Running;
                        *timer = Some(self.schedule.arm());
                        send_success::<ProbeResponse>(channel).await?;
                    }
                    Err(e) => {
                        self.log.error(format!("start failed: {e}"));
                        send_failure::<ProbeResponse>(channel, e.to_string()).await?;
                    }
                }
            }

            ProbeRequest::Stop => {
                if self.state != State::Running {
                    send_failure::<ProbeResponse>(channel, "probe not running").await?;
                    return Ok(false);
                }

                let adapter = self.adapter.as_mut().expect("running state has an adapter");

                match adapter.stop() {
                    Ok(()) => {
                        self.state = State::Stopped;
                        *timer = None;
                        send_success::<ProbeResponse>(channel).await?;
                    }
                    Err(e) => {
                        self.log.error(format!("stop failed: {e}"));
                        send_failure::<ProbeResponse>(channel, e.to_string()).await?;
                    }
                }
            }

            ProbeRequest::Destroy => {
                // destroy always succeeds from the caller's view; teardown
                // problems are only logged
                if let Some(mut adapter) = self.adapter.take() {
                    if let Err(e) = adapter.destroy() {
                        self.log.warn(format!("destroy reported: {e}"));
                    }
                }

                self.state = State::Destroyed;
                *timer = None;
                send_success::<ProbeResponse>(channel).await?;
                self.log.info("destroyed, shutting down");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Collect and publish samples for the boundary that just elapsed.
    /// Probe errors are logged and the cycle skipped.
    fn sample(&mut self, boundary: i64) {
        if self.state != State::Running {
            return;
        }

        let Some(adapter) = self.adapter.as_mut() else {
            return;
        };

        let samples = match adapter.probe() {
            Ok(samples) => samples,
            Err(e) => {
                self.log.error(format!("probe failed: {e}"));
                return;
            }
        };

        for sample in samples {
            let topic = qualified_name(&sample.name, &self.node_id);

            let report = ProbeReport {
                index: self.index,
                tag: self.node_id.clone(),
                uuid: self.uuid,
                timestamp: boundary,
                kind: ReportKind::Data,
                data: ReportData {
                    name: sample.message_name,
                    module: sample.message_module,
                    version: sample.version,
                    blob: sample.blob,
                },
            };

            match report.to_frame(&topic) {
                Ok(frame) => self.publisher.publish(frame),
                Err(e) => self.log.error(format!("unable to frame report: {e}")),
            }
        }
    }
}

async fn fire(timer: &mut Option<(i64, Pin<Box<Sleep>>)>) -> i64 {
    let (boundary, sleep) = timer.as_mut().expect("fire polled without an armed timer");
    sleep.as_mut().await;
    *boundary
}
