//! Probe process containers
//!
//! A container owns one probe-hosting child process: it spawns the process
//! with rendezvous parameters in the environment, waits for the ready report,
//! and then drives the probe lifecycle over the control connection.
//!
//! Control-plane failures latch. Once any transaction times out or errors,
//! the container marks itself failed and every later lifecycle call except
//! `destroy` becomes a local no-op, so one wedged probe process cannot stall
//! the controller's fan-out over the rest. Construction itself still succeeds
//! after a failed create; the latch records the loss.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;
use uuid::Uuid;

use crate::ProbeIndex;
use crate::ProbeNames;
use crate::error::{Error, Result};
use crate::logging::LogHandle;
use crate::protocol::{
    PluginDescriptor, ProbeRequest, ProbeResponse, StatusReport, StatusResponse,
};
use crate::transport::{Endpoint, MessageListener, MessageSocket, send_success, transact};

/// Parameters for spawning one probe process.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub node_id: String,
    pub index: ProbeIndex,
    pub uuid: Uuid,
    pub rate_secs: u32,
    /// Per-transaction reply timeout on the control channel.
    pub comm_timeout: Duration,
    /// How long to wait for the child's ready report.
    pub bootstrap_timeout: Duration,
    /// Executable to spawn as the probe-hosting process.
    pub probe_command: String,
}

/// Owner of one probe-hosting child process.
pub struct ProbeContainer {
    control: MessageSocket,
    publish: Endpoint,
    child: Option<Child>,
    failed: bool,
    comm_timeout: Duration,
    index: ProbeIndex,
    log: LogHandle,
}

impl ProbeContainer {
    /// Spawn the probe process, complete the rendezvous and issue the create
    /// request.
    ///
    /// Fails with [`Error::Bootstrap`] when the child does not report ready
    /// in time. A create request that times out or is rejected does not fail
    /// construction; it latches the failure flag instead.
    pub async fn spawn(settings: ContainerSettings, descriptor: PluginDescriptor) -> Result<Self> {
        let rendezvous = MessageListener::bind_local().await?;

        let log = LogHandle::new(format!(
            "{}/{}/container",
            settings.node_id, settings.index
        ));

        let child = Command::new(&settings.probe_command)
            .env("TELEPOINT_STATUS", rendezvous.local_endpoint().to_string())
            .env("TELEPOINT_NODEID", &settings.node_id)
            .env("TELEPOINT_PROBEINDEX", settings.index.to_string())
            .env("TELEPOINT_UUID", settings.uuid.to_string())
            .env("TELEPOINT_PROBERATE", settings.rate_secs.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Bootstrap(format!(
                    "unable to spawn '{}': {e}",
                    settings.probe_command
                ))
            })?;

        let (control, publish) = match timeout(
            settings.bootstrap_timeout,
            Self::rendezvous(&rendezvous),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Bootstrap(format!(
                    "probe process {} sent no ready report within {:?}",
                    settings.index, settings.bootstrap_timeout
                )));
            }
        };

        log.debug(format!("probe process ready, control {}", control));

        let mut container = Self {
            control: MessageSocket::connect(&control).await?,
            publish,
            child: Some(child),
            failed: false,
            comm_timeout: settings.comm_timeout,
            index: settings.index,
            log,
        };

        let create = ProbeRequest::Create {
            plugin: descriptor,
        };
        container.checked_transact(&create, "create").await;

        Ok(container)
    }

    async fn rendezvous(listener: &MessageListener) -> Result<(Endpoint, Endpoint)> {
        let mut status = listener.accept().await?;
        let message = status.recv().await?;

        let part = message
            .first()
            .ok_or_else(|| Error::Protocol("empty ready report".to_string()))?;
        let StatusReport::Ready {
            control, publish, ..
        } = serde_json::from_slice(part)?;

        send_success::<StatusResponse>(&mut status).await?;

        Ok((control, publish))
    }

    /// Endpoint the probe process publishes reports on.
    pub fn publish_endpoint(&self) -> &Endpoint {
        &self.publish
    }

    pub fn index(&self) -> ProbeIndex {
        self.index
    }

    /// Whether a control-plane failure has latched this container.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Initialize the probe, returning the qualified names it publishes
    /// under. Empty when latched.
    pub async fn initialize(&mut self, configuration: Option<String>) -> ProbeNames {
        if self.failed {
            return Vec::new();
        }

        let request = ProbeRequest::Initialize { configuration };

        match self.checked_transact(&request, "initialize").await {
            Some(ProbeResponse::Initialize { names }) => names,
            Some(_) | None => Vec::new(),
        }
    }

    pub async fn start(&mut self) {
        if self.failed {
            return;
        }
        self.checked_transact(&ProbeRequest::Start, "start").await;
    }

    pub async fn stop(&mut self) {
        if self.failed {
            return;
        }
        self.checked_transact(&ProbeRequest::Stop, "stop").await;
    }

    /// Tear down the probe and, on success, release the child to exit on its
    /// own. Attempted even when latched; the latch itself is never cleared.
    pub async fn destroy(&mut self) {
        if self
            .checked_transact(&ProbeRequest::Destroy, "destroy")
            .await
            .is_some()
        {
            // the process acknowledged teardown; reap it without killing
            if let Some(mut child) = self.child.take() {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }
    }

    /// Run one transaction, latching the failure flag on timeout or error.
    async fn checked_transact(
        &mut self,
        request: &ProbeRequest,
        what: &str,
    ) -> Option<ProbeResponse> {
        match transact(&mut self.control, request, self.comm_timeout).await {
            Ok(Some(response)) => Some(response),
            Ok(None) => {
                self.log
                    .error(format!("{what} timed out, abandoning probe"));
                self.failed = true;
                None
            }
            Err(e) => {
                self.log.error(format!("{what} failed: {e}"));
                self.failed = true;
                None
            }
        }
    }
}

impl Drop for ProbeContainer {
    fn drop(&mut self) {
        // destroy clears the child on success; anything still here gets killed
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
