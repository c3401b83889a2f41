//! Configuration files for the controller, broker and recorder binaries

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::transport::Endpoint;

/// One probe declaration in a controller configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    Native {
        plugin: String,
        configuration: Option<String>,
    },
    Script {
        module: String,
        class: String,
        configuration: Option<String>,
    },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ControllerConfig {
    /// Node id qualifying every published name.
    pub node_id: String,

    /// Discovery service endpoint.
    pub service: Endpoint,

    /// Publish endpoint for downstream subscribers.
    pub publish: Endpoint,

    /// Sample period in seconds, shared by every probe on this node.
    #[serde(default = "default_probe_rate")]
    pub probe_rate: u32,

    /// Control-transaction timeout in seconds.
    #[serde(default = "default_comm_timeout")]
    pub comm_timeout: u32,

    /// Executable spawned as the probe-hosting process.
    #[serde(default = "default_probe_command")]
    pub probe_command: String,

    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

/// An upstream testpoint or broker to attach.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TestpointConfig {
    pub discovery: Endpoint,
    pub publish: Endpoint,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BrokerConfig {
    pub service: Endpoint,
    pub publish: Endpoint,

    #[serde(default)]
    pub testpoints: Vec<TestpointConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RecorderConfig {
    /// Data file the capture is written to. The index lands next to it
    /// with a `.db` suffix appended.
    pub output: PathBuf,

    #[serde(default)]
    pub testpoints: Vec<TestpointConfig>,
}

fn default_probe_rate() -> u32 {
    5
}

fn default_comm_timeout() -> u32 {
    10
}

fn default_probe_command() -> String {
    "telepoint-probe".to_string()
}

pub fn read_config_file<T: serde::de::DeserializeOwned + std::fmt::Debug>(
    path: impl AsRef<Path>,
) -> anyhow::Result<T> {
    let file_content = std::fs::read_to_string(path.as_ref())?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
