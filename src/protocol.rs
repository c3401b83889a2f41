//! Wire schemas for the control, bootstrap, discovery and report messages
//!
//! Everything on the wire is a tagged JSON document inside a multipart
//! frame. Report frames are the one two-part message: part 1 is the topic
//! string, part 2 the serialized [`ProbeReport`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::logging::LogEndpoints;
use crate::transport::{Endpoint, Message, Reply};
use crate::{ProbeIndex, ProbeNames};

/// Selects the concrete probe implementation in a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginDescriptor {
    /// Native probe resolved by library/plugin name.
    Native { name: String },

    /// Script-hosted probe resolved by module and class name.
    Script { module: String, class: String },
}

/// Lifecycle requests issued by a container to its probe-hosting process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeRequest {
    Create { plugin: PluginDescriptor },
    Initialize { configuration: Option<String> },
    Start,
    Stop,
    Destroy,
}

/// Replies on the probe control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeResponse {
    Success,
    Error { message: String },
    /// Successful initialize, carrying the qualified probe names.
    Initialize { names: ProbeNames },
}

impl Reply for ProbeResponse {
    fn success() -> Self {
        ProbeResponse::Success
    }

    fn failure(message: impl Into<String>) -> Self {
        ProbeResponse::Error {
            message: message.into(),
        }
    }

    fn as_error(&self) -> Option<&str> {
        match self {
            ProbeResponse::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Bootstrap report sent by a probe-hosting process over the rendezvous
/// channel once its sockets are bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusReport {
    Ready {
        control: Endpoint,
        publish: Endpoint,
        log: LogEndpoints,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusResponse {
    Success,
    Error { message: String },
}

impl Reply for StatusResponse {
    fn success() -> Self {
        StatusResponse::Success
    }

    fn failure(message: impl Into<String>) -> Self {
        StatusResponse::Error {
            message: message.into(),
        }
    }

    fn as_error(&self) -> Option<&str> {
        match self {
            StatusResponse::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Discovery query between tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryRequest {
    Discover,
}

/// Discovery answer: the deduplicated union of known topic names plus the
/// answering tier's own publish endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryResponse {
    Discovery {
        names: Vec<String>,
        publish: Option<Endpoint>,
    },
    Error {
        message: String,
    },
}

impl Reply for DiscoveryResponse {
    fn success() -> Self {
        DiscoveryResponse::Discovery {
            names: Vec::new(),
            publish: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        DiscoveryResponse::Error {
            message: message.into(),
        }
    }

    fn as_error(&self) -> Option<&str> {
        match self {
            DiscoveryResponse::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Record kinds carried in a report frame. Only measurement data today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Data,
}

/// The measurement payload of a report frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub name: String,
    pub module: String,
    pub version: u32,
    pub blob: Vec<u8>,
}

/// The wire record wrapping one probe sample.
///
/// Crosses the publish socket as the second part of a two-part frame and is
/// what recorders persist. The timestamp is the aligned schedule boundary
/// computed when the sample timer was armed, not the collection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub index: ProbeIndex,
    pub tag: String,
    pub uuid: Uuid,
    pub timestamp: i64,
    pub kind: ReportKind,
    pub data: ReportData,
}

impl ProbeReport {
    /// Encode as the two-part publish frame for `topic`.
    pub fn to_frame(&self, topic: &str) -> Result<Message> {
        let body = serde_json::to_vec(self)
            .map_err(|e| Error::Protocol(format!("unable to serialize report: {e}")))?;

        Ok(vec![topic.as_bytes().to_vec(), body])
    }

    /// Decode a two-part publish frame into `(topic, report)`.
    pub fn from_frame(message: &Message) -> Result<(String, Self)> {
        if message.len() != 2 {
            return Err(Error::Protocol(format!(
                "report frame has {} parts, expected 2",
                message.len()
            )));
        }

        let topic = String::from_utf8(message[0].clone())
            .map_err(|_| Error::Protocol("report topic is not UTF-8".to_string()))?;

        let report = serde_json::from_slice(&message[1])
            .map_err(|e| Error::Protocol(format!("unable to deserialize report: {e}")))?;

        Ok((topic, report))
    }
}
