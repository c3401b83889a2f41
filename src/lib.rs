pub mod broker;
pub mod builder;
pub mod config;
pub mod container;
pub mod controller;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod probe;
pub mod probes;
pub mod protocol;
pub mod recorder;
pub mod transport;

use serde::{Deserialize, Serialize};

/// Identifies a probe instance within one controller. Assigned sequentially
/// in probe-registration order.
pub type ProbeIndex = u32;

/// The dotted namespace names a probe instance publishes under, as returned
/// by `initialize`. Order is preserved.
pub type ProbeNames = Vec<String>;

/// One measurement produced by a probe's `probe()` call.
///
/// The blob is an opaque serialized payload; `message_name`, `message_module`
/// and `version` describe its schema so consumers can decode it without
/// linking the producing probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSample {
    /// Unqualified sample name. Must be one of the names advertised by
    /// `initialize`.
    pub name: String,

    /// Serialized measurement payload.
    pub blob: Vec<u8>,

    /// Schema message type name.
    pub message_name: String,

    /// Schema message module/namespace.
    pub message_module: String,

    /// Schema version.
    pub version: u32,
}

/// Qualify a sample name with the publishing node's id.
///
/// The qualified name is the globally-disambiguated publish topic:
/// `sampleName.nodeId`.
pub fn qualified_name(name: &str, node_id: &str) -> String {
    format!("{name}.{node_id}")
}
