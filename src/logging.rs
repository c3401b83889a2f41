//! Component logging handles
//!
//! Every component receives a [`LogHandle`] through its constructor instead
//! of reaching for a process-wide singleton. The handle carries the component
//! label (`/nodeId/index/container` style) and emits through `tracing`, so
//! the binaries' subscriber configuration decides where records go.

use serde::{Deserialize, Serialize};

/// Endpoints of the external log fan-in service for one process.
///
/// The fan-in service itself is an external collaborator; processes that do
/// not wire one up report empty endpoint strings. The fields still travel in
/// bootstrap-ready and engine-ready messages so owners can register them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEndpoints {
    pub control: String,
    pub publish: String,
}

/// A labeled logging handle threaded through component constructors.
#[derive(Debug, Clone)]
pub struct LogHandle {
    label: String,
    endpoints: LogEndpoints,
}

impl LogHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            endpoints: LogEndpoints::default(),
        }
    }

    /// Derive a handle for a subcomponent, extending the label path.
    pub fn scoped(&self, suffix: &str) -> Self {
        Self {
            label: format!("{}/{}", self.label, suffix),
            endpoints: self.endpoints.clone(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fan-in endpoints advertised on behalf of this process.
    pub fn endpoints(&self) -> LogEndpoints {
        self.endpoints.clone()
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!(component = %self.label, "{}", message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!(component = %self.label, "{}", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!(component = %self.label, "{}", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!(component = %self.label, "{}", message.as_ref());
    }
}
