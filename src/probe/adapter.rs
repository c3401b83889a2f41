//! Uniform handle over native and script-hosted probe instances

use std::path::Path;

use crate::error::Result;
use crate::protocol::PluginDescriptor;
use crate::{ProbeNames, ProbeSample};

use super::{Probe, ProbeLoader, ScriptHost};

/// A created probe instance, abstracting over how it was produced.
///
/// The variant records the provenance for logging; the lifecycle surface is
/// identical either way.
pub enum ProbeAdapter {
    Native { name: String, probe: Box<dyn Probe> },
    Script { module: String, probe: Box<dyn Probe> },
}

impl ProbeAdapter {
    /// Resolve `descriptor` against the loader or script host and create the
    /// instance. Failures surface as [`crate::error::Error::Plugin`].
    pub fn create(
        descriptor: &PluginDescriptor,
        loader: &dyn ProbeLoader,
        script_host: &dyn ScriptHost,
    ) -> Result<Self> {
        match descriptor {
            PluginDescriptor::Native { name } => Ok(ProbeAdapter::Native {
                name: name.clone(),
                probe: loader.load(name)?,
            }),
            PluginDescriptor::Script { module, class } => Ok(ProbeAdapter::Script {
                module: module.clone(),
                probe: script_host.instantiate(module, class)?,
            }),
        }
    }

    /// Human-readable provenance for log records.
    pub fn describe(&self) -> String {
        match self {
            ProbeAdapter::Native { name, .. } => format!("native:{name}"),
            ProbeAdapter::Script { module, .. } => format!("script:{module}"),
        }
    }

    fn inner(&mut self) -> &mut dyn Probe {
        match self {
            ProbeAdapter::Native { probe, .. } => probe.as_mut(),
            ProbeAdapter::Script { probe, .. } => probe.as_mut(),
        }
    }

    pub fn initialize(&mut self, configuration: Option<&Path>) -> Result<ProbeNames> {
        self.inner().initialize(configuration)
    }

    pub fn start(&mut self) -> Result<()> {
        self.inner().start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.inner().stop()
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.inner().destroy()
    }

    pub fn probe(&mut self) -> Result<Vec<ProbeSample>> {
        self.inner().probe()
    }
}
