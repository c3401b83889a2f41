//! Probe plugin traits and the hosting server
//!
//! A probe is a measurement plugin with a five-step lifecycle: create,
//! initialize, start, stop, destroy. The hosting process drives that
//! lifecycle from control requests and calls [`Probe::probe`] on aligned
//! schedule boundaries while the probe is running.

pub mod adapter;
pub mod scheduler;
pub mod server;

use std::path::Path;

use crate::error::{Error, Result};
use crate::{ProbeNames, ProbeSample};

pub use adapter::ProbeAdapter;
pub use scheduler::SampleSchedule;
pub use server::{BootstrapEnv, ProbeServer};

/// A measurement plugin.
///
/// Implementations are synchronous; the hosting server invokes them between
/// awaits, so a `probe()` call should stay short relative to the sample
/// period.
pub trait Probe: Send {
    /// Load configuration and report the unqualified names this probe will
    /// publish samples under.
    fn initialize(&mut self, configuration: Option<&Path>) -> Result<ProbeNames>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn destroy(&mut self) -> Result<()>;

    /// Collect the current measurements.
    fn probe(&mut self) -> Result<Vec<ProbeSample>>;
}

/// Resolves native probe plugins by name.
pub trait ProbeLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Box<dyn Probe>>;
}

/// Instantiates script-hosted probes by module and class.
pub trait ScriptHost: Send + Sync {
    fn instantiate(&self, module: &str, class: &str) -> Result<Box<dyn Probe>>;
}

/// Loader over the probes compiled into this binary.
#[derive(Debug, Default)]
pub struct BuiltinLoader;

impl ProbeLoader for BuiltinLoader {
    fn load(&self, name: &str) -> Result<Box<dyn Probe>> {
        match name {
            "timeofday" => Ok(Box::new(crate::probes::TimeOfDay::new())),
            "resources" => Ok(Box::new(crate::probes::Resources::new())),
            other => Err(Error::Plugin(format!("unknown probe plugin '{other}'"))),
        }
    }
}

/// Script host for builds without an embedded interpreter.
#[derive(Debug, Default)]
pub struct UnavailableScriptHost;

impl ScriptHost for UnavailableScriptHost {
    fn instantiate(&self, module: &str, _class: &str) -> Result<Box<dyn Probe>> {
        Err(Error::Plugin(format!(
            "script probes are not available in this build (requested module '{module}')"
        )))
    }
}
